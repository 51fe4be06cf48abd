//! Wire format shared with the control plane.
//!
//! Every message, inbound or outbound, travels inside the same envelope:
//! `{type, deviceId, clientId, timestamp, data}`. The `data` object carries
//! the per-message payload and is decoded lazily by the handler that owns it.

pub mod envelope;
pub mod messages;

pub use envelope::Envelope;
pub use messages::{
    BroadcastNotice, CommandRequest, ContentKind, ContentPush, ContentStatus, PresenceStatus,
};
