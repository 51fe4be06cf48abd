//! Topic layout and inbound topic classification.

/// Published on every successful connect.
pub const TOPIC_REGISTER: &str = "device/register";
/// Periodic status snapshots.
pub const TOPIC_HEARTBEAT: &str = "device/heartbeat";
/// Online/offline presence.
pub const TOPIC_STATUS: &str = "device/status";
/// Per-content lifecycle events.
pub const TOPIC_CONTENT_RESPONSE: &str = "device/content_response";
/// Operator broadcast notices.
pub const TOPIC_BROADCAST: &str = "broadcast/all";

const CONTENT_SUFFIX: &str = "/content";
const COMMAND_SUFFIX: &str = "/commands";

/// Per-device content push topic.
pub fn content_topic(client_id: &str) -> String {
    format!("device/{client_id}{CONTENT_SUFFIX}")
}

/// Per-device command topic.
pub fn command_topic(client_id: &str) -> String {
    format!("device/{client_id}{COMMAND_SUFFIX}")
}

/// Inbound topic classes the dispatcher routes on. Routing is by topic, not
/// by the envelope `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicClass {
    Content,
    Command,
    Broadcast,
}

/// Classify an inbound topic; unknown topics return None and are dropped.
pub fn classify(topic: &str) -> Option<TopicClass> {
    if topic == TOPIC_BROADCAST {
        Some(TopicClass::Broadcast)
    } else if topic.ends_with(CONTENT_SUFFIX) {
        Some(TopicClass::Content)
    } else if topic.ends_with(COMMAND_SUFFIX) {
        Some(TopicClass::Command)
    } else {
        None
    }
}
