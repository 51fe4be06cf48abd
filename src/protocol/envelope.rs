//! Message envelope parsing and construction.

use crate::core::identity::DeviceIdentity;
use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Common envelope wrapping every message on the wire.
///
/// Inbound messages are parsed leniently: only `type` is required, and the
/// identity fields may be absent on broker-originated messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Epoch milliseconds.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Build an outbound envelope stamped with the agent identity and now().
    pub fn outbound(kind: &str, identity: &DeviceIdentity, data: Value) -> Self {
        Self {
            kind: kind.to_string(),
            device_id: Some(identity.device_id.clone()),
            client_id: Some(identity.client_id.clone()),
            timestamp: Utc::now().timestamp_millis(),
            data,
        }
    }

    /// Parse an inbound payload. Malformed input is an error the dispatcher
    /// logs and drops; it never tears down the session.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload).context("malformed message envelope")
    }

    pub fn to_payload(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).context("serialize envelope")
    }
}
