//! Typed payloads carried in the envelope `data` field, plus the builders
//! for every message the agent publishes.

use crate::core::identity::DeviceIdentity;
use crate::protocol::Envelope;
use crate::status::{DeviceInfo, DeviceSpecs, StatusSnapshot};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const DEFAULT_DURATION_SECONDS: u64 = 10;

// -----------------------------------------------------------------------------
// Inbound payloads
// -----------------------------------------------------------------------------

/// Content kinds the agent can display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Image,
    Video,
    Text,
    Webpage,
}

impl ContentKind {
    /// Parse a pushed type string. Unknown kinds are reported back as an
    /// "unsupported content type" error, not a parse failure.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            "text" => Some(Self::Text),
            "webpage" => Some(Self::Webpage),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Text => "text",
            Self::Webpage => "webpage",
        }
    }
}

/// A content-push directive. `type` stays a free-form string so an
/// unsupported kind still parses and can be rejected with its content id.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentPush {
    pub content_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Source reference; the backend pushes either `url` or `fileUrl`.
    #[serde(alias = "fileUrl")]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default = "default_duration")]
    pub duration: u64,
}

fn default_duration() -> u64 {
    DEFAULT_DURATION_SECONDS
}

impl ContentPush {
    pub fn from_data(data: &Value) -> Result<Self> {
        serde_json::from_value(data.clone()).context("malformed content push data")
    }
}

/// An administrative command.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandRequest {
    pub command: String,
}

impl CommandRequest {
    pub fn from_data(data: &Value) -> Result<Self> {
        serde_json::from_value(data.clone()).context("malformed command data")
    }
}

/// An operator broadcast notice.
#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastNotice {
    pub message: String,
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_level() -> String {
    "info".into()
}

impl BroadcastNotice {
    pub fn from_data(data: &Value) -> Result<Self> {
        serde_json::from_value(data.clone()).context("malformed broadcast data")
    }
}

// -----------------------------------------------------------------------------
// Outbound payloads
// -----------------------------------------------------------------------------

/// Lifecycle status of one content push, reported on `device/content_response`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    Received,
    Downloading,
    Playing,
    Completed,
    Error,
}

impl ContentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Downloading => "downloading",
            Self::Playing => "playing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

/// Agent presence reported on `device/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceStatus {
    Online,
    Offline,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

/// Registration message sent on every successful connect.
pub fn register(identity: &DeviceIdentity, specs: &DeviceSpecs) -> Envelope {
    let suffix = identity.suffix();
    Envelope::outbound(
        "register",
        identity,
        json!({
            "deviceId": identity.device_id,
            "name": format!("screen_agent_{suffix}"),
            "type": "screen_agent",
            "location": {
                "name": "unassigned",
                "address": "unassigned",
                "coordinates": {"latitude": 0.0, "longitude": 0.0},
            },
            "specifications": specs,
            "version": env!("CARGO_PKG_VERSION"),
            "capabilities": ["display", "audio"],
        }),
    )
}

/// Heartbeat message carrying one status snapshot.
pub fn heartbeat(identity: &DeviceIdentity, snapshot: &StatusSnapshot) -> Envelope {
    Envelope::outbound(
        "heartbeat",
        identity,
        serde_json::to_value(snapshot).unwrap_or(Value::Null),
    )
}

/// Presence message published on connect, disconnect, and `get_status`.
pub fn presence(identity: &DeviceIdentity, status: PresenceStatus, info: &DeviceInfo) -> Envelope {
    Envelope::outbound(
        "status",
        identity,
        json!({
            "status": status.as_str(),
            "deviceInfo": info,
        }),
    )
}

/// Per-content lifecycle response.
pub fn content_response(
    identity: &DeviceIdentity,
    content_id: &str,
    status: ContentStatus,
    error: Option<&str>,
) -> Envelope {
    Envelope::outbound(
        "content_response",
        identity,
        json!({
            "contentId": content_id,
            "status": status.as_str(),
            "error": error,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> DeviceIdentity {
        DeviceIdentity {
            device_id: "device_aabbccdd".into(),
            client_id: "agent_aabbccdd".into(),
        }
    }

    #[test]
    fn test_content_push_defaults() {
        let data = json!({"contentId": "c1", "type": "image", "url": "http://x/y.png"});
        let push = ContentPush::from_data(&data).unwrap();
        assert_eq!(push.duration, 10);
        assert_eq!(push.kind, "image");
        assert!(push.title.is_none());
    }

    #[test]
    fn test_content_push_file_url_alias() {
        let data = json!({"contentId": "c2", "type": "video", "fileUrl": "http://x/v.mp4"});
        let push = ContentPush::from_data(&data).unwrap();
        assert_eq!(push.url.as_deref(), Some("http://x/v.mp4"));
    }

    #[test]
    fn test_content_push_missing_id_rejected() {
        let data = json!({"type": "image", "url": "http://x"});
        assert!(ContentPush::from_data(&data).is_err());
    }

    #[test]
    fn test_content_kind_parse() {
        assert_eq!(ContentKind::parse("Video"), Some(ContentKind::Video));
        assert_eq!(ContentKind::parse("hologram"), None);
    }

    #[test]
    fn test_registration_round_trip() {
        let id = identity();
        let env = register(&id, &DeviceSpecs::default());
        let parsed = Envelope::parse(&env.to_payload().unwrap()).unwrap();
        assert_eq!(parsed.device_id.as_deref(), Some(id.device_id.as_str()));
        assert_eq!(parsed.client_id.as_deref(), Some(id.client_id.as_str()));
        assert_eq!(parsed.data["deviceId"], id.device_id.as_str());
        assert_eq!(parsed.data["type"], "screen_agent");
    }

    #[test]
    fn test_content_response_shape() {
        let env = content_response(&identity(), "c9", ContentStatus::Error, Some("boom"));
        assert_eq!(env.kind, "content_response");
        assert_eq!(env.data["contentId"], "c9");
        assert_eq!(env.data["status"], "error");
        assert_eq!(env.data["error"], "boom");

        let ok = content_response(&identity(), "c9", ContentStatus::Playing, None);
        assert_eq!(ok.data["status"], "playing");
        assert!(ok.data["error"].is_null());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(ContentStatus::Completed.is_terminal());
        assert!(ContentStatus::Error.is_terminal());
        assert!(!ContentStatus::Downloading.is_terminal());
        assert!(!ContentStatus::Playing.is_terminal());
    }
}
