//! Device identity bootstrap and persistence.
//!
//! The identity is created lazily on first need and is immutable once
//! persisted: repeated loads return the same record. The device id is derived
//! from the machine id when one is readable, with a timestamp fallback, and
//! the client id is derived deterministically from the device id.

use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const MACHINE_ID_PATH: &str = "/etc/machine-id";
const DEVICE_PREFIX: &str = "device_";
const CLIENT_PREFIX: &str = "agent_";

/// Stable agent identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentity {
    pub device_id: String,
    pub client_id: String,
}

impl DeviceIdentity {
    /// The shared suffix both ids are built from.
    pub fn suffix(&self) -> &str {
        self.device_id
            .strip_prefix(DEVICE_PREFIX)
            .unwrap_or(&self.device_id)
    }
}

/// Persists the identity record as JSON under the agent data directory.
pub struct IdentityStore {
    path: PathBuf,
    cached: Mutex<Option<DeviceIdentity>>,
}

impl IdentityStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("identity.json"),
            cached: Mutex::new(None),
        }
    }

    /// Load the persisted identity, creating and persisting one on first use.
    /// Explicit overrides win over both the persisted record and generation.
    pub fn load_or_create(
        &self,
        device_override: Option<&str>,
        client_override: Option<&str>,
    ) -> Result<DeviceIdentity> {
        if let (Some(device_id), Some(client_id)) = (device_override, client_override) {
            let identity = DeviceIdentity {
                device_id: device_id.to_string(),
                client_id: client_id.to_string(),
            };
            *self.cached.lock() = Some(identity.clone());
            return Ok(identity);
        }

        let mut cached = self.cached.lock();
        if let Some(identity) = cached.as_ref() {
            return Ok(identity.clone());
        }

        if self.path.exists() {
            let raw = fs::read_to_string(&self.path)
                .with_context(|| format!("read identity {}", self.path.display()))?;
            let identity: DeviceIdentity =
                serde_json::from_str(&raw).context("malformed identity record")?;
            *cached = Some(identity.clone());
            return Ok(identity);
        }

        let identity = generate_identity(machine_id().as_deref());
        self.persist(&identity)?;
        *cached = Some(identity.clone());
        tracing::info!(
            device_id = %identity.device_id,
            client_id = %identity.client_id,
            "generated new device identity"
        );
        Ok(identity)
    }

    /// Overwrite the persisted identity.
    pub fn set(&self, identity: &DeviceIdentity) -> Result<()> {
        self.persist(identity)?;
        *self.cached.lock() = Some(identity.clone());
        Ok(())
    }

    /// Remove the persisted identity so the next load regenerates it.
    pub fn reset(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("remove identity {}", self.path.display()))?;
        }
        *self.cached.lock() = None;
        Ok(())
    }

    fn persist(&self, identity: &DeviceIdentity) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create data dir {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(identity).context("serialize identity")?;
        fs::write(&self.path, raw)
            .with_context(|| format!("write identity {}", self.path.display()))?;
        Ok(())
    }
}

/// Derive an identity from a stable machine id, or fall back to a
/// timestamp-derived suffix when none is available.
fn generate_identity(machine_id: Option<&str>) -> DeviceIdentity {
    let suffix = match machine_id {
        Some(id) if id.len() >= 8 => id[id.len() - 8..].to_string(),
        _ => {
            let millis = Utc::now().timestamp_millis().to_string();
            let start = millis.len().saturating_sub(8);
            millis[start..].to_string()
        }
    };
    DeviceIdentity {
        device_id: format!("{DEVICE_PREFIX}{suffix}"),
        client_id: format!("{CLIENT_PREFIX}{suffix}"),
    }
}

fn machine_id() -> Option<String> {
    let raw = fs::read_to_string(MACHINE_ID_PATH).ok()?;
    let trimmed = raw.trim();
    // All-zero ids show up on unprovisioned images; treat them as absent.
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '0') {
        return None;
    }
    Some(trimmed.to_string())
}
