//! Agent configuration: file loading, env overrides, validation, and the
//! live settings handle shared with the background schedulers.

use anyhow::{bail, Context, Result};
use parking_lot::RwLock;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Top-level configuration for the agent.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_broker_host")]
    pub broker_host: String,
    #[serde(default = "default_broker_port")]
    pub broker_port: u16,
    /// Explicit identity overrides; generated and persisted when absent.
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default = "default_auto_connect")]
    pub auto_connect: bool,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_seconds: u64,
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_seconds: u64,
    #[serde(default = "default_keepalive")]
    pub keepalive_seconds: u64,
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_seconds: u64,
    /// Directory for downloaded media; resolved via the shared-downloads
    /// fallback chain when unset.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    /// Directory for persisted agent state (identity record).
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(default)]
    pub fetch: FetchConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_fetch_connect_timeout")]
    pub connect_timeout_seconds: u64,
    #[serde(default = "default_fetch_read_timeout")]
    pub read_timeout_seconds: u64,
    #[serde(default = "default_fetch_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout_seconds: default_fetch_connect_timeout(),
            read_timeout_seconds: default_fetch_read_timeout(),
            max_concurrent: default_fetch_max_concurrent(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        // serde defaults double as the programmatic defaults
        toml::from_str("").expect("empty config deserializes")
    }
}

impl AgentConfig {
    /// Load configuration from the path in `BEACON_CONFIG`, defaulting to
    /// `config/beacon.toml`. Env overrides are applied after parsing.
    pub fn load_from_env() -> Result<Self> {
        Self::load_or_default(env_config_path())
    }

    /// Load configuration from `path` when it exists, fall back to defaults
    /// otherwise. Env overrides are applied after parsing and the result is
    /// validated.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        let mut cfg = if path_ref.exists() {
            Self::load(path_ref)?
        } else {
            Self::default()
        };
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from a specific file (TOML or JSON by extension).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        let data = fs::read_to_string(path_ref)
            .with_context(|| format!("unable to read config {}", path_ref.display()))?;
        let cfg: Self = if is_json(path_ref) {
            serde_json::from_str(&data)
                .with_context(|| format!("invalid JSON config {}", path_ref.display()))?
        } else {
            toml::from_str(&data)
                .with_context(|| format!("invalid TOML config {}", path_ref.display()))?
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Schema-level invariants checked before startup.
    pub fn validate(&self) -> Result<()> {
        if self.broker_host.is_empty() {
            bail!("broker_host must be non-empty");
        }
        if self.broker_port == 0 {
            bail!("broker_port must be non-zero");
        }
        if self.heartbeat_interval_seconds == 0 {
            bail!("heartbeat_interval_seconds must be > 0");
        }
        if self.reconnect_delay_seconds == 0 {
            bail!("reconnect_delay_seconds must be > 0");
        }
        if self.keepalive_seconds == 0 {
            bail!("keepalive_seconds must be > 0");
        }
        if self.fetch.max_concurrent == 0 {
            bail!("fetch.max_concurrent must be > 0");
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("BEACON_BROKER_HOST") {
            self.broker_host = host;
        }
        if let Ok(port) = std::env::var("BEACON_BROKER_PORT") {
            self.broker_port = port
                .parse()
                .context("BEACON_BROKER_PORT must be a port number")?;
        }
        if let Ok(level) = std::env::var("BEACON_LOG") {
            self.log_level = Some(level);
        }
        Ok(())
    }

    /// Directory holding persisted agent state, created on demand.
    pub fn resolve_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("beacon")
        })
    }
}

fn env_config_path() -> PathBuf {
    if let Ok(path) = std::env::var("BEACON_CONFIG") {
        PathBuf::from(path)
    } else {
        PathBuf::from("config/beacon.toml")
    }
}

fn is_json(path: &Path) -> bool {
    matches!(path.extension().and_then(|s| s.to_str()), Some("json"))
}

fn default_broker_host() -> String {
    "127.0.0.1".into()
}

const fn default_broker_port() -> u16 {
    1883
}

const fn default_auto_connect() -> bool {
    true
}

const fn default_heartbeat_interval() -> u64 {
    30
}

const fn default_reconnect_delay() -> u64 {
    5
}

const fn default_keepalive() -> u64 {
    60
}

const fn default_connection_timeout() -> u64 {
    30
}

const fn default_fetch_connect_timeout() -> u64 {
    15
}

const fn default_fetch_read_timeout() -> u64 {
    30
}

const fn default_fetch_max_concurrent() -> usize {
    2
}

/// Commented starter config written by `beacon init`.
pub const EXAMPLE_CONFIG: &str = r#"# beacon agent configuration

broker_host = "127.0.0.1"
broker_port = 1883

# Connect automatically on startup.
auto_connect = true

heartbeat_interval_seconds = 30
reconnect_delay_seconds = 5
keepalive_seconds = 60
connection_timeout_seconds = 30

# log_level = "info"
# cache_dir = "/var/lib/beacon/media"
# data_dir = "/var/lib/beacon"

[fetch]
connect_timeout_seconds = 15
read_timeout_seconds = 30
max_concurrent = 2
"#;

// -----------------------------------------------------------------------------
// Live settings handle
// -----------------------------------------------------------------------------

/// Shared, live-readable settings. The heartbeat scheduler reads the interval
/// fresh each tick, so a replaced config takes effect on the next cycle.
#[derive(Debug, Clone)]
pub struct Settings {
    inner: Arc<RwLock<AgentConfig>>,
}

impl Settings {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    pub fn get(&self) -> AgentConfig {
        self.inner.read().clone()
    }

    pub fn heartbeat_interval_seconds(&self) -> u64 {
        self.inner.read().heartbeat_interval_seconds
    }

    pub fn reconnect_delay_seconds(&self) -> u64 {
        self.inner.read().reconnect_delay_seconds
    }

    pub fn replace(&self, config: AgentConfig) {
        *self.inner.write() = config;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_values() {
        let cfg = AgentConfig::default();
        assert_eq!(cfg.broker_port, 1883);
        assert!(cfg.auto_connect);
        assert_eq!(cfg.heartbeat_interval_seconds, 30);
        assert_eq!(cfg.reconnect_delay_seconds, 5);
        assert_eq!(cfg.keepalive_seconds, 60);
        assert_eq!(cfg.connection_timeout_seconds, 30);
        assert_eq!(cfg.fetch.connect_timeout_seconds, 15);
        assert_eq!(cfg.fetch.read_timeout_seconds, 30);
        cfg.validate().unwrap();
    }

    #[test]
    fn test_load_toml_overrides() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("beacon.toml");
        fs::write(
            &path,
            r#"
broker_host = "broker.example"
broker_port = 1884
heartbeat_interval_seconds = 10

[fetch]
max_concurrent = 4
"#,
        )
        .unwrap();
        let cfg = AgentConfig::load(&path).unwrap();
        assert_eq!(cfg.broker_host, "broker.example");
        assert_eq!(cfg.broker_port, 1884);
        assert_eq!(cfg.heartbeat_interval_seconds, 10);
        assert_eq!(cfg.fetch.max_concurrent, 4);
        // Untouched fields keep defaults
        assert_eq!(cfg.reconnect_delay_seconds, 5);
    }

    #[test]
    fn test_load_or_default_tolerates_missing_file() {
        let dir = tempdir().unwrap();
        let cfg = AgentConfig::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.broker_port, 1883);

        let path = dir.path().join("beacon.toml");
        fs::write(&path, "broker_port = 1999\n").unwrap();
        let cfg = AgentConfig::load_or_default(&path).unwrap();
        assert_eq!(cfg.broker_port, 1999);
    }

    #[test]
    fn test_load_json_by_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("beacon.json");
        fs::write(&path, r#"{"broker_host": "b", "broker_port": 2000}"#).unwrap();
        let cfg = AgentConfig::load(&path).unwrap();
        assert_eq!(cfg.broker_host, "b");
        assert_eq!(cfg.broker_port, 2000);
    }

    #[test]
    fn test_validate_rejects_zero_intervals() {
        let mut cfg = AgentConfig::default();
        cfg.heartbeat_interval_seconds = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = AgentConfig::default();
        cfg.broker_port = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = AgentConfig::default();
        cfg.fetch.max_concurrent = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_example_config_parses_to_defaults() {
        let cfg: AgentConfig = toml::from_str(EXAMPLE_CONFIG).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.heartbeat_interval_seconds, 30);
    }

    #[test]
    fn test_settings_live_replace() {
        let settings = Settings::new(AgentConfig::default());
        assert_eq!(settings.heartbeat_interval_seconds(), 30);
        let mut next = AgentConfig::default();
        next.heartbeat_interval_seconds = 7;
        settings.replace(next);
        assert_eq!(settings.heartbeat_interval_seconds(), 7);
    }
}
