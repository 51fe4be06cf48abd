//! Status snapshot provider.
//!
//! Point-in-time device metrics for heartbeats, plus the static device
//! specifications sent with registration. Every reading tolerates its source
//! being unavailable: the field is omitted rather than failing the snapshot.

use serde::{Deserialize, Serialize};
use std::fs;
use sysinfo::{Disks, Networks, System};

const THERMAL_ZONE_PATH: &str = "/sys/class/thermal/thermal_zone0/temp";

/// One heartbeat payload, generated fresh each tick. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub uptime_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_memory_mb: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_memory_mb: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_usage_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_usage_percent: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_celsius: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageTotals>,
    pub network_type: String,
    pub app_version: String,
}

/// Aggregate storage across mounted disks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageTotals {
    pub total_mb: u64,
    pub available_mb: u64,
}

/// Static device description sent with registration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSpecs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kernel: Option<String>,
    pub arch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_memory_mb: Option<u64>,
    pub app_version: String,
}

/// Condensed device state attached to presence publishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub network_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_celsius: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageTotals>,
}

/// Collects device metrics. Stateless; each call reads fresh OS counters.
#[derive(Debug, Clone, Default)]
pub struct StatusProvider;

impl StatusProvider {
    pub fn new() -> Self {
        Self
    }

    /// Point-in-time status for one heartbeat tick.
    pub fn snapshot(&self) -> StatusSnapshot {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu_usage();
        // CPU usage needs a second sample after a short window.
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        sys.refresh_cpu_usage();

        let total = sys.total_memory();
        let available = sys.available_memory();
        let memory_usage_percent = if total > 0 {
            Some((((total - available) as f64 / total as f64) * 1000.0).round() / 10.0)
        } else {
            None
        };

        StatusSnapshot {
            uptime_seconds: System::uptime(),
            total_memory_mb: (total > 0).then(|| total / (1024 * 1024)),
            available_memory_mb: (total > 0).then(|| available / (1024 * 1024)),
            memory_usage_percent,
            cpu_usage_percent: cpu_estimate(&sys),
            temperature_celsius: read_temperature(),
            storage: storage_totals(),
            network_type: network_type(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Static specifications for the registration message.
    pub fn specifications(&self) -> DeviceSpecs {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu_usage();
        let total = sys.total_memory();
        DeviceSpecs {
            hostname: System::host_name(),
            os: System::long_os_version().or_else(System::name),
            kernel: System::kernel_version(),
            arch: std::env::consts::ARCH.to_string(),
            cpu_count: (!sys.cpus().is_empty()).then(|| sys.cpus().len()),
            total_memory_mb: (total > 0).then(|| total / (1024 * 1024)),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Condensed state for presence publishes.
    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            network_type: network_type(),
            temperature_celsius: read_temperature(),
            storage: storage_totals(),
        }
    }
}

fn cpu_estimate(sys: &System) -> Option<f32> {
    if sys.cpus().is_empty() {
        return None;
    }
    Some(sys.global_cpu_usage())
}

/// Thermal zone read; unavailable on most VMs and containers.
fn read_temperature() -> Option<f32> {
    let raw = fs::read_to_string(THERMAL_ZONE_PATH).ok()?;
    let millis: f32 = raw.trim().parse().ok()?;
    let celsius = millis / 1000.0;
    (celsius > 0.0).then_some(celsius)
}

fn storage_totals() -> Option<StorageTotals> {
    let disks = Disks::new_with_refreshed_list();
    let mut total = 0u64;
    let mut available = 0u64;
    for disk in disks.list() {
        total += disk.total_space();
        available += disk.available_space();
    }
    if total == 0 {
        return None;
    }
    Some(StorageTotals {
        total_mb: total / (1024 * 1024),
        available_mb: available / (1024 * 1024),
    })
}

/// Classify the first active non-loopback interface.
fn network_type() -> String {
    let networks = Networks::new_with_refreshed_list();
    let mut fallback = None;
    for (name, _data) in networks.iter() {
        if name.starts_with("lo") {
            continue;
        }
        if name.starts_with("wl") {
            return "WIFI".to_string();
        }
        if name.starts_with("en") || name.starts_with("eth") {
            return "ETHERNET".to_string();
        }
        fallback = Some("OTHER");
    }
    fallback.unwrap_or("UNKNOWN").to_string()
}
