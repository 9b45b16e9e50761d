//! Reading value object and collector fingerprint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A single timestamped sensor value.
///
/// This struct is the JSON body of `POST {api_url}/data` and matches the `SensorData`
/// schema of the core API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Identifies the collector host, not the device
    pub fingerprint: String,

    /// Identifier of the device the sensor is attached to
    pub mcu_dev_id: u32,

    /// Sensor name, unique within the device
    pub sensor_name: String,

    /// Measured value (always finite)
    pub value: f64,

    /// Capture time at the collector
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    /// Create a reading stamped with the current wall-clock time.
    pub fn new(
        fingerprint: impl Into<String>,
        mcu_dev_id: u32,
        sensor_name: impl Into<String>,
        value: f64,
    ) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            mcu_dev_id,
            sensor_name: sensor_name.into(),
            value,
            timestamp: Utc::now(),
        }
    }
}

/// Compute the collector host fingerprint.
///
/// SHA-256 (hex) over the host name, CPU architecture, OS, OS family and a machine-unique
/// id (the primary MAC address, else `/etc/machine-id`). Stable for a given machine across
/// restarts.
pub fn machine_fingerprint() -> String {
    fingerprint_of(&host_name(), &machine_id())
}

fn fingerprint_of(host: &str, machine_id: &str) -> String {
    let raw = format!(
        "{}{}{}{}{}",
        host,
        std::env::consts::ARCH,
        std::env::consts::OS,
        std::env::consts::FAMILY,
        machine_id,
    );
    format!("{:x}", Sha256::digest(raw.as_bytes()))
}

fn host_name() -> String {
    let name = gethostname::gethostname().to_string_lossy().trim().to_string();
    if name.is_empty() {
        "localhost".to_string()
    } else {
        name
    }
}

fn machine_id() -> String {
    if let Ok(Some(mac)) = mac_address::get_mac_address() {
        return mac.to_string();
    }

    std::fs::read_to_string("/etc/machine-id")
        .map(|id| id.trim().to_string())
        .unwrap_or_default()
}
