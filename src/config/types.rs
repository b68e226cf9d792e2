//! Configuration types

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Current config file version
pub const CONFIG_VERSION: u32 = 1;

/// Baud rates offered by selectors
pub const BAUD_RATES: [u32; 8] = [9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600];

pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Longest read timeout allowed; bounds reader shutdown latency
pub const MAX_READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Shortest hold between deasserting and reasserting the reset lines
pub const MIN_RESET_SETTLE: Duration = Duration::from_millis(100);

/// Persisted monitor settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorConfig {
    pub version: u32,
    /// Baud rate selected at startup
    #[serde(default = "default_baud_rate")]
    pub default_baud_rate: u32,
    /// Per-line read timeout in milliseconds
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Hold time between the two halves of the reset sequence
    #[serde(default = "default_reset_settle_ms")]
    pub reset_settle_ms: u64,
    /// Port to select when present; otherwise the USB/ACM/COM heuristic applies
    #[serde(default)]
    pub preferred_port: Option<String>,
    #[serde(default = "default_true")]
    pub desktop_notifications: bool,
    #[serde(default = "default_notification_timeout")]
    pub notification_timeout_secs: u32,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_read_timeout_ms() -> u64 {
    100
}

fn default_reset_settle_ms() -> u64 {
    100
}

fn default_true() -> bool {
    true
}

fn default_notification_timeout() -> u32 {
    10
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            default_baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout_ms(),
            reset_settle_ms: default_reset_settle_ms(),
            preferred_port: None,
            desktop_notifications: true,
            notification_timeout_secs: default_notification_timeout(),
        }
    }
}

impl MonitorConfig {
    /// Read timeout, clamped to `(0, MAX_READ_TIMEOUT]`
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.max(1)).min(MAX_READ_TIMEOUT)
    }

    /// Reset hold time, never shorter than `MIN_RESET_SETTLE`
    pub fn reset_settle(&self) -> Duration {
        Duration::from_millis(self.reset_settle_ms).max(MIN_RESET_SETTLE)
    }
}
