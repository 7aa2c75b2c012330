//! Port traits — the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ state owner (domain)
//! ```
//!
//! Every trait here has two implementations: a host-side simulation used by
//! the test suite and an ESP-IDF adapter compiled only for the device. State
//! owners hold ports as trait objects and never touch FFI directly.

use crate::config::SystemConfig;
use crate::error::{StorageError, TransportError};
use crate::state::output::Channel;
use crate::state::wifi::{MAX_SCAN_RESULTS, WifiConnectionDetails, WifiNetwork};

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain → NVS)
// ───────────────────────────────────────────────────────────────

/// Namespaced key/value blob storage (NVS on the device).
pub trait StoragePort {
    /// Read a value into `buf`, returning the number of bytes copied.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write (create or overwrite) a value.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;

    /// Delete a key. Deleting a missing key is not an error.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No stored configuration found.
    NotFound,
    /// Stored bytes could not be decoded.
    Corrupted,
    /// Decoded config failed range validation.
    ValidationFailed(&'static str),
    /// Underlying storage failed.
    Storage(StorageError),
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "no stored config"),
            Self::Corrupted => write!(f, "stored config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
        }
    }
}

/// Load/save of the validated [`SystemConfig`]. Implementations MUST
/// validate before persisting.
pub trait ConfigPort {
    fn load(&self) -> Result<SystemConfig, ConfigError>;
    fn save(&mut self, config: &SystemConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Output port (domain → LEDC PWM)
// ───────────────────────────────────────────────────────────────

/// PWM duty sink for the four RGBW channels (8-bit resolution).
pub trait OutputPort {
    fn set_duty(&mut self, channel: Channel, duty: u8);
}

// ───────────────────────────────────────────────────────────────
// Wi-Fi radio port
// ───────────────────────────────────────────────────────────────

/// Result of polling an in-flight scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanPoll {
    /// Scan still running.
    Pending,
    /// Scan finished; raw records in driver order, duplicates included.
    Done(heapless::Vec<WifiNetwork, { MAX_SCAN_RESULTS * 2 }>),
    /// Scan aborted by the driver.
    Failed,
}

/// Station-mode Wi-Fi operations the state machine needs. Association
/// mechanics stay inside the adapter; status changes come back through
/// stack events.
pub trait WifiRadioPort {
    fn begin_scan(&mut self) -> Result<(), TransportError>;
    fn poll_scan(&mut self) -> ScanPoll;
    fn connect(&mut self, details: &WifiConnectionDetails) -> Result<(), TransportError>;
    fn set_hostname(&mut self, hostname: &str);
    /// Tear down any association so a reconnect picks up new credentials.
    fn reconnect(&mut self);
}

// ───────────────────────────────────────────────────────────────
// ESP-NOW radio port
// ───────────────────────────────────────────────────────────────

/// Raw ESP-NOW primitives used by the remote-side sender.
pub trait EspNowRadioPort {
    fn has_peer(&self, mac: &[u8; 6]) -> bool;
    fn add_peer(&mut self, mac: &[u8; 6]) -> Result<(), TransportError>;
    fn send(&mut self, mac: &[u8; 6], payload: &[u8]) -> Result<(), TransportError>;
    /// Full radio deinit + reinit, used once when the peer table is wedged.
    fn reinit(&mut self) -> Result<(), TransportError>;
}
