//! Unified error types for the rgbw-ctrl firmware.
//!
//! Every subsystem funnels its failures into the crate-level `Error` so the
//! tick loop's handling stays uniform. All variants are `Copy` so they can be
//! passed around without allocation; transports log-and-continue rather than
//! tearing anything down.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A wire frame could not be decoded.
    Wire(WireError),
    /// NVS storage failed.
    Storage(StorageError),
    /// A transport (BLE / WebSocket / ESP-NOW) failed to deliver.
    Transport(TransportError),
    /// An OTA session was rejected or aborted.
    Ota(OtaError),
    /// Peripheral initialisation failed.
    Init(&'static str),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wire(e) => write!(f, "wire: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Ota(e) => write!(f, "ota: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl core::error::Error for Error {}

// ---------------------------------------------------------------------------
// Wire codec errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireError {
    /// Frame is empty or shorter than the payload its tag requires.
    Truncated,
    /// Leading byte is not a known message tag.
    UnknownTag(u8),
    /// Payload decoded but a field was out of its valid range.
    InvalidField,
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "frame truncated"),
            Self::UnknownTag(t) => write!(f, "unknown tag {t}"),
            Self::InvalidField => write!(f, "invalid field"),
        }
    }
}

impl From<WireError> for Error {
    fn from(e: WireError) -> Self {
        Self::Wire(e)
    }
}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Key does not exist in the namespace.
    NotFound,
    /// NVS partition is full.
    Full,
    /// Underlying flash I/O failed.
    IoError,
    /// Stored blob failed validation after decode.
    Corrupted,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "flash I/O error"),
            Self::Corrupted => write!(f, "stored blob corrupted"),
        }
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// A BLE notify could not be queued (no subscriber, stack down).
    NotifyFailed,
    /// WebSocket enqueue failed (client backpressure or gone).
    EnqueueFailed,
    /// ESP-NOW peer could not be registered.
    PeerAddFailed,
    /// ESP-NOW send was rejected by the radio.
    SendFailed,
    /// The transport has not been initialised.
    NotReady,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotifyFailed => write!(f, "BLE notify failed"),
            Self::EnqueueFailed => write!(f, "frame enqueue failed"),
            Self::PeerAddFailed => write!(f, "peer add failed"),
            Self::SendFailed => write!(f, "radio send failed"),
            Self::NotReady => write!(f, "transport not ready"),
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// OTA errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaError {
    /// A session is already running; concurrent starts are rejected.
    AlreadyRunning,
    /// Data arrived while no session was active.
    NotStarted,
    /// The flash write for a chunk failed.
    WriteFailed,
    /// The client disconnected before the image completed.
    Aborted,
}

impl fmt::Display for OtaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRunning => write!(f, "update already in progress"),
            Self::NotStarted => write!(f, "no update in progress"),
            Self::WriteFailed => write!(f, "flash write failed"),
            Self::Aborted => write!(f, "update aborted"),
        }
    }
}

impl From<OtaError> for Error {
    fn from(e: OtaError) -> Self {
        Self::Ota(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_prefixed_by_subsystem() {
        let e: Error = WireError::UnknownTag(99).into();
        assert_eq!(e.to_string(), "wire: unknown tag 99");

        let e: Error = StorageError::NotFound.into();
        assert_eq!(e.to_string(), "storage: key not found");
    }

    #[test]
    fn errors_are_copy() {
        fn takes_copy<T: Copy>(_: T) {}
        takes_copy(Error::Init("x"));
        takes_copy(TransportError::SendFailed);
    }
}
