//! OTA update session owner.
//!
//! One upload session at a time. A second start while a session runs is
//! rejected without touching the running session's counters. Completion is
//! reached when the final chunk flag arrives or the byte count reaches the
//! announced total; a disconnect before that aborts the session.

use crate::error::OtaError;

/// Flash-side sink for the incoming image. The esp-ota wrapper implements
/// this on the device; tests use an in-memory sink.
pub trait OtaFlashPort {
    fn begin(&mut self) -> Result<(), OtaError>;
    fn write(&mut self, chunk: &[u8]) -> Result<(), OtaError>;
    fn finalize(&mut self) -> Result<(), OtaError>;
    fn abort(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum OtaStatus {
    #[default]
    Idle = 0,
    Started = 1,
    Completed = 2,
    Failed = 3,
}

impl OtaStatus {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Idle),
            1 => Some(Self::Started),
            2 => Some(Self::Completed),
            3 => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Snapshot pushed to transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OtaProgress {
    pub status: OtaStatus,
    pub total_bytes_expected: u32,
    pub total_bytes_received: u32,
}

/// What the caller should do after the uploading client went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectAction {
    /// Nothing was running.
    None,
    /// Session aborted mid-flight.
    Aborted,
    /// Image complete; reboot into it.
    Restart,
}

pub struct OtaHandler {
    flash: Box<dyn OtaFlashPort>,
    status: OtaStatus,
    expected: u32,
    received: u32,
}

impl OtaHandler {
    pub fn new(flash: Box<dyn OtaFlashPort>) -> Self {
        Self {
            flash,
            status: OtaStatus::Idle,
            expected: 0,
            received: 0,
        }
    }

    pub fn status(&self) -> OtaStatus {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == OtaStatus::Started
    }

    pub fn progress(&self) -> OtaProgress {
        OtaProgress {
            status: self.status,
            total_bytes_expected: self.expected,
            total_bytes_received: self.received,
        }
    }

    /// Open a session. Rejects a concurrent start without mutating the
    /// session already in flight.
    pub fn begin(&mut self, expected_len: u32) -> Result<(), OtaError> {
        if self.status == OtaStatus::Started {
            log::warn!("ota: start rejected, update already in progress");
            return Err(OtaError::AlreadyRunning);
        }
        self.flash.begin()?;
        self.expected = expected_len;
        self.received = 0;
        self.status = OtaStatus::Started;
        log::info!("ota: session started, expecting {expected_len} bytes");
        Ok(())
    }

    /// Feed one chunk. `index` is the byte offset of this chunk within the
    /// image; `is_final` marks the transport's last-chunk flag.
    pub fn write_chunk(
        &mut self,
        index: u32,
        chunk: &[u8],
        is_final: bool,
    ) -> Result<(), OtaError> {
        if self.status != OtaStatus::Started {
            return Err(OtaError::NotStarted);
        }
        if let Err(e) = self.flash.write(chunk) {
            self.fail();
            return Err(e);
        }
        self.received = self.received.saturating_add(chunk.len() as u32);

        let reached_total =
            self.expected > 0 && index.saturating_add(chunk.len() as u32) >= self.expected;
        if is_final || reached_total {
            match self.flash.finalize() {
                Ok(()) => {
                    self.status = OtaStatus::Completed;
                    log::info!("ota: image complete ({} bytes)", self.received);
                }
                Err(e) => {
                    self.fail();
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// The uploading client went away.
    pub fn on_client_disconnect(&mut self) -> DisconnectAction {
        match self.status {
            OtaStatus::Started => {
                log::warn!(
                    "ota: client disconnected mid-update ({}/{} bytes)",
                    self.received,
                    self.expected
                );
                self.fail();
                DisconnectAction::Aborted
            }
            OtaStatus::Completed => DisconnectAction::Restart,
            _ => DisconnectAction::None,
        }
    }

    fn fail(&mut self) {
        self.flash.abort();
        self.status = OtaStatus::Failed;
    }
}
