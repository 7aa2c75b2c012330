//! OTA flash sink.
//!
//! Implements [`OtaFlashPort`] over the `esp-ota` wrapper: write into the
//! inactive app partition, mark it bootable on finalize. Session policy
//! (single upload, disconnect handling) lives in the OTA handler.

use crate::error::OtaError;
use crate::state::ota::OtaFlashPort;

// ── ESP-IDF backend ──────────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod espidf {
    use super::*;
    use log::warn;

    /// Partition-backed sink. `None` between sessions.
    pub struct EspOtaFlash {
        update: Option<esp_ota::OtaUpdate>,
    }

    impl EspOtaFlash {
        pub fn new() -> Self {
            Self { update: None }
        }
    }

    impl Default for EspOtaFlash {
        fn default() -> Self {
            Self::new()
        }
    }

    impl OtaFlashPort for EspOtaFlash {
        fn begin(&mut self) -> Result<(), OtaError> {
            let update = esp_ota::OtaUpdate::begin().map_err(|e| {
                warn!("ota: partition open failed: {e:?}");
                OtaError::WriteFailed
            })?;
            self.update = Some(update);
            Ok(())
        }

        fn write(&mut self, chunk: &[u8]) -> Result<(), OtaError> {
            let Some(update) = self.update.as_mut() else {
                return Err(OtaError::NotStarted);
            };
            update.write(chunk).map_err(|e| {
                warn!("ota: flash write failed: {e:?}");
                OtaError::WriteFailed
            })
        }

        fn finalize(&mut self) -> Result<(), OtaError> {
            let Some(update) = self.update.take() else {
                return Err(OtaError::NotStarted);
            };
            let mut completed = update.finalize().map_err(|e| {
                warn!("ota: image verification failed: {e:?}");
                OtaError::WriteFailed
            })?;
            completed.set_as_boot_partition().map_err(|e| {
                warn!("ota: boot partition switch failed: {e:?}");
                OtaError::WriteFailed
            })
        }

        fn abort(&mut self) {
            // Dropping the handle releases the partition without marking it.
            self.update = None;
        }
    }
}

#[cfg(target_os = "espidf")]
pub use espidf::EspOtaFlash;

// ── simulation backend ───────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
mod sim {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct SimOtaState {
        image: Vec<u8>,
        in_session: bool,
        finalized: bool,
        aborted: bool,
        fail_writes: bool,
    }

    /// In-memory sink recording the received image.
    pub struct SimOtaFlash {
        state: Rc<RefCell<SimOtaState>>,
    }

    impl SimOtaFlash {
        pub fn new() -> Self {
            Self {
                state: Rc::new(RefCell::new(SimOtaState::default())),
            }
        }

        pub fn handle(&self) -> SimOtaHandle {
            SimOtaHandle {
                state: Rc::clone(&self.state),
            }
        }
    }

    impl Default for SimOtaFlash {
        fn default() -> Self {
            Self::new()
        }
    }

    impl OtaFlashPort for SimOtaFlash {
        fn begin(&mut self) -> Result<(), OtaError> {
            let mut state = self.state.borrow_mut();
            state.image.clear();
            state.in_session = true;
            state.finalized = false;
            state.aborted = false;
            Ok(())
        }

        fn write(&mut self, chunk: &[u8]) -> Result<(), OtaError> {
            let mut state = self.state.borrow_mut();
            if !state.in_session {
                return Err(OtaError::NotStarted);
            }
            if state.fail_writes {
                return Err(OtaError::WriteFailed);
            }
            state.image.extend_from_slice(chunk);
            Ok(())
        }

        fn finalize(&mut self) -> Result<(), OtaError> {
            let mut state = self.state.borrow_mut();
            if !state.in_session {
                return Err(OtaError::NotStarted);
            }
            state.in_session = false;
            state.finalized = true;
            Ok(())
        }

        fn abort(&mut self) {
            let mut state = self.state.borrow_mut();
            state.in_session = false;
            state.aborted = true;
        }
    }

    /// Test-side view of the simulated flash.
    #[derive(Clone)]
    pub struct SimOtaHandle {
        state: Rc<RefCell<SimOtaState>>,
    }

    impl SimOtaHandle {
        pub fn image(&self) -> Vec<u8> {
            self.state.borrow().image.clone()
        }

        pub fn finalized(&self) -> bool {
            self.state.borrow().finalized
        }

        pub fn aborted(&self) -> bool {
            self.state.borrow().aborted
        }

        /// Make every subsequent write fail.
        pub fn fail_writes(&self) {
            self.state.borrow_mut().fail_writes = true;
        }
    }
}

#[cfg(not(target_os = "espidf"))]
pub use sim::{SimOtaFlash, SimOtaHandle};
