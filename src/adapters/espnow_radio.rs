//! ESP-NOW radio adapter.
//!
//! Implements [`EspNowRadioPort`] for the remote's sender and owns the
//! receive callback on the controller side. Received frames are pushed to
//! the event queue; pairing policy and decoding live in the transport layer.

use crate::app::ports::EspNowRadioPort;
use crate::error::TransportError;

// ── ESP-IDF backend ──────────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod espidf {
    use super::*;
    use esp_idf_svc::sys::*;
    use log::{info, warn};

    unsafe extern "C" fn recv_callback(
        info: *const esp_now_recv_info_t,
        data: *const u8,
        len: i32,
    ) {
        if info.is_null() || data.is_null() || len < 0 {
            return;
        }
        let src = unsafe { (*info).src_addr };
        if src.is_null() {
            return;
        }
        let mut sender = [0u8; 6];
        unsafe {
            core::ptr::copy_nonoverlapping(src, sender.as_mut_ptr(), 6);
        }
        let bytes = unsafe { core::slice::from_raw_parts(data, len as usize) };
        let Ok(payload) = heapless::Vec::from_slice(bytes) else {
            // Longer than any command frame we speak.
            return;
        };
        crate::events::push(crate::events::Event::EspNowFrame { sender, payload });
    }

    /// Radio over the raw `esp_now_*` driver. Wi-Fi must already be started
    /// in station mode.
    pub struct EspNowRadio;

    impl EspNowRadio {
        pub fn new() -> Result<Self, TransportError> {
            Self::bring_up()?;
            Ok(Self)
        }

        fn bring_up() -> Result<(), TransportError> {
            unsafe {
                if esp_now_init() != ESP_OK {
                    return Err(TransportError::NotReady);
                }
                if esp_now_register_recv_cb(Some(recv_callback)) != ESP_OK {
                    esp_now_deinit();
                    return Err(TransportError::NotReady);
                }
            }
            info!("espnow: radio up");
            Ok(())
        }
    }

    impl EspNowRadioPort for EspNowRadio {
        fn has_peer(&self, mac: &[u8; 6]) -> bool {
            unsafe { esp_now_is_peer_exist(mac.as_ptr()) }
        }

        fn add_peer(&mut self, mac: &[u8; 6]) -> Result<(), TransportError> {
            let mut peer: esp_now_peer_info_t = unsafe { core::mem::zeroed() };
            peer.peer_addr.copy_from_slice(mac);
            peer.channel = 0; // current Wi-Fi channel
            peer.ifidx = wifi_interface_t_WIFI_IF_STA;
            peer.encrypt = false;
            let ret = unsafe { esp_now_add_peer(&peer) };
            if ret == ESP_OK {
                Ok(())
            } else {
                warn!("espnow: add_peer failed ({ret})");
                Err(TransportError::PeerAddFailed)
            }
        }

        fn send(&mut self, mac: &[u8; 6], payload: &[u8]) -> Result<(), TransportError> {
            let ret = unsafe { esp_now_send(mac.as_ptr(), payload.as_ptr(), payload.len()) };
            if ret == ESP_OK {
                Ok(())
            } else {
                Err(TransportError::SendFailed)
            }
        }

        fn reinit(&mut self) -> Result<(), TransportError> {
            unsafe {
                esp_now_deinit();
            }
            Self::bring_up()
        }
    }
}

#[cfg(target_os = "espidf")]
pub use espidf::EspNowRadio;

// ── simulation backend ───────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
mod sim {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct SimEspNowState {
        peers: Vec<[u8; 6]>,
        peer_adds: usize,
        failing_adds: usize,
        sent: Vec<([u8; 6], Vec<u8>)>,
        reinits: usize,
    }

    /// In-memory radio with an injectable peer-table failure.
    pub struct SimEspNowRadio {
        state: Rc<RefCell<SimEspNowState>>,
    }

    impl SimEspNowRadio {
        pub fn new() -> Self {
            Self {
                state: Rc::new(RefCell::new(SimEspNowState::default())),
            }
        }

        pub fn handle(&self) -> SimEspNowHandle {
            SimEspNowHandle {
                state: Rc::clone(&self.state),
            }
        }
    }

    impl Default for SimEspNowRadio {
        fn default() -> Self {
            Self::new()
        }
    }

    impl EspNowRadioPort for SimEspNowRadio {
        fn has_peer(&self, mac: &[u8; 6]) -> bool {
            self.state.borrow().peers.contains(mac)
        }

        fn add_peer(&mut self, mac: &[u8; 6]) -> Result<(), TransportError> {
            let mut state = self.state.borrow_mut();
            state.peer_adds += 1;
            if state.failing_adds > 0 {
                state.failing_adds -= 1;
                return Err(TransportError::PeerAddFailed);
            }
            if !state.peers.contains(mac) {
                state.peers.push(*mac);
            }
            Ok(())
        }

        fn send(&mut self, mac: &[u8; 6], payload: &[u8]) -> Result<(), TransportError> {
            self.state.borrow_mut().sent.push((*mac, payload.to_vec()));
            Ok(())
        }

        fn reinit(&mut self) -> Result<(), TransportError> {
            let mut state = self.state.borrow_mut();
            state.reinits += 1;
            state.peers.clear();
            Ok(())
        }
    }

    /// Test-side view of the simulated radio.
    #[derive(Clone)]
    pub struct SimEspNowHandle {
        state: Rc<RefCell<SimEspNowState>>,
    }

    impl SimEspNowHandle {
        /// Fail the next `count` peer-add attempts.
        pub fn fail_peer_adds(&self, count: usize) {
            self.state.borrow_mut().failing_adds = count;
        }

        pub fn peer_adds(&self) -> usize {
            self.state.borrow().peer_adds
        }

        pub fn sent(&self) -> Vec<([u8; 6], Vec<u8>)> {
            self.state.borrow().sent.clone()
        }

        pub fn reinits(&self) -> usize {
            self.state.borrow().reinits
        }
    }
}

#[cfg(not(target_os = "espidf"))]
pub use sim::{SimEspNowHandle, SimEspNowRadio};
