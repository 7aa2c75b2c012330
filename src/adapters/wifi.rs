//! Wi-Fi station radio adapter.
//!
//! Implements [`WifiRadioPort`] — scan, connect, reconnect. Link state is
//! never synthesized here: the device backend forwards driver events through
//! the event queue and the Wi-Fi state owner reacts to those.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: raw `esp_wifi_*` / `esp_netif_*` calls.
//!   Driver callbacks run on the Wi-Fi task and only push events.
//! - **all other targets**: [`SimWifiRadio`] with a stageable scan result.

use crate::app::ports::{ScanPoll, WifiRadioPort};
use crate::error::TransportError;
use crate::state::wifi::{WifiConnectionDetails, WifiNetwork, MAX_SCAN_RESULTS};

/// Raw scan capacity handed back to the state owner (deduplication and the
/// public cap happen there).
pub const RAW_SCAN_CAP: usize = MAX_SCAN_RESULTS * 2;

// ── ESP-IDF backend ──────────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod espidf {
    use super::*;
    use crate::state::wifi::{WifiCredentials, WifiDetails, WifiEncryption, WifiStatus};
    use core::sync::atomic::{AtomicBool, Ordering};
    use esp_idf_svc::sys::*;
    use log::{error, info, warn};

    /// Set by the SCAN_DONE driver event, cleared by `poll_scan`.
    static SCAN_DONE: AtomicBool = AtomicBool::new(false);
    static SCAN_FAILED: AtomicBool = AtomicBool::new(false);

    fn cstr_field<const N: usize>(value: &str) -> [u8; N] {
        let mut buf = [0u8; N];
        let bytes = value.as_bytes();
        let len = bytes.len().min(N - 1);
        buf[..len].copy_from_slice(&bytes[..len]);
        buf
    }

    unsafe extern "C" fn wifi_event_handler(
        _arg: *mut core::ffi::c_void,
        event_base: esp_event_base_t,
        event_id: i32,
        event_data: *mut core::ffi::c_void,
    ) {
        if event_base == unsafe { WIFI_EVENT } {
            match event_id as u32 {
                wifi_event_t_WIFI_EVENT_STA_CONNECTED => {
                    crate::events::push(crate::events::Event::WifiStatus(
                        WifiStatus::ConnectedNoIp,
                    ));
                }
                wifi_event_t_WIFI_EVENT_STA_DISCONNECTED => {
                    let reason =
                        unsafe { (*(event_data as *mut wifi_event_sta_disconnected_t)).reason }
                            as u32;
                    let status = match reason {
                        wifi_err_reason_t_WIFI_REASON_AUTH_FAIL
                        | wifi_err_reason_t_WIFI_REASON_4WAY_HANDSHAKE_TIMEOUT
                        | wifi_err_reason_t_WIFI_REASON_HANDSHAKE_TIMEOUT => {
                            WifiStatus::WrongPassword
                        }
                        wifi_err_reason_t_WIFI_REASON_NO_AP_FOUND => WifiStatus::NoApFound,
                        _ => WifiStatus::Disconnected,
                    };
                    crate::events::push(crate::events::Event::WifiStatus(status));
                }
                wifi_event_t_WIFI_EVENT_SCAN_DONE => {
                    let status =
                        unsafe { (*(event_data as *mut wifi_event_sta_scan_done_t)).status };
                    SCAN_FAILED.store(status != 0, Ordering::Relaxed);
                    SCAN_DONE.store(true, Ordering::Relaxed);
                }
                _ => {}
            }
        } else if event_base == unsafe { IP_EVENT }
            && event_id as u32 == ip_event_t_IP_EVENT_STA_GOT_IP
        {
            let event = unsafe { &*(event_data as *mut ip_event_got_ip_t) };
            let mut details = WifiDetails {
                ip: event.ip_info.ip.addr,
                gateway: event.ip_info.gw.addr,
                subnet: event.ip_info.netmask.addr,
                ..WifiDetails::default()
            };
            let mut ap: wifi_ap_record_t = unsafe { core::mem::zeroed() };
            if unsafe { esp_wifi_sta_get_ap_info(&mut ap) } == ESP_OK {
                let len = ap.ssid.iter().position(|b| *b == 0).unwrap_or(ap.ssid.len());
                if let Ok(ssid) = core::str::from_utf8(&ap.ssid[..len]) {
                    let _ = details.ssid.push_str(ssid);
                }
            }
            unsafe {
                esp_read_mac(details.mac.as_mut_ptr(), esp_mac_type_t_ESP_MAC_WIFI_STA);
            }
            crate::events::push(crate::events::Event::WifiGotIp(details));
        }
    }

    /// Station-mode radio over the raw driver.
    pub struct EspWifiRadio {
        netif: *mut esp_netif_t,
    }

    impl EspWifiRadio {
        /// Bring the driver up in station mode. `esp_netif_init` and the
        /// default event loop must already exist.
        pub fn new() -> Result<Self, TransportError> {
            let netif = unsafe { esp_netif_create_default_wifi_sta() };
            if netif.is_null() {
                return Err(TransportError::NotReady);
            }
            let cfg = wifi_init_config_t::default();
            unsafe {
                if esp_wifi_init(&cfg) != ESP_OK {
                    error!("wifi: driver init failed");
                    return Err(TransportError::NotReady);
                }
                esp_event_handler_register(
                    WIFI_EVENT,
                    ESP_EVENT_ANY_ID,
                    Some(wifi_event_handler),
                    core::ptr::null_mut(),
                );
                esp_event_handler_register(
                    IP_EVENT,
                    ip_event_t_IP_EVENT_STA_GOT_IP as i32,
                    Some(wifi_event_handler),
                    core::ptr::null_mut(),
                );
                esp_wifi_set_mode(wifi_mode_t_WIFI_MODE_STA);
                if esp_wifi_start() != ESP_OK {
                    error!("wifi: start failed");
                    return Err(TransportError::NotReady);
                }
            }
            info!("wifi: station started");
            Ok(Self { netif })
        }

        fn apply_credentials(details: &WifiConnectionDetails) -> Result<(), TransportError> {
            let mut config: wifi_config_t = unsafe { core::mem::zeroed() };
            config.sta.ssid = cstr_field::<32>(details.ssid.as_str());
            match &details.credentials {
                WifiCredentials::Simple { password } => {
                    config.sta.password = cstr_field::<64>(password.as_str());
                }
                WifiCredentials::Eap {
                    identity,
                    username,
                    password,
                    phase2,
                } => {
                    unsafe {
                        esp_eap_client_set_identity(
                            identity.as_ptr(),
                            identity.len() as i32,
                        );
                        esp_eap_client_set_username(
                            username.as_ptr(),
                            username.len() as i32,
                        );
                        esp_eap_client_set_password(
                            password.as_ptr(),
                            password.len() as i32,
                        );
                        esp_eap_client_set_ttls_phase2_method(*phase2 as i32);
                        esp_wifi_sta_enterprise_enable();
                    }
                }
            }
            if details.encryption != WifiEncryption::Enterprise {
                // Leaving a previous enterprise session enabled would
                // poison a plain PSK association.
                unsafe { esp_wifi_sta_enterprise_disable() };
            }
            let ret = unsafe {
                esp_wifi_set_config(wifi_interface_t_WIFI_IF_STA, &mut config)
            };
            if ret == ESP_OK {
                Ok(())
            } else {
                Err(TransportError::NotReady)
            }
        }
    }

    impl WifiRadioPort for EspWifiRadio {
        fn begin_scan(&mut self) -> Result<(), TransportError> {
            SCAN_DONE.store(false, Ordering::Relaxed);
            SCAN_FAILED.store(false, Ordering::Relaxed);
            let ret = unsafe { esp_wifi_scan_start(core::ptr::null(), false) };
            if ret == ESP_OK {
                Ok(())
            } else {
                Err(TransportError::NotReady)
            }
        }

        fn poll_scan(&mut self) -> ScanPoll {
            if !SCAN_DONE.load(Ordering::Relaxed) {
                return ScanPoll::Pending;
            }
            SCAN_DONE.store(false, Ordering::Relaxed);
            if SCAN_FAILED.load(Ordering::Relaxed) {
                return ScanPoll::Failed;
            }

            let mut count: u16 = RAW_SCAN_CAP as u16;
            let mut records: [wifi_ap_record_t; RAW_SCAN_CAP] = unsafe { core::mem::zeroed() };
            if unsafe { esp_wifi_scan_get_ap_records(&mut count, records.as_mut_ptr()) } != ESP_OK
            {
                return ScanPoll::Failed;
            }

            let mut networks = heapless::Vec::new();
            for record in records.iter().take(count as usize) {
                let len = record
                    .ssid
                    .iter()
                    .position(|b| *b == 0)
                    .unwrap_or(record.ssid.len());
                let Ok(ssid) = core::str::from_utf8(&record.ssid[..len]) else {
                    continue;
                };
                let Ok(ssid) = heapless::String::try_from(ssid) else {
                    continue;
                };
                let network = WifiNetwork {
                    ssid,
                    rssi: record.rssi as i32,
                    encryption: WifiEncryption::from_u8(record.authmode as u8),
                };
                if networks.push(network).is_err() {
                    break;
                }
            }
            ScanPoll::Done(networks)
        }

        fn connect(&mut self, details: &WifiConnectionDetails) -> Result<(), TransportError> {
            Self::apply_credentials(details)?;
            unsafe { esp_wifi_disconnect() };
            let ret = unsafe { esp_wifi_connect() };
            if ret == ESP_OK {
                info!("wifi: associating with '{}'", details.ssid);
                Ok(())
            } else {
                Err(TransportError::NotReady)
            }
        }

        fn set_hostname(&mut self, hostname: &str) {
            let buf = cstr_field::<33>(hostname);
            let ret = unsafe { esp_netif_set_hostname(self.netif, buf.as_ptr() as *const _) };
            if ret != ESP_OK {
                warn!("wifi: setting hostname failed ({ret})");
            }
        }

        fn reconnect(&mut self) {
            unsafe {
                esp_wifi_disconnect();
                esp_wifi_connect();
            }
        }
    }
}

#[cfg(target_os = "espidf")]
pub use espidf::EspWifiRadio;

// ── simulation backend ───────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
mod sim {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct SimWifiState {
        staged: Option<Vec<WifiNetwork>>,
        scanning: bool,
        scan_polls: usize,
        connects: Vec<WifiConnectionDetails>,
        hostname: String,
        reconnects: usize,
    }

    /// Deterministic radio: a staged scan completes on the first poll.
    pub struct SimWifiRadio {
        state: Rc<RefCell<SimWifiState>>,
    }

    impl SimWifiRadio {
        pub fn new() -> Self {
            Self {
                state: Rc::new(RefCell::new(SimWifiState::default())),
            }
        }

        /// Queue the raw records the next scan reports (driver order,
        /// duplicates and empty SSIDs included).
        pub fn stage_scan(&self, networks: Vec<WifiNetwork>) {
            self.state.borrow_mut().staged = Some(networks);
        }

        pub fn handle(&self) -> SimWifiHandle {
            SimWifiHandle {
                state: Rc::clone(&self.state),
            }
        }
    }

    impl Default for SimWifiRadio {
        fn default() -> Self {
            Self::new()
        }
    }

    impl WifiRadioPort for SimWifiRadio {
        fn begin_scan(&mut self) -> Result<(), TransportError> {
            self.state.borrow_mut().scanning = true;
            Ok(())
        }

        fn poll_scan(&mut self) -> ScanPoll {
            let mut state = self.state.borrow_mut();
            if !state.scanning {
                return ScanPoll::Failed;
            }
            state.scan_polls += 1;
            state.scanning = false;
            let mut networks = heapless::Vec::new();
            for network in state.staged.take().unwrap_or_default() {
                if networks.push(network).is_err() {
                    break;
                }
            }
            ScanPoll::Done(networks)
        }

        fn connect(&mut self, details: &WifiConnectionDetails) -> Result<(), TransportError> {
            self.state.borrow_mut().connects.push(details.clone());
            Ok(())
        }

        fn set_hostname(&mut self, hostname: &str) {
            self.state.borrow_mut().hostname = hostname.to_string();
        }

        fn reconnect(&mut self) {
            self.state.borrow_mut().reconnects += 1;
        }
    }

    /// Test-side view of the simulated radio.
    #[derive(Clone)]
    pub struct SimWifiHandle {
        state: Rc<RefCell<SimWifiState>>,
    }

    impl SimWifiHandle {
        pub fn scan_polls(&self) -> usize {
            self.state.borrow().scan_polls
        }

        pub fn connects(&self) -> Vec<WifiConnectionDetails> {
            self.state.borrow().connects.clone()
        }

        pub fn hostname(&self) -> String {
            self.state.borrow().hostname.clone()
        }

        pub fn reconnects(&self) -> usize {
            self.state.borrow().reconnects
        }
    }
}

#[cfg(not(target_os = "espidf"))]
pub use sim::{SimWifiHandle, SimWifiRadio};
