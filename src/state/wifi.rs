//! Wi-Fi state owner.
//!
//! Tracks link status, the connected-network details record and the result
//! of the most recent scan. Status only changes in response to stack events
//! reported by the radio adapter; this module never infers link state from
//! timers. Scanning is tick-driven with a single-slot request queue: a
//! second request while one is pending or running is dropped.

use crate::app::ports::{ScanPoll, StoragePort, WifiRadioPort};
use crate::persist;

/// Scan results are capped; the driver may report more.
pub const MAX_SCAN_RESULTS: usize = 15;

/// How often a running scan is polled for completion.
pub const SCAN_POLL_INTERVAL_MS: u32 = 500;

pub const MAX_SSID_LEN: usize = 32;
pub const MAX_PASSWORD_LEN: usize = 64;
pub const MAX_EAP_FIELD_LEN: usize = 128;

// ── status enums ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum WifiStatus {
    #[default]
    Disconnected = 0,
    Connected = 1,
    ConnectedNoIp = 2,
    WrongPassword = 3,
    NoApFound = 4,
    ConnectionFailed = 5,
    Unknown = 255,
}

impl WifiStatus {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Disconnected,
            1 => Self::Connected,
            2 => Self::ConnectedNoIp,
            3 => Self::WrongPassword,
            4 => Self::NoApFound,
            5 => Self::ConnectionFailed,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum WifiScanStatus {
    #[default]
    NotStarted = 0,
    Running = 1,
    Completed = 2,
    Failed = 3,
}

impl WifiScanStatus {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::NotStarted),
            1 => Some(Self::Running),
            2 => Some(Self::Completed),
            3 => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum WifiEncryption {
    #[default]
    Open = 0,
    Wep = 1,
    WpaPsk = 2,
    Wpa2Psk = 3,
    WpaWpa2Psk = 4,
    Enterprise = 5,
    Wpa3Psk = 6,
    Wpa2Wpa3Psk = 7,
    WapiPsk = 8,
    Wpa3Ent192 = 9,
    Invalid = 10,
}

impl WifiEncryption {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Open,
            1 => Self::Wep,
            2 => Self::WpaPsk,
            3 => Self::Wpa2Psk,
            4 => Self::WpaWpa2Psk,
            5 => Self::Enterprise,
            6 => Self::Wpa3Psk,
            7 => Self::Wpa2Wpa3Psk,
            8 => Self::WapiPsk,
            9 => Self::Wpa3Ent192,
            _ => Self::Invalid,
        }
    }
}

/// EAP phase-2 authentication scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum EapPhase2 {
    #[default]
    Eap = 0,
    Mschapv2 = 1,
    Mschap = 2,
    Pap = 3,
    Chap = 4,
}

impl EapPhase2 {
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Mschapv2,
            2 => Self::Mschap,
            3 => Self::Pap,
            4 => Self::Chap,
            _ => Self::Eap,
        }
    }
}

// ── records ──────────────────────────────────────────────────────

/// One network as seen by a scan.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WifiNetwork {
    pub ssid: heapless::String<MAX_SSID_LEN>,
    pub rssi: i32,
    pub encryption: WifiEncryption,
}

/// Details of the currently-associated network.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WifiDetails {
    pub ssid: heapless::String<MAX_SSID_LEN>,
    pub mac: [u8; 6],
    pub ip: u32,
    pub gateway: u32,
    pub subnet: u32,
    pub dns: u32,
}

/// Secrets for joining a network. Personal and enterprise variants are
/// mutually exclusive; the wire layout overlays them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WifiCredentials {
    Simple {
        password: heapless::String<MAX_PASSWORD_LEN>,
    },
    Eap {
        identity: heapless::String<MAX_EAP_FIELD_LEN>,
        username: heapless::String<MAX_EAP_FIELD_LEN>,
        password: heapless::String<MAX_EAP_FIELD_LEN>,
        phase2: EapPhase2,
    },
}

impl Default for WifiCredentials {
    fn default() -> Self {
        Self::Simple {
            password: heapless::String::new(),
        }
    }
}

/// Everything needed to join one network.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WifiConnectionDetails {
    pub ssid: heapless::String<MAX_SSID_LEN>,
    pub encryption: WifiEncryption,
    pub credentials: WifiCredentials,
}

/// Latest scan outcome, status plus the deduplicated network list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScanResult {
    pub status: WifiScanStatus,
    pub networks: heapless::Vec<WifiNetwork, MAX_SCAN_RESULTS>,
}

// ── manager ──────────────────────────────────────────────────────

pub struct WifiManager {
    radio: Box<dyn WifiRadioPort>,
    status: WifiStatus,
    details: WifiDetails,
    scan: ScanResult,
    /// Single-slot scan queue: true while a request waits for the tick loop.
    scan_requested: bool,
    last_scan_poll_ms: u32,
}

impl WifiManager {
    pub fn new(radio: Box<dyn WifiRadioPort>) -> Self {
        Self {
            radio,
            status: WifiStatus::Disconnected,
            details: WifiDetails::default(),
            scan: ScanResult::default(),
            scan_requested: false,
            last_scan_poll_ms: 0,
        }
    }

    pub fn status(&self) -> WifiStatus {
        self.status
    }

    pub fn details(&self) -> &WifiDetails {
        &self.details
    }

    pub fn scan_result(&self) -> &ScanResult {
        &self.scan
    }

    pub fn scan_status(&self) -> WifiScanStatus {
        self.scan.status
    }

    // ── stack event inputs (adapter-driven) ──────────────────────

    /// Called by the radio adapter when the stack reports a link change.
    pub fn on_status_event(&mut self, status: WifiStatus) {
        if self.status != status {
            log::info!("wifi: status {:?} -> {:?}", self.status, status);
            self.status = status;
        }
    }

    /// Called by the radio adapter once an IP is bound.
    pub fn on_got_ip(&mut self, details: WifiDetails) {
        self.details = details;
        self.on_status_event(WifiStatus::Connected);
    }

    pub fn set_hostname(&mut self, hostname: &str) {
        self.radio.set_hostname(hostname);
    }

    pub fn reconnect(&mut self) {
        self.radio.reconnect();
    }

    // ── connect / credentials ────────────────────────────────────

    pub fn has_stored_credentials(storage: &dyn StoragePort) -> bool {
        persist::load_wifi_credentials(storage).is_some()
    }

    /// Persist credentials, abandon any scan in flight and ask the radio to
    /// (re)associate.
    pub fn connect(&mut self, details: &WifiConnectionDetails, storage: &mut dyn StoragePort) {
        if let Err(e) = persist::save_wifi_credentials(storage, details) {
            log::warn!("wifi: persisting credentials failed: {e}");
        }
        self.scan = ScanResult::default();
        self.scan_requested = false;
        if let Err(e) = self.radio.connect(details) {
            log::error!("wifi: connect failed: {e}");
            self.on_status_event(WifiStatus::ConnectionFailed);
        }
    }

    /// Restore credentials on boot and associate if any exist. Returns true
    /// when an association was started.
    pub fn connect_stored(&mut self, storage: &mut dyn StoragePort) -> bool {
        let Some(details) = persist::load_wifi_credentials(storage) else {
            return false;
        };
        self.connect(&details, storage);
        true
    }

    // ── scanning ─────────────────────────────────────────────────

    /// Queue a scan. Returns false (and drops the request) when one is
    /// already queued or running.
    pub fn request_scan(&mut self) -> bool {
        if self.scan_requested || self.scan.status == WifiScanStatus::Running {
            log::warn!("wifi: scan request dropped, one already in flight");
            return false;
        }
        self.scan_requested = true;
        true
    }

    /// Tick: start a queued scan, poll a running one.
    pub fn handle(&mut self, now_ms: u32) {
        if self.scan_requested {
            self.scan_requested = false;
            self.scan.networks.clear();
            if self.radio.begin_scan().is_ok() {
                self.scan.status = WifiScanStatus::Running;
                self.last_scan_poll_ms = now_ms;
            } else {
                log::error!("wifi: scan start failed");
                self.scan.status = WifiScanStatus::Failed;
            }
            return;
        }

        if self.scan.status != WifiScanStatus::Running {
            return;
        }
        if now_ms.wrapping_sub(self.last_scan_poll_ms) < SCAN_POLL_INTERVAL_MS {
            return;
        }
        self.last_scan_poll_ms = now_ms;

        match self.radio.poll_scan() {
            ScanPoll::Pending => {}
            ScanPoll::Failed => {
                log::error!("wifi: scan failed");
                self.scan.status = WifiScanStatus::Failed;
            }
            ScanPoll::Done(raw) => {
                self.scan.networks = dedup_networks(&raw);
                self.scan.status = WifiScanStatus::Completed;
                log::info!("wifi: scan found {} networks", self.scan.networks.len());
            }
        }
    }
}

/// Keep the first record per SSID, skip hidden (empty-SSID) entries, cap at
/// [`MAX_SCAN_RESULTS`].
fn dedup_networks<const N: usize>(
    raw: &heapless::Vec<WifiNetwork, N>,
) -> heapless::Vec<WifiNetwork, MAX_SCAN_RESULTS> {
    let mut out: heapless::Vec<WifiNetwork, MAX_SCAN_RESULTS> = heapless::Vec::new();
    for network in raw {
        if network.ssid.is_empty() {
            continue;
        }
        if out.iter().any(|n| n.ssid == network.ssid) {
            continue;
        }
        if out.push(network.clone()).is_err() {
            break;
        }
    }
    out
}
