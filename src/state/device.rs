//! Device identity, credentials and housekeeping telemetry.
//!
//! Owns the device name (cached, invalidated on change), HTTP basic-auth
//! credentials, the restart request flag and the supply-voltage sensor with
//! its persisted calibration factor.

use core::fmt::Write as _;

use crate::app::ports::StoragePort;
use crate::persist;
use crate::state::wifi::WifiManager;

pub const FIRMWARE_VERSION: &str = "5.1.1";
pub const DEVICE_BASE_NAME: &str = "rgbw-ctrl-";
pub const MAX_DEVICE_NAME_LEN: usize = 28;

pub const MAX_CREDENTIAL_LEN: usize = 32;

/// Writing this token to the restart characteristic reboots the device.
pub const RESTART_TOKEN: &[u8] = b"RESTART_NOW";

/// Voltage sensor sampling cadence.
pub const VOLTAGE_SAMPLE_INTERVAL_MS: u32 = 50;
const VOLTAGE_WINDOW: usize = 20;
const DEFAULT_CALIBRATION_FACTOR: f32 = 11.0;

pub type DeviceName = heapless::String<MAX_DEVICE_NAME_LEN>;

/// HTTP basic-auth credentials guarding mutating endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpCredentials {
    pub username: heapless::String<MAX_CREDENTIAL_LEN>,
    pub password: heapless::String<MAX_CREDENTIAL_LEN>,
}

impl Default for HttpCredentials {
    fn default() -> Self {
        Self {
            username: heapless::String::try_from("admin").unwrap_or_default(),
            password: heapless::String::new(),
        }
    }
}

/// Raw supply-voltage reading source (ADC behind a divider).
pub trait VoltagePort {
    fn read_millivolts(&mut self) -> u32;
}

/// Calibrated voltage snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoltageData {
    pub milli_volts: u32,
    pub calibration_factor: f32,
}

// ── moving average ───────────────────────────────────────────────

struct MovingAverage<const N: usize> {
    samples: [u32; N],
    count: usize,
    next: usize,
}

impl<const N: usize> MovingAverage<N> {
    const fn new() -> Self {
        Self {
            samples: [0; N],
            count: 0,
            next: 0,
        }
    }

    fn push(&mut self, sample: u32) {
        self.samples[self.next] = sample;
        self.next = (self.next + 1) % N;
        self.count = (self.count + 1).min(N);
    }

    fn average(&self) -> u32 {
        if self.count == 0 {
            return 0;
        }
        let sum: u64 = self.samples[..self.count.min(N)]
            .iter()
            .map(|s| u64::from(*s))
            .sum();
        (sum / self.count as u64) as u32
    }
}

// ── manager ──────────────────────────────────────────────────────

pub struct DeviceManager {
    mac: [u8; 6],
    /// Empty means "not loaded"; reads go through `name()`.
    cached_name: DeviceName,
    credentials: HttpCredentials,
    restart_requested: bool,
    voltage_port: Box<dyn VoltagePort>,
    voltage_avg: MovingAverage<VOLTAGE_WINDOW>,
    calibration_factor: f32,
    last_voltage_sample_ms: u32,
}

impl DeviceManager {
    pub fn new(mac: [u8; 6], voltage_port: Box<dyn VoltagePort>) -> Self {
        Self {
            mac,
            cached_name: DeviceName::new(),
            credentials: HttpCredentials::default(),
            restart_requested: false,
            voltage_port,
            voltage_avg: MovingAverage::new(),
            calibration_factor: DEFAULT_CALIBRATION_FACTOR,
            last_voltage_sample_ms: 0,
        }
    }

    pub fn restore(&mut self, storage: &dyn StoragePort) {
        if let Some(credentials) = persist::load_http_credentials(storage) {
            self.credentials = credentials;
        }
        if let Some(factor) = persist::load_calibration(storage) {
            self.calibration_factor = factor;
        }
    }

    pub fn mac(&self) -> [u8; 6] {
        self.mac
    }

    pub fn firmware_version(&self) -> &'static str {
        FIRMWARE_VERSION
    }

    pub fn free_heap(&self) -> u32 {
        crate::adapters::sysinfo::free_heap()
    }

    // ── device name ──────────────────────────────────────────────

    /// Current name: cache, then storage, then `rgbw-ctrl-` + the last
    /// three MAC bytes in hex.
    pub fn name(&mut self, storage: &dyn StoragePort) -> &str {
        if self.cached_name.is_empty() {
            self.cached_name = match persist::load_device_name(storage) {
                Some(name) if !name.is_empty() => name,
                _ => Self::default_name(self.mac),
            };
        }
        self.cached_name.as_str()
    }

    /// Rename the device. Empty names are ignored, oversized names are
    /// truncated, unchanged names are a no-op. A real change persists, sets
    /// the network hostname and forces a reassociation so DHCP/mDNS pick
    /// the new name up.
    pub fn set_name(
        &mut self,
        name: &str,
        storage: &mut dyn StoragePort,
        wifi: &mut WifiManager,
    ) -> bool {
        if name.is_empty() {
            return false;
        }
        let truncated = truncate_str(name, MAX_DEVICE_NAME_LEN);
        if truncated == self.name(storage) {
            return false;
        }
        let Ok(next) = DeviceName::try_from(truncated) else {
            return false;
        };
        if let Err(e) = persist::save_device_name(storage, &next) {
            log::warn!("device: persisting name failed: {e}");
        }
        self.cached_name = next;
        log::info!("device: renamed to '{}'", self.cached_name);
        wifi.set_hostname(self.cached_name.as_str());
        wifi.reconnect();
        true
    }

    fn default_name(mac: [u8; 6]) -> DeviceName {
        let mut name = DeviceName::new();
        let _ = write!(name, "{DEVICE_BASE_NAME}{:02X}{:02X}{:02X}", mac[3], mac[4], mac[5]);
        name
    }

    // ── credentials ──────────────────────────────────────────────

    pub fn credentials(&self) -> &HttpCredentials {
        &self.credentials
    }

    pub fn set_credentials(&mut self, credentials: HttpCredentials, storage: &mut dyn StoragePort) {
        if let Err(e) = persist::save_http_credentials(storage, &credentials) {
            log::warn!("device: persisting credentials failed: {e}");
        }
        self.credentials = credentials;
    }

    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        self.credentials.username.as_str() == username
            && self.credentials.password.as_str() == password
    }

    // ── restart ──────────────────────────────────────────────────

    /// Handle a write to the restart characteristic. Only the exact token
    /// triggers a restart.
    pub fn on_restart_write(&mut self, payload: &[u8]) -> bool {
        if payload == RESTART_TOKEN {
            self.request_restart();
            return true;
        }
        false
    }

    pub fn request_restart(&mut self) {
        log::warn!("device: restart requested");
        self.restart_requested = true;
    }

    /// Polled by the binary's tick loop.
    pub fn take_restart_request(&mut self) -> bool {
        core::mem::take(&mut self.restart_requested)
    }

    // ── voltage sensor ───────────────────────────────────────────

    pub fn voltage(&self) -> VoltageData {
        VoltageData {
            milli_volts: self.voltage_avg.average(),
            calibration_factor: self.calibration_factor,
        }
    }

    pub fn calibration_factor(&self) -> f32 {
        self.calibration_factor
    }

    /// Handle a calibration write: exactly four little-endian f32 bytes,
    /// anything else is rejected.
    pub fn on_calibration_write(&mut self, payload: &[u8], storage: &mut dyn StoragePort) -> bool {
        let Ok(bytes) = <[u8; 4]>::try_from(payload) else {
            log::warn!("device: calibration write rejected, {} bytes", payload.len());
            return false;
        };
        let factor = f32::from_le_bytes(bytes);
        if !factor.is_finite() || factor <= 0.0 {
            return false;
        }
        self.calibration_factor = factor;
        if let Err(e) = persist::save_calibration(storage, factor) {
            log::warn!("device: persisting calibration failed: {e}");
        }
        true
    }

    /// Tick: sample the divider on a fixed cadence into the moving window.
    pub fn handle(&mut self, now_ms: u32) {
        if now_ms.wrapping_sub(self.last_voltage_sample_ms) < VOLTAGE_SAMPLE_INTERVAL_MS {
            return;
        }
        self.last_voltage_sample_ms = now_ms;
        let raw = self.voltage_port.read_millivolts();
        let scaled = (raw as f32 * self.calibration_factor) as u32;
        self.voltage_avg.push(scaled);
    }
}

/// Truncate at a char boundary so multi-byte names cannot split.
fn truncate_str(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::nvs::NvsAdapter;
    use crate::adapters::wifi::SimWifiRadio;

    struct FixedVolts(u32);
    impl VoltagePort for FixedVolts {
        fn read_millivolts(&mut self) -> u32 {
            self.0
        }
    }

    const MAC: [u8; 6] = [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE];

    fn manager() -> DeviceManager {
        DeviceManager::new(MAC, Box::new(FixedVolts(300)))
    }

    fn wifi() -> WifiManager {
        WifiManager::new(Box::new(SimWifiRadio::new()))
    }

    #[test]
    fn default_name_derives_from_mac_tail() {
        let mut m = manager();
        let nvs = NvsAdapter::new_sim();
        assert_eq!(m.name(&nvs), "rgbw-ctrl-EFCAFE");
    }

    #[test]
    fn stored_name_wins_over_derived() {
        let mut nvs = NvsAdapter::new_sim();
        persist::save_device_name(&mut nvs, &DeviceName::try_from("living-room").unwrap())
            .unwrap();
        let mut m = manager();
        assert_eq!(m.name(&nvs), "living-room");
    }

    #[test]
    fn set_name_ignores_empty_and_unchanged() {
        let mut m = manager();
        let mut nvs = NvsAdapter::new_sim();
        let mut wifi = wifi();
        assert!(!m.set_name("", &mut nvs, &mut wifi));
        assert!(m.set_name("lamp", &mut nvs, &mut wifi));
        assert!(!m.set_name("lamp", &mut nvs, &mut wifi), "unchanged is a no-op");
    }

    #[test]
    fn set_name_truncates_and_persists() {
        let mut m = manager();
        let mut nvs = NvsAdapter::new_sim();
        let mut wifi = wifi();
        let long = "a".repeat(40);
        assert!(m.set_name(&long, &mut nvs, &mut wifi));
        assert_eq!(m.name(&nvs).len(), MAX_DEVICE_NAME_LEN);
        assert_eq!(
            persist::load_device_name(&nvs).unwrap().len(),
            MAX_DEVICE_NAME_LEN
        );
    }

    #[test]
    fn name_round_trips_across_instances() {
        let mut nvs = NvsAdapter::new_sim();
        {
            let mut m = manager();
            let mut wifi = wifi();
            m.set_name("bedroom", &mut nvs, &mut wifi);
        }
        let mut m = manager();
        assert_eq!(m.name(&nvs), "bedroom");
    }

    #[test]
    fn restart_only_on_exact_token() {
        let mut m = manager();
        assert!(!m.on_restart_write(b"restart_now"));
        assert!(!m.take_restart_request());
        assert!(m.on_restart_write(RESTART_TOKEN));
        assert!(m.take_restart_request());
        assert!(!m.take_restart_request(), "flag is one-shot");
    }

    #[test]
    fn calibration_write_requires_exactly_four_bytes() {
        let mut m = manager();
        let mut nvs = NvsAdapter::new_sim();
        assert!(!m.on_calibration_write(&[1, 2, 3], &mut nvs));
        assert!(!m.on_calibration_write(&[1, 2, 3, 4, 5], &mut nvs));
        assert!(m.on_calibration_write(&2.5f32.to_le_bytes(), &mut nvs));
        assert!((m.calibration_factor() - 2.5).abs() < f32::EPSILON);
        assert_eq!(persist::load_calibration(&nvs), Some(2.5));
    }

    #[test]
    fn voltage_sampling_respects_cadence_and_calibration() {
        let mut m = manager();
        let mut nvs = NvsAdapter::new_sim();
        m.on_calibration_write(&2.0f32.to_le_bytes(), &mut nvs);

        m.handle(VOLTAGE_SAMPLE_INTERVAL_MS);
        assert_eq!(m.voltage().milli_volts, 600);

        // Too soon: no new sample taken.
        m.handle(VOLTAGE_SAMPLE_INTERVAL_MS + 1);
        assert_eq!(m.voltage().milli_volts, 600);
    }

    #[test]
    fn default_credentials_are_admin_blank() {
        let m = manager();
        assert!(m.authenticate("admin", ""));
        assert!(!m.authenticate("admin", "x"));
    }
}
