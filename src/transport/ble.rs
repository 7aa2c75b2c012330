//! BLE GATT transport.
//!
//! The controller wraps a [`BleBackend`] (NimBLE-style stack on the device,
//! an in-memory fake on the host) and owns the advertise/connect lifecycle:
//! the stack is powered on on demand, advertises for a bounded window and is
//! torn down completely from the tick thread when nobody connected. Status
//! is always derived, never stored: no stack → Off, a subscriber → Connected,
//! otherwise Advertising.
//!
//! Characteristic values are the tagged frames from [`crate::wire`]; notify
//! gates commit only after the backend accepted the notification.

use crate::error::TransportError;
use crate::state::device::VoltageData;
use crate::state::output::OutputState;
use crate::throttle::ThrottledGate;
use crate::wire::WireMessage;

/// Advertising window. Refreshed by `start()` and by a live connection, so
/// teardown happens 30 s after the last activity, not after power-on.
pub const ADVERTISING_TIMEOUT_MS: u32 = 30_000;

/// Notify gate windows.
pub const COLOR_NOTIFY_MS: u32 = 500;
pub const HEAP_NOTIFY_MS: u32 = 500;
pub const VOLTAGE_NOTIFY_MS: u32 = 1_000;

/// Manufacturer-specific advertisement: ID, device type, subtype.
pub const MANUFACTURER_ID: u16 = 54321;
pub const DEVICE_TYPE: u8 = 0xAA;
pub const SUBTYPE_CONTROLLER: u8 = 0xAA;
pub const SUBTYPE_REMOTE: u8 = 0xBB;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Controller,
    Remote,
}

/// The 4-byte manufacturer data blob carried in the advertisement.
pub fn manufacturer_data(kind: DeviceKind) -> [u8; 4] {
    let id = MANUFACTURER_ID.to_le_bytes();
    let subtype = match kind {
        DeviceKind::Controller => SUBTYPE_CONTROLLER,
        DeviceKind::Remote => SUBTYPE_REMOTE,
    };
    [id[0], id[1], DEVICE_TYPE, subtype]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum BleStatus {
    #[default]
    Off = 0,
    Advertising = 1,
    Connected = 2,
}

impl BleStatus {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Off),
            1 => Some(Self::Advertising),
            2 => Some(Self::Connected),
            _ => None,
        }
    }
}

// ── GATT layout ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Device,
    Http,
    Output,
    Alexa,
    EspNowController,
    EspNowRemote,
    Wifi,
}

impl Service {
    pub const fn uuid(self) -> &'static str {
        match self {
            Self::Device => "12345678-1234-1234-1234-1234567890a0",
            Self::Http => "12345678-1234-1234-1234-1234567890a1",
            Self::Output => "12345678-1234-1234-1234-1234567890a2",
            Self::Alexa => "12345678-1234-1234-1234-1234567890a3",
            Self::EspNowController => "12345678-1234-1234-1234-1234567890a4",
            Self::EspNowRemote => "12345678-1234-1234-1234-1234567890a5",
            Self::Wifi => "12345678-1234-1234-1234-1234567890a6",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Characteristic {
    Restart,
    DeviceName,
    FirmwareVersion,
    Heap,
    Voltage,
    HttpCredentials,
    OutputColor,
    AlexaSettings,
    EspNowRemotes,
    EspNowController,
    WifiDetails,
    WifiStatus,
    WifiScanStatus,
    WifiScanResult,
}

impl Characteristic {
    pub const fn uuid(self) -> &'static str {
        match self {
            Self::Restart => "aaaaaaaa-bbbb-cccc-dddd-eeeeeeee0000",
            Self::DeviceName => "aaaaaaaa-bbbb-cccc-dddd-eeeeeeee0001",
            Self::FirmwareVersion => "aaaaaaaa-bbbb-cccc-dddd-eeeeeeee0002",
            Self::Heap => "aaaaaaaa-bbbb-cccc-dddd-eeeeeeee0003",
            Self::Voltage => "aaaaaaaa-bbbb-cccc-dddd-eeeeeeee0004",
            Self::HttpCredentials => "aaaaaaaa-bbbb-cccc-dddd-eeeeeeee0005",
            Self::OutputColor => "aaaaaaaa-bbbb-cccc-dddd-eeeeeeee0006",
            Self::AlexaSettings => "aaaaaaaa-bbbb-cccc-dddd-eeeeeeee0007",
            Self::EspNowRemotes => "aaaaaaaa-bbbb-cccc-dddd-eeeeeeee0008",
            Self::EspNowController => "aaaaaaaa-bbbb-cccc-dddd-eeeeeeee0009",
            Self::WifiDetails => "aaaaaaaa-bbbb-cccc-dddd-eeeeeeee000a",
            Self::WifiStatus => "aaaaaaaa-bbbb-cccc-dddd-eeeeeeee000b",
            Self::WifiScanStatus => "aaaaaaaa-bbbb-cccc-dddd-eeeeeeee000c",
            Self::WifiScanResult => "aaaaaaaa-bbbb-cccc-dddd-eeeeeeee000d",
        }
    }
}

// ── backend ──────────────────────────────────────────────────────

/// Stack operations the controller drives. `power_on`/`power_off` bracket
/// the whole stack lifetime; nothing here is callable while powered off.
pub trait BleBackend {
    fn power_on(&mut self, device_name: &str) -> Result<(), TransportError>;
    fn start_advertising(&mut self, manufacturer_data: [u8; 4]) -> Result<(), TransportError>;
    fn connected_count(&self) -> usize;
    fn notify(&mut self, characteristic: Characteristic, value: &[u8])
    -> Result<(), TransportError>;
    fn disconnect_all(&mut self);
    fn power_off(&mut self);
}

// ── controller ───────────────────────────────────────────────────

pub struct BleController {
    backend: Box<dyn BleBackend>,
    kind: DeviceKind,
    powered: bool,
    last_activity_ms: u32,
    advertising_timeout_ms: u32,
    color_gate: ThrottledGate<OutputState>,
    heap_gate: ThrottledGate<u32>,
    voltage_gate: ThrottledGate<u32>,
}

impl BleController {
    pub fn new(backend: Box<dyn BleBackend>, kind: DeviceKind) -> Self {
        Self {
            backend,
            kind,
            powered: false,
            last_activity_ms: 0,
            advertising_timeout_ms: ADVERTISING_TIMEOUT_MS,
            color_gate: ThrottledGate::new(COLOR_NOTIFY_MS),
            heap_gate: ThrottledGate::new(HEAP_NOTIFY_MS),
            voltage_gate: ThrottledGate::new(VOLTAGE_NOTIFY_MS),
        }
    }

    /// Override the advertising window (from [`SystemConfig`]).
    ///
    /// [`SystemConfig`]: crate::config::SystemConfig
    pub fn set_advertising_timeout(&mut self, timeout_ms: u32) {
        self.advertising_timeout_ms = timeout_ms;
    }

    pub fn status(&self) -> BleStatus {
        if !self.powered {
            BleStatus::Off
        } else if self.backend.connected_count() > 0 {
            BleStatus::Connected
        } else {
            BleStatus::Advertising
        }
    }

    /// Power the stack on (if needed) and (re)start advertising. Safe to
    /// call while already running; it just refreshes the timeout window.
    pub fn start(&mut self, now_ms: u32, device_name: &str) {
        self.last_activity_ms = now_ms;
        if !self.powered {
            if let Err(e) = self.backend.power_on(device_name) {
                log::error!("ble: power on failed: {e}");
                return;
            }
            self.powered = true;
            log::info!("ble: stack up, advertising as '{device_name}'");
        }
        if let Err(e) = self.backend.start_advertising(manufacturer_data(self.kind)) {
            log::error!("ble: advertising failed: {e}");
        }
    }

    /// Disconnect everyone and tear the stack down.
    pub fn stop(&mut self) {
        if !self.powered {
            return;
        }
        self.backend.disconnect_all();
        self.backend.power_off();
        self.powered = false;
        log::info!("ble: stack down");
    }

    /// Tick: a live connection keeps the window open; with nobody connected
    /// the stack is torn down once the window expires.
    pub fn handle(&mut self, now_ms: u32) {
        if !self.powered {
            return;
        }
        if self.status() == BleStatus::Connected {
            self.last_activity_ms = now_ms;
            return;
        }
        if now_ms.wrapping_sub(self.last_activity_ms) > self.advertising_timeout_ms {
            log::info!("ble: advertising timed out");
            self.stop();
        }
    }

    // ── notifies ─────────────────────────────────────────────────

    /// Gate commits only when the backend accepted the notification, so a
    /// failed push is retried next tick.
    pub fn notify_color(&mut self, now_ms: u32, state: OutputState) {
        if !self.powered || !self.color_gate.should_send(now_ms, &state) {
            return;
        }
        let frame = WireMessage::Color(state).encode();
        if self.backend.notify(Characteristic::OutputColor, &frame).is_ok() {
            self.color_gate.commit(now_ms, state);
        }
    }

    pub fn notify_heap(&mut self, now_ms: u32, free_heap: u32) {
        if !self.powered || !self.heap_gate.interval_elapsed(now_ms) {
            return;
        }
        let frame = WireMessage::Heap(free_heap).encode();
        if self.backend.notify(Characteristic::Heap, &frame).is_ok() {
            self.heap_gate.commit(now_ms, free_heap);
        }
    }

    pub fn notify_voltage(&mut self, now_ms: u32, voltage: VoltageData) {
        if !self.powered || !self.voltage_gate.interval_elapsed(now_ms) {
            return;
        }
        let mut payload = [0u8; 8];
        payload[..4].copy_from_slice(&voltage.milli_volts.to_le_bytes());
        payload[4..].copy_from_slice(&voltage.calibration_factor.to_le_bytes());
        if self.backend.notify(Characteristic::Voltage, &payload).is_ok() {
            self.voltage_gate.commit(now_ms, voltage.milli_volts);
        }
    }

    /// Unthrottled push for event-driven values (status, name, roster).
    pub fn notify_message(&mut self, characteristic: Characteristic, message: &WireMessage) {
        if !self.powered {
            return;
        }
        let frame = message.encode();
        if let Err(e) = self.backend.notify(characteristic, &frame) {
            log::debug!("ble: notify {characteristic:?} dropped: {e}");
        }
    }
}
