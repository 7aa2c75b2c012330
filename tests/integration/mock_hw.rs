//! Shared test rig: a full [`Controller`] on simulation adapters plus a
//! recording WebSocket sink, so flow tests can assert on everything that
//! left the device without touching real radios or GPIO registers.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Mutex, MutexGuard, OnceLock};

use rgbwctrl::adapters::ble::{SimBleBackend, SimBleHandle};
use rgbwctrl::adapters::espnow_radio::{SimEspNowHandle, SimEspNowRadio};
use rgbwctrl::adapters::nvs::NvsAdapter;
use rgbwctrl::adapters::ota_flash::SimOtaFlash;
use rgbwctrl::adapters::rgbw_pwm::SimPwm;
use rgbwctrl::adapters::voltage::SimVoltageSense;
use rgbwctrl::adapters::wifi::{SimWifiHandle, SimWifiRadio};
use rgbwctrl::app::controller::{Controller, ControllerPorts};
use rgbwctrl::error::TransportError;
use rgbwctrl::fanout::{ClientId, FanoutSink};

pub const CONTROLLER_MAC: [u8; 6] = [0x24, 0x6f, 0x28, 0xaa, 0xbb, 0xcc];

/// The event queue behind `Controller::tick` is a process-wide static.
/// Every test that pushes events or calls `tick` holds this lock so
/// parallel test threads cannot steal each other's events.
pub fn event_queue_lock() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

// ── recording WebSocket sink ──────────────────────────────────────

#[derive(Default)]
#[allow(dead_code)]
pub struct Recorded {
    pub broadcasts: Vec<Vec<u8>>,
    pub unicasts: Vec<(ClientId, Vec<u8>)>,
    pub texts: Vec<(ClientId, String)>,
    pub clients: usize,
}

#[allow(dead_code)]
impl Recorded {
    pub fn broadcast_tags(&self) -> Vec<u8> {
        self.broadcasts.iter().map(|f| f[0]).collect()
    }
}

/// Sink half handed to the controller; the `Rc` stays with the test.
pub struct RecordingSink(pub Rc<RefCell<Recorded>>);

impl FanoutSink for RecordingSink {
    fn broadcast(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        self.0.borrow_mut().broadcasts.push(frame.to_vec());
        Ok(())
    }

    fn unicast(&mut self, client: ClientId, frame: &[u8]) -> Result<(), TransportError> {
        self.0.borrow_mut().unicasts.push((client, frame.to_vec()));
        Ok(())
    }

    fn send_text(&mut self, client: ClientId, text: &str) -> Result<(), TransportError> {
        self.0.borrow_mut().texts.push((client, text.to_string()));
        Ok(())
    }

    fn client_count(&self) -> usize {
        self.0.borrow().clients
    }
}

/// A PSK network the way provisioning would have stored it.
pub fn stored_network() -> rgbwctrl::state::wifi::WifiConnectionDetails {
    use rgbwctrl::state::wifi::{WifiConnectionDetails, WifiCredentials, WifiEncryption};
    WifiConnectionDetails {
        ssid: heapless::String::try_from("shoplight").unwrap(),
        encryption: WifiEncryption::Wpa2Psk,
        credentials: WifiCredentials::Simple {
            password: heapless::String::try_from("hunter22").unwrap(),
        },
    }
}

// ── controller rig ────────────────────────────────────────────────

pub struct ControllerRig {
    pub controller: Controller,
    pub ble: SimBleHandle,
    pub wifi: SimWifiHandle,
    pub espnow: SimEspNowHandle,
    pub ws: Rc<RefCell<Recorded>>,
}

/// Build a controller over the given (possibly pre-seeded) storage.
pub fn controller_rig(nvs: NvsAdapter) -> ControllerRig {
    let ble = SimBleBackend::new();
    let ble_handle = ble.handle();
    let wifi = SimWifiRadio::new();
    let wifi_handle = wifi.handle();
    let espnow = SimEspNowRadio::new();
    let espnow_handle = espnow.handle();
    let ws = Rc::new(RefCell::new(Recorded::default()));

    let controller = Controller::new(ControllerPorts {
        storage: nvs,
        mac: CONTROLLER_MAC,
        output: Box::new(SimPwm::new()),
        voltage: Box::new(SimVoltageSense::new(1200)),
        wifi: Box::new(wifi),
        ble: Box::new(ble),
        espnow: Box::new(espnow),
        ota_flash: Box::new(SimOtaFlash::new()),
        ws_sink: Box::new(RecordingSink(Rc::clone(&ws))),
    });

    ControllerRig {
        controller,
        ble: ble_handle,
        wifi: wifi_handle,
        espnow: espnow_handle,
        ws,
    }
}
