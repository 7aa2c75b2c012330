//! Remote application aggregate.
//!
//! The battery remote is a one-way device: button and encoder gestures go
//! out as ESP-NOW commands to the paired controller. BLE exists only for
//! configuration (name, explicit controller MAC); a long press opens a
//! pairing window during which a received controller announcement latches
//! the sender MAC.

use core::fmt::Write;

use crate::adapters::nvs::NvsAdapter;
use crate::app::ports::EspNowRadioPort;
use crate::config::SystemConfig;
use crate::drivers::board_led::{BoardLed, ConnectivityView};
use crate::drivers::button::{Button, ButtonEvent};
use crate::drivers::encoder::{Encoder, EncoderStep};
use crate::events::Event;
use crate::persist;
use crate::state::device::DeviceName;
use crate::state::espnow::PeerAddress;
use crate::state::wifi::{WifiScanStatus, WifiStatus};
use crate::transport::ble::{BleBackend, BleController, BleStatus, Characteristic, DeviceKind};
use crate::transport::espnow::{EspNowCommand, EspNowSender, PAIRING_ANNOUNCE};
use crate::wire::WireMessage;

/// How long a long press keeps the pairing window open.
pub const PAIRING_WINDOW_MS: u32 = 30_000;

const REMOTE_BASE_NAME: &str = "rgbw-remote-";

pub struct RemotePorts {
    pub storage: NvsAdapter,
    pub mac: [u8; 6],
    pub ble: Box<dyn BleBackend>,
    pub espnow: Box<dyn EspNowRadioPort>,
}

pub struct Remote {
    storage: NvsAdapter,
    config: SystemConfig,
    name: DeviceName,
    peer: PeerAddress,
    sender: EspNowSender,
    ble: BleController,
    button: Button,
    encoder: Encoder,
    board_led: BoardLed,
    pairing_until: Option<u32>,
    restart_requested: bool,
}

impl Remote {
    pub fn new(ports: RemotePorts) -> Self {
        let storage = ports.storage;
        let config = match crate::app::ports::ConfigPort::load(&storage) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("remote: stored config unusable ({e}), using defaults");
                SystemConfig::default()
            }
        };

        let name = persist::load_device_name(&storage)
            .unwrap_or_else(|| default_name(&ports.mac));

        let mut peer = PeerAddress::new();
        peer.restore(&storage);

        let mut ble = BleController::new(ports.ble, DeviceKind::Remote);
        ble.set_advertising_timeout(config.ble_advertising_timeout_ms);

        let mut button = Button::new(crate::pins::BUTTON_GPIO);
        button.set_timing(config.button_debounce_ms, config.button_long_press_ms);

        Self {
            storage,
            config,
            name,
            peer,
            sender: EspNowSender::new(ports.espnow),
            ble,
            button,
            encoder: Encoder::new(),
            board_led: BoardLed::new(),
            pairing_until: None,
            restart_requested: false,
        }
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn is_paired(&self) -> bool {
        self.peer.is_paired()
    }

    /// Advertise at boot so a companion app can always reach an unpaired
    /// remote; the advertising timeout closes the window on its own.
    pub fn boot(&mut self, now_ms: u32) {
        log::info!(
            "remote: '{}', {}",
            self.name,
            if self.peer.is_paired() {
                "paired"
            } else {
                "unpaired"
            }
        );
        let name = self.name.clone();
        self.ble.start(now_ms, name.as_str());
    }

    /// One pass of the tick loop.
    pub fn tick(&mut self, now_ms: u32) {
        while let Some(event) = crate::events::pop() {
            self.on_event(now_ms, event);
        }

        self.ble.handle(now_ms);

        let pressed = self.button.is_pressed();
        match self.button.tick(now_ms, pressed) {
            Some(ButtonEvent::ShortPress) => self.send_command(EspNowCommand::ToggleAll),
            Some(ButtonEvent::LongPress) => self.open_pairing_window(now_ms),
            None => {}
        }

        let (a, b) = self.encoder.read_pins();
        if let Some(step) = self.encoder.update(a, b) {
            match step {
                EncoderStep::Right => self.send_command(EspNowCommand::IncreaseBrightness),
                EncoderStep::Left => self.send_command(EspNowCommand::DecreaseBrightness),
            }
        }

        self.pairing_active(now_ms);

        self.board_led.handle(now_ms, &self.connectivity_view());

        if self.restart_requested {
            crate::adapters::sysinfo::restart();
        }
    }

    // ── event funnel ─────────────────────────────────────────────

    fn on_event(&mut self, now_ms: u32, event: Event) {
        match event {
            Event::EspNowFrame { sender, payload } => {
                if self.pairing_active(now_ms) && payload.as_slice() == [PAIRING_ANNOUNCE] {
                    self.pair_with(sender);
                }
            }
            Event::GattWrite {
                characteristic,
                payload,
            } => self.on_gatt_write(now_ms, characteristic, &payload),
            Event::BleDisconnected => {
                if self.ble.status() != BleStatus::Off {
                    let name = self.name.clone();
                    self.ble.start(now_ms, name.as_str());
                }
            }
            // The station interface exists only to carry ESP-NOW.
            Event::WifiStatus(_) | Event::WifiGotIp(_) => {}
        }
    }

    pub fn on_gatt_write(&mut self, now_ms: u32, characteristic: Characteristic, payload: &[u8]) {
        if characteristic == Characteristic::Restart {
            if payload == crate::state::device::RESTART_TOKEN {
                self.restart_requested = true;
            }
            return;
        }
        match WireMessage::decode(payload) {
            Ok(WireMessage::EspNowController(mac)) => self.pair_with(mac),
            Ok(WireMessage::DeviceName(name)) => {
                if let Err(e) = persist::save_device_name(&mut self.storage, &name) {
                    log::warn!("remote: persisting name failed: {e}");
                }
                self.name = name;
            }
            Ok(WireMessage::BleStatus(BleStatus::Off)) => self.ble.stop(),
            Ok(WireMessage::BleStatus(_)) => {
                let name = self.name.clone();
                self.ble.start(now_ms, name.as_str());
            }
            Ok(message) => {
                log::debug!("remote: inbound {:?} ignored", message.tag());
            }
            Err(e) => log::warn!("remote: gatt write to {characteristic:?} rejected: {e}"),
        }
    }

    // ── pairing ──────────────────────────────────────────────────

    fn open_pairing_window(&mut self, now_ms: u32) {
        log::info!("remote: pairing window open ({PAIRING_WINDOW_MS} ms)");
        self.pairing_until = Some(now_ms.wrapping_add(PAIRING_WINDOW_MS));
    }

    /// Checks the window, closing it on expiry.
    fn pairing_active(&mut self, now_ms: u32) -> bool {
        let Some(deadline) = self.pairing_until else {
            return false;
        };
        if now_ms.wrapping_sub(deadline) < u32::MAX / 2 {
            log::info!("remote: pairing window closed");
            self.pairing_until = None;
            return false;
        }
        true
    }

    fn pair_with(&mut self, mac: [u8; 6]) {
        self.peer.set(mac, &mut self.storage);
        self.pairing_until = None;
        self.ble.notify_message(
            Characteristic::EspNowController,
            &WireMessage::EspNowController(mac),
        );
    }

    // ── outputs ──────────────────────────────────────────────────

    fn send_command(&mut self, command: EspNowCommand) {
        if !self.peer.is_paired() {
            log::warn!("remote: {command:?} dropped, no paired controller");
            return;
        }
        let mac = self.peer.mac();
        // Fire-and-forget: the next gesture is the retry.
        let _ = self.sender.send(&mac, command);
    }

    /// The remote has no Wi-Fi link of its own; "connected" on the status
    /// pixel means a controller is paired, and a pairing window borrows the
    /// scan-running blink.
    fn connectivity_view(&self) -> ConnectivityView {
        ConnectivityView {
            ota_running: false,
            ble_status: self.ble.status(),
            scan_status: if self.pairing_until.is_some() {
                WifiScanStatus::Running
            } else {
                WifiScanStatus::NotStarted
            },
            wifi_status: if self.peer.is_paired() {
                WifiStatus::Connected
            } else {
                WifiStatus::Disconnected
            },
        }
    }
}

fn default_name(mac: &[u8; 6]) -> DeviceName {
    let mut name = DeviceName::new();
    let _ = write!(name, "{REMOTE_BASE_NAME}{:02x}{:02x}{:02x}", mac[3], mac[4], mac[5]);
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ble::{SimBleBackend, SimBleHandle};
    use crate::adapters::espnow_radio::{SimEspNowHandle, SimEspNowRadio};
    use crate::state::device::RESTART_TOKEN;

    fn build(nvs: NvsAdapter) -> (Remote, SimBleHandle, SimEspNowHandle) {
        let ble = SimBleBackend::new();
        let ble_handle = ble.handle();
        let espnow = SimEspNowRadio::new();
        let espnow_handle = espnow.handle();
        let remote = Remote::new(RemotePorts {
            storage: nvs,
            mac: [0x24, 0x6f, 0x28, 0x01, 0x02, 0x03],
            ble: Box::new(ble),
            espnow: Box::new(espnow),
        });
        (remote, ble_handle, espnow_handle)
    }

    fn announce(remote: &mut Remote, now_ms: u32, sender: [u8; 6]) {
        remote.on_event(
            now_ms,
            Event::EspNowFrame {
                sender,
                payload: heapless::Vec::from_slice(&[PAIRING_ANNOUNCE]).unwrap(),
            },
        );
    }

    #[test]
    fn boots_unpaired_with_a_derived_name() {
        let (mut remote, ble, _) = build(NvsAdapter::new_sim());
        remote.boot(0);
        assert!(!remote.is_paired());
        assert!(ble.is_advertising());
        assert_eq!(ble.device_name(), "rgbw-remote-010203");
    }

    #[test]
    fn gestures_without_a_pairing_go_nowhere() {
        let (mut remote, _, espnow) = build(NvsAdapter::new_sim());
        remote.send_command(EspNowCommand::ToggleAll);
        assert!(espnow.sent().is_empty());
    }

    #[test]
    fn announcement_outside_the_window_is_ignored() {
        let (mut remote, _, _) = build(NvsAdapter::new_sim());
        announce(&mut remote, 0, [9; 6]);
        assert!(!remote.is_paired());
    }

    #[test]
    fn long_press_pairing_latches_the_announcing_controller() {
        let (mut remote, _, espnow) = build(NvsAdapter::new_sim());
        remote.open_pairing_window(1_000);
        announce(&mut remote, 2_000, [9; 6]);
        assert!(remote.is_paired());
        assert!(remote.pairing_until.is_none(), "window closes on pairing");

        // Gestures now reach the paired controller.
        remote.send_command(EspNowCommand::IncreaseBrightness);
        assert_eq!(
            espnow.sent(),
            vec![([9; 6], vec![EspNowCommand::IncreaseBrightness as u8])]
        );
    }

    #[test]
    fn pairing_window_expires() {
        let (mut remote, _, _) = build(NvsAdapter::new_sim());
        remote.open_pairing_window(0);
        announce(&mut remote, PAIRING_WINDOW_MS + 1, [9; 6]);
        assert!(!remote.is_paired());
        assert!(remote.pairing_until.is_none());
    }

    #[test]
    fn pairing_survives_a_restart() {
        let nvs = NvsAdapter::new_sim();
        let (mut remote, _, _) = build(nvs);
        remote.open_pairing_window(0);
        announce(&mut remote, 1, [7; 6]);
        let storage = remote.storage;

        let (remote, _, _) = build(storage);
        assert!(remote.is_paired());
        assert_eq!(remote.peer.mac(), [7; 6]);
    }

    #[test]
    fn controller_mac_can_be_written_over_ble() {
        let (mut remote, _, _) = build(NvsAdapter::new_sim());
        let frame = WireMessage::EspNowController([3; 6]).encode();
        remote.on_gatt_write(0, Characteristic::EspNowController, &frame);
        assert!(remote.is_paired());
    }

    #[test]
    fn restart_token_is_honoured() {
        let (mut remote, _, _) = build(NvsAdapter::new_sim());
        remote.on_gatt_write(0, Characteristic::Restart, b"nope");
        assert!(!remote.restart_requested);
        remote.on_gatt_write(0, Characteristic::Restart, RESTART_TOKEN);
        assert!(remote.restart_requested);
    }
}
