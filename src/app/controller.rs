//! Controller application aggregate.
//!
//! Owns every state owner and transport of the main firmware and runs the
//! tick loop body. All mutation enters through three funnels: drained queue
//! events (radio callbacks), decoded wire messages (BLE writes, WebSocket
//! frames) and REST requests. The tick order is fixed; the board LED runs
//! last so it reflects the state this tick produced.

use crate::adapters::nvs::NvsAdapter;
use crate::app::ports::{ConfigPort, EspNowRadioPort, OutputPort, WifiRadioPort};
use crate::config::SystemConfig;
use crate::drivers::board_led::{BoardLed, ConnectivityView};
use crate::drivers::button::{Button, ButtonEvent};
use crate::drivers::encoder::{Encoder, EncoderStep};
use crate::error::OtaError;
use crate::events::Event;
use crate::fanout::{ClientId, FanoutSink, StateView};
use crate::persist;
use crate::state::alexa::AlexaIntegration;
use crate::state::device::{DeviceManager, DeviceName, VoltagePort, FIRMWARE_VERSION};
use crate::state::espnow::EspNowRoster;
use crate::state::ota::{DisconnectAction, OtaFlashPort, OtaHandler};
use crate::state::output::OutputManager;
use crate::state::wifi::{WifiManager, WifiScanStatus, WifiStatus};
use crate::transport::ble::{BleBackend, BleController, BleStatus, Characteristic, DeviceKind};
use crate::transport::espnow::{EspNowReceiver, EspNowSender};
use crate::transport::rest::{self, RestResponse};
use crate::transport::websocket::{FrameInfo, WsHub};
use crate::wire::{FirmwareVersion, WireMessage};

/// Everything the aggregate needs from the outside world.
pub struct ControllerPorts {
    pub storage: NvsAdapter,
    pub mac: [u8; 6],
    pub output: Box<dyn OutputPort>,
    pub voltage: Box<dyn VoltagePort>,
    pub wifi: Box<dyn WifiRadioPort>,
    pub ble: Box<dyn BleBackend>,
    pub espnow: Box<dyn EspNowRadioPort>,
    pub ota_flash: Box<dyn OtaFlashPort>,
    pub ws_sink: Box<dyn FanoutSink>,
}

pub struct Controller {
    storage: NvsAdapter,
    config: SystemConfig,
    device: DeviceManager,
    output: OutputManager,
    wifi: WifiManager,
    ota: OtaHandler,
    roster: EspNowRoster,
    alexa: AlexaIntegration,
    ble: BleController,
    ws: WsHub,
    espnow_rx: EspNowReceiver,
    espnow_tx: EspNowSender,
    button: Button,
    encoder: Encoder,
    board_led: BoardLed,
    last_wifi_status: WifiStatus,
    last_scan_status: WifiScanStatus,
}

impl Controller {
    /// Build the aggregate and restore every owner from storage.
    pub fn new(ports: ControllerPorts) -> Self {
        let storage = ports.storage;
        let config = match storage.load() {
            Ok(config) => config,
            Err(e) => {
                log::warn!("controller: stored config unusable ({e}), using defaults");
                SystemConfig::default()
            }
        };

        let mut device = DeviceManager::new(ports.mac, ports.voltage);
        device.restore(&storage);

        let mut output = OutputManager::new(
            ports.output,
            crate::pins::OUTPUT_GPIOS.map(|pin| pin as u8),
        );
        output.restore(&storage);
        output.set_persist_debounce(config.output_persist_debounce_ms);

        let wifi = WifiManager::new(ports.wifi);

        let mut roster = EspNowRoster::new();
        roster.restore(&storage);

        let mut alexa = AlexaIntegration::new();
        alexa.restore(&storage, &output);

        let mut ble = BleController::new(ports.ble, DeviceKind::Controller);
        ble.set_advertising_timeout(config.ble_advertising_timeout_ms);

        let mut button = Button::new(crate::pins::BUTTON_GPIO);
        button.set_timing(config.button_debounce_ms, config.button_long_press_ms);

        Self {
            storage,
            config,
            device,
            output,
            wifi,
            ota: OtaHandler::new(ports.ota_flash),
            roster,
            alexa,
            ble,
            ws: WsHub::new(ports.ws_sink),
            espnow_rx: EspNowReceiver::new(),
            espnow_tx: EspNowSender::new(ports.espnow),
            button,
            encoder: Encoder::new(),
            board_led: BoardLed::new(),
            last_wifi_status: WifiStatus::default(),
            last_scan_status: WifiScanStatus::default(),
        }
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    /// Boot policy: stored Wi-Fi credentials win, otherwise open the BLE
    /// provisioning window. The hostname follows the device name either way.
    pub fn boot(&mut self, now_ms: u32) {
        let name = self.device_name();
        self.wifi.set_hostname(name.as_str());
        if self.wifi.connect_stored(&mut self.storage) {
            log::info!("controller: joining stored network as '{name}'");
        } else {
            log::info!("controller: no stored network, advertising over BLE");
            self.ble.start(now_ms, name.as_str());
        }
    }

    /// One pass of the tick loop.
    pub fn tick(&mut self, now_ms: u32) {
        while let Some(event) = crate::events::pop() {
            self.on_event(now_ms, event);
        }

        self.ble.handle(now_ms);

        let pressed = self.button.is_pressed();
        match self.button.tick(now_ms, pressed) {
            Some(ButtonEvent::ShortPress) => self.output.toggle_all(now_ms),
            Some(ButtonEvent::LongPress) => self.factory_reset(),
            None => {}
        }

        let (a, b) = self.encoder.read_pins();
        if let Some(step) = self.encoder.update(a, b) {
            self.on_encoder_step(now_ms, step);
        }

        self.device.handle(now_ms);
        self.output.handle(now_ms, &mut self.storage);
        self.wifi.handle(now_ms);
        self.notify_wifi_transitions();

        let view = self.state_view();
        self.ws.handle(now_ms, &view);

        self.ble.notify_color(now_ms, self.output.state());
        self.ble.notify_heap(now_ms, self.device.free_heap());
        self.ble.notify_voltage(now_ms, self.device.voltage());

        self.alexa.handle(now_ms, &self.output);

        self.board_led.handle(
            now_ms,
            &ConnectivityView {
                ota_running: self.ota.is_running(),
                ble_status: self.ble.status(),
                scan_status: self.wifi.scan_status(),
                wifi_status: self.wifi.status(),
            },
        );

        if self.device.take_restart_request() {
            crate::adapters::sysinfo::restart();
        }
    }

    // ── event funnel ─────────────────────────────────────────────

    fn on_event(&mut self, now_ms: u32, event: Event) {
        match event {
            Event::EspNowFrame { sender, payload } => {
                if let Some(command) = self.espnow_rx.on_receive(&self.roster, &sender, &payload)
                {
                    command.apply(&mut self.output, now_ms);
                }
            }
            Event::GattWrite {
                characteristic,
                payload,
            } => self.on_gatt_write(now_ms, characteristic, &payload),
            Event::BleDisconnected => {
                // Re-advertise unless the stack was deliberately stopped.
                if self.ble.status() != BleStatus::Off {
                    let name = self.device_name();
                    self.ble.start(now_ms, name.as_str());
                }
            }
            Event::WifiStatus(status) => self.wifi.on_status_event(status),
            Event::WifiGotIp(details) => self.wifi.on_got_ip(details),
        }
    }

    /// A write landed on a GATT characteristic. Restart and calibration
    /// carry raw payloads; everything else is a tagged wire frame.
    pub fn on_gatt_write(&mut self, now_ms: u32, characteristic: Characteristic, payload: &[u8]) {
        match characteristic {
            Characteristic::Restart => {
                self.device.on_restart_write(payload);
            }
            Characteristic::Voltage => {
                self.device.on_calibration_write(payload, &mut self.storage);
            }
            _ => match WireMessage::decode(payload) {
                Ok(message) => self.apply_wire_message(now_ms, message),
                Err(e) => {
                    log::warn!("controller: gatt write to {characteristic:?} rejected: {e}")
                }
            },
        }
    }

    // ── WebSocket funnel ─────────────────────────────────────────

    pub fn on_ws_client_connected(&mut self, now_ms: u32, client: ClientId) {
        let view = self.state_view();
        self.ws.on_client_connected(now_ms, client, &view);
    }

    pub fn on_ws_frame(&mut self, now_ms: u32, client: ClientId, info: &FrameInfo, data: &[u8]) {
        if let Some(message) = self.ws.on_frame(now_ms, client, info, data) {
            self.apply_wire_message(now_ms, message);
        }
    }

    // ── wire message dispatch ────────────────────────────────────

    fn apply_wire_message(&mut self, now_ms: u32, message: WireMessage) {
        match message {
            WireMessage::Color(state) => self.output.set_all(state, now_ms),
            WireMessage::HttpCredentials(credentials) => {
                self.device.set_credentials(credentials, &mut self.storage);
            }
            WireMessage::DeviceName(name) => {
                self.device
                    .set_name(name.as_str(), &mut self.storage, &mut self.wifi);
            }
            WireMessage::BleStatus(BleStatus::Advertising) => {
                let name = self.device_name();
                self.ble.start(now_ms, name.as_str());
            }
            WireMessage::BleStatus(BleStatus::Off) => self.ble.stop(),
            WireMessage::BleStatus(BleStatus::Connected) => {}
            WireMessage::WifiConnectionDetails(details) => {
                self.wifi.connect(&details, &mut self.storage);
            }
            WireMessage::WifiScanStatus(WifiScanStatus::Running) => {
                self.wifi.request_scan();
            }
            WireMessage::WifiScanStatus(_) => {}
            WireMessage::AlexaSettings(settings) => {
                self.alexa
                    .apply_settings(settings, &mut self.storage, &self.output);
            }
            WireMessage::EspNowDevices(devices) => {
                let known: heapless::Vec<[u8; 6], 10> =
                    self.roster.devices().iter().map(|d| d.mac).collect();
                self.roster.apply(devices, &mut self.storage);
                // Newly rostered remotes get a pairing announcement so one
                // holding its pairing window open can latch onto us.
                for device in self.roster.devices() {
                    if !known.contains(&device.mac) {
                        if let Err(e) = self.espnow_tx.announce(&device.mac) {
                            log::warn!("controller: pairing announce failed: {e}");
                        }
                    }
                }
            }
            // Telemetry and remote-side tags are not applicable here.
            WireMessage::Heap(_)
            | WireMessage::FirmwareVersion(_)
            | WireMessage::OtaProgress(_)
            | WireMessage::WifiDetails(_)
            | WireMessage::WifiStatus(_)
            | WireMessage::EspNowController(_) => {
                log::debug!("controller: inbound {:?} ignored", message.tag());
            }
        }
    }

    // ── REST funnel ──────────────────────────────────────────────

    pub fn handle_rest(&mut self, path: &str, query: &str, now_ms: u32) -> RestResponse {
        match path {
            rest::PATH_STATE => {
                let name = self.device_name();
                rest::get_state(
                    name.as_str(),
                    &self.device,
                    &self.output,
                    &self.wifi,
                    &self.ota,
                    self.ble.status(),
                    &self.alexa,
                    &self.roster,
                )
            }
            rest::PATH_OUTPUT_COLOR => rest::set_color(&mut self.output, query, now_ms),
            rest::PATH_OUTPUT_BRIGHTNESS => rest::set_brightness(&mut self.output, query, now_ms),
            rest::PATH_SYSTEM_RESTART => rest::restart(&mut self.device),
            rest::PATH_SYSTEM_RESET => rest::factory_reset(&mut self.device, &mut self.storage),
            rest::PATH_BLUETOOTH => {
                let name = self.device_name();
                rest::bluetooth(&mut self.ble, query, now_ms, name.as_str())
            }
            _ => RestResponse {
                status: 404,
                body: r#"{"message":"Not found"}"#.to_string(),
                no_store: false,
            },
        }
    }

    // ── OTA upload path (driven by the HTTP server) ──────────────

    pub fn ota_begin(&mut self, expected_len: u32) -> Result<(), OtaError> {
        self.ota.begin(expected_len)
    }

    pub fn ota_chunk(&mut self, index: u32, chunk: &[u8], is_final: bool) -> Result<(), OtaError> {
        self.ota.write_chunk(index, chunk, is_final)
    }

    /// The uploading client dropped; a completed image reboots into itself.
    pub fn on_upload_disconnect(&mut self) {
        if self.ota.on_client_disconnect() == DisconnectAction::Restart {
            self.device.request_restart();
        }
    }

    // ── inputs and housekeeping ──────────────────────────────────

    pub fn on_encoder_step(&mut self, now_ms: u32, step: EncoderStep) {
        match step {
            EncoderStep::Right => self.output.increase_brightness(now_ms),
            EncoderStep::Left => self.output.decrease_brightness(now_ms),
        }
    }

    /// Wi-Fi status changes are event-driven on the BLE side; the gates only
    /// cover the periodic telemetry characteristics.
    fn notify_wifi_transitions(&mut self) {
        let status = self.wifi.status();
        if status != self.last_wifi_status {
            self.last_wifi_status = status;
            self.ble
                .notify_message(Characteristic::WifiStatus, &WireMessage::WifiStatus(status));
            if status == WifiStatus::Connected {
                self.ble.notify_message(
                    Characteristic::WifiDetails,
                    &WireMessage::WifiDetails(self.wifi.details().clone()),
                );
            }
        }
        let scan_status = self.wifi.scan_status();
        if scan_status != self.last_scan_status {
            self.last_scan_status = scan_status;
            self.ble.notify_message(
                Characteristic::WifiScanStatus,
                &WireMessage::WifiScanStatus(scan_status),
            );
        }
    }

    fn factory_reset(&mut self) {
        log::warn!("controller: factory reset via button");
        if let Err(e) = persist::wipe_all(&mut self.storage) {
            log::warn!("controller: factory reset wipe incomplete: {e}");
        }
        self.device.request_restart();
    }

    fn device_name(&mut self) -> DeviceName {
        DeviceName::try_from(self.device.name(&self.storage)).unwrap_or_default()
    }

    /// Snapshot for the fanout and the REST aggregate.
    pub fn state_view(&mut self) -> StateView {
        let device_name = self.device_name();
        StateView {
            free_heap: self.device.free_heap(),
            output: Some(self.output.state()),
            ble_status: self.ble.status(),
            device_name,
            firmware_version: FirmwareVersion::try_from(FIRMWARE_VERSION).unwrap_or_default(),
            ota: self.ota.progress(),
            roster: Some(self.roster.devices().clone()),
            controller_mac: None,
            wifi_details: self.wifi.details().clone(),
            wifi_status: self.wifi.status(),
            alexa: Some(self.alexa.settings().clone()),
        }
    }
}
