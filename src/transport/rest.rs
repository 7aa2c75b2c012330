//! REST endpoints.
//!
//! The JSON surface is pull-based and stateless: `GET /state` aggregates a
//! snapshot from every owner (marked `Cache-Control: no-store` so clients
//! never cache a stale one), action endpoints reply with a `{"message": ..}`
//! envelope. Handlers here are pure request→response functions; the device
//! binary wires them into the HTTP server, tests call them directly.

use serde_json::json;

use crate::app::ports::StoragePort;
use crate::persist;
use crate::state::alexa::AlexaIntegration;
use crate::state::device::DeviceManager;
use crate::state::espnow::EspNowRoster;
use crate::state::ota::OtaHandler;
use crate::state::output::{ChannelState, OutputManager};
use crate::state::wifi::WifiManager;
use crate::transport::ble::{BleController, BleStatus};

pub const PATH_STATE: &str = "/state";
pub const PATH_UPDATE: &str = "/update";
pub const PATH_BLUETOOTH: &str = "/bluetooth";
pub const PATH_SYSTEM_RESTART: &str = "/system/restart";
pub const PATH_SYSTEM_RESET: &str = "/system/reset";
pub const PATH_OUTPUT_COLOR: &str = "/output/color";
pub const PATH_OUTPUT_BRIGHTNESS: &str = "/output/brightness";

/// Transport-agnostic response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestResponse {
    pub status: u16,
    pub body: String,
    /// Adds `Cache-Control: no-store`.
    pub no_store: bool,
}

impl RestResponse {
    fn ok_message(message: &str) -> Self {
        Self {
            status: 200,
            body: json!({ "message": message }).to_string(),
            no_store: false,
        }
    }

    fn bad_request(message: &str) -> Self {
        Self {
            status: 400,
            body: json!({ "message": message }).to_string(),
            no_store: false,
        }
    }
}

/// Pull one value out of an URL query string (`a=1&b=2`).
pub fn query_param<'a>(query: &'a str, key: &str) -> Option<&'a str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
}

// ── GET /state ───────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
pub fn get_state(
    device_name: &str,
    device: &DeviceManager,
    output: &OutputManager,
    wifi: &WifiManager,
    ota: &OtaHandler,
    ble_status: BleStatus,
    alexa: &AlexaIntegration,
    roster: &EspNowRoster,
) -> RestResponse {
    let output_state = output.state();
    let details = wifi.details();
    let scan = wifi.scan_result();
    let voltage = device.voltage();
    let ota_progress = ota.progress();

    let body = json!({
        "deviceName": device_name,
        "firmwareVersion": device.firmware_version(),
        "heap": device.free_heap(),
        "voltage": {
            "milliVolts": voltage.milli_volts,
            "calibrationFactor": voltage.calibration_factor,
        },
        "output": output_state.channels.iter().map(|c| json!({
            "on": c.on,
            "value": c.value,
        })).collect::<Vec<_>>(),
        "ble": { "status": ble_status as u8 },
        "wifi": {
            "status": wifi.status() as u8,
            "details": {
                "ssid": details.ssid.as_str(),
                "ip": details.ip,
                "gateway": details.gateway,
                "subnet": details.subnet,
                "dns": details.dns,
            },
            "scan": {
                "status": scan.status as u8,
                "networks": scan.networks.iter().map(|n| json!({
                    "ssid": n.ssid.as_str(),
                    "rssi": n.rssi,
                    "encryption": n.encryption as u8,
                })).collect::<Vec<_>>(),
            },
        },
        "ota": {
            "status": ota_progress.status as u8,
            "expected": ota_progress.total_bytes_expected,
            "received": ota_progress.total_bytes_received,
        },
        "alexa": { "mode": alexa.settings().mode as u8 },
        "espNow": {
            "devices": roster.devices().iter().map(|d| json!({
                "name": d.name.as_str(),
            })).collect::<Vec<_>>(),
        },
    });

    RestResponse {
        status: 200,
        body: body.to_string(),
        no_store: true,
    }
}

// ── output endpoints ─────────────────────────────────────────────

/// `/output/color?r=..&g=..&b=..&w=..` — each present parameter drives its
/// channel; a value of zero switches the channel off.
pub fn set_color(output: &mut OutputManager, query: &str, now_ms: u32) -> RestResponse {
    let mut any = false;
    for (key, channel) in [
        ("r", crate::state::output::Channel::Red),
        ("g", crate::state::output::Channel::Green),
        ("b", crate::state::output::Channel::Blue),
        ("w", crate::state::output::Channel::White),
    ] {
        let Some(value) = query_param(query, key).and_then(|v| v.parse::<u8>().ok()) else {
            continue;
        };
        output.set_channel(channel, ChannelState::new(value > 0, value), now_ms);
        any = true;
    }
    if any {
        RestResponse::ok_message("Color updated")
    } else {
        RestResponse::bad_request("No channel parameter")
    }
}

/// `/output/brightness?value=..` — a valid value sets every channel to it;
/// a missing or unparsable value turns the light off.
pub fn set_brightness(output: &mut OutputManager, query: &str, now_ms: u32) -> RestResponse {
    match query_param(query, "value").and_then(|v| v.parse::<u8>().ok()) {
        Some(value) => {
            for channel in crate::state::output::Channel::ALL {
                output.set_channel(channel, ChannelState::new(true, value), now_ms);
            }
            RestResponse::ok_message("Brightness updated")
        }
        None => {
            output.turn_off_all(now_ms);
            RestResponse::ok_message("Light turned off")
        }
    }
}

// ── system endpoints ─────────────────────────────────────────────

pub fn restart(device: &mut DeviceManager) -> RestResponse {
    device.request_restart();
    RestResponse::ok_message("Restarting")
}

/// Wipe every persisted record, then restart.
pub fn factory_reset(device: &mut DeviceManager, storage: &mut dyn StoragePort) -> RestResponse {
    if let Err(e) = persist::wipe_all(storage) {
        log::warn!("rest: factory reset wipe incomplete: {e}");
    }
    device.request_restart();
    RestResponse::ok_message("Factory reset")
}

/// `/bluetooth?state=on|off`.
pub fn bluetooth(
    ble: &mut BleController,
    query: &str,
    now_ms: u32,
    device_name: &str,
) -> RestResponse {
    match query_param(query, "state") {
        Some("on") => {
            ble.start(now_ms, device_name);
            RestResponse::ok_message("Bluetooth enabled")
        }
        Some("off") => {
            ble.stop();
            RestResponse::ok_message("Bluetooth disabled")
        }
        _ => RestResponse::bad_request("Missing state parameter"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ble::SimBleBackend;
    use crate::adapters::nvs::NvsAdapter;
    use crate::adapters::rgbw_pwm::SimPwm;
    use crate::adapters::wifi::SimWifiRadio;
    use crate::error::OtaError;
    use crate::state::device::VoltagePort;
    use crate::state::ota::OtaFlashPort;
    use crate::state::output::Channel;
    use crate::transport::ble::DeviceKind;

    struct NoFlash;
    impl OtaFlashPort for NoFlash {
        fn begin(&mut self) -> Result<(), OtaError> {
            Ok(())
        }
        fn write(&mut self, _chunk: &[u8]) -> Result<(), OtaError> {
            Ok(())
        }
        fn finalize(&mut self) -> Result<(), OtaError> {
            Ok(())
        }
        fn abort(&mut self) {}
    }

    struct NoVolts;
    impl VoltagePort for NoVolts {
        fn read_millivolts(&mut self) -> u32 {
            300
        }
    }

    fn output() -> OutputManager {
        OutputManager::new(Box::new(SimPwm::new()), [4, 5, 6, 7])
    }

    #[test]
    fn query_param_finds_values() {
        assert_eq!(query_param("value=42&x=1", "value"), Some("42"));
        assert_eq!(query_param("x=1", "value"), None);
        assert_eq!(query_param("", "value"), None);
    }

    #[test]
    fn state_snapshot_is_never_cached() {
        let device = DeviceManager::new([0; 6], Box::new(NoVolts));
        let out = output();
        let wifi = WifiManager::new(Box::new(SimWifiRadio::new()));
        let ota = OtaHandler::new(Box::new(NoFlash));
        let alexa = AlexaIntegration::new();
        let roster = EspNowRoster::new();

        let response = get_state(
            "lamp",
            &device,
            &out,
            &wifi,
            &ota,
            BleStatus::Off,
            &alexa,
            &roster,
        );
        assert_eq!(response.status, 200);
        assert!(response.no_store, "state endpoint must not be cached");

        let body: serde_json::Value = serde_json::from_str(&response.body).unwrap();
        assert_eq!(body["deviceName"], "lamp");
        assert_eq!(body["firmwareVersion"], "5.1.1");
        assert_eq!(body["output"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn brightness_with_value_sets_every_channel() {
        let mut out = output();
        let response = set_brightness(&mut out, "value=120", 0);
        assert_eq!(response.status, 200);
        for channel in Channel::ALL {
            assert_eq!(out.channel(channel), ChannelState::new(true, 120));
        }
    }

    #[test]
    fn brightness_without_value_turns_the_light_off() {
        let mut out = output();
        out.toggle_all(0);
        let response = set_brightness(&mut out, "", 1);
        assert!(response.body.contains("Light turned off"));
        assert!(!out.any_visible());

        // Unparsable value behaves the same way.
        out.toggle_all(2);
        let response = set_brightness(&mut out, "value=abc", 3);
        assert!(response.body.contains("Light turned off"));
        assert!(!out.any_visible());
    }

    #[test]
    fn color_sets_only_named_channels() {
        let mut out = output();
        let response = set_color(&mut out, "r=200&w=0", 0);
        assert_eq!(response.status, 200);
        assert_eq!(out.channel(Channel::Red), ChannelState::new(true, 200));
        assert_eq!(out.channel(Channel::White), ChannelState::new(false, 0));
        assert_eq!(out.channel(Channel::Green), ChannelState::default());
    }

    #[test]
    fn color_without_parameters_is_rejected() {
        let mut out = output();
        assert_eq!(set_color(&mut out, "", 0).status, 400);
    }

    #[test]
    fn bluetooth_toggles_the_stack() {
        let mut ble = BleController::new(Box::new(SimBleBackend::new()), DeviceKind::Controller);
        assert_eq!(bluetooth(&mut ble, "state=on", 0, "lamp").status, 200);
        assert_eq!(ble.status(), BleStatus::Advertising);
        assert_eq!(bluetooth(&mut ble, "state=off", 1, "lamp").status, 200);
        assert_eq!(ble.status(), BleStatus::Off);
        assert_eq!(bluetooth(&mut ble, "", 2, "lamp").status, 400);
    }

    #[test]
    fn factory_reset_wipes_persisted_state() {
        let mut nvs = NvsAdapter::new_sim();
        let mut device = DeviceManager::new([0; 6], Box::new(NoVolts));
        persist::save_device_name(
            &mut nvs,
            &crate::state::device::DeviceName::try_from("x").unwrap(),
        )
        .unwrap();

        let response = factory_reset(&mut device, &mut nvs);
        assert_eq!(response.status, 200);
        assert!(persist::load_device_name(&nvs).is_none());
        assert!(device.take_restart_request());
    }
}
