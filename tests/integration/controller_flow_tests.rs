//! Controller tick-loop flows: radio callbacks land on the event queue and
//! the next tick applies them, exactly as on the device.

use rgbwctrl::adapters::nvs::NvsAdapter;
use rgbwctrl::events::{self, Event};
use rgbwctrl::persist;
use rgbwctrl::state::espnow::EspNowDevice;
use rgbwctrl::state::ota::OtaStatus;
use rgbwctrl::state::output::{ChannelState, OutputState};
use rgbwctrl::state::wifi::{WifiDetails, WifiStatus};
use rgbwctrl::transport::ble::Characteristic;
use rgbwctrl::transport::espnow::EspNowCommand;
use rgbwctrl::wire::{Tag, WireMessage};

use crate::mock_hw::{controller_rig, event_queue_lock, stored_network};

fn gatt_write(characteristic: Characteristic, frame: &[u8]) -> Event {
    Event::GattWrite {
        characteristic,
        payload: heapless::Vec::from_slice(frame).unwrap(),
    }
}

#[test]
fn gatt_color_write_is_applied_and_fanned_out() {
    let _guard = event_queue_lock();
    let mut rig = controller_rig(NvsAdapter::new_sim());
    rig.ws.borrow_mut().clients = 1;

    let state = OutputState {
        channels: [ChannelState::new(true, 180); 4],
    };
    let frame = WireMessage::Color(state).encode();
    events::push(gatt_write(Characteristic::OutputColor, &frame));

    rig.controller.tick(1000);

    assert_eq!(rig.controller.state_view().output, Some(state));
    // The same tick's fanout pass pushed the new color to the hub.
    assert!(
        rig.ws
            .borrow()
            .broadcasts
            .iter()
            .any(|f| f.as_slice() == frame.as_slice()),
        "color frame missing from the WebSocket fanout"
    );
}

#[test]
fn paired_remote_commands_flow_through_the_queue() {
    let _guard = event_queue_lock();
    let remote_mac = [0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01];
    let mut nvs = NvsAdapter::new_sim();
    let mut roster = heapless::Vec::new();
    roster
        .push(EspNowDevice {
            name: heapless::String::try_from("desk").unwrap(),
            mac: remote_mac,
        })
        .unwrap();
    persist::save_roster(&mut nvs, &roster).unwrap();

    let mut rig = controller_rig(nvs);
    events::push(Event::EspNowFrame {
        sender: remote_mac,
        payload: heapless::Vec::from_slice(&[EspNowCommand::ToggleAll as u8]).unwrap(),
    });
    rig.controller.tick(0);
    assert!(rig.controller.state_view().output.unwrap().any_visible());

    // An unpaired sender on the same queue changes nothing.
    events::push(Event::EspNowFrame {
        sender: [1; 6],
        payload: heapless::Vec::from_slice(&[EspNowCommand::TurnOffAll as u8]).unwrap(),
    });
    rig.controller.tick(1);
    assert!(rig.controller.state_view().output.unwrap().any_visible());
}

#[test]
fn central_disconnect_rearms_advertising() {
    let _guard = event_queue_lock();
    let mut rig = controller_rig(NvsAdapter::new_sim());
    rig.controller.boot(0);
    assert!(rig.ble.is_advertising());

    rig.ble.connect_central();
    rig.ble.disconnect_central();
    events::push(Event::BleDisconnected);
    rig.controller.tick(10);
    assert!(rig.ble.is_advertising(), "lost central must re-advertise");
}

#[test]
fn wifi_driver_events_update_the_link_state() {
    let _guard = event_queue_lock();
    let mut nvs = NvsAdapter::new_sim();
    persist::save_wifi_credentials(&mut nvs, &stored_network()).unwrap();
    let mut rig = controller_rig(nvs);

    rig.controller.boot(0);
    assert_eq!(rig.wifi.connects().len(), 1);

    events::push(Event::WifiStatus(WifiStatus::ConnectedNoIp));
    events::push(Event::WifiGotIp(WifiDetails {
        ssid: heapless::String::try_from("shoplight").unwrap(),
        ip: 0x0100_a8c0, // 192.168.0.1, little-endian
        ..WifiDetails::default()
    }));
    rig.controller.tick(1000);

    let view = rig.controller.state_view();
    assert_eq!(view.wifi_status, WifiStatus::Connected);
    assert_eq!(view.wifi_details.ssid.as_str(), "shoplight");
}

#[test]
fn ota_upload_reports_progress_and_completion() {
    // No queue traffic: the upload path is driven by the HTTP server task.
    let mut rig = controller_rig(NvsAdapter::new_sim());

    rig.controller.ota_begin(8).unwrap();
    rig.controller.ota_chunk(0, &[1, 2, 3, 4], false).unwrap();
    let progress = rig.controller.state_view().ota;
    assert_eq!(progress.status, OtaStatus::Started);
    assert_eq!(progress.total_bytes_received, 4);

    rig.controller.ota_chunk(4, &[5, 6, 7, 8], true).unwrap();
    assert_eq!(rig.controller.state_view().ota.status, OtaStatus::Completed);
}

#[test]
fn fanout_stays_quiet_without_clients() {
    let _guard = event_queue_lock();
    let mut rig = controller_rig(NvsAdapter::new_sim());

    let frame = WireMessage::Color(OutputState {
        channels: [ChannelState::new(true, 10); 4],
    })
    .encode();
    events::push(gatt_write(Characteristic::OutputColor, &frame));
    rig.controller.tick(1000);
    rig.controller.tick(2000);

    assert!(rig.ws.borrow().broadcasts.is_empty());
    assert!(
        !rig.ws.borrow().broadcast_tags().contains(&(Tag::Heap as u8)),
        "heap telemetry must not be pushed to an empty hub"
    );
}
