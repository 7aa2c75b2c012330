//! ESP-NOW pairing between the two firmware roles.
//!
//! The controller announces itself to every newly rostered remote; a remote
//! latches a controller either from such an announcement (long-press window,
//! covered by its unit tests) or from an explicit BLE write.

use rgbwctrl::adapters::ble::SimBleBackend;
use rgbwctrl::adapters::espnow_radio::SimEspNowRadio;
use rgbwctrl::adapters::nvs::NvsAdapter;
use rgbwctrl::app::remote::{Remote, RemotePorts};
use rgbwctrl::events::{self, Event};
use rgbwctrl::persist;
use rgbwctrl::state::espnow::EspNowDevice;
use rgbwctrl::transport::ble::Characteristic;
use rgbwctrl::transport::espnow::PAIRING_ANNOUNCE;
use rgbwctrl::wire::WireMessage;

use crate::mock_hw::{controller_rig, event_queue_lock, CONTROLLER_MAC};

const REMOTE_MAC: [u8; 6] = [0x24, 0x6f, 0x28, 0x01, 0x02, 0x03];

fn remote_rig(
    nvs: NvsAdapter,
) -> (
    Remote,
    rgbwctrl::adapters::ble::SimBleHandle,
    rgbwctrl::adapters::espnow_radio::SimEspNowHandle,
) {
    let ble = SimBleBackend::new();
    let ble_handle = ble.handle();
    let espnow = SimEspNowRadio::new();
    let espnow_handle = espnow.handle();
    let remote = Remote::new(RemotePorts {
        storage: nvs,
        mac: REMOTE_MAC,
        ble: Box::new(ble),
        espnow: Box::new(espnow),
    });
    (remote, ble_handle, espnow_handle)
}

#[test]
fn roster_write_over_gatt_announces_to_the_new_remote() {
    let mut rig = controller_rig(NvsAdapter::new_sim());

    let mut roster = heapless::Vec::new();
    roster
        .push(EspNowDevice {
            name: heapless::String::try_from("desk").unwrap(),
            mac: REMOTE_MAC,
        })
        .unwrap();
    let frame = WireMessage::EspNowDevices(roster).encode();
    rig.controller
        .on_gatt_write(0, Characteristic::EspNowRemotes, &frame);

    assert_eq!(
        rig.espnow.sent(),
        vec![(REMOTE_MAC, vec![PAIRING_ANNOUNCE])]
    );
    let view = rig.controller.state_view();
    assert_eq!(view.roster.unwrap().len(), 1);
}

#[test]
fn remote_pairs_from_an_explicit_ble_write() {
    let (mut remote, ble, _) = remote_rig(NvsAdapter::new_sim());
    remote.boot(0);
    assert!(!remote.is_paired());

    let frame = WireMessage::EspNowController(CONTROLLER_MAC).encode();
    remote.on_gatt_write(1, Characteristic::EspNowController, &frame);

    assert!(remote.is_paired());
    // The new peer is confirmed back to the configuring central.
    assert_eq!(ble.notify_count(Characteristic::EspNowController), 1);
    assert_eq!(
        ble.last_notify(Characteristic::EspNowController),
        Some(frame.to_vec())
    );
}

#[test]
fn stored_peer_survives_a_remote_reboot() {
    let mut nvs = NvsAdapter::new_sim();
    persist::save_controller_mac(&mut nvs, &CONTROLLER_MAC).unwrap();
    let (remote, _, _) = remote_rig(nvs);
    assert!(remote.is_paired());
}

#[test]
fn announcement_without_a_window_is_ignored_through_the_tick_loop() {
    let _guard = event_queue_lock();
    let (mut remote, _, _) = remote_rig(NvsAdapter::new_sim());
    remote.boot(0);

    events::push(Event::EspNowFrame {
        sender: CONTROLLER_MAC,
        payload: heapless::Vec::from_slice(&[PAIRING_ANNOUNCE]).unwrap(),
    });
    remote.tick(10);
    assert!(!remote.is_paired());
}
