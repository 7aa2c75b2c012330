//! Reboot behavior: everything a controller owns restores from NVS blobs
//! written by the previous life of the firmware.

use rgbwctrl::adapters::nvs::NvsAdapter;
use rgbwctrl::persist;
use rgbwctrl::pins;
use rgbwctrl::state::espnow::EspNowDevice;
use rgbwctrl::state::output::ChannelState;
use rgbwctrl::transport::ble::Characteristic;
use rgbwctrl::wire::WireMessage;

use crate::mock_hw::{controller_rig, stored_network};

#[test]
fn persisted_channels_light_up_at_boot() {
    let mut nvs = NvsAdapter::new_sim();
    persist::save_channel(&mut nvs, pins::OUTPUT_R_GPIO as u8, ChannelState::new(true, 77))
        .unwrap();
    persist::save_channel(&mut nvs, pins::OUTPUT_W_GPIO as u8, ChannelState::new(false, 12))
        .unwrap();

    let mut rig = controller_rig(nvs);
    let output = rig.controller.state_view().output.unwrap();
    assert_eq!(output.channels[0], ChannelState::new(true, 77));
    assert_eq!(output.channels[3], ChannelState::new(false, 12));
    assert_eq!(output.channels[1], ChannelState::default());
}

#[test]
fn stored_roster_restores_before_any_radio_traffic() {
    let mut nvs = NvsAdapter::new_sim();
    let mut roster = heapless::Vec::new();
    roster
        .push(EspNowDevice {
            name: heapless::String::try_from("hall").unwrap(),
            mac: [5; 6],
        })
        .unwrap();
    persist::save_roster(&mut nvs, &roster).unwrap();

    let mut rig = controller_rig(nvs);
    assert_eq!(rig.controller.state_view().roster, Some(roster));
}

#[test]
fn renaming_over_gatt_is_visible_in_the_next_view() {
    let mut rig = controller_rig(NvsAdapter::new_sim());
    let name = heapless::String::try_from("workbench").unwrap();
    let frame = WireMessage::DeviceName(name).encode();
    rig.controller
        .on_gatt_write(0, Characteristic::DeviceName, &frame);
    assert_eq!(
        rig.controller.state_view().device_name.as_str(),
        "workbench"
    );
}

#[test]
fn factory_reset_forgets_the_stored_network() {
    let mut nvs = NvsAdapter::new_sim();
    persist::save_wifi_credentials(&mut nvs, &stored_network()).unwrap();
    let mut rig = controller_rig(nvs);

    let response = rig
        .controller
        .handle_rest(rgbwctrl::transport::rest::PATH_SYSTEM_RESET, "", 0);
    assert_eq!(response.status, 200);

    // The next boot finds no credentials and falls back to provisioning.
    rig.controller.boot(1);
    assert!(rig.wifi.connects().is_empty());
    assert!(rig.ble.is_advertising());
}
