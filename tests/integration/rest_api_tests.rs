//! REST surface through the controller dispatcher.

use rgbwctrl::adapters::nvs::NvsAdapter;
use rgbwctrl::transport::rest;

use crate::mock_hw::controller_rig;

#[test]
fn color_update_shows_up_in_the_state_snapshot() {
    let mut rig = controller_rig(NvsAdapter::new_sim());

    let response = rig
        .controller
        .handle_rest(rest::PATH_OUTPUT_COLOR, "r=200&b=10", 0);
    assert_eq!(response.status, 200);

    let state = rig.controller.handle_rest(rest::PATH_STATE, "", 1);
    assert_eq!(state.status, 200);
    assert!(state.no_store);

    let body: serde_json::Value = serde_json::from_str(&state.body).unwrap();
    assert_eq!(body["output"][0]["value"], 200);
    assert_eq!(body["output"][2]["value"], 10);
    assert_eq!(body["output"][1]["on"], false);
}

#[test]
fn bluetooth_endpoint_toggles_the_stack() {
    let mut rig = controller_rig(NvsAdapter::new_sim());

    assert_eq!(
        rig.controller
            .handle_rest(rest::PATH_BLUETOOTH, "state=on", 0)
            .status,
        200
    );
    assert!(rig.ble.is_advertising());

    assert_eq!(
        rig.controller
            .handle_rest(rest::PATH_BLUETOOTH, "state=off", 1)
            .status,
        200
    );
    assert!(!rig.ble.is_advertising());
}

#[test]
fn unknown_paths_get_a_404_envelope() {
    let mut rig = controller_rig(NvsAdapter::new_sim());
    let response = rig.controller.handle_rest("/nope", "", 0);
    assert_eq!(response.status, 404);
    assert!(response.body.contains("Not found"));
}
