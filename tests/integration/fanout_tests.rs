//! WebSocket hub flows through the controller: snapshot on connect, gated
//! broadcast on tick, inbound frame validation.

use rgbwctrl::adapters::nvs::NvsAdapter;
use rgbwctrl::fanout::BROADCAST_GATE_MS;
use rgbwctrl::state::output::{ChannelState, OutputState};
use rgbwctrl::transport::websocket::FrameInfo;
use rgbwctrl::wire::{Tag, WireMessage};

use crate::mock_hw::{controller_rig, event_queue_lock};

fn color_frame(value: u8) -> Vec<u8> {
    WireMessage::Color(OutputState {
        channels: [ChannelState::new(true, value); 4],
    })
    .encode()
    .to_vec()
}

#[test]
fn new_client_gets_the_full_snapshot() {
    let mut rig = controller_rig(NvsAdapter::new_sim());
    rig.ws.borrow_mut().clients = 1;

    rig.controller.on_ws_client_connected(0, 7);

    let recorded = rig.ws.borrow();
    // Controller view: everything except the remote-only peer MAC.
    assert_eq!(recorded.unicasts.len(), 10);
    assert!(recorded.unicasts.iter().all(|(client, _)| *client == 7));
    assert_eq!(recorded.unicasts[0].1[0], Tag::Heap as u8);
    assert!(recorded.broadcasts.is_empty(), "snapshot is unicast only");
}

#[test]
fn applied_client_write_does_not_echo_back() {
    let _guard = event_queue_lock();
    let mut rig = controller_rig(NvsAdapter::new_sim());
    rig.ws.borrow_mut().clients = 1;

    let frame = color_frame(128);
    rig.controller
        .on_ws_frame(1000, 1, &FrameInfo::whole_binary(frame.len()), &frame);
    assert_eq!(
        rig.controller.state_view().output,
        Some(OutputState {
            channels: [ChannelState::new(true, 128); 4],
        })
    );

    rig.controller.tick(1000 + BROADCAST_GATE_MS);
    assert!(
        !rig.ws.borrow().broadcast_tags().contains(&(Tag::Color as u8)),
        "inbound color bounced back to the hub"
    );
}

#[test]
fn fragmented_and_text_frames_change_nothing() {
    let mut rig = controller_rig(NvsAdapter::new_sim());
    let frame = color_frame(99);

    let fragment = FrameInfo {
        is_final: false,
        ..FrameInfo::whole_binary(frame.len())
    };
    rig.controller.on_ws_frame(0, 1, &fragment, &frame);

    let text = FrameInfo {
        binary: false,
        ..FrameInfo::whole_binary(frame.len())
    };
    rig.controller.on_ws_frame(1, 1, &text, &frame);

    assert!(!rig.controller.state_view().output.unwrap().any_on());
}

#[test]
fn broadcast_only_tags_are_rejected_inbound() {
    let mut rig = controller_rig(NvsAdapter::new_sim());
    let frame = WireMessage::EspNowController([9; 6]).encode();
    rig.controller
        .on_ws_frame(0, 1, &FrameInfo::whole_binary(frame.len()), &frame);
    // A roster-tag write from a client must not announce to anyone.
    assert!(rig.espnow.sent().is_empty());
}
