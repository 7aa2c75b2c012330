//! Property tests for the wire codec, the send gates and the brightness
//! curve.
//!
//! Runs on host (x86_64) only — proptest is not available for ESP32 targets.

#![cfg(not(target_os = "espidf"))]

use proptest::prelude::*;
use rgbwctrl::adapters::rgbw_pwm::SimPwm;
use rgbwctrl::state::output::{
    Channel, ChannelState, OutputManager, OutputState, MIN_BRIGHTNESS, ON_VALUE,
};
use rgbwctrl::throttle::ThrottledGate;
use rgbwctrl::wire::WireMessage;

// ── wire codec ────────────────────────────────────────────────────

proptest! {
    /// Arbitrary bytes must never panic the decoder, and anything it
    /// accepts must survive a re-encode unchanged.
    #[test]
    fn decode_never_panics_and_accepted_frames_are_canonical(
        data in proptest::collection::vec(any::<u8>(), 0..=512),
    ) {
        if let Ok(message) = WireMessage::decode(&data) {
            let frame = message.encode();
            prop_assert_eq!(WireMessage::decode(&frame), Ok(message));
        }
    }

    #[test]
    fn color_frames_round_trip(raw in any::<[(bool, u8); 4]>()) {
        let state = OutputState {
            channels: raw.map(|(on, value)| ChannelState::new(on, value)),
        };
        let frame = WireMessage::Color(state).encode();
        prop_assert_eq!(WireMessage::decode(&frame), Ok(WireMessage::Color(state)));
    }

    #[test]
    fn device_names_round_trip(name in "[a-zA-Z0-9 _-]{0,28}") {
        let name = heapless::String::try_from(name.as_str()).unwrap();
        let frame = WireMessage::DeviceName(name.clone()).encode();
        prop_assert_eq!(
            WireMessage::decode(&frame),
            Ok(WireMessage::DeviceName(name))
        );
    }
}

// ── send gates ────────────────────────────────────────────────────

proptest! {
    /// A gate never reopens inside its interval, whatever the value does.
    #[test]
    fn gate_stays_closed_within_the_interval(
        interval in 1u32..=10_000,
        committed_at in 0u32..=1_000_000,
        elapsed in 0u32..=9_999,
        old in any::<u8>(),
        new in any::<u8>(),
    ) {
        prop_assume!(elapsed < interval);
        let gate = ThrottledGate::new(interval);
        gate.commit(committed_at, old);
        prop_assert!(!gate.should_send(committed_at.wrapping_add(elapsed), &new));
    }

    /// An unchanged value never re-sends, however much time passes.
    #[test]
    fn gate_never_resends_an_unchanged_value(
        interval in 1u32..=10_000,
        committed_at in 0u32..=1_000_000,
        elapsed in 0u32..=2_000_000,
        value in any::<u8>(),
    ) {
        let gate = ThrottledGate::new(interval);
        gate.commit(committed_at, value);
        prop_assert!(!gate.should_send(committed_at.wrapping_add(elapsed), &value));
    }
}

// ── brightness curve ──────────────────────────────────────────────

proptest! {
    /// Stepping up is monotonic, saturates at full and never switches a
    /// channel off; stepping down floors at the minimum.
    #[test]
    fn brightness_steps_are_bounded_and_monotonic(
        start in any::<u8>(),
        ups in 0usize..=64,
        downs in 0usize..=64,
    ) {
        let mut output = OutputManager::new(Box::new(SimPwm::new()), [4, 5, 6, 7]);
        output.set_channel(Channel::Red, ChannelState::new(true, start), 0);

        let mut previous = start;
        for i in 0..ups {
            output.increase_brightness(i as u32 + 1);
            let state = output.channel(Channel::Red);
            prop_assert!(state.on);
            prop_assert!(state.value >= previous);
            previous = state.value;
        }
        if ups >= 64 {
            prop_assert_eq!(previous, ON_VALUE, "64 steps span the whole curve");
        }

        for i in 0..downs {
            output.decrease_brightness((ups + i) as u32 + 1);
            let state = output.channel(Channel::Red);
            prop_assert!(state.on, "stepping down must never turn the channel off");
            prop_assert!(state.value <= previous);
            prop_assert!(state.value >= MIN_BRIGHTNESS || state.value == previous);
            previous = state.value;
        }
    }
}
