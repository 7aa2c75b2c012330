//! Fuzz the wire decoder: arbitrary bytes must never panic, and any frame
//! the decoder accepts must re-encode to a frame that decodes identically.

#![no_main]

use libfuzzer_sys::fuzz_target;
use rgbwctrl::wire::WireMessage;

fuzz_target!(|data: &[u8]| {
    if let Ok(message) = WireMessage::decode(data) {
        let frame = message.encode();
        assert_eq!(WireMessage::decode(&frame), Ok(message));
    }
});
