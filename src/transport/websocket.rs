//! WebSocket transport.
//!
//! Binary frames only, one wire message per frame. Inbound frames are
//! validated hard before the payload is touched: fragmented frames, length
//! mismatches, empty payloads and broadcast-only tags are dropped without a
//! reply. Valid frames either mutate state (handed to the control plane),
//! are silently ignored (status messages a client has no business sending),
//! or earn a text reply for a known-but-inbound-meaningless tag.
//!
//! Outbound pushes go through the shared [`FanoutSet`]; a freshly connected
//! client gets the full snapshot before joining the gated broadcast flow.

use crate::fanout::{ClientId, FanoutSet, FanoutSink, StateView};
use crate::wire::{MAX_INBOUND_TAG, Tag, WireMessage};

const UNKNOWN_MESSAGE_REPLY: &str = "Unknown message type";

/// What the transport reported about one received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub binary: bool,
    pub is_final: bool,
    /// Byte offset of this fragment within the message.
    pub index: u64,
    /// Total message length announced by the frame header.
    pub message_len: u64,
}

impl FrameInfo {
    /// A whole, unfragmented binary message of `len` bytes.
    pub fn whole_binary(len: usize) -> Self {
        Self {
            binary: true,
            is_final: true,
            index: 0,
            message_len: len as u64,
        }
    }
}

pub struct WsHub {
    sink: Box<dyn FanoutSink>,
    fanout: FanoutSet,
}

impl WsHub {
    pub fn new(sink: Box<dyn FanoutSink>) -> Self {
        Self {
            sink,
            fanout: FanoutSet::new(),
        }
    }

    pub fn client_count(&self) -> usize {
        self.sink.client_count()
    }

    /// Tick: gated broadcast of everything that changed.
    pub fn handle(&mut self, now_ms: u32, view: &StateView) {
        self.fanout.broadcast(now_ms, view, self.sink.as_mut());
    }

    /// Full snapshot for a client that just connected.
    pub fn on_client_connected(&mut self, now_ms: u32, client: ClientId, view: &StateView) {
        log::info!("ws: client {client} connected");
        self.fanout.snapshot(now_ms, client, view, self.sink.as_mut());
    }

    /// Validate and decode one inbound frame. Returns the message the
    /// control plane should apply, or `None` when the frame was dropped,
    /// ignored or answered directly.
    pub fn on_frame(
        &mut self,
        now_ms: u32,
        client: ClientId,
        info: &FrameInfo,
        data: &[u8],
    ) -> Option<WireMessage> {
        if !frame_is_wellformed(info, data) {
            return None;
        }
        // Broadcast-only tags are not accepted back.
        let tag = Tag::from_u8(data[0])?;
        if tag > MAX_INBOUND_TAG {
            return None;
        }
        let message = WireMessage::decode(data).ok()?;
        match message {
            // Telemetry a client cannot legitimately set.
            WireMessage::Heap(_) | WireMessage::WifiDetails(_) | WireMessage::OtaProgress(_) => {
                None
            }
            WireMessage::FirmwareVersion(_) => {
                let _ = self.sink.send_text(client, UNKNOWN_MESSAGE_REPLY);
                None
            }
            // Seed the gate first so applying the write does not echo the
            // same state straight back to the sender.
            WireMessage::Color(state) => {
                self.fanout.seed_color(now_ms, state);
                Some(WireMessage::Color(state))
            }
            other => Some(other),
        }
    }
}

/// Single-frame binary messages only: final, offset zero, announced length
/// matching the payload, nonempty.
fn frame_is_wellformed(info: &FrameInfo, data: &[u8]) -> bool {
    info.binary
        && info.is_final
        && info.index == 0
        && info.message_len == data.len() as u64
        && !data.is_empty()
}
