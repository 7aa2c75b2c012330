//! Broadcast fanout.
//!
//! One [`FanoutSet`] per push transport bundles the per-message-type gates
//! and walks them in a fixed order each tick. Two paths:
//!
//! - `broadcast`: gated pushes to every client; a gate commits only when
//!   the sink accepted the frame.
//! - `snapshot`: everything to one new client, bypassing the gates, then
//!   committing so the next broadcast pass does not repeat what the client
//!   just received.
//!
//! The heap sample changes on every read, so its gate is interval-only.

use crate::error::TransportError;
use crate::state::alexa::AlexaSettings;
use crate::state::device::DeviceName;
use crate::state::espnow::{EspNowDevice, MAX_REMOTE_DEVICES};
use crate::state::ota::OtaProgress;
use crate::state::output::OutputState;
use crate::state::wifi::{WifiDetails, WifiStatus};
use crate::throttle::ThrottledGate;
use crate::transport::ble::BleStatus;
use crate::wire::{FirmwareVersion, WireMessage};

/// Gate window for value-changed messages.
pub const BROADCAST_GATE_MS: u32 = 200;
/// The heap sample gets a wider, interval-only window.
pub const HEAP_BROADCAST_MS: u32 = 750;

/// Opaque per-connection handle assigned by the transport.
pub type ClientId = u32;

/// Where broadcast frames go. The device implementation wraps the async
/// HTTP server's WebSocket hub; tests record frames in memory.
pub trait FanoutSink {
    fn broadcast(&mut self, frame: &[u8]) -> Result<(), TransportError>;
    fn unicast(&mut self, client: ClientId, frame: &[u8]) -> Result<(), TransportError>;
    fn send_text(&mut self, client: ClientId, text: &str) -> Result<(), TransportError>;
    fn client_count(&self) -> usize;
}

/// Read-only snapshot of everything the fanout pushes. Owners the binary
/// does not wire up (remote has no Alexa, controller has no peer MAC) stay
/// `None` and are skipped.
#[derive(Debug, Clone, Default)]
pub struct StateView {
    pub free_heap: u32,
    pub output: Option<OutputState>,
    pub ble_status: BleStatus,
    pub device_name: DeviceName,
    pub firmware_version: FirmwareVersion,
    pub ota: OtaProgress,
    pub roster: Option<heapless::Vec<EspNowDevice, MAX_REMOTE_DEVICES>>,
    pub controller_mac: Option<[u8; 6]>,
    pub wifi_details: WifiDetails,
    pub wifi_status: WifiStatus,
    pub alexa: Option<AlexaSettings>,
}

pub struct FanoutSet {
    heap: ThrottledGate<u32>,
    color: ThrottledGate<OutputState>,
    ble_status: ThrottledGate<BleStatus>,
    device_name: ThrottledGate<DeviceName>,
    ota: ThrottledGate<OtaProgress>,
    roster: ThrottledGate<heapless::Vec<EspNowDevice, MAX_REMOTE_DEVICES>>,
    controller_mac: ThrottledGate<[u8; 6]>,
    firmware_version: ThrottledGate<FirmwareVersion>,
    wifi_details: ThrottledGate<WifiDetails>,
    wifi_status: ThrottledGate<WifiStatus>,
    alexa: ThrottledGate<AlexaSettings>,
}

impl Default for FanoutSet {
    fn default() -> Self {
        Self::new()
    }
}

impl FanoutSet {
    pub fn new() -> Self {
        Self {
            heap: ThrottledGate::new(HEAP_BROADCAST_MS),
            color: ThrottledGate::new(BROADCAST_GATE_MS),
            ble_status: ThrottledGate::new(BROADCAST_GATE_MS),
            device_name: ThrottledGate::new(BROADCAST_GATE_MS),
            ota: ThrottledGate::new(BROADCAST_GATE_MS),
            roster: ThrottledGate::new(BROADCAST_GATE_MS),
            controller_mac: ThrottledGate::new(BROADCAST_GATE_MS),
            firmware_version: ThrottledGate::new(BROADCAST_GATE_MS),
            wifi_details: ThrottledGate::new(BROADCAST_GATE_MS),
            wifi_status: ThrottledGate::new(BROADCAST_GATE_MS),
            alexa: ThrottledGate::new(BROADCAST_GATE_MS),
        }
    }

    /// Let an inbound echo of `state` pre-commit the color gate so applying
    /// a client's own write does not bounce straight back to it.
    pub fn seed_color(&self, now_ms: u32, state: OutputState) {
        self.color.commit(now_ms, state);
    }

    /// Gated pushes to all clients, fixed order.
    pub fn broadcast(&mut self, now_ms: u32, view: &StateView, sink: &mut dyn FanoutSink) {
        if sink.client_count() == 0 {
            return;
        }

        if self.heap.interval_elapsed(now_ms) {
            let frame = WireMessage::Heap(view.free_heap).encode();
            if sink.broadcast(&frame).is_ok() {
                self.heap.commit(now_ms, view.free_heap);
            }
        }

        if let Some(output) = view.output {
            Self::push(&self.color, now_ms, &output, sink, || {
                WireMessage::Color(output)
            });
        }
        Self::push(&self.ble_status, now_ms, &view.ble_status, sink, || {
            WireMessage::BleStatus(view.ble_status)
        });
        Self::push(&self.device_name, now_ms, &view.device_name, sink, || {
            WireMessage::DeviceName(view.device_name.clone())
        });
        Self::push(&self.ota, now_ms, &view.ota, sink, || {
            WireMessage::OtaProgress(view.ota)
        });
        if let Some(roster) = &view.roster {
            Self::push(&self.roster, now_ms, roster, sink, || {
                WireMessage::EspNowDevices(roster.clone())
            });
        }
        if let Some(mac) = view.controller_mac {
            Self::push(&self.controller_mac, now_ms, &mac, sink, || {
                WireMessage::EspNowController(mac)
            });
        }
        Self::push(
            &self.firmware_version,
            now_ms,
            &view.firmware_version,
            sink,
            || WireMessage::FirmwareVersion(view.firmware_version.clone()),
        );
        Self::push(&self.wifi_details, now_ms, &view.wifi_details, sink, || {
            WireMessage::WifiDetails(view.wifi_details.clone())
        });
        Self::push(&self.wifi_status, now_ms, &view.wifi_status, sink, || {
            WireMessage::WifiStatus(view.wifi_status)
        });
        if let Some(alexa) = &view.alexa {
            Self::push(&self.alexa, now_ms, alexa, sink, || {
                WireMessage::AlexaSettings(alexa.clone())
            });
        }
    }

    /// Full state to one client, bypassing the gates; every delivered
    /// message commits its gate afterwards.
    pub fn snapshot(
        &mut self,
        now_ms: u32,
        client: ClientId,
        view: &StateView,
        sink: &mut dyn FanoutSink,
    ) {
        let mut messages: heapless::Vec<WireMessage, 11> = heapless::Vec::new();
        let _ = messages.push(WireMessage::Heap(view.free_heap));
        if let Some(output) = view.output {
            let _ = messages.push(WireMessage::Color(output));
        }
        let _ = messages.push(WireMessage::BleStatus(view.ble_status));
        let _ = messages.push(WireMessage::DeviceName(view.device_name.clone()));
        let _ = messages.push(WireMessage::OtaProgress(view.ota));
        if let Some(roster) = &view.roster {
            let _ = messages.push(WireMessage::EspNowDevices(roster.clone()));
        }
        if let Some(mac) = view.controller_mac {
            let _ = messages.push(WireMessage::EspNowController(mac));
        }
        let _ = messages.push(WireMessage::FirmwareVersion(view.firmware_version.clone()));
        let _ = messages.push(WireMessage::WifiDetails(view.wifi_details.clone()));
        let _ = messages.push(WireMessage::WifiStatus(view.wifi_status));
        if let Some(alexa) = &view.alexa {
            let _ = messages.push(WireMessage::AlexaSettings(alexa.clone()));
        }

        for message in &messages {
            if sink.unicast(client, &message.encode()).is_err() {
                log::debug!("fanout: snapshot frame dropped for client {client}");
                continue;
            }
            self.commit_for(now_ms, message);
        }
    }

    fn push<T: PartialEq + Clone>(
        gate: &ThrottledGate<T>,
        now_ms: u32,
        value: &T,
        sink: &mut dyn FanoutSink,
        build: impl FnOnce() -> WireMessage,
    ) {
        if !gate.should_send(now_ms, value) {
            return;
        }
        let frame = build().encode();
        if sink.broadcast(&frame).is_ok() {
            gate.commit(now_ms, value.clone());
        }
    }

    fn commit_for(&self, now_ms: u32, message: &WireMessage) {
        match message {
            WireMessage::Heap(v) => self.heap.commit(now_ms, *v),
            WireMessage::Color(state) => self.color.commit(now_ms, *state),
            WireMessage::BleStatus(s) => self.ble_status.commit(now_ms, *s),
            WireMessage::DeviceName(name) => self.device_name.commit(now_ms, name.clone()),
            WireMessage::OtaProgress(p) => self.ota.commit(now_ms, *p),
            WireMessage::EspNowDevices(roster) => self.roster.commit(now_ms, roster.clone()),
            WireMessage::EspNowController(mac) => self.controller_mac.commit(now_ms, *mac),
            WireMessage::FirmwareVersion(v) => self.firmware_version.commit(now_ms, v.clone()),
            WireMessage::WifiDetails(d) => self.wifi_details.commit(now_ms, d.clone()),
            WireMessage::WifiStatus(s) => self.wifi_status.commit(now_ms, *s),
            WireMessage::AlexaSettings(a) => self.alexa.commit(now_ms, a.clone()),
            _ => {}
        }
    }
}
