//! ESP-NOW command transport.
//!
//! A command is a single byte. The controller receives: the sender MAC is
//! checked against the paired-remote roster BEFORE the payload is inspected,
//! so unpaired senders cannot reach the decoder at all. The remote sends:
//! fire-and-forget, with one bounded recovery path when the radio's peer
//! table is wedged (deinit, reinit, one more peer-add attempt).

use crate::app::ports::EspNowRadioPort;
use crate::error::TransportError;
use crate::state::espnow::EspNowRoster;
use crate::state::output::{Channel, OutputManager};

/// Commands are exactly one byte on air.
pub const COMMAND_FRAME_LEN: usize = 1;

/// Pairing announcement byte, deliberately outside the command range. The
/// controller sends it to a freshly rostered remote; a remote in its pairing
/// window stores the sender MAC as its controller.
pub const PAIRING_ANNOUNCE: u8 = 0xA5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EspNowCommand {
    ToggleRed = 0,
    ToggleGreen = 1,
    ToggleBlue = 2,
    ToggleWhite = 3,
    ToggleAll = 4,
    TurnOffAll = 5,
    TurnOnAll = 6,
    IncreaseBrightness = 7,
    DecreaseBrightness = 8,
}

impl EspNowCommand {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::ToggleRed),
            1 => Some(Self::ToggleGreen),
            2 => Some(Self::ToggleBlue),
            3 => Some(Self::ToggleWhite),
            4 => Some(Self::ToggleAll),
            5 => Some(Self::TurnOffAll),
            6 => Some(Self::TurnOnAll),
            7 => Some(Self::IncreaseBrightness),
            8 => Some(Self::DecreaseBrightness),
            _ => None,
        }
    }

    /// Drive the output manager.
    pub fn apply(self, output: &mut OutputManager, now_ms: u32) {
        match self {
            Self::ToggleRed => output.toggle(Channel::Red, now_ms),
            Self::ToggleGreen => output.toggle(Channel::Green, now_ms),
            Self::ToggleBlue => output.toggle(Channel::Blue, now_ms),
            Self::ToggleWhite => output.toggle(Channel::White, now_ms),
            Self::ToggleAll => output.toggle_all(now_ms),
            Self::TurnOffAll => output.turn_off_all(now_ms),
            Self::TurnOnAll => output.turn_on_all(now_ms),
            Self::IncreaseBrightness => output.increase_brightness(now_ms),
            Self::DecreaseBrightness => output.decrease_brightness(now_ms),
        }
    }
}

// ── receiving (controller) ───────────────────────────────────────

/// Payload decoding, injectable so tests can observe when it runs.
pub trait CommandDecoder {
    fn decode(&mut self, payload: &[u8]) -> Option<EspNowCommand>;
}

/// Production decoder: exactly one byte, known command values only.
#[derive(Default)]
pub struct WireCommandDecoder;

impl CommandDecoder for WireCommandDecoder {
    fn decode(&mut self, payload: &[u8]) -> Option<EspNowCommand> {
        if payload.len() != COMMAND_FRAME_LEN {
            log::warn!("espnow: frame of {} bytes dropped", payload.len());
            return None;
        }
        EspNowCommand::from_u8(payload[0])
    }
}

pub struct EspNowReceiver<D = WireCommandDecoder> {
    decoder: D,
}

impl Default for EspNowReceiver<WireCommandDecoder> {
    fn default() -> Self {
        Self::new()
    }
}

impl EspNowReceiver<WireCommandDecoder> {
    pub fn new() -> Self {
        Self {
            decoder: WireCommandDecoder,
        }
    }
}

impl<D: CommandDecoder> EspNowReceiver<D> {
    pub fn with_decoder(decoder: D) -> Self {
        Self { decoder }
    }

    /// Receive callback. The allow-list check comes first: payloads from
    /// unpaired MACs are never decoded.
    pub fn on_receive(
        &mut self,
        roster: &EspNowRoster,
        sender: &[u8; 6],
        payload: &[u8],
    ) -> Option<EspNowCommand> {
        if !roster.is_allowed(sender) {
            log::debug!(
                "espnow: frame from unpaired {:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X} dropped",
                sender[0],
                sender[1],
                sender[2],
                sender[3],
                sender[4],
                sender[5]
            );
            return None;
        }
        self.decoder.decode(payload)
    }
}

// ── sending (remote) ─────────────────────────────────────────────

pub struct EspNowSender {
    radio: Box<dyn EspNowRadioPort>,
}

impl EspNowSender {
    pub fn new(radio: Box<dyn EspNowRadioPort>) -> Self {
        Self { radio }
    }

    pub fn send(&mut self, mac: &[u8; 6], command: EspNowCommand) -> Result<(), TransportError> {
        self.send_byte(mac, command as u8)
    }

    /// Pairing announcement to a newly rostered remote.
    pub fn announce(&mut self, mac: &[u8; 6]) -> Result<(), TransportError> {
        self.send_byte(mac, PAIRING_ANNOUNCE)
    }

    fn send_byte(&mut self, mac: &[u8; 6], byte: u8) -> Result<(), TransportError> {
        self.ensure_peer(mac)?;
        match self.radio.send(mac, &[byte]) {
            Ok(()) => Ok(()),
            Err(e) => {
                log::error!("espnow: send 0x{byte:02X} failed: {e}");
                Err(e)
            }
        }
    }

    /// Register the peer if needed. A failed add gets exactly one recovery
    /// attempt: reinit the radio and add again.
    fn ensure_peer(&mut self, mac: &[u8; 6]) -> Result<(), TransportError> {
        if self.radio.has_peer(mac) {
            return Ok(());
        }
        if self.radio.add_peer(mac).is_ok() {
            return Ok(());
        }
        log::warn!("espnow: peer add failed, reinitialising radio");
        self.radio.reinit()?;
        self.radio.add_peer(mac).map_err(|e| {
            log::error!("espnow: peer add failed after reinit: {e}");
            e
        })
    }
}
