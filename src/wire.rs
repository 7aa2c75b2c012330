//! Binary wire codec shared by every transport.
//!
//! One encoding, many carriers: the same tagged frame travels as a
//! WebSocket binary message, a BLE characteristic value and (for the roster
//! records) an NVS blob. Layout is a 1-byte tag followed by a fixed-size
//! little-endian payload; strings are NUL-padded fixed fields sized for a
//! terminator. There is no framing beyond the tag — the carrier delimits.
//!
//! Decoding is strict: unknown tags and frames whose length does not match
//! the tag's payload are rejected (callers drop them silently).

use crate::error::WireError;
use crate::state::alexa::{AlexaMode, AlexaSettings};
use crate::state::device::HttpCredentials;
use crate::state::espnow::{EspNowDevice, MAX_REMOTE_DEVICES, NAME_FIELD_LEN};
use crate::state::ota::{OtaProgress, OtaStatus};
use crate::state::output::{ChannelState, OutputState};
use crate::state::wifi::{
    EapPhase2, WifiConnectionDetails, WifiCredentials, WifiDetails, WifiEncryption,
    WifiScanStatus, WifiStatus,
};
use crate::transport::ble::BleStatus;

/// Largest frame (connection details), tag included.
pub const MAX_FRAME_LEN: usize = 423;

const SSID_FIELD: usize = 33;
const PASSWORD_FIELD: usize = 65;
const EAP_FIELD: usize = 129;
/// The credential union is sized by its EAP arm.
const CREDENTIAL_UNION: usize = EAP_FIELD * 3 + 1;

const NAME_FIELD: usize = 29;
const VERSION_FIELD: usize = 10;
const CREDENTIAL_FIELD: usize = 33;
const ALEXA_NAME_FIELD: usize = 32;

/// Firmware version string, sized for its wire field.
pub type FirmwareVersion = heapless::String<{ VERSION_FIELD - 1 }>;

// ── tags ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Tag {
    Heap = 0,
    DeviceName = 1,
    FirmwareVersion = 2,
    Color = 3,
    HttpCredentials = 4,
    BleStatus = 5,
    WifiStatus = 6,
    WifiScanStatus = 7,
    WifiDetails = 8,
    WifiConnectionDetails = 9,
    OtaProgress = 10,
    AlexaSettings = 11,
    EspNowDevices = 12,
    EspNowController = 13,
}

/// Highest tag a client may send; the roster tags are broadcast-only.
pub const MAX_INBOUND_TAG: Tag = Tag::AlexaSettings;

impl Tag {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Heap),
            1 => Some(Self::DeviceName),
            2 => Some(Self::FirmwareVersion),
            3 => Some(Self::Color),
            4 => Some(Self::HttpCredentials),
            5 => Some(Self::BleStatus),
            6 => Some(Self::WifiStatus),
            7 => Some(Self::WifiScanStatus),
            8 => Some(Self::WifiDetails),
            9 => Some(Self::WifiConnectionDetails),
            10 => Some(Self::OtaProgress),
            11 => Some(Self::AlexaSettings),
            12 => Some(Self::EspNowDevices),
            13 => Some(Self::EspNowController),
            _ => None,
        }
    }

    /// Full frame length for this tag, the tag byte included.
    pub const fn frame_len(self) -> usize {
        match self {
            Self::Heap => 5,
            Self::DeviceName => 1 + NAME_FIELD,
            Self::FirmwareVersion => 1 + VERSION_FIELD,
            Self::Color => 9,
            Self::HttpCredentials => 1 + 2 * CREDENTIAL_FIELD,
            Self::BleStatus | Self::WifiStatus | Self::WifiScanStatus => 2,
            Self::WifiDetails => 56,
            Self::WifiConnectionDetails => 1 + 1 + SSID_FIELD + CREDENTIAL_UNION,
            Self::OtaProgress => 10,
            Self::AlexaSettings => 130,
            Self::EspNowDevices => 2 + MAX_REMOTE_DEVICES * (NAME_FIELD_LEN + 6),
            Self::EspNowController => 7,
        }
    }
}

// ── message ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    Heap(u32),
    DeviceName(crate::state::device::DeviceName),
    FirmwareVersion(FirmwareVersion),
    Color(OutputState),
    HttpCredentials(HttpCredentials),
    BleStatus(BleStatus),
    WifiStatus(WifiStatus),
    WifiScanStatus(WifiScanStatus),
    WifiDetails(WifiDetails),
    WifiConnectionDetails(WifiConnectionDetails),
    OtaProgress(OtaProgress),
    AlexaSettings(AlexaSettings),
    EspNowDevices(heapless::Vec<EspNowDevice, MAX_REMOTE_DEVICES>),
    EspNowController([u8; 6]),
}

impl WireMessage {
    pub fn tag(&self) -> Tag {
        match self {
            Self::Heap(_) => Tag::Heap,
            Self::DeviceName(_) => Tag::DeviceName,
            Self::FirmwareVersion(_) => Tag::FirmwareVersion,
            Self::Color(_) => Tag::Color,
            Self::HttpCredentials(_) => Tag::HttpCredentials,
            Self::BleStatus(_) => Tag::BleStatus,
            Self::WifiStatus(_) => Tag::WifiStatus,
            Self::WifiScanStatus(_) => Tag::WifiScanStatus,
            Self::WifiDetails(_) => Tag::WifiDetails,
            Self::WifiConnectionDetails(_) => Tag::WifiConnectionDetails,
            Self::OtaProgress(_) => Tag::OtaProgress,
            Self::AlexaSettings(_) => Tag::AlexaSettings,
            Self::EspNowDevices(_) => Tag::EspNowDevices,
            Self::EspNowController(_) => Tag::EspNowController,
        }
    }

    /// Encode into a fixed-capacity frame. Infallible by construction: every
    /// payload fits [`MAX_FRAME_LEN`].
    pub fn encode(&self) -> heapless::Vec<u8, MAX_FRAME_LEN> {
        let mut frame = heapless::Vec::new();
        // frame_len is bounded by the vec capacity for every tag
        frame.resize_default(self.tag().frame_len()).ok();
        frame[0] = self.tag() as u8;
        let payload = &mut frame[1..];
        match self {
            Self::Heap(free) => payload.copy_from_slice(&free.to_le_bytes()),
            Self::DeviceName(name) => put_cstr(payload, name.as_str()),
            Self::FirmwareVersion(version) => put_cstr(payload, version.as_str()),
            Self::Color(state) => encode_color(payload, state),
            Self::HttpCredentials(credentials) => {
                put_cstr(&mut payload[..CREDENTIAL_FIELD], credentials.username.as_str());
                put_cstr(&mut payload[CREDENTIAL_FIELD..], credentials.password.as_str());
            }
            Self::BleStatus(status) => payload[0] = *status as u8,
            Self::WifiStatus(status) => payload[0] = *status as u8,
            Self::WifiScanStatus(status) => payload[0] = *status as u8,
            Self::WifiDetails(details) => encode_wifi_details(payload, details),
            Self::WifiConnectionDetails(details) => encode_connection_details(payload, details),
            Self::OtaProgress(progress) => {
                payload[0] = progress.status as u8;
                payload[1..5].copy_from_slice(&progress.total_bytes_expected.to_le_bytes());
                payload[5..9].copy_from_slice(&progress.total_bytes_received.to_le_bytes());
            }
            Self::AlexaSettings(settings) => {
                payload[0] = settings.mode as u8;
                for (i, name) in settings.names.iter().enumerate() {
                    let start = 1 + i * ALEXA_NAME_FIELD;
                    put_cstr(&mut payload[start..start + ALEXA_NAME_FIELD], name.as_str());
                }
            }
            Self::EspNowDevices(devices) => {
                payload[0] = devices.len() as u8;
                for (i, device) in devices.iter().enumerate() {
                    let start = 1 + i * (NAME_FIELD_LEN + 6);
                    put_cstr(&mut payload[start..start + NAME_FIELD_LEN], device.name.as_str());
                    payload[start + NAME_FIELD_LEN..start + NAME_FIELD_LEN + 6]
                        .copy_from_slice(&device.mac);
                }
            }
            Self::EspNowController(mac) => payload.copy_from_slice(mac),
        }
        frame
    }

    /// Strict decode: the frame must be exactly the tag's length.
    pub fn decode(frame: &[u8]) -> Result<Self, WireError> {
        let (&first, payload) = frame.split_first().ok_or(WireError::Truncated)?;
        let tag = Tag::from_u8(first).ok_or(WireError::UnknownTag(first))?;
        if frame.len() != tag.frame_len() {
            return Err(WireError::Truncated);
        }
        Ok(match tag {
            Tag::Heap => Self::Heap(u32::from_le_bytes(le4(payload, 0))),
            Tag::DeviceName => Self::DeviceName(get_cstr(payload)?),
            Tag::FirmwareVersion => Self::FirmwareVersion(get_cstr(payload)?),
            Tag::Color => Self::Color(decode_color(payload)),
            Tag::HttpCredentials => Self::HttpCredentials(HttpCredentials {
                username: get_cstr(&payload[..CREDENTIAL_FIELD])?,
                password: get_cstr(&payload[CREDENTIAL_FIELD..])?,
            }),
            Tag::BleStatus => {
                Self::BleStatus(BleStatus::from_u8(payload[0]).ok_or(WireError::InvalidField)?)
            }
            Tag::WifiStatus => Self::WifiStatus(WifiStatus::from_u8(payload[0])),
            Tag::WifiScanStatus => Self::WifiScanStatus(
                WifiScanStatus::from_u8(payload[0]).ok_or(WireError::InvalidField)?,
            ),
            Tag::WifiDetails => Self::WifiDetails(decode_wifi_details(payload)?),
            Tag::WifiConnectionDetails => {
                Self::WifiConnectionDetails(decode_connection_details(payload)?)
            }
            Tag::OtaProgress => Self::OtaProgress(OtaProgress {
                status: OtaStatus::from_u8(payload[0]).ok_or(WireError::InvalidField)?,
                total_bytes_expected: u32::from_le_bytes(le4(payload, 1)),
                total_bytes_received: u32::from_le_bytes(le4(payload, 5)),
            }),
            Tag::AlexaSettings => {
                let mode = AlexaMode::from_u8(payload[0]);
                let mut names: [crate::state::alexa::DeviceName; 4] = Default::default();
                for (i, name) in names.iter_mut().enumerate() {
                    let start = 1 + i * ALEXA_NAME_FIELD;
                    *name = get_cstr(&payload[start..start + ALEXA_NAME_FIELD])?;
                }
                Self::AlexaSettings(AlexaSettings { mode, names })
            }
            Tag::EspNowDevices => {
                let count = (payload[0] as usize).min(MAX_REMOTE_DEVICES);
                let mut devices = heapless::Vec::new();
                for i in 0..count {
                    let start = 1 + i * (NAME_FIELD_LEN + 6);
                    let mut mac = [0u8; 6];
                    mac.copy_from_slice(&payload[start + NAME_FIELD_LEN..start + NAME_FIELD_LEN + 6]);
                    let device = EspNowDevice {
                        name: get_cstr(&payload[start..start + NAME_FIELD_LEN])?,
                        mac,
                    };
                    // capacity matches count bound
                    devices.push(device).map_err(|_| WireError::InvalidField)?;
                }
                Self::EspNowDevices(devices)
            }
            Tag::EspNowController => {
                let mut mac = [0u8; 6];
                mac.copy_from_slice(payload);
                Self::EspNowController(mac)
            }
        })
    }
}

// ── field helpers ────────────────────────────────────────────────

/// Copy a string into a NUL-padded fixed field, always leaving a terminator.
fn put_cstr(field: &mut [u8], s: &str) {
    let max = field.len() - 1;
    let mut end = s.len().min(max);
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    field[..end].copy_from_slice(&s.as_bytes()[..end]);
    field[end..].fill(0);
}

/// Read a NUL-terminated string out of a fixed field.
fn get_cstr<const N: usize>(field: &[u8]) -> Result<heapless::String<N>, WireError> {
    let end = field.iter().position(|b| *b == 0).unwrap_or(field.len()).min(N);
    let s = core::str::from_utf8(&field[..end]).map_err(|_| WireError::InvalidField)?;
    heapless::String::try_from(s).map_err(|()| WireError::InvalidField)
}

fn le4(payload: &[u8], offset: usize) -> [u8; 4] {
    let mut out = [0u8; 4];
    out.copy_from_slice(&payload[offset..offset + 4]);
    out
}

fn encode_color(payload: &mut [u8], state: &OutputState) {
    for (i, channel) in state.channels.iter().enumerate() {
        payload[i * 2] = u8::from(channel.on);
        payload[i * 2 + 1] = channel.value;
    }
}

fn decode_color(payload: &[u8]) -> OutputState {
    let mut state = OutputState::default();
    for (i, channel) in state.channels.iter_mut().enumerate() {
        *channel = ChannelState::new(payload[i * 2] != 0, payload[i * 2 + 1]);
    }
    state
}

fn encode_wifi_details(payload: &mut [u8], details: &WifiDetails) {
    put_cstr(&mut payload[..SSID_FIELD], details.ssid.as_str());
    payload[SSID_FIELD..SSID_FIELD + 6].copy_from_slice(&details.mac);
    let words = [details.ip, details.gateway, details.subnet, details.dns];
    for (i, word) in words.iter().enumerate() {
        let start = SSID_FIELD + 6 + i * 4;
        payload[start..start + 4].copy_from_slice(&word.to_le_bytes());
    }
}

fn decode_wifi_details(payload: &[u8]) -> Result<WifiDetails, WireError> {
    let mut mac = [0u8; 6];
    mac.copy_from_slice(&payload[SSID_FIELD..SSID_FIELD + 6]);
    let word = |i: usize| u32::from_le_bytes(le4(payload, SSID_FIELD + 6 + i * 4));
    Ok(WifiDetails {
        ssid: get_cstr(&payload[..SSID_FIELD])?,
        mac,
        ip: word(0),
        gateway: word(1),
        subnet: word(2),
        dns: word(3),
    })
}

/// Layout: encryption byte, SSID field, then the credential union. The
/// union area is sized by the EAP arm and zero-padded by the personal arm;
/// the encryption byte selects the interpretation.
fn encode_connection_details(payload: &mut [u8], details: &WifiConnectionDetails) {
    payload[0] = details.encryption as u8;
    put_cstr(&mut payload[1..1 + SSID_FIELD], details.ssid.as_str());
    let union = &mut payload[1 + SSID_FIELD..];
    union.fill(0);
    match &details.credentials {
        WifiCredentials::Simple { password } => {
            put_cstr(&mut union[..PASSWORD_FIELD], password.as_str());
        }
        WifiCredentials::Eap {
            identity,
            username,
            password,
            phase2,
        } => {
            put_cstr(&mut union[..EAP_FIELD], identity.as_str());
            put_cstr(&mut union[EAP_FIELD..EAP_FIELD * 2], username.as_str());
            put_cstr(&mut union[EAP_FIELD * 2..EAP_FIELD * 3], password.as_str());
            union[EAP_FIELD * 3] = *phase2 as u8;
        }
    }
}

fn decode_connection_details(payload: &[u8]) -> Result<WifiConnectionDetails, WireError> {
    let encryption = WifiEncryption::from_u8(payload[0]);
    let ssid = get_cstr(&payload[1..1 + SSID_FIELD])?;
    let union = &payload[1 + SSID_FIELD..];
    let credentials = if encryption == WifiEncryption::Enterprise {
        WifiCredentials::Eap {
            identity: get_cstr(&union[..EAP_FIELD])?,
            username: get_cstr(&union[EAP_FIELD..EAP_FIELD * 2])?,
            password: get_cstr(&union[EAP_FIELD * 2..EAP_FIELD * 3])?,
            phase2: EapPhase2::from_u8(union[EAP_FIELD * 3]),
        }
    } else {
        WifiCredentials::Simple {
            password: get_cstr(&union[..PASSWORD_FIELD])?,
        }
    };
    Ok(WifiConnectionDetails {
        ssid,
        encryption,
        credentials,
    })
}
