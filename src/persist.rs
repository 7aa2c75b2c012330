//! Typed persistence bridge.
//!
//! Maps every persistent record onto its NVS namespace and keys. State
//! owners never format keys or touch blob layout themselves; they call
//! through here so the flash layout is visible in one place.
//!
//! | Namespace       | Keys                                    | Record             |
//! |-----------------|-----------------------------------------|--------------------|
//! | `light`         | `%02uo` / `%02uv` per pin               | channel on/value   |
//! | `device-config` | `deviceName`                            | device name        |
//! | `http`          | `u`, `p`                                | basic-auth creds   |
//! | `wifi-config`   | `ssid`, `enc`, `password` or EAP keys   | join credentials   |
//! | `esp-now`       | `devCount`, `devData`, `controller`     | roster / peer MAC  |
//! | `alexa-config`  | `mode`, `r`, `g`, `b`, `w`              | Alexa settings     |
//! | `sensor`        | `f`                                     | calibration factor |

use core::fmt::Write as _;

use crate::app::ports::StoragePort;
use crate::error::StorageError;
use crate::state::alexa::{AlexaMode, AlexaSettings};
use crate::state::device::{DeviceName, HttpCredentials};
use crate::state::espnow::{EspNowDevice, MAX_REMOTE_DEVICES, NAME_FIELD_LEN};
use crate::state::output::ChannelState;
use crate::state::wifi::{
    EapPhase2, WifiConnectionDetails, WifiCredentials, WifiEncryption,
};

const NS_LIGHT: &str = "light";
const NS_DEVICE: &str = "device-config";
const NS_HTTP: &str = "http";
const NS_WIFI: &str = "wifi-config";
const NS_ESPNOW: &str = "esp-now";
const NS_ALEXA: &str = "alexa-config";
const NS_SENSOR: &str = "sensor";

const KEY_DEVICE_NAME: &str = "deviceName";
const KEY_HTTP_USER: &str = "u";
const KEY_HTTP_PASS: &str = "p";
const KEY_ROSTER_COUNT: &str = "devCount";
const KEY_ROSTER_DATA: &str = "devData";
const KEY_CONTROLLER_MAC: &str = "controller";
const KEY_CALIBRATION: &str = "f";

const ROSTER_ENTRY_LEN: usize = NAME_FIELD_LEN + 6;

// ── generic helpers ──────────────────────────────────────────────

fn read_string<const N: usize>(
    storage: &dyn StoragePort,
    namespace: &str,
    key: &str,
) -> Option<heapless::String<N>> {
    let mut buf = [0u8; 192];
    let len = storage.read(namespace, key, &mut buf).ok()?;
    let bytes = &buf[..len.min(N)];
    // Stored strings may carry a trailing NUL.
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    let s = core::str::from_utf8(&bytes[..end]).ok()?;
    heapless::String::try_from(s).ok()
}

fn write_string(
    storage: &mut dyn StoragePort,
    namespace: &str,
    key: &str,
    value: &str,
) -> Result<(), StorageError> {
    storage.write(namespace, key, value.as_bytes())
}

fn read_byte(storage: &dyn StoragePort, namespace: &str, key: &str) -> Option<u8> {
    let mut buf = [0u8; 1];
    match storage.read(namespace, key, &mut buf) {
        Ok(1) => Some(buf[0]),
        _ => None,
    }
}

// ── light channels ───────────────────────────────────────────────

fn channel_key(pin: u8, suffix: char) -> heapless::String<8> {
    let mut key = heapless::String::new();
    let _ = write!(key, "{pin:02}{suffix}");
    key
}

pub fn load_channel(storage: &dyn StoragePort, pin: u8) -> Option<ChannelState> {
    let on = read_byte(storage, NS_LIGHT, &channel_key(pin, 'o'))?;
    let value = read_byte(storage, NS_LIGHT, &channel_key(pin, 'v'))?;
    Some(ChannelState::new(on != 0, value))
}

pub fn save_channel(
    storage: &mut dyn StoragePort,
    pin: u8,
    state: ChannelState,
) -> Result<(), StorageError> {
    storage.write(NS_LIGHT, &channel_key(pin, 'o'), &[u8::from(state.on)])?;
    storage.write(NS_LIGHT, &channel_key(pin, 'v'), &[state.value])
}

// ── device name ──────────────────────────────────────────────────

pub fn load_device_name(storage: &dyn StoragePort) -> Option<DeviceName> {
    read_string(storage, NS_DEVICE, KEY_DEVICE_NAME)
}

pub fn save_device_name(
    storage: &mut dyn StoragePort,
    name: &DeviceName,
) -> Result<(), StorageError> {
    write_string(storage, NS_DEVICE, KEY_DEVICE_NAME, name.as_str())
}

// ── HTTP credentials ─────────────────────────────────────────────

pub fn load_http_credentials(storage: &dyn StoragePort) -> Option<HttpCredentials> {
    let username = read_string(storage, NS_HTTP, KEY_HTTP_USER)?;
    let password = read_string(storage, NS_HTTP, KEY_HTTP_PASS).unwrap_or_default();
    Some(HttpCredentials { username, password })
}

pub fn save_http_credentials(
    storage: &mut dyn StoragePort,
    credentials: &HttpCredentials,
) -> Result<(), StorageError> {
    write_string(storage, NS_HTTP, KEY_HTTP_USER, credentials.username.as_str())?;
    write_string(storage, NS_HTTP, KEY_HTTP_PASS, credentials.password.as_str())
}

// ── Wi-Fi credentials ────────────────────────────────────────────

pub fn load_wifi_credentials(storage: &dyn StoragePort) -> Option<WifiConnectionDetails> {
    let ssid: heapless::String<32> = read_string(storage, NS_WIFI, "ssid")?;
    if ssid.is_empty() {
        return None;
    }
    let encryption = WifiEncryption::from_u8(read_byte(storage, NS_WIFI, "enc").unwrap_or(0));
    let credentials = if encryption == WifiEncryption::Enterprise {
        WifiCredentials::Eap {
            identity: read_string(storage, NS_WIFI, "identity").unwrap_or_default(),
            username: read_string(storage, NS_WIFI, "username").unwrap_or_default(),
            password: read_string(storage, NS_WIFI, "eapPassword").unwrap_or_default(),
            phase2: EapPhase2::from_u8(read_byte(storage, NS_WIFI, "phase2").unwrap_or(0)),
        }
    } else {
        WifiCredentials::Simple {
            password: read_string(storage, NS_WIFI, "password").unwrap_or_default(),
        }
    };
    Some(WifiConnectionDetails {
        ssid,
        encryption,
        credentials,
    })
}

pub fn save_wifi_credentials(
    storage: &mut dyn StoragePort,
    details: &WifiConnectionDetails,
) -> Result<(), StorageError> {
    write_string(storage, NS_WIFI, "ssid", details.ssid.as_str())?;
    storage.write(NS_WIFI, "enc", &[details.encryption as u8])?;
    match &details.credentials {
        WifiCredentials::Simple { password } => {
            write_string(storage, NS_WIFI, "password", password.as_str())?;
            for key in ["identity", "username", "eapPassword", "phase2"] {
                storage.delete(NS_WIFI, key)?;
            }
        }
        WifiCredentials::Eap {
            identity,
            username,
            password,
            phase2,
        } => {
            write_string(storage, NS_WIFI, "identity", identity.as_str())?;
            write_string(storage, NS_WIFI, "username", username.as_str())?;
            write_string(storage, NS_WIFI, "eapPassword", password.as_str())?;
            storage.write(NS_WIFI, "phase2", &[*phase2 as u8])?;
            storage.delete(NS_WIFI, "password")?;
        }
    }
    Ok(())
}

pub fn clear_wifi_credentials(storage: &mut dyn StoragePort) -> Result<(), StorageError> {
    for key in ["ssid", "enc", "password", "identity", "username", "eapPassword", "phase2"] {
        storage.delete(NS_WIFI, key)?;
    }
    Ok(())
}

// ── ESP-NOW roster / controller MAC ──────────────────────────────

pub fn load_roster(
    storage: &dyn StoragePort,
) -> Option<heapless::Vec<EspNowDevice, MAX_REMOTE_DEVICES>> {
    let count = read_byte(storage, NS_ESPNOW, KEY_ROSTER_COUNT)? as usize;
    let count = count.min(MAX_REMOTE_DEVICES);
    let mut buf = [0u8; MAX_REMOTE_DEVICES * ROSTER_ENTRY_LEN];
    let len = storage.read(NS_ESPNOW, KEY_ROSTER_DATA, &mut buf).ok()?;
    if len < count * ROSTER_ENTRY_LEN {
        return None;
    }
    let mut devices = heapless::Vec::new();
    for i in 0..count {
        let entry = &buf[i * ROSTER_ENTRY_LEN..(i + 1) * ROSTER_ENTRY_LEN];
        let name_end = entry[..NAME_FIELD_LEN]
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(NAME_FIELD_LEN - 1);
        let name = core::str::from_utf8(&entry[..name_end]).ok()?;
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&entry[NAME_FIELD_LEN..]);
        let device = EspNowDevice {
            name: heapless::String::try_from(name).ok()?,
            mac,
        };
        devices.push(device).ok()?;
    }
    Some(devices)
}

pub fn save_roster(
    storage: &mut dyn StoragePort,
    devices: &heapless::Vec<EspNowDevice, MAX_REMOTE_DEVICES>,
) -> Result<(), StorageError> {
    let mut buf = [0u8; MAX_REMOTE_DEVICES * ROSTER_ENTRY_LEN];
    for (i, device) in devices.iter().enumerate() {
        let entry = &mut buf[i * ROSTER_ENTRY_LEN..(i + 1) * ROSTER_ENTRY_LEN];
        let name = device.name.as_bytes();
        entry[..name.len()].copy_from_slice(name);
        entry[NAME_FIELD_LEN..].copy_from_slice(&device.mac);
    }
    storage.write(NS_ESPNOW, KEY_ROSTER_COUNT, &[devices.len() as u8])?;
    storage.write(
        NS_ESPNOW,
        KEY_ROSTER_DATA,
        &buf[..devices.len() * ROSTER_ENTRY_LEN],
    )
}

pub fn load_controller_mac(storage: &dyn StoragePort) -> Option<[u8; 6]> {
    let mut buf = [0u8; 8];
    match storage.read(NS_ESPNOW, KEY_CONTROLLER_MAC, &mut buf) {
        // A blob of any other length is stale and ignored.
        Ok(6) => {
            let mut mac = [0u8; 6];
            mac.copy_from_slice(&buf[..6]);
            Some(mac)
        }
        _ => None,
    }
}

pub fn save_controller_mac(
    storage: &mut dyn StoragePort,
    mac: &[u8; 6],
) -> Result<(), StorageError> {
    storage.write(NS_ESPNOW, KEY_CONTROLLER_MAC, mac)
}

// ── Alexa settings ───────────────────────────────────────────────

const ALEXA_NAME_KEYS: [&str; 4] = ["r", "g", "b", "w"];

pub fn load_alexa_settings(storage: &dyn StoragePort) -> Option<AlexaSettings> {
    let mode = AlexaMode::from_u8(read_byte(storage, NS_ALEXA, "mode")?);
    let mut names: [crate::state::alexa::DeviceName; 4] = Default::default();
    for (i, key) in ALEXA_NAME_KEYS.iter().enumerate() {
        if let Some(name) = read_string(storage, NS_ALEXA, key) {
            names[i] = name;
        }
    }
    Some(AlexaSettings { mode, names })
}

pub fn save_alexa_settings(
    storage: &mut dyn StoragePort,
    settings: &AlexaSettings,
) -> Result<(), StorageError> {
    storage.write(NS_ALEXA, "mode", &[settings.mode as u8])?;
    for (i, key) in ALEXA_NAME_KEYS.iter().enumerate() {
        write_string(storage, NS_ALEXA, key, settings.names[i].as_str())?;
    }
    Ok(())
}

// ── factory reset ────────────────────────────────────────────────

/// Delete every persisted record. Missing keys are not an error; the first
/// real storage failure aborts the wipe.
pub fn wipe_all(storage: &mut dyn StoragePort) -> Result<(), StorageError> {
    clear_wifi_credentials(storage)?;
    for &pin in &crate::pins::OUTPUT_GPIOS {
        storage.delete(NS_LIGHT, &channel_key(pin as u8, 'o'))?;
        storage.delete(NS_LIGHT, &channel_key(pin as u8, 'v'))?;
    }
    for key in ALEXA_NAME_KEYS {
        storage.delete(NS_ALEXA, key)?;
    }
    for (namespace, key) in [
        (NS_DEVICE, KEY_DEVICE_NAME),
        (NS_HTTP, KEY_HTTP_USER),
        (NS_HTTP, KEY_HTTP_PASS),
        (NS_ESPNOW, KEY_ROSTER_COUNT),
        (NS_ESPNOW, KEY_ROSTER_DATA),
        (NS_ESPNOW, KEY_CONTROLLER_MAC),
        (NS_ALEXA, "mode"),
        (NS_SENSOR, KEY_CALIBRATION),
    ] {
        storage.delete(namespace, key)?;
    }
    Ok(())
}

// ── sensor calibration ───────────────────────────────────────────

pub fn load_calibration(storage: &dyn StoragePort) -> Option<f32> {
    let mut buf = [0u8; 8];
    let len = storage.read(NS_SENSOR, KEY_CALIBRATION, &mut buf).ok()?;
    let factor: f32 = postcard::from_bytes(&buf[..len]).ok()?;
    factor.is_finite().then_some(factor)
}

pub fn save_calibration(storage: &mut dyn StoragePort, factor: f32) -> Result<(), StorageError> {
    let mut buf = [0u8; 8];
    let encoded = postcard::to_slice(&factor, &mut buf).map_err(|_| StorageError::IoError)?;
    storage.write(NS_SENSOR, KEY_CALIBRATION, encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::nvs::NvsAdapter;

    #[test]
    fn channel_keys_are_zero_padded_per_pin() {
        assert_eq!(channel_key(4, 'o').as_str(), "04o");
        assert_eq!(channel_key(18, 'v').as_str(), "18v");
    }

    #[test]
    fn missing_channel_reads_as_none() {
        let nvs = NvsAdapter::new_sim();
        assert!(load_channel(&nvs, 4).is_none());
    }

    #[test]
    fn eap_credentials_round_trip() {
        let mut nvs = NvsAdapter::new_sim();
        let details = WifiConnectionDetails {
            ssid: heapless::String::try_from("corp").unwrap(),
            encryption: WifiEncryption::Enterprise,
            credentials: WifiCredentials::Eap {
                identity: heapless::String::try_from("id").unwrap(),
                username: heapless::String::try_from("user").unwrap(),
                password: heapless::String::try_from("pw").unwrap(),
                phase2: EapPhase2::Mschapv2,
            },
        };
        save_wifi_credentials(&mut nvs, &details).unwrap();
        assert_eq!(load_wifi_credentials(&nvs), Some(details));
    }

    #[test]
    fn switching_to_simple_clears_eap_keys() {
        let mut nvs = NvsAdapter::new_sim();
        let eap = WifiConnectionDetails {
            ssid: heapless::String::try_from("corp").unwrap(),
            encryption: WifiEncryption::Enterprise,
            credentials: WifiCredentials::Eap {
                identity: heapless::String::try_from("id").unwrap(),
                username: heapless::String::new(),
                password: heapless::String::new(),
                phase2: EapPhase2::Eap,
            },
        };
        save_wifi_credentials(&mut nvs, &eap).unwrap();

        let simple = WifiConnectionDetails {
            ssid: heapless::String::try_from("home").unwrap(),
            encryption: WifiEncryption::Wpa2Psk,
            credentials: WifiCredentials::Simple {
                password: heapless::String::try_from("pw").unwrap(),
            },
        };
        save_wifi_credentials(&mut nvs, &simple).unwrap();
        assert!(!nvs.exists("wifi-config", "identity"));
        assert_eq!(load_wifi_credentials(&nvs), Some(simple));
    }

    #[test]
    fn empty_ssid_reads_as_no_credentials() {
        let mut nvs = NvsAdapter::new_sim();
        nvs.write("wifi-config", "ssid", b"").unwrap();
        assert!(load_wifi_credentials(&nvs).is_none());
    }

    #[test]
    fn stale_controller_mac_length_is_ignored() {
        let mut nvs = NvsAdapter::new_sim();
        nvs.write("esp-now", "controller", &[1, 2, 3]).unwrap();
        assert!(load_controller_mac(&nvs).is_none());
    }

    #[test]
    fn calibration_rejects_garbage() {
        let mut nvs = NvsAdapter::new_sim();
        nvs.write("sensor", "f", &[0xFF]).unwrap();
        assert!(load_calibration(&nvs).is_none());
    }
}
