//! Alexa virtual-device mapping.
//!
//! Settings select how the four physical channels appear to Alexa: hidden,
//! one RGBW device, an RGB device plus a standalone white, or four
//! independent dimmable devices. Settings changes persist immediately (no
//! debounce) and rebuild the device set; output state is polled on a fixed
//! interval and pushed into the virtual devices when it changed.
//!
//! Color-space conversions live in the UPnP-facing collaborator, not here;
//! this module deals in on/brightness only.

use crate::app::ports::StoragePort;
use crate::persist;
use crate::state::output::{Channel, ChannelState, OutputManager, OutputState};

/// How often the output state is mirrored into the virtual devices.
pub const OUTPUT_POLL_INTERVAL_MS: u32 = 500;

pub const MAX_DEVICE_NAME_LEN: usize = 31;
pub type DeviceName = heapless::String<MAX_DEVICE_NAME_LEN>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum AlexaMode {
    #[default]
    Off = 0,
    RgbwDevice = 1,
    RgbDevice = 2,
    MultiDevice = 3,
}

impl AlexaMode {
    /// Out-of-range values fall back to `Off` rather than failing.
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::RgbwDevice,
            2 => Self::RgbDevice,
            3 => Self::MultiDevice,
            _ => Self::Off,
        }
    }
}

/// Mode plus the four device names (R, G, B, W order).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AlexaSettings {
    pub mode: AlexaMode,
    pub names: [DeviceName; 4],
}

/// One device as Alexa sees it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VirtualDevice {
    pub name: DeviceName,
    pub on: bool,
    pub brightness: u8,
}

/// The active device set, shaped by the mode.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ModeDevices {
    #[default]
    Off,
    Rgbw(VirtualDevice),
    Rgb {
        color: VirtualDevice,
        /// Present only when a white-channel name is configured.
        white: Option<VirtualDevice>,
    },
    Multi([VirtualDevice; 4]),
}

/// Alexa brightness writes skip a value: 128..=254 map one higher so 254
/// reaches full scale.
pub fn map_alexa_brightness(brightness: u8) -> u8 {
    if brightness < 128 {
        brightness
    } else {
        brightness.saturating_add(1)
    }
}

pub struct AlexaIntegration {
    settings: AlexaSettings,
    devices: ModeDevices,
    last_poll_ms: u32,
    last_output: OutputState,
}

impl AlexaIntegration {
    pub fn new() -> Self {
        Self {
            settings: AlexaSettings::default(),
            devices: ModeDevices::Off,
            last_poll_ms: 0,
            last_output: OutputState::default(),
        }
    }

    pub fn settings(&self) -> &AlexaSettings {
        &self.settings
    }

    pub fn devices(&self) -> &ModeDevices {
        &self.devices
    }

    pub fn restore(&mut self, storage: &dyn StoragePort, output: &OutputManager) {
        if let Some(settings) = persist::load_alexa_settings(storage) {
            self.settings = settings;
        }
        self.rebuild(output.state());
    }

    /// Store, persist immediately and rebuild the device set.
    pub fn apply_settings(
        &mut self,
        settings: AlexaSettings,
        storage: &mut dyn StoragePort,
        output: &OutputManager,
    ) {
        self.settings = settings;
        if let Err(e) = persist::save_alexa_settings(storage, &self.settings) {
            log::warn!("alexa: persisting settings failed: {e}");
        }
        self.rebuild(output.state());
        log::info!("alexa: settings applied, mode {:?}", self.settings.mode);
    }

    /// Tick: mirror the output into the virtual devices when it changed.
    pub fn handle(&mut self, now_ms: u32, output: &OutputManager) {
        if now_ms.wrapping_sub(self.last_poll_ms) < OUTPUT_POLL_INTERVAL_MS {
            return;
        }
        self.last_poll_ms = now_ms;
        let state = output.state();
        if state != self.last_output {
            self.rebuild(state);
        }
    }

    /// A command arrived for device `index` within the current mode.
    pub fn apply_device_command(
        &mut self,
        index: usize,
        on: bool,
        brightness: u8,
        output: &mut OutputManager,
        now_ms: u32,
    ) {
        let value = map_alexa_brightness(brightness);
        match self.settings.mode {
            AlexaMode::Off => {}
            AlexaMode::RgbwDevice => {
                if on {
                    for channel in Channel::ALL {
                        output.set_channel(channel, ChannelState::new(true, value), now_ms);
                    }
                } else {
                    output.turn_off_all(now_ms);
                }
            }
            AlexaMode::RgbDevice => match index {
                0 => {
                    for channel in [Channel::Red, Channel::Green, Channel::Blue] {
                        output.set_channel(channel, ChannelState::new(on, value), now_ms);
                    }
                }
                1 => output.set_channel(Channel::White, ChannelState::new(on, value), now_ms),
                _ => {}
            },
            AlexaMode::MultiDevice => {
                if index < 4 {
                    output.set_channel(Channel::ALL[index], ChannelState::new(on, value), now_ms);
                }
            }
        }
        self.rebuild(output.state());
    }

    fn rebuild(&mut self, state: OutputState) {
        self.last_output = state;
        let names = &self.settings.names;
        self.devices = match self.settings.mode {
            AlexaMode::Off => ModeDevices::Off,
            AlexaMode::RgbwDevice => ModeDevices::Rgbw(VirtualDevice {
                name: names[0].clone(),
                on: state.any_visible(),
                brightness: max_value(&state.channels),
            }),
            AlexaMode::RgbDevice => {
                let rgb = &state.channels[..3];
                let white = state.channels[3];
                ModeDevices::Rgb {
                    color: VirtualDevice {
                        name: names[0].clone(),
                        on: rgb.iter().any(ChannelState::is_visible),
                        brightness: max_value(rgb),
                    },
                    white: (!names[3].is_empty()).then(|| VirtualDevice {
                        name: names[3].clone(),
                        on: white.is_visible(),
                        brightness: white.value,
                    }),
                }
            }
            AlexaMode::MultiDevice => {
                let mut devices: [VirtualDevice; 4] = Default::default();
                for (i, device) in devices.iter_mut().enumerate() {
                    device.name = names[i].clone();
                    device.on = state.channels[i].is_visible();
                    device.brightness = state.channels[i].value;
                }
                ModeDevices::Multi(devices)
            }
        };
    }
}

fn max_value(channels: &[ChannelState]) -> u8 {
    channels
        .iter()
        .filter(|c| c.on)
        .map(|c| c.value)
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::nvs::NvsAdapter;
    use crate::adapters::rgbw_pwm::SimPwm;

    fn output() -> OutputManager {
        OutputManager::new(Box::new(SimPwm::new()), [4, 5, 6, 7])
    }

    fn settings(mode: AlexaMode) -> AlexaSettings {
        AlexaSettings {
            mode,
            names: [
                heapless::String::try_from("red").unwrap(),
                heapless::String::try_from("green").unwrap(),
                heapless::String::try_from("blue").unwrap(),
                heapless::String::try_from("white").unwrap(),
            ],
        }
    }

    #[test]
    fn mode_from_u8_falls_back_to_off() {
        assert_eq!(AlexaMode::from_u8(2), AlexaMode::RgbDevice);
        assert_eq!(AlexaMode::from_u8(200), AlexaMode::Off);
    }

    #[test]
    fn brightness_mapping_skips_midpoint() {
        assert_eq!(map_alexa_brightness(127), 127);
        assert_eq!(map_alexa_brightness(128), 129);
        assert_eq!(map_alexa_brightness(254), 255);
    }

    #[test]
    fn settings_persist_immediately() {
        let out = output();
        let mut nvs = NvsAdapter::new_sim();
        let mut alexa = AlexaIntegration::new();
        alexa.apply_settings(settings(AlexaMode::MultiDevice), &mut nvs, &out);
        assert_eq!(
            persist::load_alexa_settings(&nvs),
            Some(settings(AlexaMode::MultiDevice))
        );
    }

    #[test]
    fn output_poll_is_interval_gated() {
        let mut out = output();
        let mut alexa = AlexaIntegration::new();
        let mut nvs = NvsAdapter::new_sim();
        alexa.apply_settings(settings(AlexaMode::MultiDevice), &mut nvs, &out);

        out.set_channel(Channel::Red, ChannelState::new(true, 200), 0);
        alexa.handle(OUTPUT_POLL_INTERVAL_MS - 1, &out);
        let ModeDevices::Multi(devices) = alexa.devices() else {
            panic!("expected multi mode");
        };
        assert!(!devices[0].on, "updated before the poll interval");

        alexa.handle(OUTPUT_POLL_INTERVAL_MS, &out);
        let ModeDevices::Multi(devices) = alexa.devices() else {
            panic!("expected multi mode");
        };
        assert!(devices[0].on);
        assert_eq!(devices[0].brightness, 200);
    }

    #[test]
    fn rgb_mode_omits_white_without_a_name() {
        let out = output();
        let mut nvs = NvsAdapter::new_sim();
        let mut alexa = AlexaIntegration::new();
        let mut s = settings(AlexaMode::RgbDevice);
        s.names[3] = heapless::String::new();
        alexa.apply_settings(s, &mut nvs, &out);
        let ModeDevices::Rgb { white, .. } = alexa.devices() else {
            panic!("expected rgb mode");
        };
        assert!(white.is_none());
    }

    #[test]
    fn multi_device_command_drives_one_channel() {
        let mut out = output();
        let mut nvs = NvsAdapter::new_sim();
        let mut alexa = AlexaIntegration::new();
        alexa.apply_settings(settings(AlexaMode::MultiDevice), &mut nvs, &out);

        alexa.apply_device_command(2, true, 200, &mut out, 0);
        assert_eq!(out.channel(Channel::Blue), ChannelState::new(true, 201));
        assert_eq!(out.channel(Channel::Red), ChannelState::default());
    }

    #[test]
    fn rgbw_off_command_turns_everything_off() {
        let mut out = output();
        out.toggle_all(0);
        let mut nvs = NvsAdapter::new_sim();
        let mut alexa = AlexaIntegration::new();
        alexa.apply_settings(settings(AlexaMode::RgbwDevice), &mut nvs, &out);

        alexa.apply_device_command(0, false, 0, &mut out, 1);
        assert!(!out.any_visible());
    }
}
