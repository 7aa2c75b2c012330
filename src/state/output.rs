//! RGBW output state owner.
//!
//! Four channels, each `{on, value}`. The manager is the single writer of
//! output state: transports and drivers funnel every mutation through it, it
//! pushes duty cycles to the PWM port immediately and persists changed
//! channels after a quiet period so an encoder sweep costs one flash write.

use crate::app::ports::{OutputPort, StoragePort};
use crate::persist;

/// Full brightness.
pub const ON_VALUE: u8 = 255;
/// Brightness of a switched-off channel.
pub const OFF_VALUE: u8 = 0;
/// Lowest brightness a step can reach without turning the channel off.
pub const MIN_BRIGHTNESS: u8 = 1;

/// Quiet period before a changed channel is written to flash.
pub const PERSIST_DEBOUNCE_MS: u32 = 500;

const GAMMA: f32 = 2.2;
const BRIGHTNESS_STEP: f32 = 0.05;

// ── channel identity ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Channel {
    Red = 0,
    Green = 1,
    Blue = 2,
    White = 3,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Self::Red, Self::Green, Self::Blue, Self::White];

    pub const fn index(self) -> usize {
        self as usize
    }
}

// ── channel and aggregate state ──────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelState {
    pub on: bool,
    pub value: u8,
}

impl ChannelState {
    pub const fn new(on: bool, value: u8) -> Self {
        Self { on, value }
    }

    /// A channel contributes light only when switched on with nonzero value.
    pub const fn is_visible(&self) -> bool {
        self.on && self.value > OFF_VALUE
    }

    /// Duty actually driven onto the pin.
    pub const fn duty(&self) -> u8 {
        if self.on { self.value } else { OFF_VALUE }
    }
}

/// Snapshot of all four channels, in R/G/B/W order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputState {
    pub channels: [ChannelState; 4],
}

impl OutputState {
    pub fn any_on(&self) -> bool {
        self.channels.iter().any(|c| c.on)
    }

    pub fn any_visible(&self) -> bool {
        self.channels.iter().any(ChannelState::is_visible)
    }
}

/// One brightness step on the perceptual (gamma 2.2) curve.
///
/// Steps are uniform in perceived brightness, so low values move by one or
/// two counts while high values move by tens.
fn perceptual_step(value: u8, up: bool) -> u8 {
    let linear = (f32::from(value) / 255.0).powf(1.0 / GAMMA);
    let stepped = if up {
        (linear + BRIGHTNESS_STEP).min(1.0)
    } else {
        (linear - BRIGHTNESS_STEP).max(0.0)
    };
    let next = (stepped.powf(GAMMA) * 255.0).round() as u8;
    next.clamp(MIN_BRIGHTNESS, ON_VALUE)
}

// ── per-channel bookkeeping ──────────────────────────────────────

struct Light {
    pin: u8,
    state: ChannelState,
    /// Tick timestamp of the last unpersisted change.
    dirty_since_ms: Option<u32>,
}

impl Light {
    fn set_state(&mut self, state: ChannelState, now_ms: u32) -> bool {
        if self.state == state {
            return false;
        }
        self.state = state;
        self.dirty_since_ms = Some(now_ms);
        true
    }

    fn make_visible(&mut self, now_ms: u32) -> bool {
        let mut next = self.state;
        next.on = true;
        if next.value == OFF_VALUE {
            next.value = ON_VALUE;
        }
        self.set_state(next, now_ms)
    }
}

// ── manager ──────────────────────────────────────────────────────

/// Owner of the four RGBW channels.
pub struct OutputManager {
    lights: [Light; 4],
    port: Box<dyn OutputPort>,
    persist_debounce_ms: u32,
}

impl OutputManager {
    pub fn new(port: Box<dyn OutputPort>, pins: [u8; 4]) -> Self {
        let lights = pins.map(|pin| Light {
            pin,
            state: ChannelState::default(),
            dirty_since_ms: None,
        });
        Self {
            lights,
            port,
            persist_debounce_ms: PERSIST_DEBOUNCE_MS,
        }
    }

    /// Override the persistence debounce (from [`SystemConfig`]).
    ///
    /// [`SystemConfig`]: crate::config::SystemConfig
    pub fn set_persist_debounce(&mut self, debounce_ms: u32) {
        self.persist_debounce_ms = debounce_ms;
    }

    /// Restore persisted channel states and drive the pins accordingly.
    pub fn restore(&mut self, storage: &dyn StoragePort) {
        for (i, light) in self.lights.iter_mut().enumerate() {
            if let Some(state) = persist::load_channel(storage, light.pin) {
                light.state = state;
                light.dirty_since_ms = None;
            }
            let duty = light.state.duty();
            self.port.set_duty(Channel::ALL[i], duty);
        }
    }

    pub fn state(&self) -> OutputState {
        OutputState {
            channels: [
                self.lights[0].state,
                self.lights[1].state,
                self.lights[2].state,
                self.lights[3].state,
            ],
        }
    }

    pub fn channel(&self, channel: Channel) -> ChannelState {
        self.lights[channel.index()].state
    }

    pub fn any_on(&self) -> bool {
        self.lights.iter().any(|l| l.state.on)
    }

    pub fn any_visible(&self) -> bool {
        self.lights.iter().any(|l| l.state.is_visible())
    }

    pub fn set_channel(&mut self, channel: Channel, state: ChannelState, now_ms: u32) {
        if self.lights[channel.index()].set_state(state, now_ms) {
            self.apply(channel);
        }
    }

    /// Apply a full four-channel snapshot (wire color message, REST body).
    pub fn set_all(&mut self, state: OutputState, now_ms: u32) {
        for (i, channel) in Channel::ALL.iter().enumerate() {
            self.set_channel(*channel, state.channels[i], now_ms);
        }
    }

    /// Toggle one channel between visible and off.
    pub fn toggle(&mut self, channel: Channel, now_ms: u32) {
        let light = &mut self.lights[channel.index()];
        if light.state.is_visible() {
            let mut next = light.state;
            next.on = false;
            light.set_state(next, now_ms);
        } else {
            light.make_visible(now_ms);
        }
        self.apply(channel);
    }

    /// All-channel toggle: anything visible turns everything off, otherwise
    /// everything comes up at full brightness.
    pub fn toggle_all(&mut self, now_ms: u32) {
        if self.any_visible() {
            self.turn_off_all(now_ms);
        } else {
            for channel in Channel::ALL {
                self.set_channel(channel, ChannelState::new(true, ON_VALUE), now_ms);
            }
        }
    }

    pub fn turn_on_all(&mut self, now_ms: u32) {
        for (i, channel) in Channel::ALL.iter().enumerate() {
            if self.lights[i].make_visible(now_ms) {
                self.apply(*channel);
            }
        }
    }

    pub fn turn_off_all(&mut self, now_ms: u32) {
        for channel in Channel::ALL {
            let mut next = self.channel(channel);
            next.on = false;
            self.set_channel(channel, next, now_ms);
        }
    }

    /// Step every lit channel up one perceptual notch. When nothing is on,
    /// all channels are switched on at zero first so the step starts from
    /// darkness instead of jumping to full.
    pub fn increase_brightness(&mut self, now_ms: u32) {
        if !self.any_on() {
            for channel in Channel::ALL {
                self.set_channel(channel, ChannelState::new(true, OFF_VALUE), now_ms);
            }
        }
        for channel in Channel::ALL {
            let state = self.channel(channel);
            if !state.on || state.value == ON_VALUE {
                continue;
            }
            let next = ChannelState::new(true, perceptual_step(state.value, true));
            self.set_channel(channel, next, now_ms);
        }
    }

    /// Step every lit channel down one perceptual notch; stops at the
    /// minimum instead of turning the channel off.
    pub fn decrease_brightness(&mut self, now_ms: u32) {
        for channel in Channel::ALL {
            let state = self.channel(channel);
            if !state.on || state.value <= MIN_BRIGHTNESS {
                continue;
            }
            let next = ChannelState::new(true, perceptual_step(state.value, false));
            self.set_channel(channel, next, now_ms);
        }
    }

    /// Debounced persistence: a channel is written once it has been stable
    /// for [`PERSIST_DEBOUNCE_MS`].
    pub fn handle(&mut self, now_ms: u32, storage: &mut dyn StoragePort) {
        for light in &mut self.lights {
            let Some(since) = light.dirty_since_ms else {
                continue;
            };
            if now_ms.wrapping_sub(since) < self.persist_debounce_ms {
                continue;
            }
            if let Err(e) = persist::save_channel(storage, light.pin, light.state) {
                log::warn!("output: persist pin {} failed: {e}", light.pin);
            }
            light.dirty_since_ms = None;
        }
    }

    fn apply(&mut self, channel: Channel) {
        let duty = self.lights[channel.index()].state.duty();
        self.port.set_duty(channel, duty);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::rgbw_pwm::SimPwm;
    use crate::adapters::nvs::NvsAdapter;

    fn manager() -> OutputManager {
        OutputManager::new(Box::new(SimPwm::new()), [4, 5, 6, 7])
    }

    #[test]
    fn toggle_all_from_dark_goes_full() {
        let mut m = manager();
        m.toggle_all(0);
        for ch in Channel::ALL {
            assert_eq!(m.channel(ch), ChannelState::new(true, ON_VALUE));
        }
        m.toggle_all(1);
        assert!(!m.any_visible());
    }

    #[test]
    fn toggle_all_turns_off_when_any_channel_visible() {
        let mut m = manager();
        m.set_channel(Channel::Red, ChannelState::new(true, 10), 0);
        m.toggle_all(1);
        assert!(!m.any_visible(), "one visible channel flips toggle to OFF");
    }

    #[test]
    fn toggle_channel_revives_zero_value_at_full() {
        let mut m = manager();
        m.set_channel(Channel::Blue, ChannelState::new(false, 0), 0);
        m.toggle(Channel::Blue, 1);
        assert_eq!(m.channel(Channel::Blue), ChannelState::new(true, ON_VALUE));
    }

    #[test]
    fn increase_from_dark_starts_at_zero_not_full() {
        let mut m = manager();
        m.increase_brightness(0);
        for ch in Channel::ALL {
            let s = m.channel(ch);
            assert!(s.on);
            assert!(s.value >= MIN_BRIGHTNESS && s.value < 64, "got {}", s.value);
        }
    }

    #[test]
    fn increase_saturates_at_full() {
        let mut m = manager();
        m.set_all(
            OutputState {
                channels: [ChannelState::new(true, ON_VALUE); 4],
            },
            0,
        );
        m.increase_brightness(1);
        assert_eq!(m.channel(Channel::Red).value, ON_VALUE);
    }

    #[test]
    fn decrease_stops_at_minimum_and_never_turns_off() {
        let mut m = manager();
        m.set_channel(Channel::White, ChannelState::new(true, MIN_BRIGHTNESS), 0);
        m.decrease_brightness(1);
        let s = m.channel(Channel::White);
        assert!(s.on);
        assert_eq!(s.value, MIN_BRIGHTNESS);
    }

    #[test]
    fn decrease_ignores_off_channels() {
        let mut m = manager();
        m.set_channel(Channel::Red, ChannelState::new(false, 200), 0);
        m.decrease_brightness(1);
        assert_eq!(m.channel(Channel::Red).value, 200);
    }

    #[test]
    fn brightness_steps_are_monotonic() {
        let mut v = 10u8;
        for _ in 0..64 {
            let next = perceptual_step(v, true);
            assert!(next >= v);
            v = next;
        }
        assert_eq!(v, ON_VALUE);
    }

    #[test]
    fn persistence_waits_for_debounce() {
        let mut m = manager();
        let mut nvs = NvsAdapter::new_sim();
        m.set_channel(Channel::Red, ChannelState::new(true, 42), 1000);

        m.handle(1400, &mut nvs);
        assert!(persist::load_channel(&nvs, 4).is_none(), "written too early");

        m.handle(1500, &mut nvs);
        assert_eq!(
            persist::load_channel(&nvs, 4),
            Some(ChannelState::new(true, 42))
        );
    }

    #[test]
    fn restore_reapplies_persisted_state() {
        let mut nvs = NvsAdapter::new_sim();
        {
            let mut m = manager();
            m.set_channel(Channel::Green, ChannelState::new(true, 99), 0);
            m.handle(PERSIST_DEBOUNCE_MS, &mut nvs);
        }
        let mut m = manager();
        m.restore(&nvs);
        assert_eq!(m.channel(Channel::Green), ChannelState::new(true, 99));
    }
}
