//! Board status LED driver.
//!
//! One RGB pixel reflecting connectivity, updated last in the tick order so
//! it shows the state the rest of the tick produced. Highest-priority
//! condition wins:
//!
//! | Condition          | Pattern        |
//! |--------------------|----------------|
//! | OTA in progress    | blink purple   |
//! | BLE connected      | steady yellow  |
//! | BLE advertising    | blink blue     |
//! | Wi-Fi scan running | blink yellow   |
//! | Wi-Fi connected    | steady green   |
//! | otherwise          | steady red     |
//!
//! The LED is wired common-anode, so duties are written inverted.

use crate::state::wifi::{WifiScanStatus, WifiStatus};
use crate::transport::ble::BleStatus;

/// Peak component intensity. Full 8-bit duty is blinding on this pixel.
const MAX_LEVEL: u8 = 32;
/// Triangular fade: one step every 20 ms, MAX_LEVEL/FADE_STEP steps per ramp.
const FADE_INTERVAL_MS: u32 = 20;
const FADE_STEP: u8 = 4;

const PURPLE: [u8; 3] = [MAX_LEVEL, 0, MAX_LEVEL];
const YELLOW: [u8; 3] = [MAX_LEVEL, MAX_LEVEL, 0];
const BLUE: [u8; 3] = [0, 0, MAX_LEVEL];
const GREEN: [u8; 3] = [0, MAX_LEVEL, 0];
const RED: [u8; 3] = [MAX_LEVEL, 0, 0];

/// Connectivity inputs, gathered by the tick loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectivityView {
    pub ota_running: bool,
    pub ble_status: BleStatus,
    pub scan_status: WifiScanStatus,
    pub wifi_status: WifiStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pattern {
    Steady([u8; 3]),
    Blink([u8; 3]),
}

pub struct BoardLed {
    level: u8,
    rising: bool,
    last_fade_ms: u32,
    current: [u8; 3],
}

impl BoardLed {
    pub fn new() -> Self {
        Self {
            level: 0,
            rising: true,
            last_fade_ms: 0,
            current: [0; 3],
        }
    }

    /// Last color written, before polarity inversion. Test hook.
    pub fn current(&self) -> [u8; 3] {
        self.current
    }

    pub fn handle(&mut self, now_ms: u32, view: &ConnectivityView) {
        let color = match Self::pattern(view) {
            Pattern::Steady(color) => color,
            Pattern::Blink(color) => {
                self.advance_fade(now_ms);
                color.map(|c| (c as u16 * self.level as u16 / MAX_LEVEL as u16) as u8)
            }
        };
        if color != self.current {
            self.current = color;
            self.write(color);
        }
    }

    fn pattern(view: &ConnectivityView) -> Pattern {
        if view.ota_running {
            return Pattern::Blink(PURPLE);
        }
        match view.ble_status {
            BleStatus::Connected => return Pattern::Steady(YELLOW),
            BleStatus::Advertising => return Pattern::Blink(BLUE),
            BleStatus::Off => {}
        }
        if view.scan_status == WifiScanStatus::Running {
            return Pattern::Blink(YELLOW);
        }
        if matches!(view.wifi_status, WifiStatus::Connected) {
            return Pattern::Steady(GREEN);
        }
        Pattern::Steady(RED)
    }

    fn advance_fade(&mut self, now_ms: u32) {
        if now_ms.wrapping_sub(self.last_fade_ms) < FADE_INTERVAL_MS {
            return;
        }
        self.last_fade_ms = now_ms;
        if self.rising {
            self.level = self.level.saturating_add(FADE_STEP).min(MAX_LEVEL);
            if self.level == MAX_LEVEL {
                self.rising = false;
            }
        } else {
            self.level = self.level.saturating_sub(FADE_STEP);
            if self.level == 0 {
                self.rising = true;
            }
        }
    }

    fn write(&self, color: [u8; 3]) {
        for (i, &component) in color.iter().enumerate() {
            // Common anode: 255 = dark.
            crate::drivers::hw_init::ledc_set(
                crate::pins::LEDC_CH_BOARD_R + i as u32,
                255 - component,
            );
        }
    }
}

impl Default for BoardLed {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_shows_steady_red() {
        let mut led = BoardLed::new();
        led.handle(0, &ConnectivityView::default());
        assert_eq!(led.current(), RED);
    }

    #[test]
    fn ota_outranks_everything() {
        let mut led = BoardLed::new();
        let view = ConnectivityView {
            ota_running: true,
            ble_status: BleStatus::Connected,
            wifi_status: WifiStatus::Connected,
            ..Default::default()
        };
        // Walk the fade up; the color stays purple-proportioned.
        for t in 0..20 {
            led.handle(t * FADE_INTERVAL_MS, &view);
        }
        let [r, g, b] = led.current();
        assert_eq!(g, 0);
        assert_eq!(r, b, "purple keeps red == blue while fading");
    }

    #[test]
    fn ble_connected_outranks_wifi() {
        let mut led = BoardLed::new();
        let view = ConnectivityView {
            ble_status: BleStatus::Connected,
            wifi_status: WifiStatus::Connected,
            ..Default::default()
        };
        led.handle(0, &view);
        assert_eq!(led.current(), YELLOW);
    }

    #[test]
    fn advertising_blinks_blue() {
        let mut led = BoardLed::new();
        let view = ConnectivityView {
            ble_status: BleStatus::Advertising,
            ..Default::default()
        };
        led.handle(FADE_INTERVAL_MS, &view);
        assert_eq!(led.current(), [0, 0, FADE_STEP], "one fade step in");
        // Eight intervals in, the ramp has peaked.
        for t in 2..=8 {
            led.handle(t * FADE_INTERVAL_MS, &view);
        }
        assert_eq!(led.current(), BLUE);
    }

    #[test]
    fn fade_ramps_down_after_the_peak() {
        let mut led = BoardLed::new();
        let view = ConnectivityView {
            ble_status: BleStatus::Advertising,
            ..Default::default()
        };
        let mut peaked = false;
        let mut saw_dark_after_peak = false;
        for t in 1..=40 {
            led.handle(t * FADE_INTERVAL_MS, &view);
            if led.current() == BLUE {
                peaked = true;
            }
            if peaked && led.current() == [0, 0, 0] {
                saw_dark_after_peak = true;
            }
        }
        assert!(peaked && saw_dark_after_peak);
    }
}
