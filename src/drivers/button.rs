//! Debounced push-button driver.
//!
//! Active-low momentary switch, sampled from the tick loop (no interrupt
//! path). The caller reads the pin level each tick and feeds it in, which
//! keeps the state machine fully host-testable.
//!
//! | Gesture     | Condition                     |
//! |-------------|-------------------------------|
//! | Short press | Release after >= debounce     |
//! | Long press  | Held >= long-press threshold  |
//!
//! A long press fires while the button is still held; the following release
//! emits nothing.

pub const DEBOUNCE_MS: u32 = 50;
pub const LONG_PRESS_MS: u32 = 2500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    ShortPress,
    LongPress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PressState {
    Released,
    Debouncing { since_ms: u32 },
    Pressed { since_ms: u32, long_fired: bool },
}

pub struct Button {
    gpio: i32,
    debounce_ms: u32,
    long_press_ms: u32,
    state: PressState,
}

impl Button {
    pub fn new(gpio: i32) -> Self {
        Self {
            gpio,
            debounce_ms: DEBOUNCE_MS,
            long_press_ms: LONG_PRESS_MS,
            state: PressState::Released,
        }
    }

    /// Override the timing thresholds (from [`SystemConfig`]).
    ///
    /// [`SystemConfig`]: crate::config::SystemConfig
    pub fn set_timing(&mut self, debounce_ms: u32, long_press_ms: u32) {
        self.debounce_ms = debounce_ms;
        self.long_press_ms = long_press_ms;
    }

    pub fn gpio(&self) -> i32 {
        self.gpio
    }

    /// Sample the pin. Active-low: pressed while the level reads low.
    pub fn is_pressed(&self) -> bool {
        !crate::drivers::hw_init::gpio_read(self.gpio)
    }

    /// Advance the state machine one tick. `pressed` is the debouncer's
    /// input, usually [`is_pressed`](Self::is_pressed).
    pub fn tick(&mut self, now_ms: u32, pressed: bool) -> Option<ButtonEvent> {
        match self.state {
            PressState::Released => {
                if pressed {
                    self.state = PressState::Debouncing { since_ms: now_ms };
                }
                None
            }

            PressState::Debouncing { since_ms } => {
                if !pressed {
                    // Bounce shorter than the window.
                    self.state = PressState::Released;
                } else if now_ms.wrapping_sub(since_ms) >= self.debounce_ms {
                    self.state = PressState::Pressed {
                        since_ms,
                        long_fired: false,
                    };
                }
                None
            }

            PressState::Pressed {
                since_ms,
                long_fired,
            } => {
                if !pressed {
                    self.state = PressState::Released;
                    return if long_fired {
                        None
                    } else {
                        Some(ButtonEvent::ShortPress)
                    };
                }
                if !long_fired && now_ms.wrapping_sub(since_ms) >= self.long_press_ms {
                    self.state = PressState::Pressed {
                        since_ms,
                        long_fired: true,
                    };
                    return Some(ButtonEvent::LongPress);
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn button() -> Button {
        Button::new(crate::pins::BUTTON_GPIO)
    }

    #[test]
    fn bounce_shorter_than_the_window_is_ignored() {
        let mut btn = button();
        assert_eq!(btn.tick(0, true), None);
        assert_eq!(btn.tick(20, false), None); // released at 20ms, below 50ms
        assert_eq!(btn.tick(100, false), None);
    }

    #[test]
    fn short_press_fires_on_release() {
        let mut btn = button();
        btn.tick(0, true);
        btn.tick(60, true); // debounce cleared
        assert_eq!(btn.tick(200, false), Some(ButtonEvent::ShortPress));
    }

    #[test]
    fn long_press_fires_while_held_and_swallows_the_release() {
        let mut btn = button();
        btn.tick(0, true);
        btn.tick(60, true);
        assert_eq!(btn.tick(2499, true), None);
        assert_eq!(btn.tick(2500, true), Some(ButtonEvent::LongPress));
        assert_eq!(btn.tick(2600, true), None, "fires once per hold");
        assert_eq!(btn.tick(2700, false), None, "release after long is silent");
    }

    #[test]
    fn configured_thresholds_take_effect() {
        let mut btn = button();
        btn.set_timing(10, 500);
        btn.tick(0, true);
        btn.tick(10, true);
        assert_eq!(btn.tick(500, true), Some(ButtonEvent::LongPress));
    }

    #[test]
    fn timing_survives_clock_wraparound() {
        let mut btn = button();
        let start = u32::MAX - 20;
        btn.tick(start, true);
        btn.tick(start.wrapping_add(60), true);
        assert_eq!(
            btn.tick(start.wrapping_add(200), false),
            Some(ButtonEvent::ShortPress)
        );
    }
}
