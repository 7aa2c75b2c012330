//! RGBW PWM adapter.
//!
//! Implements [`OutputPort`] over the four LEDC channels driving the light
//! strip. The duty written here is the raw 8-bit value the output manager
//! computed; color math never lives at this layer.

use crate::app::ports::OutputPort;
use crate::state::output::Channel;

// ── ESP-IDF backend ──────────────────────────────────────────────

/// LEDC-backed output (timer 0, channels 0-3, 25 kHz).
#[cfg(target_os = "espidf")]
pub struct LedcPwm;

#[cfg(target_os = "espidf")]
impl LedcPwm {
    /// Peripherals must already be configured via
    /// [`hw_init::init_peripherals`](crate::drivers::hw_init::init_peripherals).
    pub fn new() -> Self {
        Self
    }
}

#[cfg(target_os = "espidf")]
impl Default for LedcPwm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "espidf")]
impl OutputPort for LedcPwm {
    fn set_duty(&mut self, channel: Channel, duty: u8) {
        let ledc_channel = crate::pins::LEDC_CH_OUTPUT_R + channel.index() as u32;
        crate::drivers::hw_init::ledc_set(ledc_channel, duty);
    }
}

// ── simulation backend ───────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
mod sim {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records the last duty per channel.
    pub struct SimPwm {
        duties: Rc<RefCell<[u8; 4]>>,
    }

    impl SimPwm {
        pub fn new() -> Self {
            Self {
                duties: Rc::new(RefCell::new([0; 4])),
            }
        }

        pub fn handle(&self) -> SimPwmHandle {
            SimPwmHandle {
                duties: Rc::clone(&self.duties),
            }
        }
    }

    impl Default for SimPwm {
        fn default() -> Self {
            Self::new()
        }
    }

    impl OutputPort for SimPwm {
        fn set_duty(&mut self, channel: Channel, duty: u8) {
            self.duties.borrow_mut()[channel.index()] = duty;
        }
    }

    #[derive(Clone)]
    pub struct SimPwmHandle {
        duties: Rc<RefCell<[u8; 4]>>,
    }

    impl SimPwmHandle {
        pub fn duty(&self, channel: Channel) -> u8 {
            self.duties.borrow()[channel.index()]
        }
    }
}

#[cfg(not(target_os = "espidf"))]
pub use sim::{SimPwm, SimPwmHandle};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duties_land_on_the_right_channel() {
        let pwm = SimPwm::new();
        let handle = pwm.handle();
        let mut port: Box<dyn OutputPort> = Box::new(pwm);
        port.set_duty(Channel::Red, 200);
        port.set_duty(Channel::White, 10);
        assert_eq!(handle.duty(Channel::Red), 200);
        assert_eq!(handle.duty(Channel::White), 10);
        assert_eq!(handle.duty(Channel::Green), 0);
    }
}
