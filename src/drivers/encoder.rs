//! Rotary encoder driver.
//!
//! Quadrature decode sampled from the tick loop. A detent is four valid
//! Gray-code transitions; invalid transitions (skipped states from slow
//! sampling) reset the accumulator instead of guessing a direction.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderStep {
    Left,
    Right,
}

/// Per-transition direction, indexed by `prev << 2 | current` (each state
/// is the 2-bit `A << 1 | B` pin pattern).
const TRANSITIONS: [i8; 16] = [0, -1, 1, 0, 1, 0, 0, -1, -1, 0, 0, 1, 0, 1, -1, 0];

const STEPS_PER_DETENT: i8 = 4;

pub struct Encoder {
    prev: u8,
    accum: i8,
}

impl Encoder {
    pub fn new() -> Self {
        Self {
            // Idle detent position: both lines pulled high.
            prev: 0b11,
            accum: 0,
        }
    }

    /// Sample the pins. Pull-ups make the idle level high on both lines.
    pub fn read_pins(&self) -> (bool, bool) {
        (
            crate::drivers::hw_init::gpio_read(crate::pins::ENCODER_A_GPIO),
            crate::drivers::hw_init::gpio_read(crate::pins::ENCODER_B_GPIO),
        )
    }

    /// Feed one sample; returns a step when a full detent has accumulated.
    pub fn update(&mut self, a: bool, b: bool) -> Option<EncoderStep> {
        let current = (a as u8) << 1 | b as u8;
        if current == self.prev {
            return None;
        }
        let direction = TRANSITIONS[(self.prev << 2 | current) as usize];
        self.prev = current;
        if direction == 0 {
            // Skipped a state; the count is no longer trustworthy.
            self.accum = 0;
            return None;
        }
        self.accum += direction;
        if self.accum >= STEPS_PER_DETENT {
            self.accum = 0;
            Some(EncoderStep::Right)
        } else if self.accum <= -STEPS_PER_DETENT {
            self.accum = 0;
            Some(EncoderStep::Left)
        } else {
            None
        }
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}
