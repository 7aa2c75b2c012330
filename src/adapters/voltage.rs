//! Supply-voltage sense adapter.
//!
//! Implements [`VoltagePort`] — the raw millivolt reading at the ADC pin.
//! Scaling through the persisted divider calibration factor happens in the
//! device manager, not here.

use crate::state::device::VoltagePort;

/// Full-scale input at 12 dB attenuation, 12-bit conversion.
#[allow(dead_code)]
const ADC_FULL_SCALE_MV: u32 = 3_100;
#[allow(dead_code)]
const ADC_MAX_RAW: u32 = 4_095;

// ── ESP-IDF backend ──────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub struct AdcVoltageSense;

#[cfg(target_os = "espidf")]
impl AdcVoltageSense {
    /// Peripherals must already be configured via
    /// [`hw_init::init_peripherals`](crate::drivers::hw_init::init_peripherals).
    pub fn new() -> Self {
        Self
    }
}

#[cfg(target_os = "espidf")]
impl Default for AdcVoltageSense {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "espidf")]
impl VoltagePort for AdcVoltageSense {
    fn read_millivolts(&mut self) -> u32 {
        let raw = crate::drivers::hw_init::adc1_read(crate::pins::VOLTAGE_ADC_CHANNEL) as u32;
        raw * ADC_FULL_SCALE_MV / ADC_MAX_RAW
    }
}

// ── simulation backend ───────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
mod sim {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    pub struct SimVoltageSense {
        milli_volts: Rc<RefCell<u32>>,
    }

    impl SimVoltageSense {
        pub fn new(milli_volts: u32) -> Self {
            Self {
                milli_volts: Rc::new(RefCell::new(milli_volts)),
            }
        }

        pub fn handle(&self) -> SimVoltageHandle {
            SimVoltageHandle {
                milli_volts: Rc::clone(&self.milli_volts),
            }
        }
    }

    impl VoltagePort for SimVoltageSense {
        fn read_millivolts(&mut self) -> u32 {
            *self.milli_volts.borrow()
        }
    }

    #[derive(Clone)]
    pub struct SimVoltageHandle {
        milli_volts: Rc<RefCell<u32>>,
    }

    impl SimVoltageHandle {
        pub fn set_millivolts(&self, milli_volts: u32) {
            *self.milli_volts.borrow_mut() = milli_volts;
        }
    }
}

#[cfg(not(target_os = "espidf"))]
pub use sim::{SimVoltageHandle, SimVoltageSense};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_reading_tracks_the_handle() {
        let mut sense = SimVoltageSense::new(250);
        let handle = sense.handle();
        assert_eq!(sense.read_millivolts(), 250);
        handle.set_millivolts(300);
        assert_eq!(sense.read_millivolts(), 300);
    }
}
