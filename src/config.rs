//! System configuration parameters
//!
//! Loop timing and input tuning for the light controller. Values can be
//! overridden via NVS; everything else in the firmware runs off compile-time
//! constants in its own module.

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Timing ---
    /// Main loop tick interval (milliseconds)
    pub tick_interval_ms: u32,
    /// Debounce before an unsaved light state is written to NVS (milliseconds)
    pub output_persist_debounce_ms: u32,

    // --- Button ---
    /// Button debounce window (milliseconds)
    pub button_debounce_ms: u32,
    /// Hold duration that counts as a long press (milliseconds)
    pub button_long_press_ms: u32,

    // --- BLE ---
    /// Advertising window before an unconnected BLE stack powers off
    /// (milliseconds)
    pub ble_advertising_timeout_ms: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 10,
            output_persist_debounce_ms: crate::state::output::PERSIST_DEBOUNCE_MS,
            button_debounce_ms: crate::drivers::button::DEBOUNCE_MS,
            button_long_press_ms: crate::drivers::button::LONG_PRESS_MS,
            ble_advertising_timeout_ms: crate::transport::ble::ADVERTISING_TIMEOUT_MS,
        }
    }
}

impl SystemConfig {
    /// Range-check every field. Called before persisting and after loading.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.tick_interval_ms) {
            return Err(ConfigError::ValidationFailed(
                "tick_interval_ms must be 1–100",
            ));
        }
        if !(50..=10_000).contains(&self.output_persist_debounce_ms) {
            return Err(ConfigError::ValidationFailed(
                "output_persist_debounce_ms must be 50–10000",
            ));
        }
        if !(10..=500).contains(&self.button_debounce_ms) {
            return Err(ConfigError::ValidationFailed(
                "button_debounce_ms must be 10–500",
            ));
        }
        if !(500..=10_000).contains(&self.button_long_press_ms) {
            return Err(ConfigError::ValidationFailed(
                "button_long_press_ms must be 500–10000",
            ));
        }
        if self.button_long_press_ms <= self.button_debounce_ms {
            return Err(ConfigError::ValidationFailed(
                "button_long_press_ms must exceed button_debounce_ms",
            ));
        }
        if !(1_000..=300_000).contains(&self.ble_advertising_timeout_ms) {
            return Err(ConfigError::ValidationFailed(
                "ble_advertising_timeout_ms must be 1000–300000",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_passes_validation() {
        assert!(SystemConfig::default().validate().is_ok());
    }

    #[test]
    fn long_press_must_exceed_debounce() {
        let c = SystemConfig {
            button_debounce_ms: 500,
            button_long_press_ms: 500,
            ..Default::default()
        };
        assert!(matches!(
            c.validate(),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn rejects_tick_interval_out_of_range() {
        let c = SystemConfig {
            tick_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            c.validate(),
            Err(ConfigError::ValidationFailed(_))
        ));
        let c = SystemConfig {
            tick_interval_ms: 101,
            ..Default::default()
        };
        assert!(matches!(
            c.validate(),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn serde_roundtrip() {
        let c = SystemConfig::default();
        let json = serde_json::to_string(&c).unwrap();
        let c2: SystemConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(c, c2);
    }

    #[test]
    fn postcard_roundtrip() {
        let c = SystemConfig::default();
        let bytes = postcard::to_allocvec(&c).unwrap();
        let c2: SystemConfig = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(c, c2);
    }
}
