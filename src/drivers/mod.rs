//! Input drivers, hardware initialisation, and the status pixel.

pub mod board_led;
pub mod button;
pub mod encoder;
pub mod hw_init;
