//! GPIO / peripheral pin assignments.
//!
//! Single source of truth — every driver references this module rather than
//! hard-coding pin numbers. The controller and the remote share a board
//! family; remote-only assignments live in their own section.

// ---------------------------------------------------------------------------
// RGBW output (LEDC PWM, one channel per colour)
// ---------------------------------------------------------------------------

pub const OUTPUT_R_GPIO: i32 = 13;
pub const OUTPUT_G_GPIO: i32 = 16;
pub const OUTPUT_B_GPIO: i32 = 19;
pub const OUTPUT_W_GPIO: i32 = 18;

/// Ordered as [`Channel::ALL`](crate::state::output::Channel::ALL).
pub const OUTPUT_GPIOS: [i32; 4] = [OUTPUT_R_GPIO, OUTPUT_G_GPIO, OUTPUT_B_GPIO, OUTPUT_W_GPIO];

// ---------------------------------------------------------------------------
// Board status LED (discrete RGB, inverted polarity)
// ---------------------------------------------------------------------------

pub const BOARD_LED_R_GPIO: i32 = 21;
pub const BOARD_LED_G_GPIO: i32 = 17;
pub const BOARD_LED_B_GPIO: i32 = 4;

// ---------------------------------------------------------------------------
// User input
// ---------------------------------------------------------------------------

/// Momentary push-button, active-low with pull-up (BOOT button).
pub const BUTTON_GPIO: i32 = 0;

/// Rotary encoder quadrature inputs + push switch (header H1).
pub const ENCODER_A_GPIO: i32 = 27;
pub const ENCODER_B_GPIO: i32 = 26;
pub const ENCODER_SW_GPIO: i32 = 33;

// ---------------------------------------------------------------------------
// Supply-voltage sense (resistive divider into ADC1)
// ---------------------------------------------------------------------------

pub const VOLTAGE_ADC_GPIO: i32 = 34;
/// ADC1 channel corresponding to [`VOLTAGE_ADC_GPIO`].
pub const VOLTAGE_ADC_CHANNEL: u32 = 6;

// ---------------------------------------------------------------------------
// PWM configuration
// ---------------------------------------------------------------------------

/// LEDC timer resolution (bits). 8-bit gives 0 – 255 duty levels.
pub const PWM_RESOLUTION_BITS: u32 = 8;
/// LEDC base frequency for the RGBW output (25 kHz — flicker-free).
pub const OUTPUT_PWM_FREQ_HZ: u32 = 25_000;
/// LEDC frequency for the board status LED (1 kHz).
pub const BOARD_LED_PWM_FREQ_HZ: u32 = 1_000;

// ---------------------------------------------------------------------------
// LEDC channel map
// ---------------------------------------------------------------------------

pub const LEDC_CH_OUTPUT_R: u32 = 0;
pub const LEDC_CH_OUTPUT_G: u32 = 1;
pub const LEDC_CH_OUTPUT_B: u32 = 2;
pub const LEDC_CH_OUTPUT_W: u32 = 3;
pub const LEDC_CH_BOARD_R: u32 = 4;
pub const LEDC_CH_BOARD_G: u32 = 5;
pub const LEDC_CH_BOARD_B: u32 = 6;
