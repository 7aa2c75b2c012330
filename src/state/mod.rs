//! State owners.
//!
//! Each submodule owns one slice of device state and is its only writer;
//! transports observe snapshots and funnel mutations through owner methods.
//!
//! | Module   | Owns                                              |
//! |----------|---------------------------------------------------|
//! | `output` | four RGBW channels, brightness stepping, persist  |
//! | `wifi`   | link status, scan slot + results, credentials     |
//! | `device` | name, HTTP credentials, voltage sensor, restart   |
//! | `ota`    | update session status and byte counters           |
//! | `espnow` | remote roster (controller), peer MAC (remote)     |
//! | `alexa`  | virtual-device mapping settings                   |

pub mod alexa;
pub mod device;
pub mod espnow;
pub mod ota;
pub mod output;
pub mod wifi;
