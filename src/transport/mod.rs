//! Transport adapters.
//!
//! Four concurrently-active surfaces over the same state owners:
//!
//! | Module      | Surface                                          |
//! |-------------|--------------------------------------------------|
//! | `ble`       | GATT services, gated notifies, bounded advertise |
//! | `websocket` | push, binary wire frames, per-tag gates          |
//! | `rest`      | pull, JSON snapshot + action endpoints           |
//! | `espnow`    | 1-byte commands between remote and controller    |

pub mod ble;
pub mod espnow;
pub mod rest;
pub mod websocket;
