//! Application layer.
//!
//! [`ports`] defines the hexagonal boundary traits; [`controller`] and
//! [`remote`] wire the state owners and transports into the aggregates the
//! two binaries drive. Nothing in here touches FFI — hardware comes in
//! through boxed port trait objects.

pub mod controller;
pub mod ports;
pub mod remote;
