//! Integration test driver for `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises one flow end to end —
//! aggregate, state owners and transports wired to simulation adapters.
//! All tests run on the host (x86_64) with no real hardware required.

mod mock_hw;

mod controller_flow_tests;
mod fanout_tests;
mod pairing_tests;
mod persistence_tests;
mod rest_api_tests;
