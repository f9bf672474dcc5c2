//! Integration test driver for the `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises one part of the charge
//! service against [`mock_hw::MockHardware`].  All tests run on the host
//! with no real hardware required.

mod boot_tests;
mod mock_hw;
mod session_tests;
