//! Measurement front ends: pilot plateaus, mains supply, board temperature.
//!
//! The pilot sampler and supply monitor are written from interrupt
//! context and drained by the tick loop; see [`crate::irq`] for the
//! bundle that shares them.

pub mod pilot;
pub mod supply;
pub mod temperature;

pub use pilot::{PilotSampler, Plateau};
pub use supply::{FrontEndSample, RmsEstimator, SupplyMonitor, SupplyWindow};
pub use temperature::TemperatureMonitor;
