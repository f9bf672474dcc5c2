//! Event classifiers.
//!
//! Once per tick the measurements in [`ControllerContext`] are turned
//! into the next [`Event`] by three classifiers run in a fixed order:
//!
//! ```text
//!  previous event ─▶ pilot ─▶ supply ─▶ temperature ─▶ state machine
//! ```
//!
//! Each one sees the event produced by the one before and may move
//! `current_state` or latch a fault on the context, so later classifiers
//! observe earlier transitions within the same tick.  None of them
//! touches hardware.
//!
//! [`ControllerContext`]: crate::fsm::context::ControllerContext
//! [`Event`]: crate::events::Event

pub mod pilot;
pub mod supply;
pub mod temperature;

pub use pilot::{PilotBand, classify_pilot};
pub use supply::classify_supply;
pub use temperature::classify_temperature;
