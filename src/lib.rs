//! Charge-control core for a single-phase AC EV charging station.
//!
//! Hardware-independent: the control loop talks to the board only
//! through the port traits in [`app::ports`], and interrupt handlers
//! hand data over through [`irq::InterruptSignals`].  Everything here
//! runs on the host for integration testing.

#![deny(unused_must_use)]

pub mod app;
pub mod classify;
pub mod config;
pub mod error;
pub mod events;
pub mod fsm;
pub mod irq;
pub mod rcd;

pub mod adapters;
pub mod drivers;
pub mod sensors;
