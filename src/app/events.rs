//! Outbound application events.
//!
//! The [`ChargeService`](super::service::ChargeService) emits these through
//! the [`EventSink`](super::ports::EventSink) port.

use crate::config::GridVariant;
use crate::error::FaultKind;
use crate::events::Event;
use crate::fsm::ChargeState;

#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// Boot self-tests passed.
    Booted {
        grid: GridVariant,
        v1_peak_mv: i32,
        v1_rms_mv: i32,
    },

    StateChanged { from: ChargeState, to: ChargeState },

    /// A fault was entered (latching or not).
    FaultRaised(FaultKind),

    /// A self-clearing fault went away.
    FaultCleared(FaultKind),

    /// Relay closed for a session offering `offered_ma`.
    ChargingStarted { offered_ma: i32 },

    ChargingStopped,

    /// Periodic measurement snapshot.
    Telemetry(TelemetryData),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryData {
    pub state: ChargeState,
    pub event: Event,
    pub pwm_high_mv: i32,
    pub pwm_low_mv: i32,
    pub v1_max_mv: i32,
    pub i_max_ma: i32,
    pub temperature_mdeg: i32,
    pub offered_current_ma: i32,
    pub relay_closed: bool,
    pub fault: Option<FaultKind>,
    pub uptime_ms: u64,
}
