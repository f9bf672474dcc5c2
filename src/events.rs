//! Control-loop events.
//!
//! An [`Event`] is produced once per tick by the classifier pipeline
//! (pilot → supply → temperature), optionally replaced by the RCD
//! sequencer or the asynchronous-trip checks, and consumed by the
//! charge state machine.  The state machine may re-derive a different
//! event before acting (e.g. `DiodeErrCheck` → `DiodeError`); whatever it
//! returns is carried into the next tick as the "previous event".
//!
//! ```text
//!  PowerOn ─InitialCheckDone─▶ A ─EvConnected─▶ B ─EvseReady─▶ B(PWM) ─WaitB
//!                                                                  │
//!        ┌─────────────── ChargingReq ◀───────────────────────────┘
//!        ▼
//!  RcdSelfTest ─RcdTestTriggered…RcdTestCompleted─▶ C|D ─DiodeErrCheck
//!        ─DiodeCheckPassed─▶ ChargingStart ─▶ Charging / ChargingD
//!        ─EvRequestsStop | CableUnplugged─▶ RelayOpen ─StopCharging
//!        ─CheckStuckRelay─▶ CheckRelay ─CheckRelayPassed─▶ B ─ChargingStopped
//! ```

/// Closed set of control-loop events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// Nothing happened yet (first tick only).
    NoEvent,

    // ── Boot / idle ───────────────────────────────────────
    /// Boot self-tests passed; the pilot has not been classified yet.
    InitialCheckDone,
    /// Idle in state A.
    Wait,
    /// Vehicle left a non-charging state and the machine went idle.
    Disconnected,

    // ── Connection ────────────────────────────────────────
    /// Vehicle plugged in (pilot dropped to the B band).
    EvConnected,
    /// Settle delay elapsed; the pilot switches from DC to PWM.
    EvseReady,
    /// Idle in state B with PWM offered.
    WaitB,

    // ── Charging request ──────────────────────────────────
    /// Vehicle asked to charge (C or D band while waiting in B).
    ChargingReq,
    /// RCD self-test in progress.
    RcdTestTriggered,
    /// RCD self-test passed (or was skipped inside the cooldown).
    RcdTestCompleted,
    /// RCD self-test detected a wrong detector response.
    RcdTestFail,
    /// Waiting for the diode check to settle.
    DiodeErrCheck,
    /// Diode present; relay may close.
    DiodeCheckPassed,
    /// Diode missing.
    DiodeError,
    /// Close the relay now.
    ChargingStart,
    /// Charging without ventilation.
    Charging,
    /// Charging with ventilation.
    ChargingD,
    /// First temperature threshold crossed while charging.
    TemperatureDerate,
    /// Temperature back under the derate threshold (minus hysteresis).
    TemperatureNominal,

    // ── Teardown ──────────────────────────────────────────
    /// Vehicle went back to B while charging.
    EvRequestsStop,
    /// Vehicle went to A while charging.
    CableUnplugged,
    /// Relay has been commanded open.
    StopCharging,
    /// Stuck-contact check requested.
    CheckStuckRelay,
    /// Stuck-contact check passed.
    CheckRelayPassed,
    /// Session fully torn down, vehicle still connected.
    ChargingStopped,

    // ── Faults ────────────────────────────────────────────
    /// Pilot high plateau at or below the floor.
    PilotFault,
    /// Vehicle dropped to A right after a stop request.
    PeFault,
    /// Line peak below the grid low limit (first detection).
    Undervoltage,
    /// Line still below the low limit.
    UndervoltageWait,
    /// Line back above the low limit.
    VinRecovered,
    /// Line peak above the grid high limit.
    Overvoltage,
    /// Current over the active or idle limit.
    Overcurrent,
    /// Second temperature threshold crossed.
    Overtemperature,
    /// Relay contacts stuck or failed to actuate.
    RelayFault,
    /// RCD tripped outside a self-test.
    RcdTripped,
    /// Upstream PE detector fired.
    PeUpstreamFault,
}

impl Event {
    /// Event is one of the two steady charging events.
    pub const fn is_charging(self) -> bool {
        matches!(self, Self::Charging | Self::ChargingD)
    }

    /// While one of these is active the pilot classifier must not run:
    /// the state machine owns the pilot interpretation for that tick.
    pub const fn suspends_pilot_classification(self) -> bool {
        matches!(
            self,
            Self::CheckStuckRelay
                | Self::DiodeErrCheck
                | Self::RcdTestTriggered
                | Self::Undervoltage
                | Self::UndervoltageWait
        )
    }
}
