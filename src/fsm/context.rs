//! Shared mutable context threaded through the classifiers and every
//! state handler.
//!
//! `ControllerContext` is the blackboard of the charge controller: the
//! latest measurements, the current/previous state, the active fault,
//! the offered current and the per-session bookkeeping.  It is created
//! once at boot and lives until power loss.  Only the tick loop mutates
//! it; interrupt handlers write to [`crate::irq::InterruptSignals`].

use log::{error, info, warn};

use super::ChargeState;
use crate::config::{ChargeConfig, GridVariant};
use crate::drivers::PilotOutput;
use crate::error::FaultKind;

// ---------------------------------------------------------------------------
// Stuck-relay accumulator
// ---------------------------------------------------------------------------

/// Averages the relay-side peak over a fixed number of supply windows.
/// The first window after `begin` is discarded.
#[derive(Debug, Clone, Default)]
pub struct RelayCheckAccumulator {
    active: bool,
    windows: u8,
    target: u8,
    sum_mv: i64,
}

impl RelayCheckAccumulator {
    pub fn begin(&mut self, windows: u8) {
        *self = Self {
            active: true,
            windows: 0,
            target: windows.max(2),
            sum_mv: 0,
        };
    }

    pub fn cancel(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Feed one window's relay-side peak.  Returns the average once the
    /// last window is in.
    pub fn push(&mut self, v2_max_mv: i32) -> Option<i32> {
        if !self.active {
            return None;
        }
        self.windows += 1;
        if self.windows == 1 {
            return None;
        }
        self.sum_mv += i64::from(v2_max_mv);
        if self.windows < self.target {
            return None;
        }
        self.active = false;
        Some((self.sum_mv / i64::from(self.target - 1)) as i32)
    }
}

// ---------------------------------------------------------------------------
// ControllerContext
// ---------------------------------------------------------------------------

pub struct ControllerContext {
    // -- Timing --
    /// Milliseconds since boot.
    pub uptime_ms: u64,
    /// Milliseconds since the last `reset_timer()`, tick-quantized.
    pub state_timer_ms: u32,

    // -- State --
    pub current_state: ChargeState,
    /// Updated only together with `current_state`.
    pub previous_state: ChargeState,
    /// State to resume once undervoltage clears.
    pub pre_fault_state: ChargeState,
    pub fault: Option<FaultKind>,

    // -- Measurements --
    pub pwm_high_mv: i32,
    pub pwm_low_mv: i32,
    pub v1_max_mv: i32,
    pub v2_max_mv: i32,
    pub i_max_ma: i32,
    pub temperature_mdeg: i32,
    /// Relay read-back: auxiliary contact reports closed.
    pub relay_feedback_closed: bool,
    /// Latest completed stuck-relay average.
    pub relay_v2_avg_mv: Option<i32>,
    pub relay_check: RelayCheckAccumulator,

    // -- Grid and limits --
    pub grid_variant: GridVariant,
    pub offered_current_ma: i32,
    pub current_limit_ma: i32,
    pub current_limit_idle_ma: i32,
    pub derated: bool,
    /// Windows since the current first went over the active limit;
    /// `None` while no excursion is pending.
    pub overcurrent_windows: Option<u8>,

    // -- Outputs --
    pub pilot_output: PilotOutput,
    /// Intended relay position (what was last commanded).
    pub relay_closed_flag: bool,
    pub relay_closed_at_ms: Option<u64>,

    // -- Session --
    pub rcd_verified: bool,
    pub diode_verified: bool,
    pub unplugged_while_charging: bool,

    // -- Configuration --
    pub config: ChargeConfig,
}

impl ControllerContext {
    pub fn new(config: ChargeConfig) -> Self {
        let offered = config.nominal_current_ma;
        Self {
            uptime_ms: 0,
            state_timer_ms: 0,
            current_state: ChargeState::PowerOn,
            previous_state: ChargeState::PowerOn,
            pre_fault_state: ChargeState::PowerOn,
            fault: None,
            pwm_high_mv: 0,
            pwm_low_mv: 0,
            v1_max_mv: 0,
            v2_max_mv: 0,
            i_max_ma: 0,
            temperature_mdeg: 25_000,
            relay_feedback_closed: false,
            relay_v2_avg_mv: None,
            relay_check: RelayCheckAccumulator::default(),
            grid_variant: GridVariant::Nominal230V,
            offered_current_ma: offered,
            current_limit_ma: config.active_current_limit(offered),
            current_limit_idle_ma: config.idle_current_limit_ma,
            derated: false,
            overcurrent_windows: None,
            pilot_output: PilotOutput::Dc,
            relay_closed_flag: false,
            relay_closed_at_ms: None,
            rcd_verified: false,
            diode_verified: false,
            unplugged_while_charging: false,
            config,
        }
    }

    /// Advance both clocks by one tick.
    pub fn advance(&mut self, tick_ms: u32) {
        self.uptime_ms = self.uptime_ms.saturating_add(u64::from(tick_ms));
        self.state_timer_ms = self.state_timer_ms.saturating_add(tick_ms);
    }

    pub fn reset_timer(&mut self) {
        self.state_timer_ms = 0;
    }

    /// Move to `next`.  `previous_state` follows on every call, including
    /// a stay in the same state.
    pub fn transition(&mut self, next: ChargeState) {
        self.previous_state = self.current_state;
        self.current_state = next;
    }

    /// Record `kind` and move to `Fault`.
    ///
    /// A latched fault is never replaced.  A latching fault replaces an
    /// active undervoltage.  Returns whether the fault was taken.
    pub fn enter_fault(&mut self, kind: FaultKind) -> bool {
        match self.fault {
            Some(active) if active.is_latching() => return false,
            Some(active) if active == kind => return false,
            _ => {}
        }
        if kind.is_latching() {
            error!("fault latched: {kind}");
        } else {
            warn!("fault: {kind}");
            self.pre_fault_state = self.current_state;
        }
        self.fault = Some(kind);
        self.transition(ChargeState::Fault);
        true
    }

    /// Clear a self-clearing fault and resume where it struck.
    pub fn recover_undervoltage(&mut self) -> bool {
        if self.fault != Some(FaultKind::InputUndervoltage) {
            return false;
        }
        self.fault = None;
        let resume = resume_state_after_undervoltage(self.pre_fault_state);
        info!("supply recovered, resuming {:?}", resume);
        self.transition(resume);
        self.reset_timer();
        true
    }

    pub fn fault_latched(&self) -> bool {
        self.fault.is_some_and(FaultKind::is_latching)
    }

    /// Pilot held at a constant level (not offering current).
    pub fn pilot_is_dc(&self) -> bool {
        !self.pilot_output.is_pwm()
    }

    /// PWM output for the current offer.
    pub fn offered_pilot(&self) -> PilotOutput {
        PilotOutput::for_current_ma(self.offered_current_ma)
    }

    pub fn apply_derating(&mut self, derated: bool) {
        self.derated = derated;
        self.offered_current_ma = if derated {
            self.config.derated_current_ma
        } else {
            self.config.nominal_current_ma
        };
        self.current_limit_ma = self.config.active_current_limit(self.offered_current_ma);
    }

    /// Forget per-session proofs; a new charging request starts over.
    pub fn clear_session(&mut self) {
        self.rcd_verified = false;
        self.diode_verified = false;
    }
}

/// Transient test and teardown states cannot be resumed mid-way: the
/// vehicle is known to be connected, so they restart from `B`.
pub fn resume_state_after_undervoltage(state: ChargeState) -> ChargeState {
    match state {
        ChargeState::RcdSelfTest | ChargeState::RelayOpen | ChargeState::CheckRelay => {
            ChargeState::B
        }
        ChargeState::Fault => ChargeState::A,
        other => other,
    }
}
