//! Pilot classifier.
//!
//! The high plateau of the pilot selects one of four contiguous bands;
//! a value equal to an edge belongs to the lower band:
//!
//! ```text
//!  ≤ floor │ (floor, d] │ (d, c] │ (c, b] │ (b, a] │ > a
//!  short   │     D      │   C    │   B    │   A    │ out of range
//! ```
//!
//! The band plus the previous event decide the next event and state.
//! The low plateau is checked against the diode ceiling while charging.

use log::debug;

use crate::config::PilotBands;
use crate::error::FaultKind;
use crate::events::Event;
use crate::fsm::ChargeState;
use crate::fsm::context::ControllerContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PilotBand {
    /// Wire shorted, open or the vehicle pulled the line to ground.
    Short,
    D,
    C,
    B,
    A,
    OutOfRange,
}

impl PilotBand {
    pub fn classify(pwm_high_mv: i32, bands: &PilotBands) -> Self {
        if pwm_high_mv <= bands.floor_mv {
            Self::Short
        } else if pwm_high_mv <= bands.d_upper_mv {
            Self::D
        } else if pwm_high_mv <= bands.c_upper_mv {
            Self::C
        } else if pwm_high_mv <= bands.b_upper_mv {
            Self::B
        } else if pwm_high_mv <= bands.a_upper_mv {
            Self::A
        } else {
            Self::OutOfRange
        }
    }
}

pub fn classify_pilot(ctx: &mut ControllerContext, event: Event) -> Event {
    if ctx.fault_latched() || ctx.current_state == ChargeState::Fault {
        return event;
    }

    let bands = ctx.config.pilot_bands;
    let band = PilotBand::classify(ctx.pwm_high_mv, &bands);

    if band == PilotBand::Short {
        // Right after boot the sampler may not be filled yet.
        if event == Event::InitialCheckDone {
            return event;
        }
        debug!("pilot: high plateau {} mV at or below floor", ctx.pwm_high_mv);
        ctx.enter_fault(FaultKind::PilotError);
        ctx.reset_timer();
        return Event::PilotFault;
    }

    if ctx.pwm_low_mv > bands.diode_ceiling_mv && !ctx.pilot_is_dc() && event.is_charging() {
        debug!(
            "pilot: diode missing, high {} mV low {} mV",
            ctx.pwm_high_mv, ctx.pwm_low_mv
        );
        ctx.enter_fault(FaultKind::DiodeError);
        ctx.reset_timer();
        return Event::DiodeError;
    }

    let next = match band {
        PilotBand::A => band_a(ctx, event),
        PilotBand::B => band_b(ctx, event),
        PilotBand::C => band_charging(ctx, event, ChargeState::C),
        PilotBand::D => band_charging(ctx, event, ChargeState::D),
        PilotBand::Short | PilotBand::OutOfRange => event,
    };
    if next != event {
        debug!("pilot: {:?} band, {:?} -> {:?}", band, event, next);
    }
    next
}

fn go(ctx: &mut ControllerContext, state: ChargeState, event: Event) -> Event {
    ctx.transition(state);
    event
}

/// Vehicle disconnected.
fn band_a(ctx: &mut ControllerContext, event: Event) -> Event {
    match event {
        Event::InitialCheckDone | Event::VinRecovered => go(ctx, ChargeState::A, Event::Wait),
        Event::Charging | Event::ChargingD => {
            ctx.unplugged_while_charging = true;
            go(ctx, ChargeState::RelayOpen, Event::CableUnplugged)
        }
        Event::StopCharging => {
            if ctx.unplugged_while_charging {
                go(ctx, ChargeState::CheckRelay, Event::CheckStuckRelay)
            } else {
                // Dropped to A right after asking to stop: PE is missing.
                ctx.enter_fault(FaultKind::PeError);
                Event::PeFault
            }
        }
        Event::Wait
        | Event::Disconnected
        | Event::WaitB
        | Event::EvseReady
        | Event::CheckRelayPassed
        | Event::PeFault => {
            ctx.reset_timer();
            go(ctx, ChargeState::A, Event::Wait)
        }
        _ => go(ctx, ChargeState::A, Event::Disconnected),
    }
}

/// Vehicle connected, not requesting energy.
fn band_b(ctx: &mut ControllerContext, event: Event) -> Event {
    let timer = ctx.state_timer_ms;
    let connect_window = ctx.config.ev_connect_window_ms;
    let ready_delay = ctx.config.evse_ready_delay_ms;
    match event {
        Event::VinRecovered => {
            ctx.reset_timer();
            go(ctx, ChargeState::B, Event::EvConnected)
        }
        Event::Wait | Event::InitialCheckDone if timer < connect_window => {
            ctx.reset_timer();
            go(ctx, ChargeState::B, Event::EvConnected)
        }
        Event::EvConnected if timer >= ready_delay => {
            ctx.reset_timer();
            go(ctx, ChargeState::B, Event::EvseReady)
        }
        Event::Charging | Event::ChargingD => {
            ctx.unplugged_while_charging = false;
            go(ctx, ChargeState::RelayOpen, Event::EvRequestsStop)
        }
        Event::ChargingStart => {
            ctx.unplugged_while_charging = false;
            go(ctx, ChargeState::RelayOpen, Event::EvRequestsStop)
        }
        Event::StopCharging => go(ctx, ChargeState::CheckRelay, Event::CheckStuckRelay),
        Event::CheckRelayPassed => go(ctx, ChargeState::B, Event::ChargingStopped),
        Event::ChargingStopped | Event::EvseReady => {
            ctx.reset_timer();
            go(ctx, ChargeState::B, Event::WaitB)
        }
        Event::RcdTestCompleted | Event::DiodeCheckPassed => go(ctx, ChargeState::B, Event::WaitB),
        other => other,
    }
}

/// Vehicle requesting energy; `state` is `C` or `D`.
fn band_charging(ctx: &mut ControllerContext, event: Event, state: ChargeState) -> Event {
    let steady = if state == ChargeState::D {
        Event::ChargingD
    } else {
        Event::Charging
    };
    match event {
        Event::WaitB => go(ctx, ChargeState::RcdSelfTest, Event::ChargingReq),
        Event::RcdTestCompleted => {
            ctx.reset_timer();
            go(ctx, state, Event::DiodeErrCheck)
        }
        Event::DiodeCheckPassed => go(ctx, state, Event::ChargingStart),
        Event::ChargingStart => go(ctx, state, steady),
        // Ventilation requirement changed mid-session.
        Event::Charging | Event::ChargingD if event != steady => go(ctx, state, steady),
        Event::VinRecovered
            if matches!(ctx.current_state, ChargeState::C | ChargeState::D) =>
        {
            go(ctx, ChargeState::RcdSelfTest, Event::ChargingReq)
        }
        // Vehicle kept requesting while the connection sequence restarts.
        Event::VinRecovered => {
            ctx.reset_timer();
            go(ctx, ChargeState::B, Event::EvConnected)
        }
        Event::EvConnected if ctx.state_timer_ms >= ctx.config.evse_ready_delay_ms => {
            ctx.reset_timer();
            go(ctx, ChargeState::B, Event::EvseReady)
        }
        Event::EvseReady => {
            ctx.reset_timer();
            go(ctx, ChargeState::B, Event::WaitB)
        }
        other => other,
    }
}
