//! Concrete state handler functions and table builder.
//!
//! Each state is three plain `fn` pointers.  Handlers read and write the
//! [`ControllerContext`] and append [`Action`]s; nothing here performs
//! I/O.
//!
//! ```text
//!  POWER_ON ──▶ A ◀──────────────────────────────┐
//!               │ EvConnected                    │ unplugged
//!               ▼                                │
//!               B ──ChargingReq──▶ RCD_SELF_TEST │
//!               ▲                      │ pass    │
//!               │                      ▼         │
//!               │                    C / D ──▶ RELAY_OPEN ──▶ CHECK_RELAY
//!               └──────────── CheckRelayPassed ◀──────────────────┘
//!
//!  Any state ──[fault]──▶ FAULT   (undervoltage resumes, others latch)
//! ```

use log::{error, info, warn};

use super::context::ControllerContext;
use super::{Action, ActionList, ChargeState, StateDescriptor, push};
use crate::drivers::{IndicatorPattern, PilotOutput};
use crate::error::FaultKind;
use crate::events::Event;

/// Contact read-back is ignored this long after a close command.
const RELAY_SETTLE_MS: u64 = 100;

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

pub fn build_state_table() -> [StateDescriptor; ChargeState::COUNT] {
    [
        StateDescriptor {
            id: ChargeState::PowerOn,
            name: "PowerOn",
            on_enter: Some(power_on_enter),
            on_exit: None,
            on_update: power_on_update,
        },
        StateDescriptor {
            id: ChargeState::RcdSelfTest,
            name: "RcdSelfTest",
            on_enter: None,
            on_exit: None,
            on_update: rcd_self_test_update,
        },
        StateDescriptor {
            id: ChargeState::A,
            name: "A",
            on_enter: Some(a_enter),
            on_exit: None,
            on_update: a_update,
        },
        StateDescriptor {
            id: ChargeState::B,
            name: "B",
            on_enter: Some(b_enter),
            on_exit: None,
            on_update: b_update,
        },
        StateDescriptor {
            id: ChargeState::C,
            name: "C",
            on_enter: Some(charging_enter),
            on_exit: None,
            on_update: charging_update,
        },
        StateDescriptor {
            id: ChargeState::D,
            name: "D",
            on_enter: Some(charging_enter),
            on_exit: None,
            on_update: charging_update,
        },
        StateDescriptor {
            id: ChargeState::RelayOpen,
            name: "RelayOpen",
            on_enter: Some(relay_open_enter),
            on_exit: None,
            on_update: relay_open_update,
        },
        StateDescriptor {
            id: ChargeState::CheckRelay,
            name: "CheckRelay",
            on_enter: Some(check_relay_enter),
            on_exit: Some(check_relay_exit),
            on_update: check_relay_update,
        },
        StateDescriptor {
            id: ChargeState::Fault,
            name: "Fault",
            on_enter: Some(fault_enter),
            on_exit: Some(fault_exit),
            on_update: fault_update,
        },
    ]
}

// ── Output helpers: record intent on the context, queue the action ──

fn open_relay(ctx: &mut ControllerContext, out: &mut ActionList) {
    ctx.relay_closed_flag = false;
    push(out, Action::OpenRelay);
}

fn close_relay(ctx: &mut ControllerContext, out: &mut ActionList) {
    ctx.relay_closed_flag = true;
    ctx.relay_closed_at_ms = Some(ctx.uptime_ms);
    push(out, Action::CloseRelay);
}

fn set_pilot(ctx: &mut ControllerContext, out: &mut ActionList, pilot: PilotOutput) {
    ctx.pilot_output = pilot;
    push(out, Action::SetPilot(pilot));
}

fn display(out: &mut ActionList, pattern: IndicatorPattern) {
    push(out, Action::Display(pattern));
}

// ═══════════════════════════════════════════════════════════════════════════
//  POWER_ON
// ═══════════════════════════════════════════════════════════════════════════

fn power_on_enter(ctx: &mut ControllerContext, out: &mut ActionList) {
    set_pilot(ctx, out, PilotOutput::Dc);
    display(out, IndicatorPattern::Booting);
}

fn power_on_update(ctx: &mut ControllerContext, event: Event, _out: &mut ActionList) -> Event {
    ctx.reset_timer();
    event
}

// ═══════════════════════════════════════════════════════════════════════════
//  RCD_SELF_TEST (the sequencer itself runs in the service)
// ═══════════════════════════════════════════════════════════════════════════

fn rcd_self_test_update(ctx: &mut ControllerContext, event: Event, _out: &mut ActionList) -> Event {
    if event == Event::RcdTestFail {
        ctx.enter_fault(FaultKind::RcdError);
    }
    event
}

// ═══════════════════════════════════════════════════════════════════════════
//  A: vehicle disconnected
// ═══════════════════════════════════════════════════════════════════════════

fn a_enter(ctx: &mut ControllerContext, out: &mut ActionList) {
    if ctx.relay_closed_flag {
        open_relay(ctx, out);
        push(out, Action::StopCharging);
    }
    ctx.clear_session();
    ctx.unplugged_while_charging = false;
    set_pilot(ctx, out, PilotOutput::Dc);
    display(out, IndicatorPattern::Idle);
    info!("A: waiting for a vehicle");
}

fn a_update(ctx: &mut ControllerContext, event: Event, out: &mut ActionList) -> Event {
    if ctx.relay_closed_flag {
        warn!("A: relay still closed, opening");
        open_relay(ctx, out);
        push(out, Action::StopCharging);
    }
    event
}

// ═══════════════════════════════════════════════════════════════════════════
//  B: vehicle connected
// ═══════════════════════════════════════════════════════════════════════════

fn b_enter(ctx: &mut ControllerContext, out: &mut ActionList) {
    ctx.clear_session();
    display(out, IndicatorPattern::Connected);
    info!("B: vehicle connected");
}

fn b_update(ctx: &mut ControllerContext, event: Event, out: &mut ActionList) -> Event {
    if event == Event::EvseReady {
        let pilot = ctx.offered_pilot();
        info!("B: offering {} mA", ctx.offered_current_ma);
        set_pilot(ctx, out, pilot);
    }
    event
}

// ═══════════════════════════════════════════════════════════════════════════
//  C / D: charging (D with ventilation)
// ═══════════════════════════════════════════════════════════════════════════

fn charging_enter(ctx: &mut ControllerContext, out: &mut ActionList) {
    let pilot = ctx.offered_pilot();
    set_pilot(ctx, out, pilot);
    display(out, IndicatorPattern::Connected);
    info!("{:?}: charging requested", ctx.current_state);
}

fn charging_update(ctx: &mut ControllerContext, event: Event, out: &mut ActionList) -> Event {
    let steady = if ctx.current_state == ChargeState::D {
        Event::ChargingD
    } else {
        Event::Charging
    };

    // The offer may have moved on a tick that carried another event.
    let offered = ctx.offered_pilot();
    if ctx.pilot_output != offered {
        info!("{:?}: offering {} mA", ctx.current_state, ctx.offered_current_ma);
        set_pilot(ctx, out, offered);
        if ctx.relay_closed_flag {
            display(
                out,
                IndicatorPattern::Charging {
                    derated: ctx.derated,
                },
            );
        }
    }

    match event {
        Event::DiodeErrCheck => {
            if ctx.state_timer_ms < ctx.config.diode_check_delay_ms {
                return event;
            }
            if ctx.pwm_low_mv > ctx.config.pilot_bands.diode_ceiling_mv {
                ctx.enter_fault(FaultKind::DiodeError);
                return Event::DiodeError;
            }
            ctx.diode_verified = true;
            Event::DiodeCheckPassed
        }
        Event::ChargingStart => {
            if ctx.relay_closed_flag {
                return event;
            }
            if !ctx.rcd_verified {
                error!("relay close refused: RCD not verified");
                ctx.enter_fault(FaultKind::RcdError);
                return Event::RcdTestFail;
            }
            if !ctx.diode_verified {
                error!("relay close refused: diode not verified");
                ctx.enter_fault(FaultKind::DiodeError);
                return Event::DiodeError;
            }
            close_relay(ctx, out);
            push(out, Action::StartCharging);
            display(
                out,
                IndicatorPattern::Charging {
                    derated: ctx.derated,
                },
            );
            event
        }
        Event::TemperatureDerate | Event::TemperatureNominal => {
            ctx.apply_derating(event == Event::TemperatureDerate);
            let pilot = ctx.offered_pilot();
            set_pilot(ctx, out, pilot);
            display(
                out,
                IndicatorPattern::Charging {
                    derated: ctx.derated,
                },
            );
            steady
        }
        Event::Charging | Event::ChargingD => {
            let settled = ctx
                .relay_closed_at_ms
                .is_some_and(|at| ctx.uptime_ms.saturating_sub(at) >= RELAY_SETTLE_MS);
            if ctx.relay_closed_flag && settled && !ctx.relay_feedback_closed {
                ctx.enter_fault(FaultKind::RelayError);
                return Event::RelayFault;
            }
            event
        }
        other => other,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  RELAY_OPEN: charging stopped, contacts opening
// ═══════════════════════════════════════════════════════════════════════════

fn relay_open_enter(ctx: &mut ControllerContext, out: &mut ActionList) {
    open_relay(ctx, out);
    push(out, Action::StopCharging);
    display(out, IndicatorPattern::Connected);
    info!("RelayOpen: charging stopped");
}

fn relay_open_update(ctx: &mut ControllerContext, _event: Event, _out: &mut ActionList) -> Event {
    ctx.reset_timer();
    Event::StopCharging
}

// ═══════════════════════════════════════════════════════════════════════════
//  CHECK_RELAY: relay side must be dead with the contacts open
// ═══════════════════════════════════════════════════════════════════════════

fn check_relay_enter(ctx: &mut ControllerContext, out: &mut ActionList) {
    set_pilot(ctx, out, PilotOutput::Dc);
    let windows = ctx.config.relay_check_windows;
    ctx.relay_check.begin(windows);
    ctx.relay_v2_avg_mv = None;
}

fn check_relay_exit(ctx: &mut ControllerContext, _out: &mut ActionList) {
    ctx.relay_check.cancel();
}

fn check_relay_update(ctx: &mut ControllerContext, event: Event, out: &mut ActionList) -> Event {
    if event != Event::CheckStuckRelay {
        return event;
    }
    let Some(avg) = ctx.relay_v2_avg_mv else {
        return event;
    };

    if avg > ctx.config.relay_stuck_threshold_mv || ctx.relay_feedback_closed {
        error!(
            "CheckRelay: contacts stuck (relay side {} mV, read-back closed: {})",
            avg, ctx.relay_feedback_closed
        );
        ctx.enter_fault(FaultKind::RelayError);
        return Event::RelayFault;
    }

    info!("CheckRelay: contacts open ({} mV)", avg);
    if !ctx.unplugged_while_charging {
        let pilot = ctx.offered_pilot();
        set_pilot(ctx, out, pilot);
    }
    Event::CheckRelayPassed
}

// ═══════════════════════════════════════════════════════════════════════════
//  FAULT
// ═══════════════════════════════════════════════════════════════════════════

fn fault_enter(ctx: &mut ControllerContext, out: &mut ActionList) {
    // Relay first, unconditionally.
    open_relay(ctx, out);
    push(out, Action::StopCharging);
    ctx.clear_session();

    let Some(kind) = ctx.fault else {
        warn!("Fault entered without a fault kind");
        set_pilot(ctx, out, PilotOutput::Off);
        return;
    };
    let pilot = if kind.is_latching() {
        PilotOutput::Off
    } else {
        PilotOutput::Dc
    };
    set_pilot(ctx, out, pilot);
    display(out, IndicatorPattern::Fault(kind));
}

fn fault_exit(_ctx: &mut ControllerContext, _out: &mut ActionList) {
    info!("Fault: cleared");
}

fn fault_update(_ctx: &mut ControllerContext, event: Event, _out: &mut ActionList) -> Event {
    event
}
