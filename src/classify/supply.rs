//! Supply classifier: mains voltage window and output current.

use log::{info, warn};

use crate::error::FaultKind;
use crate::events::Event;
use crate::fsm::ChargeState;
use crate::fsm::context::ControllerContext;

/// Classify the last closed supply window (`v1_max_mv`, `i_max_ma`).
pub fn classify_supply(ctx: &mut ControllerContext, event: Event) -> Event {
    if ctx.fault_latched() {
        return event;
    }

    let mut event = event;

    // The stuck-relay check reads the relay side, not the line.
    if event != Event::CheckStuckRelay {
        let limits = ctx.config.voltage_limits(ctx.grid_variant);
        let v1 = ctx.v1_max_mv;
        let in_undervoltage = ctx.fault == Some(FaultKind::InputUndervoltage);

        if v1 > limits.high_mv {
            warn!("supply: {} mV above {} mV", v1, limits.high_mv);
            ctx.enter_fault(FaultKind::InputOvervoltage);
            return Event::Overvoltage;
        }
        if v1 < limits.low_mv {
            if in_undervoltage {
                return Event::UndervoltageWait;
            }
            warn!("supply: {} mV below {} mV", v1, limits.low_mv);
            ctx.enter_fault(FaultKind::InputUndervoltage);
            return Event::Undervoltage;
        }
        if in_undervoltage && v1 > limits.low_mv {
            ctx.recover_undervoltage();
            event = Event::VinRecovered;
        }
    }

    if ctx.current_state == ChargeState::Fault {
        return event;
    }

    let i = ctx.i_max_ma;
    let session = ctx.relay_closed_flag
        || matches!(ctx.current_state, ChargeState::RelayOpen | ChargeState::CheckRelay);

    if session {
        let over = i > ctx.current_limit_ma;
        match ctx.overcurrent_windows {
            None if over => {
                warn!("supply: {} mA over limit {} mA", i, ctx.current_limit_ma);
                ctx.overcurrent_windows = Some(0);
            }
            None => {}
            Some(elapsed) => {
                let elapsed = elapsed.saturating_add(1);
                if elapsed < ctx.config.overcurrent_debounce_windows {
                    ctx.overcurrent_windows = Some(elapsed);
                } else if over {
                    ctx.overcurrent_windows = None;
                    ctx.enter_fault(FaultKind::OvercurrentError);
                    return Event::Overcurrent;
                } else {
                    info!("supply: {} mA back under limit, overcurrent cleared", i);
                    ctx.overcurrent_windows = None;
                }
            }
        }
    } else {
        ctx.overcurrent_windows = None;
        if i > ctx.current_limit_idle_ma
            && !matches!(event, Event::CheckStuckRelay | Event::PilotFault)
        {
            warn!("supply: {} mA drawn with the relay open", i);
            ctx.enter_fault(FaultKind::OvercurrentError);
            return Event::Overcurrent;
        }
    }

    event
}
