//! Temperature classifier: derate at the first limit, shut down at the
//! second.

use log::{info, warn};

use crate::error::FaultKind;
use crate::events::Event;
use crate::fsm::context::ControllerContext;

pub fn classify_temperature(ctx: &mut ControllerContext, event: Event) -> Event {
    if ctx.fault_latched() {
        return event;
    }

    let t = ctx.temperature_mdeg;
    let shutdown_at = ctx.config.shutdown_temperature_mdeg;
    let derate_at = ctx.config.derate_temperature_mdeg;
    let release_below = derate_at - ctx.config.temperature_hysteresis_mdeg;

    if t > shutdown_at {
        ctx.enter_fault(FaultKind::OvertemperatureError);
        return Event::Overtemperature;
    }

    if event.is_charging() {
        if !ctx.derated && t > derate_at {
            warn!("temperature {} m°C, derating", t);
            return Event::TemperatureDerate;
        }
        if ctx.derated && t < release_below {
            info!("temperature {} m°C, back to nominal current", t);
            return Event::TemperatureNominal;
        }
        return event;
    }

    // Other ticks adjust the offer quietly. In C/D the charging handler
    // re-sends the pilot before acting on the event.
    let want = if ctx.derated {
        t >= release_below
    } else {
        t > derate_at
    };
    if want != ctx.derated {
        ctx.apply_derating(want);
    }
    event
}
