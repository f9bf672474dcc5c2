//! Fuzz target: classifier chain plus state machine
//!
//! Each 6-byte record is one tick of measurements (pilot plateaus, line
//! peak, current, temperature).  After every tick the relay may only be
//! commanded closed in `C`/`D` with both session proofs held, and a
//! latched fault must have opened it.
//!
//! cargo fuzz run fuzz_charge_pipeline

#![no_main]

use evsecore::classify::{classify_pilot, classify_supply, classify_temperature};
use evsecore::config::ChargeConfig;
use evsecore::events::Event;
use evsecore::fsm::context::ControllerContext;
use evsecore::fsm::{ChargeState, Fsm};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut ctx = ControllerContext::new(ChargeConfig::default());
    let mut fsm = Fsm::default();
    ctx.current_state = ChargeState::PowerOn;
    fsm.start(&mut ctx);
    let mut event = Event::InitialCheckDone;

    for rec in data.chunks_exact(6) {
        ctx.advance(ctx.config.tick_ms);
        ctx.pwm_high_mv = i32::from(i16::from_le_bytes([rec[0], rec[1]]));
        ctx.pwm_low_mv = i32::from(rec[2] as i8) * 100;
        ctx.v1_max_mv = i32::from(rec[3]) * 2_000;
        ctx.i_max_ma = i32::from(rec[4]) * 150;
        ctx.temperature_mdeg = i32::from(rec[5]) * 500;
        ctx.relay_feedback_closed = ctx.relay_closed_flag;

        if ctx.current_state != ChargeState::Fault && !event.suspends_pilot_classification() {
            event = classify_pilot(&mut ctx, event);
        }
        event = classify_supply(&mut ctx, event);
        event = classify_temperature(&mut ctx, event);

        // Self-test inside its cooldown: verified without stimulus.
        if ctx.current_state == ChargeState::RcdSelfTest && event == Event::ChargingReq {
            ctx.rcd_verified = true;
            event = Event::RcdTestCompleted;
        }

        event = fsm.resolve(&mut ctx, event).event;

        if ctx.relay_closed_flag {
            assert!(ctx.current_state.is_charging(), "relay closed in {:?}", ctx.current_state);
            assert!(ctx.rcd_verified && ctx.diode_verified, "relay closed without proofs");
        }
        if ctx.fault_latched() {
            assert!(!ctx.relay_closed_flag, "latched fault with relay closed");
            assert_eq!(ctx.current_state, ChargeState::Fault);
        }
    }
});
