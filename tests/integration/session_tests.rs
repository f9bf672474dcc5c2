//! Full charging sessions through the tick loop.

use crate::mock_hw::{A_MV, B_MV, C_MV, D_MV, HwCall, booted, charging, run, run_until, step};

use evsecore::app::events::AppEvent;
use evsecore::config::ChargeConfig;
use evsecore::drivers::{IndicatorPattern, Led, PilotOutput};
use evsecore::events::Event;
use evsecore::fsm::ChargeState;
use evsecore::irq::InterruptSignals;

fn offered() -> PilotOutput {
    PilotOutput::for_current_ma(ChargeConfig::default().nominal_current_ma)
}

#[test]
fn first_tick_after_boot_goes_idle() {
    let signals = InterruptSignals::new();
    let (mut svc, mut hw, mut sink) = booted(&signals, ChargeConfig::default());
    step(&mut svc, &mut hw, &mut sink, &signals, A_MV);

    assert_eq!(svc.state(), ChargeState::A);
    assert_eq!(svc.event(), Event::Wait);
    assert_eq!(svc.indicator_pattern(), IndicatorPattern::Idle);
    assert!(sink.contains(&AppEvent::StateChanged {
        from: ChargeState::PowerOn,
        to: ChargeState::A,
    }));
    assert!(hw.led(Led::Power));
    assert!(!hw.led(Led::Fault));
}

#[test]
fn plug_in_offers_pwm_after_settle_delay() {
    let signals = InterruptSignals::new();
    let config = ChargeConfig::default();
    let ready_ticks = (config.evse_ready_delay_ms / config.tick_ms) as usize;
    let (mut svc, mut hw, mut sink) = booted(&signals, config);
    run(&mut svc, &mut hw, &mut sink, &signals, A_MV, 3);

    step(&mut svc, &mut hw, &mut sink, &signals, B_MV);
    assert_eq!(svc.state(), ChargeState::B);
    assert_eq!(svc.event(), Event::EvConnected);
    assert_eq!(hw.pilot, PilotOutput::Dc);

    run(&mut svc, &mut hw, &mut sink, &signals, B_MV, ready_ticks - 2);
    assert_eq!(hw.pilot, PilotOutput::Dc, "PWM offered too early");

    run_until(&mut svc, &mut hw, &mut sink, &signals, B_MV, 5, |s| {
        s.event() == Event::EvseReady
    });
    assert_eq!(hw.pilot, offered());

    step(&mut svc, &mut hw, &mut sink, &signals, B_MV);
    assert_eq!(svc.event(), Event::WaitB);
    assert_eq!(svc.indicator_pattern(), IndicatorPattern::Connected);
}

#[test]
fn charge_request_closes_relay_after_rcd_and_diode_checks() {
    let signals = InterruptSignals::new();
    let (svc, hw, sink) = charging(&signals, ChargeConfig::default(), C_MV);

    assert_eq!(svc.state(), ChargeState::C);
    assert_eq!(svc.event(), Event::Charging);
    assert!(svc.relay_closed());
    assert!(hw.contacts_closed());
    assert!(svc.session_active());
    assert!(svc.context().rcd_verified);
    assert!(svc.context().diode_verified);
    assert_eq!(hw.count(HwCall::RelayClose), 1);
    assert!(sink.contains(&AppEvent::ChargingStarted { offered_ma: 16_000 }));
    assert_eq!(
        svc.indicator_pattern(),
        IndicatorPattern::Charging { derated: false }
    );
}

#[test]
fn ventilation_request_charges_in_d() {
    let signals = InterruptSignals::new();
    let (mut svc, mut hw, mut sink) = charging(&signals, ChargeConfig::default(), D_MV);
    assert_eq!(svc.state(), ChargeState::D);
    assert_eq!(svc.event(), Event::ChargingD);

    // Ventilation no longer required mid-session.
    step(&mut svc, &mut hw, &mut sink, &signals, C_MV);
    assert_eq!(svc.state(), ChargeState::C);
    assert_eq!(svc.event(), Event::Charging);
    assert!(hw.contacts_closed());
}

#[test]
fn rcd_test_runs_inside_the_tick_loop_after_cooldown() {
    let signals = InterruptSignals::new();
    let mut config = ChargeConfig::default();
    config.rcd.cooldown_ms = 0;
    let third = config.rcd.third_sample_ms;
    let tick = config.tick_ms;
    let (mut svc, mut hw, mut sink) = booted(&signals, config);
    run(&mut svc, &mut hw, &mut sink, &signals, A_MV, 2);
    run_until(&mut svc, &mut hw, &mut sink, &signals, B_MV, 200, |s| {
        s.event() == Event::WaitB
    });
    let pass_at_boot = svc.last_rcd_pass_ms();

    step(&mut svc, &mut hw, &mut sink, &signals, C_MV);
    assert_eq!(svc.state(), ChargeState::RcdSelfTest);
    assert_eq!(svc.event(), Event::RcdTestTriggered);
    assert!(hw.rcd_stimulus);

    let ticks = run_until(&mut svc, &mut hw, &mut sink, &signals, C_MV, 200, |s| {
        s.event() != Event::RcdTestTriggered
    });
    assert_eq!(svc.event(), Event::RcdTestCompleted);
    assert!(ticks as u32 * tick >= third);
    assert!(!hw.rcd_stimulus);
    assert_ne!(svc.last_rcd_pass_ms(), pass_at_boot);

    run_until(&mut svc, &mut hw, &mut sink, &signals, C_MV, 20, |s| {
        s.event() == Event::Charging
    });
    assert!(hw.contacts_closed());
}

#[test]
fn rcd_test_is_skipped_inside_cooldown() {
    let signals = InterruptSignals::new();
    let (svc, hw, _sink) = charging(&signals, ChargeConfig::default(), C_MV);
    // Only the boot test asserted the stimulus.
    assert_eq!(hw.count(HwCall::RcdStimulus(true)), 1);
    assert!(svc.relay_closed());
}

#[test]
fn ev_stop_opens_relay_checks_contacts_and_returns_to_b() {
    let signals = InterruptSignals::new();
    let (mut svc, mut hw, mut sink) = charging(&signals, ChargeConfig::default(), C_MV);
    hw.load_ma = 15_000;
    run(&mut svc, &mut hw, &mut sink, &signals, C_MV, 10);

    step(&mut svc, &mut hw, &mut sink, &signals, B_MV);
    assert_eq!(svc.state(), ChargeState::RelayOpen);
    assert!(!hw.contacts_closed());
    assert!(!svc.session_active());
    assert!(sink.contains(&AppEvent::ChargingStopped));

    step(&mut svc, &mut hw, &mut sink, &signals, B_MV);
    assert_eq!(svc.state(), ChargeState::CheckRelay);
    assert_eq!(hw.pilot, PilotOutput::Dc);

    run_until(&mut svc, &mut hw, &mut sink, &signals, B_MV, 20, |s| {
        s.event() == Event::CheckRelayPassed
    });
    assert_eq!(hw.pilot, offered());

    run_until(&mut svc, &mut hw, &mut sink, &signals, B_MV, 5, |s| {
        s.event() == Event::WaitB
    });
    assert_eq!(svc.state(), ChargeState::B);
    assert_eq!(svc.fault(), None);
    assert!(!svc.context().rcd_verified);
}

#[test]
fn unplug_while_charging_goes_idle_with_dc_pilot() {
    let signals = InterruptSignals::new();
    let (mut svc, mut hw, mut sink) = charging(&signals, ChargeConfig::default(), C_MV);

    step(&mut svc, &mut hw, &mut sink, &signals, A_MV);
    assert_eq!(svc.state(), ChargeState::RelayOpen);
    assert_eq!(svc.event(), Event::StopCharging);
    assert!(!hw.contacts_closed());

    run_until(&mut svc, &mut hw, &mut sink, &signals, A_MV, 30, |s| {
        s.state() == ChargeState::A
    });
    assert_eq!(svc.fault(), None);
    assert_eq!(hw.pilot, PilotOutput::Dc);
    assert_eq!(svc.indicator_pattern(), IndicatorPattern::Idle);
}

#[test]
fn derating_lowers_offer_while_charging() {
    let signals = InterruptSignals::new();
    let config = ChargeConfig::default();
    let cadence = config.temperature_read_ticks as usize;
    let derated = PilotOutput::for_current_ma(config.derated_current_ma);
    let derate_at = config.derate_temperature_mdeg;
    let release = derate_at - config.temperature_hysteresis_mdeg;
    let (mut svc, mut hw, mut sink) = charging(&signals, config, C_MV);

    hw.temperature_mdeg = derate_at + 1_000;
    run(&mut svc, &mut hw, &mut sink, &signals, C_MV, cadence);
    assert!(svc.context().derated);
    assert_eq!(hw.pilot, derated);
    assert_eq!(svc.event(), Event::Charging);
    assert_eq!(
        svc.indicator_pattern(),
        IndicatorPattern::Charging { derated: true }
    );
    assert!(hw.contacts_closed());

    // Inside the hysteresis band nothing changes.
    hw.temperature_mdeg = release + 1_000;
    run(&mut svc, &mut hw, &mut sink, &signals, C_MV, cadence);
    assert!(svc.context().derated);

    hw.temperature_mdeg = release - 1_000;
    run(&mut svc, &mut hw, &mut sink, &signals, C_MV, cadence);
    assert!(!svc.context().derated);
    assert_eq!(hw.pilot, offered());
}

#[test]
fn telemetry_is_emitted_periodically() {
    let signals = InterruptSignals::new();
    let config = ChargeConfig::default();
    let per_report = (config.telemetry_interval_ms / u64::from(config.tick_ms)) as usize;
    let (mut svc, mut hw, mut sink) = booted(&signals, config);
    run(&mut svc, &mut hw, &mut sink, &signals, A_MV, 3 * per_report);

    let reports = sink.count_matching(|e| matches!(e, AppEvent::Telemetry(_)));
    assert!((2..=3).contains(&reports), "{reports} reports");
    let last = sink
        .events
        .iter()
        .rev()
        .find_map(|e| match e {
            AppEvent::Telemetry(t) => Some(t.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(last.state, ChargeState::A);
    assert_eq!(last.v1_max_mv, 325_325);
    assert!(!last.relay_closed);
    assert_eq!(last.fault, None);
}

#[test]
fn relay_never_closes_without_both_checks() {
    let signals = InterruptSignals::new();
    let (mut svc, mut hw, mut sink) = booted(&signals, ChargeConfig::default());
    let levels = [A_MV, B_MV, C_MV, B_MV, D_MV, A_MV, C_MV];
    for (i, level) in levels.iter().cycle().take(700).enumerate() {
        // Dwell on each level for a varying number of ticks.
        for _ in 0..(i % 7 + 1) * 5 {
            step(&mut svc, &mut hw, &mut sink, &signals, *level);
            if svc.relay_closed() {
                let ctx = svc.context();
                assert!(ctx.rcd_verified && ctx.diode_verified);
                assert!(ctx.current_state.is_charging());
            }
        }
    }
}

#[test]
fn charging_led_blinks() {
    let signals = InterruptSignals::new();
    let (mut svc, mut hw, mut sink) = charging(&signals, ChargeConfig::default(), C_MV);
    let mut seen = [false; 2];
    for _ in 0..60 {
        step(&mut svc, &mut hw, &mut sink, &signals, C_MV);
        seen[usize::from(hw.led(Led::Charge))] = true;
    }
    assert_eq!(seen, [true, true]);
}
