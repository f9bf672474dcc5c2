//! Boot self-test sequence: supply, relay, RCD, zero crossing.

use crate::mock_hw::{
    HwCall, LINE_120_FE_MV, MockDelay, MockHardware, RecordingSink, booted,
};

use evsecore::app::events::AppEvent;
use evsecore::app::service::{BootOutcome, ChargeService};
use evsecore::config::{ChargeConfig, GridVariant};
use evsecore::drivers::{Led, PilotOutput};
use evsecore::error::FaultKind;
use evsecore::events::Event;
use evsecore::fsm::ChargeState;
use evsecore::irq::InterruptSignals;

fn boot_with<'a>(
    signals: &'a InterruptSignals,
    hw: &mut MockHardware,
    config: ChargeConfig,
) -> (anyhow::Result<BootOutcome>, ChargeService<'a>, RecordingSink, u64) {
    let mut svc = ChargeService::new(config, signals);
    let mut sink = RecordingSink::new();
    let mut delay = MockDelay::new(signals);
    let outcome = svc.boot(hw, &mut delay, &mut sink);
    let elapsed = delay.elapsed_ms;
    (outcome, svc, sink, elapsed)
}

#[test]
fn healthy_boot_starts_in_power_on() {
    let signals = InterruptSignals::new();
    let (svc, hw, sink) = booted(&signals, ChargeConfig::default());

    assert_eq!(svc.state(), ChargeState::PowerOn);
    assert_eq!(svc.event(), Event::InitialCheckDone);
    assert_eq!(svc.fault(), None);
    assert!(!svc.relay_closed());
    assert!(!hw.contacts_closed());
    assert_eq!(hw.pilot, PilotOutput::Dc);

    // RCD test ran and left the line armed, stimulus released.
    assert!(!hw.rcd_stimulus);
    assert_eq!(hw.count(HwCall::RcdStimulus(true)), 1);
    assert_eq!(
        hw.calls.iter().rev().find(|c| matches!(c, HwCall::RcdIrq(_))),
        Some(&HwCall::RcdIrq(true))
    );
    assert_eq!(svc.last_rcd_pass_ms(), Some(2_100));

    // Zero-crossing interrupt only used during boot; data-ready armed.
    let zx: Vec<_> = hw
        .calls
        .iter()
        .filter(|c| matches!(c, HwCall::ZeroCrossIrq(_)))
        .collect();
    assert_eq!(zx, [&HwCall::ZeroCrossIrq(true), &HwCall::ZeroCrossIrq(false)]);
    assert!(hw.calls.contains(&HwCall::DataReadyIrq(true)));
}

#[test]
fn boot_reports_grid_peak_and_rms() {
    let signals = InterruptSignals::new();
    let (_svc, _hw, sink) = booted(&signals, ChargeConfig::default());

    let booted = sink
        .events
        .iter()
        .find_map(|e| match e {
            AppEvent::Booted {
                grid,
                v1_peak_mv,
                v1_rms_mv,
            } => Some((*grid, *v1_peak_mv, *v1_rms_mv)),
            _ => None,
        })
        .expect("Booted event");
    assert_eq!(booted.0, GridVariant::Nominal230V);
    assert_eq!(booted.1, 325_325);
    // Constant input: RMS equals the level.
    assert!((booted.2 - 325_325).abs() <= 2_002, "rms {}", booted.2);
}

#[test]
fn low_line_selects_the_120v_grid() {
    let signals = InterruptSignals::new();
    let mut hw = MockHardware::new();
    hw.line_fe_mv = LINE_120_FE_MV;
    let (outcome, svc, _sink, _) = boot_with(&signals, &mut hw, ChargeConfig::default());
    assert_eq!(outcome.unwrap(), BootOutcome::Ready);
    assert_eq!(svc.context().grid_variant, GridVariant::Nominal120V);
}

#[test]
fn overvoltage_latches_fault_at_boot() {
    let signals = InterruptSignals::new();
    let mut hw = MockHardware::new();
    hw.line_fe_mv = 400;
    let (outcome, svc, sink, _) = boot_with(&signals, &mut hw, ChargeConfig::default());

    assert_eq!(
        outcome.unwrap(),
        BootOutcome::Faulted(FaultKind::InputOvervoltage)
    );
    assert_eq!(svc.state(), ChargeState::Fault);
    assert_eq!(hw.pilot, PilotOutput::Off);
    assert!(!hw.contacts_closed());
    assert!(sink.contains(&AppEvent::FaultRaised(FaultKind::InputOvervoltage)));
    // Failed boots skip the remaining self-tests.
    assert_eq!(hw.count(HwCall::RcdStimulus(true)), 0);
}

#[test]
fn undervoltage_blocks_until_line_recovers() {
    let signals = InterruptSignals::new();
    let config = ChargeConfig::default();
    let samples = config.startup_supply_samples as usize;
    let retry = u64::from(config.startup_retry_delay_ms);
    let mut hw = MockHardware::new();
    hw.line_fe_mv = 250;
    hw.line_after = Some((2 * samples, 325));
    let (outcome, svc, _sink, elapsed) = boot_with(&signals, &mut hw, config);

    assert_eq!(outcome.unwrap(), BootOutcome::Ready);
    assert_eq!(svc.context().grid_variant, GridVariant::Nominal230V);
    assert!(elapsed >= 2 * retry);
    // The undervoltage blink code was shown while waiting.
    assert!(hw.calls.contains(&HwCall::Led(Led::Fault, false)));
}

#[test]
fn welded_relay_fails_boot() {
    let signals = InterruptSignals::new();
    let mut hw = MockHardware::new();
    hw.welded = true;
    let (outcome, svc, _sink, _) = boot_with(&signals, &mut hw, ChargeConfig::default());
    assert_eq!(outcome.unwrap(), BootOutcome::Faulted(FaultKind::RelayError));
    assert_eq!(svc.fault(), Some(FaultKind::RelayError));
}

#[test]
fn dead_rcd_fails_boot_and_releases_stimulus() {
    let signals = InterruptSignals::new();
    let mut hw = MockHardware::new();
    hw.rcd_dead = true;
    let (outcome, svc, _sink, _) = boot_with(&signals, &mut hw, ChargeConfig::default());
    assert_eq!(
        outcome.unwrap(),
        BootOutcome::Faulted(FaultKind::RcdInitError)
    );
    assert!(!hw.rcd_stimulus);
    assert_eq!(svc.last_rcd_pass_ms(), None);
    assert_eq!(hw.pilot, PilotOutput::Off);
}

#[test]
fn metering_failure_is_an_error() {
    let signals = InterruptSignals::new();
    let mut hw = MockHardware::new();
    hw.fail_metering = true;
    let (outcome, _svc, _sink, _) = boot_with(&signals, &mut hw, ChargeConfig::default());
    let err = outcome.unwrap_err();
    assert!(format!("{err:#}").contains("metering"), "{err:#}");
}

#[test]
fn missing_zero_crossing_is_an_error() {
    let signals = InterruptSignals::new();
    let mut svc = ChargeService::new(ChargeConfig::default(), &signals);
    let mut hw = MockHardware::new();
    let mut sink = RecordingSink::new();
    let mut delay = MockDelay::new(&signals);
    delay.mains_present = false;
    assert!(svc.boot(&mut hw, &mut delay, &mut sink).is_err());
}

#[test]
fn invalid_config_is_rejected_before_touching_hardware() {
    let signals = InterruptSignals::new();
    let mut config = ChargeConfig::default();
    config.relay_check_windows = 1;
    let mut hw = MockHardware::new();
    let (outcome, _svc, _sink, _) = boot_with(&signals, &mut hw, config);
    assert!(outcome.is_err());
    assert!(hw.calls.is_empty());
}
