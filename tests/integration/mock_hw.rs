//! Mock hardware for integration tests.
//!
//! Models just enough physics to drive a whole session: contacts follow
//! the coil (unless welded or stuck open), the relay side and the load
//! current only appear with the contacts closed, and the RCD detector
//! replays the healthy self-test response after every stimulus.  Every
//! actuator call is recorded so tests can assert on the command history.

#![allow(dead_code)]

use embedded_hal::delay::DelayNs;
use evsecore::app::events::AppEvent;
use evsecore::app::ports::{ActuatorPort, EventSink, MeteringPort, RcdPort, TemperaturePort};
use evsecore::app::service::{BootOutcome, ChargeService};
use evsecore::config::ChargeConfig;
use evsecore::drivers::{Led, PilotOutput, RelayState};
use evsecore::error::{ActuatorError, Result, SensorError};
use evsecore::events::Event;
use evsecore::fsm::ChargeState;
use evsecore::irq::InterruptSignals;
use evsecore::rcd::RcdOutputs;
use evsecore::sensors::pilot::PILOT_AVG_DEPTH;
use evsecore::sensors::supply::{MeteringChannel, RawWaveforms, ZeroCrossEdge};

/// Pilot high plateaus in the middle of each band.
pub const A_MV: i32 = 12_000;
pub const B_MV: i32 = 9_000;
pub const C_MV: i32 = 6_000;
pub const D_MV: i32 = 3_000;
/// Low plateau with the vehicle diode present.
pub const DIODE_LOW_MV: i32 = -12_000;

/// Nominal 230 V line in front-end millivolts (×1001 after scaling).
pub const LINE_230_FE_MV: i32 = 325;
pub const LINE_120_FE_MV: i32 = 170;

// ── Call record ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwCall {
    RelayOpen,
    RelayClose,
    SetPilot(PilotOutput),
    Led(Led, bool),
    LedToggle(Led),
    RcdStimulus(bool),
    RcdIrq(bool),
    DataReadyIrq(bool),
    ZeroCrossIrq(bool),
    NormalMode,
}

// ── MockHardware ──────────────────────────────────────────────

pub struct MockHardware {
    pub calls: Vec<HwCall>,

    // Relay
    pub coil_closed: bool,
    pub welded: bool,
    pub stuck_open: bool,
    pub fail_relay_close: bool,

    // Pilot
    pub pilot: PilotOutput,
    pub fail_pilot: bool,

    // LEDs (power, charge, fault)
    pub leds: [bool; 3],

    // Metering
    pub line_fe_mv: i32,
    /// Switch the line to `.1` after `.0` waveform reads.
    pub line_after: Option<(usize, i32)>,
    pub load_ma: i32,
    /// Current seen with the contacts open (leakage past the relay).
    pub idle_current_ma: i32,
    pub waveform_reads: usize,
    pub fail_metering: bool,

    // RCD
    pub rcd_reads: usize,
    pub rcd_dead: bool,
    pub rcd_override: Option<RcdOutputs>,
    pub rcd_stimulus: bool,

    // Temperature
    pub temperature_mdeg: i32,
}

impl MockHardware {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            coil_closed: false,
            welded: false,
            stuck_open: false,
            fail_relay_close: false,
            pilot: PilotOutput::Dc,
            fail_pilot: false,
            leds: [false; 3],
            line_fe_mv: LINE_230_FE_MV,
            line_after: None,
            load_ma: 0,
            idle_current_ma: 0,
            waveform_reads: 0,
            fail_metering: false,
            rcd_reads: 0,
            rcd_dead: false,
            rcd_override: None,
            rcd_stimulus: false,
            temperature_mdeg: 25_000,
        }
    }

    pub fn contacts_closed(&self) -> bool {
        self.welded || (self.coil_closed && !self.stuck_open)
    }

    pub fn led(&self, led: Led) -> bool {
        self.leds[led_index(led)]
    }

    pub fn count(&self, call: HwCall) -> usize {
        self.calls.iter().filter(|c| **c == call).count()
    }

    pub fn last_pilot(&self) -> Option<PilotOutput> {
        self.calls.iter().rev().find_map(|c| match c {
            HwCall::SetPilot(p) => Some(*p),
            _ => None,
        })
    }
}

impl Default for MockHardware {
    fn default() -> Self {
        Self::new()
    }
}

fn led_index(led: Led) -> usize {
    match led {
        Led::Power => 0,
        Led::Charge => 1,
        Led::Fault => 2,
    }
}

impl ActuatorPort for MockHardware {
    fn relay_open(&mut self) -> Result<()> {
        self.calls.push(HwCall::RelayOpen);
        self.coil_closed = false;
        Ok(())
    }

    fn relay_close(&mut self) -> Result<()> {
        if self.fail_relay_close {
            return Err(ActuatorError::RelayWriteFailed.into());
        }
        self.calls.push(HwCall::RelayClose);
        self.coil_closed = true;
        Ok(())
    }

    fn relay_read_state(&mut self) -> Result<RelayState> {
        Ok(if self.contacts_closed() {
            RelayState::Closed
        } else {
            RelayState::Open
        })
    }

    fn set_pilot(&mut self, output: PilotOutput) -> Result<()> {
        if self.fail_pilot {
            return Err(ActuatorError::PwmWriteFailed.into());
        }
        self.calls.push(HwCall::SetPilot(output));
        self.pilot = output;
        Ok(())
    }

    fn led_on(&mut self, led: Led) -> Result<()> {
        self.calls.push(HwCall::Led(led, true));
        self.leds[led_index(led)] = true;
        Ok(())
    }

    fn led_off(&mut self, led: Led) -> Result<()> {
        self.calls.push(HwCall::Led(led, false));
        self.leds[led_index(led)] = false;
        Ok(())
    }

    fn led_toggle(&mut self, led: Led) -> Result<()> {
        self.calls.push(HwCall::LedToggle(led));
        self.leds[led_index(led)] = !self.leds[led_index(led)];
        Ok(())
    }
}

impl RcdPort for MockHardware {
    fn set_test_stimulus(&mut self, active: bool) -> Result<()> {
        self.calls.push(HwCall::RcdStimulus(active));
        if active {
            self.rcd_reads = 0;
        }
        self.rcd_stimulus = active;
        Ok(())
    }

    fn read_outputs(&mut self) -> Result<RcdOutputs> {
        if let Some(out) = self.rcd_override {
            return Ok(out);
        }
        if self.rcd_dead {
            return Ok(RcdOutputs::default());
        }
        // Healthy response to a released stimulus, one read per sample.
        let out = match self.rcd_reads % 3 {
            0 => RcdOutputs { dc: false, ac: true },
            1 => RcdOutputs { dc: true, ac: true },
            _ => RcdOutputs { dc: false, ac: false },
        };
        self.rcd_reads += 1;
        Ok(out)
    }

    fn set_irq_enabled(&mut self, enabled: bool) {
        self.calls.push(HwCall::RcdIrq(enabled));
    }
}

impl MeteringPort for MockHardware {
    fn read_waveforms(&mut self) -> Result<RawWaveforms> {
        if self.fail_metering {
            return Err(SensorError::MeteringReadFailed.into());
        }
        self.waveform_reads += 1;
        if let Some((after, line)) = self.line_after {
            if self.waveform_reads > after {
                self.line_fe_mv = line;
                self.line_after = None;
            }
        }
        let closed = self.contacts_closed();
        Ok(RawWaveforms {
            current: if closed { self.load_ma } else { self.idle_current_ma },
            line: self.line_fe_mv,
            relay: if closed { self.line_fe_mv } else { 0 },
        })
    }

    fn convert_to_millivolts(&self, _channel: MeteringChannel, raw: i32) -> i32 {
        raw
    }

    fn set_data_ready_irq(&mut self, enabled: bool) -> Result<()> {
        self.calls.push(HwCall::DataReadyIrq(enabled));
        Ok(())
    }

    fn set_zero_cross_irq(&mut self, enabled: bool) -> Result<()> {
        self.calls.push(HwCall::ZeroCrossIrq(enabled));
        Ok(())
    }

    fn set_normal_mode(&mut self) -> Result<()> {
        self.calls.push(HwCall::NormalMode);
        Ok(())
    }

    fn select_zero_crossing(&mut self, _: MeteringChannel, _: ZeroCrossEdge) -> Result<()> {
        Ok(())
    }
}

impl TemperaturePort for MockHardware {
    fn read_temperature_mdeg(&mut self) -> Result<i32> {
        Ok(self.temperature_mdeg)
    }
}

// ── MockDelay ─────────────────────────────────────────────────

/// Sleeps in simulated time and raises a zero crossing every 10 ms.
pub struct MockDelay<'a> {
    signals: &'a InterruptSignals,
    pub elapsed_ms: u64,
    pub mains_present: bool,
}

impl<'a> MockDelay<'a> {
    pub fn new(signals: &'a InterruptSignals) -> Self {
        Self {
            signals,
            elapsed_ms: 0,
            mains_present: true,
        }
    }

    fn advance(&mut self, ms: u64) {
        for _ in 0..ms {
            self.elapsed_ms += 1;
            if self.mains_present && self.elapsed_ms % 10 == 0 {
                self.signals.supply.on_zero_cross();
            }
        }
    }
}

impl DelayNs for MockDelay<'_> {
    fn delay_ns(&mut self, ns: u32) {
        self.advance(u64::from(ns / 1_000_000));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.advance(u64::from(ms));
    }
}

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, event: &AppEvent) -> bool {
        self.events.contains(event)
    }

    pub fn count_matching(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Rig helpers ───────────────────────────────────────────────

/// Fill both pilot rings with one plateau pair, as a few PWM periods of
/// interrupts would.
pub fn feed_pilot(signals: &InterruptSignals, config: &ChargeConfig, high_mv: i32, low_mv: i32) {
    let high = config.pilot_adc.to_raw(high_mv);
    let low = config.pilot_adc.to_raw(low_mv);
    for _ in 0..PILOT_AVG_DEPTH {
        signals.pilot.on_mid_period(high);
        signals.pilot.on_low_edge(low);
    }
}

/// Boot against healthy mock hardware.
pub fn booted<'a>(
    signals: &'a InterruptSignals,
    config: ChargeConfig,
) -> (ChargeService<'a>, MockHardware, RecordingSink) {
    let mut svc = ChargeService::new(config, signals);
    let mut hw = MockHardware::new();
    let mut sink = RecordingSink::new();
    let mut delay = MockDelay::new(signals);
    let outcome = svc.boot(&mut hw, &mut delay, &mut sink).unwrap();
    assert_eq!(outcome, BootOutcome::Ready);
    (svc, hw, sink)
}

/// One tick with the given pilot level and one metering sample.
pub fn step(
    svc: &mut ChargeService<'_>,
    hw: &mut MockHardware,
    sink: &mut RecordingSink,
    signals: &InterruptSignals,
    high_mv: i32,
) {
    let config = svc.context().config.clone();
    feed_pilot(signals, &config, high_mv, DIODE_LOW_MV);
    signals.supply.poll_front_end(hw).unwrap();
    svc.tick(hw, sink);
}

pub fn run(
    svc: &mut ChargeService<'_>,
    hw: &mut MockHardware,
    sink: &mut RecordingSink,
    signals: &InterruptSignals,
    high_mv: i32,
    ticks: usize,
) {
    for _ in 0..ticks {
        step(svc, hw, sink, signals, high_mv);
    }
}

/// Tick until `done` holds; panics after `max_ticks`.
pub fn run_until(
    svc: &mut ChargeService<'_>,
    hw: &mut MockHardware,
    sink: &mut RecordingSink,
    signals: &InterruptSignals,
    high_mv: i32,
    max_ticks: usize,
    done: impl Fn(&ChargeService<'_>) -> bool,
) -> usize {
    for n in 1..=max_ticks {
        step(svc, hw, sink, signals, high_mv);
        if done(svc) {
            return n;
        }
    }
    panic!(
        "condition not reached in {max_ticks} ticks (state {:?}, event {:?})",
        svc.state(),
        svc.event()
    );
}

/// Boot, plug in and start a session in `C` (or `D` with `D_MV`).
pub fn charging<'a>(
    signals: &'a InterruptSignals,
    config: ChargeConfig,
    request_mv: i32,
) -> (ChargeService<'a>, MockHardware, RecordingSink) {
    let (mut svc, mut hw, mut sink) = booted(signals, config);
    run_until(&mut svc, &mut hw, &mut sink, signals, A_MV, 5, |s| {
        s.state() == ChargeState::A
    });
    run_until(&mut svc, &mut hw, &mut sink, signals, B_MV, 200, |s| {
        s.event() == Event::WaitB
    });
    run_until(&mut svc, &mut hw, &mut sink, signals, request_mv, 300, |s| {
        s.event().is_charging()
    });
    (svc, hw, sink)
}
