//! Charge service: the hexagonal core.
//!
//! [`ChargeService`] owns the state machine, its context, the RCD
//! sequencer and the indicator engine.  Interrupt handlers feed the shared
//! [`InterruptSignals`]; everything else flows through port traits
//! injected at call sites, so the whole control loop runs against mock
//! adapters in tests.
//!
//! ```text
//!  InterruptSignals ──▶ ┌───────────────────────────────┐ ──▶ EventSink
//!                       │         ChargeService         │
//!    TemperaturePort ──▶│  classify · FSM · RCD · LEDs  │
//!   ActuatorPort/Rcd ◀──└───────────────────────────────┘
//! ```
//!
//! One [`tick`](ChargeService::tick) runs every `tick_ms`:
//!
//! 1. pilot averages and pilot classification,
//! 2. supply window and supply classification (every `supply_window_ticks`),
//! 3. temperature read and classification (at its cadence),
//! 4. relay read-back, PE and RCD interrupt flags,
//! 5. the RCD self-test while in `RcdSelfTest`,
//! 6. state handlers, then their actions applied to the hardware.

use anyhow::{Context, bail};
use embedded_hal::delay::DelayNs;
use log::{debug, error, info, warn};

use crate::classify::{classify_pilot, classify_supply, classify_temperature};
use crate::config::ChargeConfig;
use crate::drivers::{IndicatorEngine, IndicatorPattern, Led, LedFrame, PilotOutput, RelayState};
use crate::error::{Error, FaultKind};
use crate::events::Event;
use crate::fsm::context::ControllerContext;
use crate::fsm::{Action, ActionList, ChargeState, Fsm, Resolution};
use crate::irq::InterruptSignals;
use crate::rcd::RcdSequencer;
use crate::sensors::supply::{MeteringChannel, RmsEstimator, ZeroCrossEdge};
use crate::sensors::{Plateau, TemperatureMonitor};

use super::events::{AppEvent, TelemetryData};
use super::ports::{ActuatorPort, EventSink, MeteringPort, RcdPort, TemperaturePort};

/// Upper bound on the wait for the first zero crossing after boot.
const ZERO_CROSS_TIMEOUT_MS: u32 = 100;

/// Action batches applied per tick: the resolved one plus one follow-up
/// when applying it raised a fault.
const MAX_APPLY_PASSES: usize = 2;

/// Result of [`ChargeService::boot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOutcome {
    /// Self-tests passed; the machine starts in `PowerOn`.
    Ready,
    /// A self-test failed and the machine sits in `Fault`.
    Faulted(FaultKind),
}

/// Peak and RMS of the boot supply measurement.
#[derive(Debug, Clone, Copy)]
struct BootSupply {
    v1_peak_mv: i32,
    v2_peak_mv: i32,
    /// Largest unscaled front-end line sample, seeds the RMS estimate.
    v1_front_end_peak: i32,
}

// ───────────────────────────────────────────────────────────────
// ChargeService
// ───────────────────────────────────────────────────────────────

pub struct ChargeService<'a> {
    signals: &'a InterruptSignals,
    fsm: Fsm,
    ctx: ControllerContext,
    rcd: RcdSequencer,
    temperature: TemperatureMonitor,
    indicator: IndicatorEngine,
    /// Levels last written to the LEDs, `None` until the first write.
    leds: Option<LedFrame>,
    /// Event carried between ticks.
    event: Event,
    tick_count: u64,
    ticks_in_window: u32,
    last_telemetry_ms: u64,
    /// Between `StartCharging` and `StopCharging`.
    session_active: bool,
}

impl<'a> ChargeService<'a> {
    /// Construct the service.  Nothing touches hardware until
    /// [`boot`](Self::boot).
    pub fn new(config: ChargeConfig, signals: &'a InterruptSignals) -> Self {
        let rcd = RcdSequencer::new(config.rcd);
        let temperature = TemperatureMonitor::new(config.temperature_read_ticks);
        Self {
            signals,
            fsm: Fsm::default(),
            ctx: ControllerContext::new(config),
            rcd,
            temperature,
            indicator: IndicatorEngine::new(),
            leds: None,
            event: Event::Wait,
            tick_count: 0,
            ticks_in_window: 0,
            last_telemetry_ms: 0,
            session_active: false,
        }
    }

    // ── Boot ──────────────────────────────────────────────────

    /// Power-on self-tests, then start the machine in `PowerOn`.
    ///
    /// A failed self-test is not an error: the machine is put in the
    /// matching latched fault and [`BootOutcome::Faulted`] is returned.
    /// `Err` means a port could not be driven at all.
    ///
    /// An undervoltage supply blocks here, re-checking every
    /// `startup_retry_delay_ms`, until it recovers.
    pub fn boot(
        &mut self,
        hw: &mut (impl ActuatorPort + RcdPort + MeteringPort + TemperaturePort),
        delay: &mut impl DelayNs,
        sink: &mut impl EventSink,
    ) -> anyhow::Result<BootOutcome> {
        self.ctx
            .config
            .validate()
            .map_err(Error::from)
            .context("invalid charge configuration")?;
        info!("boot: starting self-tests");
        self.indicator.show(IndicatorPattern::Booting);
        self.refresh_indicator(hw, 0);

        // Safe outputs first.
        hw.relay_open().context("opening relay")?;
        self.ctx.relay_closed_flag = false;
        hw.set_pilot(PilotOutput::Dc).context("forcing pilot to DC")?;
        self.ctx.pilot_output = PilotOutput::Dc;

        hw.set_normal_mode().context("metering front end: normal mode")?;
        hw.select_zero_crossing(MeteringChannel::LineVoltage, ZeroCrossEdge::Rising)
            .context("metering front end: zero-crossing source")?;
        hw.set_zero_cross_irq(true)
            .context("metering front end: zero-crossing interrupt")?;

        // ── Supply ──
        let supply = match self.boot_supply_test(hw, delay)? {
            Ok(supply) => supply,
            Err(kind) => return Ok(self.fail_boot(hw, sink, kind)),
        };

        // ── Relay contacts ──
        let read_back = hw.relay_read_state().context("reading relay state")?;
        if supply.v2_peak_mv > self.ctx.config.relay_stuck_threshold_mv
            || read_back == RelayState::Closed
        {
            warn!(
                "boot: relay side live ({} mV) or contact reads {:?}",
                supply.v2_peak_mv, read_back
            );
            return Ok(self.fail_boot(hw, sink, FaultKind::RelayError));
        }

        // ── RCD ──
        if let Err(failure) = self.rcd.run_blocking(hw, delay, self.ctx.uptime_ms) {
            warn!("boot: RCD self-test failed at step {}", failure.step);
            return Ok(self.fail_boot(hw, sink, FaultKind::RcdInitError));
        }
        self.ctx.uptime_ms = self.rcd.last_pass_ms().unwrap_or(self.ctx.uptime_ms);

        let v1_rms_mv = self.estimate_rms(hw, supply)?;

        // ── Zero crossing ──
        let signals = self.signals;
        let start = signals.supply.zero_cross_count();
        let mut waited = 0;
        while signals.supply.zero_cross_count() == start {
            if waited >= ZERO_CROSS_TIMEOUT_MS {
                bail!("no mains zero crossing within {ZERO_CROSS_TIMEOUT_MS} ms");
            }
            delay.delay_ms(1);
            waited += 1;
        }
        hw.set_zero_cross_irq(false)
            .context("metering front end: zero-crossing interrupt")?;
        hw.set_data_ready_irq(true)
            .context("metering front end: data-ready interrupt")?;

        // ── Hand over to the tick loop ──
        hw.set_pilot(PilotOutput::Dc).context("forcing pilot to DC")?;
        signals.clear_rcd_trip();
        signals.pilot.reset();
        signals.supply.take_window(&self.ctx.config);

        self.ctx.current_state = ChargeState::PowerOn;
        self.ctx.previous_state = ChargeState::RcdSelfTest;
        self.ctx.reset_timer();
        self.event = Event::InitialCheckDone;
        let actions = self.fsm.start(&mut self.ctx);
        let event = self.apply(
            hw,
            Resolution {
                event: self.event,
                actions,
            },
            sink,
        );
        self.event = event;
        self.refresh_indicator(hw, 0);

        info!(
            "boot: self-tests passed, {:?} grid, peak {} mV, rms {} mV",
            self.ctx.grid_variant, supply.v1_peak_mv, v1_rms_mv
        );
        sink.emit(&AppEvent::Booted {
            grid: self.ctx.grid_variant,
            v1_peak_mv: supply.v1_peak_mv,
            v1_rms_mv,
        });
        Ok(BootOutcome::Ready)
    }

    /// Measure the line until it is inside the grid limits.  The inner
    /// `Err` carries the fault a bad supply latches.
    fn boot_supply_test(
        &mut self,
        hw: &mut (impl ActuatorPort + MeteringPort),
        delay: &mut impl DelayNs,
    ) -> anyhow::Result<Result<BootSupply, FaultKind>> {
        let mut grid_detected = false;
        let mut waiting = false;
        loop {
            let supply = self.measure_supply(hw)?;
            if !grid_detected {
                self.ctx.grid_variant = self.ctx.config.detect_grid(supply.v1_peak_mv);
                grid_detected = true;
                info!(
                    "boot: {:?} grid detected (peak {} mV)",
                    self.ctx.grid_variant, supply.v1_peak_mv
                );
            }

            let limits = self.ctx.config.voltage_limits(self.ctx.grid_variant);
            if supply.v1_peak_mv > limits.high_mv {
                warn!("boot: line overvoltage, peak {} mV", supply.v1_peak_mv);
                return Ok(Err(FaultKind::InputOvervoltage));
            }
            if supply.v1_peak_mv >= limits.low_mv {
                if waiting {
                    info!("boot: line recovered, peak {} mV", supply.v1_peak_mv);
                    self.indicator.show(IndicatorPattern::Booting);
                }
                return Ok(Ok(supply));
            }

            if !waiting {
                warn!(
                    "boot: line undervoltage, peak {} mV, waiting",
                    supply.v1_peak_mv
                );
                self.indicator
                    .show(IndicatorPattern::Fault(FaultKind::InputUndervoltage));
                waiting = true;
            }
            let retry_ms = self.ctx.config.startup_retry_delay_ms;
            delay.delay_ms(retry_ms);
            self.refresh_indicator(hw, retry_ms);
        }
    }

    /// Poll `startup_supply_samples` sample sets and return their peaks.
    fn measure_supply(&mut self, hw: &mut impl MeteringPort) -> anyhow::Result<BootSupply> {
        let signals = self.signals;
        signals.supply.take_window(&self.ctx.config);
        let mut front_end_peak = 0;
        for _ in 0..self.ctx.config.startup_supply_samples {
            let sample = signals
                .supply
                .poll_front_end(hw)
                .context("reading metering waveforms")?;
            front_end_peak = front_end_peak.max(sample.v1_mv);
        }
        let window = signals.supply.take_window(&self.ctx.config);
        debug!(
            "boot: {} samples, v1 {} mV, v2 {} mV",
            window.samples, window.v1_max_mv, window.v2_max_mv
        );
        Ok(BootSupply {
            v1_peak_mv: window.v1_max_mv,
            v2_peak_mv: window.v2_max_mv,
            v1_front_end_peak: front_end_peak,
        })
    }

    /// RMS of the line over four windows, seeded from the measured peak.
    fn estimate_rms(
        &mut self,
        hw: &mut impl MeteringPort,
        supply: BootSupply,
    ) -> anyhow::Result<i32> {
        let samples = self.ctx.config.startup_supply_samples;
        let seed = u64::from(supply.v1_front_end_peak.unsigned_abs()) * 707 / 1000;
        let mut rms = RmsEstimator::seeded(samples / 4, seed);
        for _ in 0..samples {
            let sample = self
                .signals
                .supply
                .poll_front_end(hw)
                .context("reading metering waveforms")?;
            rms.push(sample.v1_mv);
        }
        self.signals.supply.take_window(&self.ctx.config);
        let front_end_rms = i32::try_from(rms.rms()).unwrap_or(i32::MAX);
        Ok(self.ctx.config.line_scaling.apply(front_end_rms))
    }

    fn fail_boot(
        &mut self,
        hw: &mut impl ActuatorPort,
        sink: &mut impl EventSink,
        kind: FaultKind,
    ) -> BootOutcome {
        error!("boot: self-test failed: {kind}");
        self.ctx.enter_fault(kind);
        let actions = self.fsm.start(&mut self.ctx);
        let event = self.apply(
            hw,
            Resolution {
                event: fault_event(kind),
                actions,
            },
            sink,
        );
        self.event = event;
        self.refresh_indicator(hw, 0);
        sink.emit(&AppEvent::FaultRaised(kind));
        BootOutcome::Faulted(kind)
    }

    // ── Tick ──────────────────────────────────────────────────

    /// Run one control tick.
    pub fn tick(
        &mut self,
        hw: &mut (impl ActuatorPort + RcdPort + TemperaturePort),
        sink: &mut impl EventSink,
    ) {
        self.tick_count += 1;
        let tick_ms = self.ctx.config.tick_ms;
        self.ctx.advance(tick_ms);

        let prev_state = self.ctx.current_state;
        let prev_fault = self.ctx.fault;

        // A latched fault freezes the control path; only the indicator
        // and telemetry keep running.
        if !self.ctx.fault_latched() {
            self.control_step(hw, sink);
        }

        self.refresh_indicator(hw, tick_ms);
        self.report(prev_state, prev_fault, sink);
    }

    fn control_step(
        &mut self,
        hw: &mut (impl ActuatorPort + RcdPort + TemperaturePort),
        sink: &mut impl EventSink,
    ) {
        let signals = self.signals;
        let mut event = self.event;

        // ── Pilot ──
        if signals.pilot.take_ready() {
            let transfer = &self.ctx.config.pilot_adc;
            self.ctx.pwm_high_mv = signals.pilot.compute_average(Plateau::High, transfer);
            self.ctx.pwm_low_mv = signals.pilot.compute_average(Plateau::Low, transfer);
        }
        if self.ctx.current_state != ChargeState::Fault
            && !event.suspends_pilot_classification()
        {
            event = classify_pilot(&mut self.ctx, event);
        }

        // ── Supply ──
        self.ticks_in_window += 1;
        if self.ticks_in_window >= self.ctx.config.supply_window_ticks {
            self.ticks_in_window = 0;
            let window = signals.supply.take_window(&self.ctx.config);
            self.ctx.v1_max_mv = window.v1_max_mv;
            self.ctx.v2_max_mv = window.v2_max_mv;
            self.ctx.i_max_ma = window.i_max_ma;
            if self.ctx.relay_check.is_active() {
                if let Some(avg) = self.ctx.relay_check.push(window.v2_max_mv) {
                    debug!("relay check: relay-side average {} mV", avg);
                    self.ctx.relay_v2_avg_mv = Some(avg);
                }
            }
            event = classify_supply(&mut self.ctx, event);
        }

        // ── Temperature ──
        if let Some(mdeg) = self.temperature.poll(hw) {
            self.ctx.temperature_mdeg = mdeg;
            event = classify_temperature(&mut self.ctx, event);
        }

        // ── Relay read-back ──
        match hw.relay_read_state() {
            Ok(state) => self.ctx.relay_feedback_closed = state == RelayState::Closed,
            Err(e) => warn!("relay read-back failed: {e}"),
        }

        // ── Protective earth ──
        if signals.pe_upstream_pending() && self.ctx.enter_fault(FaultKind::PeUpstreamError) {
            event = Event::PeUpstreamFault;
        }

        // ── RCD trip ──
        if signals.rcd_trip_pending() {
            if self.ctx.previous_state == ChargeState::RelayOpen {
                // Contact bounce while opening under load.
                debug!("rcd: trip while relay opening, ignored");
                signals.clear_rcd_trip();
            } else {
                let tripped = match hw.read_outputs() {
                    Ok(outputs) => outputs.any_active(),
                    Err(e) => {
                        warn!("rcd: cannot read detector ({e}), treating as trip");
                        true
                    }
                };
                if tripped {
                    if self.ctx.enter_fault(FaultKind::RcdError) {
                        event = Event::RcdTripped;
                    }
                } else {
                    debug!("rcd: spurious edge, detector outputs idle");
                    signals.clear_rcd_trip();
                }
            }
        }

        // ── RCD self-test ──
        if self.ctx.current_state == ChargeState::RcdSelfTest {
            event = self.rcd.poll(&mut self.ctx, event, hw);
        }

        // ── State handlers ──
        let resolution = self.fsm.resolve(&mut self.ctx, event);
        event = self.apply(hw, resolution, sink);

        if self.rcd.is_running() && self.ctx.current_state != ChargeState::RcdSelfTest {
            self.rcd.abort(hw);
        }
        self.event = event;
    }

    /// Apply resolved actions.  A relay or pilot write failure latches the
    /// matching fault and the fault's own actions are applied next.
    fn apply(
        &mut self,
        hw: &mut impl ActuatorPort,
        resolution: Resolution,
        sink: &mut impl EventSink,
    ) -> Event {
        let mut event = resolution.event;
        let mut pending: ActionList = resolution.actions;

        for _ in 0..MAX_APPLY_PASSES {
            let mut failed: Option<FaultKind> = None;
            for action in &pending {
                match *action {
                    Action::OpenRelay => {
                        if let Err(e) = hw.relay_open() {
                            error!("relay open failed: {e}");
                            failed.get_or_insert(FaultKind::RelayError);
                        }
                    }
                    Action::CloseRelay => {
                        if let Err(e) = hw.relay_close() {
                            error!("relay close failed: {e}");
                            failed.get_or_insert(FaultKind::RelayError);
                        }
                    }
                    Action::SetPilot(output) => {
                        if let Err(e) = hw.set_pilot(output) {
                            error!("pilot output {:?} failed: {e}", output);
                            failed.get_or_insert(FaultKind::PilotError);
                        }
                    }
                    Action::StartCharging => {
                        self.session_active = true;
                        info!("charging started, {} mA offered", self.ctx.offered_current_ma);
                        sink.emit(&AppEvent::ChargingStarted {
                            offered_ma: self.ctx.offered_current_ma,
                        });
                    }
                    Action::StopCharging => {
                        if self.session_active {
                            self.session_active = false;
                            info!("charging stopped");
                            sink.emit(&AppEvent::ChargingStopped);
                        }
                    }
                    Action::Display(pattern) => self.indicator.show(pattern),
                }
            }

            match failed {
                Some(kind) if self.ctx.enter_fault(kind) => {
                    let next = self.fsm.resolve(&mut self.ctx, fault_event(kind));
                    event = next.event;
                    pending = next.actions;
                }
                _ => break,
            }
        }
        event
    }

    /// Advance the indicator and write LEDs whose level changed.
    fn refresh_indicator(&mut self, hw: &mut impl ActuatorPort, delta_ms: u32) {
        let frame = self.indicator.tick(delta_ms);
        let previous = self.leds;
        for (led, on, was) in [
            (Led::Power, frame.power, previous.map(|f| f.power)),
            (Led::Charge, frame.charge, previous.map(|f| f.charge)),
            (Led::Fault, frame.fault, previous.map(|f| f.fault)),
        ] {
            if was == Some(on) {
                continue;
            }
            let written = if on { hw.led_on(led) } else { hw.led_off(led) };
            if let Err(e) = written {
                warn!("LED {:?} write failed: {e}", led);
            }
        }
        self.leds = Some(frame);
    }

    fn report(
        &mut self,
        prev_state: ChargeState,
        prev_fault: Option<FaultKind>,
        sink: &mut impl EventSink,
    ) {
        if self.ctx.current_state != prev_state {
            sink.emit(&AppEvent::StateChanged {
                from: prev_state,
                to: self.ctx.current_state,
            });
        }
        if self.ctx.fault != prev_fault {
            match (prev_fault, self.ctx.fault) {
                (_, Some(kind)) => sink.emit(&AppEvent::FaultRaised(kind)),
                (Some(kind), None) => sink.emit(&AppEvent::FaultCleared(kind)),
                (None, None) => {}
            }
        }

        let interval = self.ctx.config.telemetry_interval_ms;
        if self.ctx.uptime_ms.saturating_sub(self.last_telemetry_ms) >= interval {
            self.last_telemetry_ms = self.ctx.uptime_ms;
            sink.emit(&AppEvent::Telemetry(self.build_telemetry()));
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> ChargeState {
        self.ctx.current_state
    }

    pub fn fault(&self) -> Option<FaultKind> {
        self.ctx.fault
    }

    /// Commanded relay position.
    pub fn relay_closed(&self) -> bool {
        self.ctx.relay_closed_flag
    }

    pub fn event(&self) -> Event {
        self.event
    }

    pub fn session_active(&self) -> bool {
        self.session_active
    }

    pub fn last_rcd_pass_ms(&self) -> Option<u64> {
        self.rcd.last_pass_ms()
    }

    pub fn indicator_pattern(&self) -> IndicatorPattern {
        self.indicator.pattern()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn context(&self) -> &ControllerContext {
        &self.ctx
    }

    pub fn build_telemetry(&self) -> TelemetryData {
        TelemetryData {
            state: self.ctx.current_state,
            event: self.event,
            pwm_high_mv: self.ctx.pwm_high_mv,
            pwm_low_mv: self.ctx.pwm_low_mv,
            v1_max_mv: self.ctx.v1_max_mv,
            i_max_ma: self.ctx.i_max_ma,
            temperature_mdeg: self.ctx.temperature_mdeg,
            offered_current_ma: self.ctx.offered_current_ma,
            relay_closed: self.ctx.relay_closed_flag,
            fault: self.ctx.fault,
            uptime_ms: self.ctx.uptime_ms,
        }
    }
}

/// Event reported alongside a fault raised outside the classifiers.
fn fault_event(kind: FaultKind) -> Event {
    match kind {
        FaultKind::RelayError => Event::RelayFault,
        FaultKind::PilotError => Event::PilotFault,
        FaultKind::RcdError => Event::RcdTripped,
        FaultKind::RcdInitError => Event::RcdTestFail,
        FaultKind::InputOvervoltage => Event::Overvoltage,
        FaultKind::InputUndervoltage => Event::Undervoltage,
        FaultKind::OvercurrentError => Event::Overcurrent,
        FaultKind::PeUpstreamError => Event::PeUpstreamFault,
        FaultKind::DiodeError => Event::DiodeError,
        FaultKind::OvertemperatureError => Event::Overtemperature,
        FaultKind::PeError => Event::PeFault,
    }
}
