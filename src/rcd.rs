//! RCD self-test sequencer.
//!
//! The residual-current detector has a built-in test winding.  Asserting
//! the stimulus and then watching both detector outputs walk through a
//! fixed pattern proves the detector trips and recovers:
//!
//! ```text
//!  t = 0        stimulus asserted, RCD line gated off
//!  step 0       release stimulus
//!  step 1       expect (dc low,  ac high)
//!  step 2       expect (dc high, ac high)
//!  step 3       expect (dc low,  ac low)    → pass, line re-enabled
//! ```
//!
//! Two callers share [`STEPS`]: [`RcdSequencer::run_blocking`] sleeps
//! between steps at boot, and [`RcdSequencer::poll`] advances at most one
//! step per control tick once the step's deadline has elapsed.

use embedded_hal::delay::DelayNs;
use log::{debug, info, warn};

use crate::app::ports::RcdPort;
use crate::config::RcdTiming;
use crate::events::Event;
use crate::fsm::context::ControllerContext;

/// Level of both detector outputs (`true` = high).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RcdOutputs {
    pub dc: bool,
    pub ac: bool,
}

impl RcdOutputs {
    pub fn any_active(self) -> bool {
        self.dc || self.ac
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RcdStep {
    ReleaseStimulus,
    Expect(RcdOutputs),
}

const STEPS: [RcdStep; 4] = [
    RcdStep::ReleaseStimulus,
    RcdStep::Expect(RcdOutputs { dc: false, ac: true }),
    RcdStep::Expect(RcdOutputs { dc: true, ac: true }),
    RcdStep::Expect(RcdOutputs { dc: false, ac: false }),
];

/// Where one deadline-driven step left the test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// No test running.
    Idle,
    /// Waiting for the next deadline.
    Pending,
    Passed,
    Failed,
}

/// The detector responded wrongly, or a port call failed, at `step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RcdTestFailure {
    pub step: usize,
}

pub struct RcdSequencer {
    timing: RcdTiming,
    next_step: Option<usize>,
    skip_until_ms: Option<u64>,
    last_pass_ms: Option<u64>,
}

impl RcdSequencer {
    pub fn new(timing: RcdTiming) -> Self {
        Self {
            timing,
            next_step: None,
            skip_until_ms: None,
            last_pass_ms: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.next_step.is_some()
    }

    /// A pass at `now_ms` would still be inside the skip window.
    pub fn in_cooldown(&self, now_ms: u64) -> bool {
        self.skip_until_ms.is_some_and(|until| now_ms < until)
    }

    pub fn last_pass_ms(&self) -> Option<u64> {
        self.last_pass_ms
    }

    /// Gate the RCD line and assert the stimulus.  Step 0 is next.
    pub fn begin(&mut self, rcd: &mut impl RcdPort) -> Result<(), RcdTestFailure> {
        rcd.set_irq_enabled(false);
        if rcd.set_test_stimulus(true).is_err() {
            self.finish(rcd);
            return Err(RcdTestFailure { step: 0 });
        }
        self.next_step = Some(0);
        debug!("rcd: stimulus asserted");
        Ok(())
    }

    /// Run the next step if `elapsed_ms` since [`begin`](Self::begin) has
    /// reached its deadline.  `now_ms` timestamps a pass.
    pub fn step(&mut self, elapsed_ms: u32, now_ms: u64, rcd: &mut impl RcdPort) -> StepOutcome {
        let Some(idx) = self.next_step else {
            return StepOutcome::Idle;
        };
        if elapsed_ms < self.timing.offsets_ms()[idx] {
            return StepOutcome::Pending;
        }

        if !run_step(STEPS[idx], rcd) {
            warn!("rcd: self-test failed at step {idx}");
            self.finish(rcd);
            return StepOutcome::Failed;
        }

        if idx + 1 == STEPS.len() {
            self.finish(rcd);
            self.record_pass(now_ms);
            return StepOutcome::Passed;
        }
        self.next_step = Some(idx + 1);
        StepOutcome::Pending
    }

    /// Tick-driven entry point, called while the machine is in `RcdSelfTest`.
    ///
    /// * `ChargingReq` starts a test, or completes at once inside the
    ///   cooldown after a pass.
    /// * `RcdTestTriggered` advances the running test.
    /// * Anything else passes through unchanged.
    pub fn poll(
        &mut self,
        ctx: &mut ControllerContext,
        event: Event,
        rcd: &mut impl RcdPort,
    ) -> Event {
        match event {
            Event::ChargingReq => {
                if self.in_cooldown(ctx.uptime_ms) {
                    debug!("rcd: inside cooldown, test skipped");
                    ctx.rcd_verified = true;
                    return Event::RcdTestCompleted;
                }
                ctx.reset_timer();
                match self.begin(rcd) {
                    Ok(()) => Event::RcdTestTriggered,
                    Err(_) => Event::RcdTestFail,
                }
            }
            Event::RcdTestTriggered => match self.step(ctx.state_timer_ms, ctx.uptime_ms, rcd) {
                StepOutcome::Pending => Event::RcdTestTriggered,
                StepOutcome::Passed => {
                    ctx.rcd_verified = true;
                    Event::RcdTestCompleted
                }
                StepOutcome::Failed => Event::RcdTestFail,
                StepOutcome::Idle => {
                    warn!("rcd: test event without a running test");
                    Event::RcdTestFail
                }
            },
            other => other,
        }
    }

    /// Boot-time variant: sleeps through every deadline.
    pub fn run_blocking(
        &mut self,
        rcd: &mut impl RcdPort,
        delay: &mut impl DelayNs,
        now_ms: u64,
    ) -> Result<(), RcdTestFailure> {
        self.begin(rcd)?;
        let mut elapsed = 0u32;
        for (idx, offset) in self.timing.offsets_ms().into_iter().enumerate() {
            delay.delay_ms(offset - elapsed);
            elapsed = offset;
            match self.step(elapsed, now_ms + u64::from(elapsed), rcd) {
                StepOutcome::Passed => return Ok(()),
                StepOutcome::Pending => {}
                StepOutcome::Failed | StepOutcome::Idle => {
                    return Err(RcdTestFailure { step: idx });
                }
            }
        }
        Err(RcdTestFailure {
            step: STEPS.len() - 1,
        })
    }

    /// Drop a running test without a verdict (the machine left
    /// `RcdSelfTest` mid-sequence).
    pub fn abort(&mut self, rcd: &mut impl RcdPort) {
        if self.is_running() {
            warn!("rcd: self-test aborted");
            self.finish(rcd);
        }
    }

    fn record_pass(&mut self, now_ms: u64) {
        info!("rcd: self-test passed");
        self.last_pass_ms = Some(now_ms);
        self.skip_until_ms = Some(now_ms.saturating_add(self.timing.cooldown_ms));
    }

    /// Stop the test: stimulus released, line re-enabled.
    fn finish(&mut self, rcd: &mut impl RcdPort) {
        self.next_step = None;
        if rcd.set_test_stimulus(false).is_err() {
            warn!("rcd: could not release stimulus");
        }
        rcd.set_irq_enabled(true);
    }
}

/// `true` when the step succeeded.
fn run_step(step: RcdStep, rcd: &mut impl RcdPort) -> bool {
    match step {
        RcdStep::ReleaseStimulus => rcd.set_test_stimulus(false).is_ok(),
        RcdStep::Expect(expected) => match rcd.read_outputs() {
            Ok(seen) => {
                debug!("rcd: outputs {:?}, expected {:?}", seen, expected);
                seen == expected
            }
            Err(_) => false,
        },
    }
}
