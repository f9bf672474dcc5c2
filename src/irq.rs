//! Interrupt-to-main-loop signals.
//!
//! Every cross-context exchange lives here.  Interrupt handlers only ever
//! write; the tick loop only ever drains.  Everything is a lock-free atomic
//! so an interrupt can preempt the tick loop at any instruction.
//!
//! ```text
//! ┌────────────────┐                       ┌──────────────────┐
//! │ pilot timer    │──▶ pilot (rings+flag) │                  │
//! │ metering DRDY  │──▶ supply (maxima)    │  ChargeService   │
//! │ metering ZX    │──▶ supply (counter)   │  tick / boot     │
//! │ RCD detector   │──▶ rcd_tripped        │                  │
//! │ PE detector    │──▶ pe_upstream        │                  │
//! └────────────────┘                       └──────────────────┘
//! ```
//!
//! The bundle is `const`-constructible so firmware can place it in a
//! `static`:
//!
//! ```
//! use evsecore::irq::InterruptSignals;
//! static SIGNALS: InterruptSignals = InterruptSignals::new();
//! SIGNALS.on_pe_upstream();
//! assert!(SIGNALS.pe_upstream_pending());
//! ```

use core::sync::atomic::{AtomicBool, Ordering};

use crate::sensors::{PilotSampler, SupplyMonitor};

pub struct InterruptSignals {
    pub pilot: PilotSampler,
    pub supply: SupplyMonitor,
    rcd_tripped: AtomicBool,
    rcd_irq_enabled: AtomicBool,
    pe_upstream: AtomicBool,
}

impl Default for InterruptSignals {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptSignals {
    pub const fn new() -> Self {
        Self {
            pilot: PilotSampler::new(),
            supply: SupplyMonitor::new(),
            rcd_tripped: AtomicBool::new(false),
            rcd_irq_enabled: AtomicBool::new(true),
            pe_upstream: AtomicBool::new(false),
        }
    }

    // ── RCD ───────────────────────────────────────────────────

    /// RCD detector edge.  Ignored while the line is gated off.
    pub fn on_rcd_trip(&self) {
        if self.rcd_irq_enabled.load(Ordering::Acquire) {
            self.rcd_tripped.store(true, Ordering::Release);
        }
    }

    pub fn rcd_trip_pending(&self) -> bool {
        self.rcd_tripped.load(Ordering::Acquire)
    }

    pub fn clear_rcd_trip(&self) {
        self.rcd_tripped.store(false, Ordering::Release);
    }

    /// Gate the RCD line (the self-test stimulus must not count as a trip).
    pub fn set_rcd_irq_enabled(&self, enabled: bool) {
        self.rcd_irq_enabled.store(enabled, Ordering::Release);
    }

    pub fn rcd_irq_enabled(&self) -> bool {
        self.rcd_irq_enabled.load(Ordering::Acquire)
    }

    // ── PE ────────────────────────────────────────────────────

    /// Upstream PE-detect edge.  Never cleared: the fault it causes latches.
    pub fn on_pe_upstream(&self) {
        self.pe_upstream.store(true, Ordering::Release);
    }

    pub fn pe_upstream_pending(&self) -> bool {
        self.pe_upstream.load(Ordering::Acquire)
    }
}
