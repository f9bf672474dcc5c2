//! Control-pilot sampler.
//!
//! The pilot PWM timer raises two interrupts per period: one on the
//! falling edge (sample the low plateau) and one at 50 % of the period
//! (sample the high plateau).  Each ISR pushes the raw ADC code into a
//! 10-entry ring; the tick loop reads the moving averages.
//!
//! ## Concurrency
//!
//! Each ring has exactly one writer (its ISR) and one reader (the tick
//! loop).  Slots and indices are atomics, so a reader preempted mid-sum
//! only ever mixes whole samples from adjacent periods, which is harmless
//! for a moving average.  The "new sample" flag coalesces: several edges
//! between two ticks are observed as one.

use core::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};

use crate::config::PilotAdcTransfer;

/// Depth of each moving-average ring.
pub const PILOT_AVG_DEPTH: usize = 10;

/// Which plateau of the pilot waveform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plateau {
    High,
    Low,
}

struct SampleRing {
    slots: [AtomicU16; PILOT_AVG_DEPTH],
    head: AtomicUsize,
    filled: AtomicUsize,
}

impl SampleRing {
    const fn new() -> Self {
        Self {
            slots: [const { AtomicU16::new(0) }; PILOT_AVG_DEPTH],
            head: AtomicUsize::new(0),
            filled: AtomicUsize::new(0),
        }
    }

    fn push(&self, raw: u16) {
        let head = self.head.load(Ordering::Relaxed);
        self.slots[head].store(raw, Ordering::Relaxed);
        self.head.store((head + 1) % PILOT_AVG_DEPTH, Ordering::Release);
        let filled = self.filled.load(Ordering::Relaxed);
        if filled < PILOT_AVG_DEPTH {
            self.filled.store(filled + 1, Ordering::Release);
        }
    }

    /// Mean raw code over the populated slots, `None` before the first push.
    fn mean_raw(&self) -> Option<u32> {
        let filled = self.filled.load(Ordering::Acquire);
        if filled == 0 {
            return None;
        }
        // Before the ring wraps, the populated slots are 0..filled.
        let sum: u32 = self.slots[..filled]
            .iter()
            .map(|s| u32::from(s.load(Ordering::Relaxed)))
            .sum();
        Some(sum / filled as u32)
    }

    fn clear(&self) {
        self.filled.store(0, Ordering::Release);
        self.head.store(0, Ordering::Release);
    }
}

/// Pilot plateau sampler shared between the pilot ISRs and the tick loop.
pub struct PilotSampler {
    high: SampleRing,
    low: SampleRing,
    ready: AtomicBool,
}

impl Default for PilotSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl PilotSampler {
    pub const fn new() -> Self {
        Self {
            high: SampleRing::new(),
            low: SampleRing::new(),
            ready: AtomicBool::new(false),
        }
    }

    // ── ISR side ──────────────────────────────────────────────

    /// PWM falling-edge interrupt: record the low plateau.
    pub fn on_low_edge(&self, raw: u16) {
        self.low.push(raw);
        self.ready.store(true, Ordering::Release);
    }

    /// Half-period interrupt: record the high plateau.
    pub fn on_mid_period(&self, raw: u16) {
        self.high.push(raw);
    }

    // ── Tick side ─────────────────────────────────────────────

    /// Consume the "new sample" flag.  Returns `true` at most once per
    /// batch of edges.
    pub fn take_ready(&self) -> bool {
        self.ready.swap(false, Ordering::AcqRel)
    }

    /// Mean of the most recent samples of `which`, in pilot millivolts.
    /// Returns 0 before any sample was taken.
    pub fn compute_average(&self, which: Plateau, transfer: &PilotAdcTransfer) -> i32 {
        let ring = match which {
            Plateau::High => &self.high,
            Plateau::Low => &self.low,
        };
        ring.mean_raw().map_or(0, |raw| transfer.to_millivolts(raw))
    }

    /// Drop all history (used when the pilot output mode changes at boot).
    pub fn reset(&self) {
        self.high.clear();
        self.low.clear();
        self.ready.store(false, Ordering::Release);
    }
}
