//! Mains supply monitor.
//!
//! The metering front end raises a data-ready interrupt for every
//! waveform sample set (output current, line voltage, relay-side voltage).
//! The ISR converts the raw codes and folds them into per-window maxima;
//! the tick loop swaps the maxima out once per supply window and scales
//! them to mains millivolts.
//!
//! ```text
//!  DRDY ISR ──▶ on_data_ready ──fetch_max──▶ [i_max, v1_max, v2_max]
//!  ZX ISR   ──▶ on_zero_cross ──fetch_add──▶ zero_crossings
//!                                              │
//!  tick ◀──────────── take_window (swap 0) ◀───┘
//! ```
//!
//! Maxima are reset to 0, so a window without any sample reads as 0 V.

use core::sync::atomic::{AtomicI32, AtomicU32, Ordering};

use crate::app::ports::MeteringPort;
use crate::config::ChargeConfig;
use crate::error::Result;

/// Front-end channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeteringChannel {
    Current,
    LineVoltage,
    RelayVoltage,
}

/// Zero-crossing detector edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZeroCrossEdge {
    Rising,
    Falling,
}

/// Raw waveform codes as read from the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawWaveforms {
    pub current: i32,
    pub line: i32,
    pub relay: i32,
}

/// One converted sample set, still in front-end units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrontEndSample {
    pub i_ma: i32,
    pub v1_mv: i32,
    pub v2_mv: i32,
}

/// Per-window peaks, scaled to mains units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SupplyWindow {
    pub v1_max_mv: i32,
    pub v2_max_mv: i32,
    pub i_max_ma: i32,
    /// Sample sets folded into this window.
    pub samples: u32,
}

/// Supply measurements shared between the metering ISRs and the tick loop.
pub struct SupplyMonitor {
    v1_max: AtomicI32,
    v2_max: AtomicI32,
    i_max: AtomicI32,
    samples: AtomicU32,
    zero_crossings: AtomicU32,
}

impl Default for SupplyMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl SupplyMonitor {
    pub const fn new() -> Self {
        Self {
            v1_max: AtomicI32::new(0),
            v2_max: AtomicI32::new(0),
            i_max: AtomicI32::new(0),
            samples: AtomicU32::new(0),
            zero_crossings: AtomicU32::new(0),
        }
    }

    // ── ISR side ──────────────────────────────────────────────

    /// Fold one converted sample set into the running maxima.
    pub fn on_data_ready(&self, sample: FrontEndSample) {
        self.i_max.fetch_max(sample.i_ma, Ordering::Relaxed);
        self.v1_max.fetch_max(sample.v1_mv, Ordering::Relaxed);
        self.v2_max.fetch_max(sample.v2_mv, Ordering::Relaxed);
        self.samples.fetch_add(1, Ordering::Release);
    }

    /// Zero-crossing interrupt.
    pub fn on_zero_cross(&self) {
        self.zero_crossings.fetch_add(1, Ordering::Release);
    }

    /// Read, convert and fold one sample set.  Called from the data-ready
    /// handler on target and directly by the boot self-test.
    pub fn poll_front_end(&self, metering: &mut impl MeteringPort) -> Result<FrontEndSample> {
        let raw = metering.read_waveforms()?;
        let sample = FrontEndSample {
            i_ma: metering.convert_to_millivolts(MeteringChannel::Current, raw.current),
            v1_mv: metering.convert_to_millivolts(MeteringChannel::LineVoltage, raw.line),
            v2_mv: metering.convert_to_millivolts(MeteringChannel::RelayVoltage, raw.relay),
        };
        self.on_data_ready(sample);
        Ok(sample)
    }

    // ── Tick side ─────────────────────────────────────────────

    /// Monotonic zero-crossing count (wraps).
    pub fn zero_cross_count(&self) -> u32 {
        self.zero_crossings.load(Ordering::Acquire)
    }

    /// Close the current window: return its scaled peaks and restart at 0.
    pub fn take_window(&self, config: &ChargeConfig) -> SupplyWindow {
        let samples = self.samples.swap(0, Ordering::AcqRel);
        let v1 = self.v1_max.swap(0, Ordering::Relaxed);
        let v2 = self.v2_max.swap(0, Ordering::Relaxed);
        let i = self.i_max.swap(0, Ordering::Relaxed);
        SupplyWindow {
            v1_max_mv: config.line_scaling.apply(v1),
            v2_max_mv: config.relay_side_scaling.apply(v2),
            i_max_ma: i,
            samples,
        }
    }
}

// ---------------------------------------------------------------------------
// RMS estimator
// ---------------------------------------------------------------------------

/// Recursive square-root estimator over fixed windows of samples.
///
/// At the end of every window of `window` samples the estimate is refined
/// with one Newton step, `rms = (rms + sum_sq / window / rms) / 2`.  The
/// estimate never drops below 1 so the division is always defined.
#[derive(Debug, Clone)]
pub struct RmsEstimator {
    window: u32,
    count: u32,
    sum_sq: u64,
    rms: u64,
}

impl RmsEstimator {
    pub fn new(window: u32) -> Self {
        Self {
            window: window.max(1),
            count: 0,
            sum_sq: 0,
            rms: 1,
        }
    }

    /// Start from a prior guess (e.g. `peak * 707 / 1000`) so a few
    /// windows suffice to converge.
    pub fn seeded(window: u32, seed: u64) -> Self {
        Self {
            rms: seed.max(1),
            ..Self::new(window)
        }
    }

    /// Add one instantaneous sample.  Returns the refreshed estimate when
    /// this sample completed a window.
    pub fn push(&mut self, sample: i32) -> Option<u64> {
        let magnitude = u64::from(sample.unsigned_abs());
        self.sum_sq = self.sum_sq.saturating_add(magnitude * magnitude);
        self.count += 1;
        if self.count < self.window {
            return None;
        }
        let mean_sq = self.sum_sq / u64::from(self.window);
        self.rms = ((self.rms + mean_sq / self.rms) / 2).max(1);
        self.count = 0;
        self.sum_sq = 0;
        Some(self.rms)
    }

    /// Current estimate.
    pub fn rms(&self) -> u64 {
        self.rms
    }
}
