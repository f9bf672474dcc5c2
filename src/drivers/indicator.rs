//! Indicator pattern engine.
//!
//! Turns the charge-state display request into per-LED on/off frames.
//! The service calls `tick()` once per control cycle and writes the
//! returned [`LedFrame`] to the three status LEDs.
//!
//! ## Patterns
//!
//! | Pattern   | Power | Charge                    | Fault                     |
//! |-----------|-------|---------------------------|---------------------------|
//! | Booting   | on    | on                        | on                        |
//! | Idle      | on    | off                       | off                       |
//! | Connected | on    | on                        | off                       |
//! | Charging  | on    | blink 1 Hz (0.5 Hz derated) | off                     |
//! | Fault(k)  | on    | off                       | `k.blink_code()` blinks, pause |

use crate::error::FaultKind;

/// One fault blink: on for this long, then off for this long.
const FAULT_BLINK_MS: u32 = 200;
/// Gap after a fault blink group.
const FAULT_PAUSE_MS: u32 = 1000;
const CHARGING_PERIOD_MS: u32 = 1000;
const DERATED_PERIOD_MS: u32 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorPattern {
    Booting,
    Idle,
    Connected,
    Charging { derated: bool },
    Fault(FaultKind),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedFrame {
    pub power: bool,
    pub charge: bool,
    pub fault: bool,
}

pub struct IndicatorEngine {
    phase_ms: u32,
    pattern: IndicatorPattern,
}

impl Default for IndicatorEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl IndicatorEngine {
    pub fn new() -> Self {
        Self {
            phase_ms: 0,
            pattern: IndicatorPattern::Booting,
        }
    }

    /// Select the pattern to display.  The phase restarts on change.
    pub fn show(&mut self, pattern: IndicatorPattern) {
        if pattern != self.pattern {
            self.pattern = pattern;
            self.phase_ms = 0;
        }
    }

    pub fn pattern(&self) -> IndicatorPattern {
        self.pattern
    }

    /// Advance the phase by `delta_ms` and return the frame for the new phase.
    pub fn tick(&mut self, delta_ms: u32) -> LedFrame {
        self.phase_ms = self.phase_ms.wrapping_add(delta_ms);
        self.frame()
    }

    /// Frame at the current phase without advancing it.
    pub fn frame(&self) -> LedFrame {
        match self.pattern {
            IndicatorPattern::Booting => LedFrame {
                power: true,
                charge: true,
                fault: true,
            },
            IndicatorPattern::Idle => LedFrame {
                power: true,
                ..LedFrame::default()
            },
            IndicatorPattern::Connected => LedFrame {
                power: true,
                charge: true,
                fault: false,
            },
            IndicatorPattern::Charging { derated } => {
                let period = if derated {
                    DERATED_PERIOD_MS
                } else {
                    CHARGING_PERIOD_MS
                };
                LedFrame {
                    power: true,
                    charge: self.phase_ms % period < period / 2,
                    fault: false,
                }
            }
            IndicatorPattern::Fault(kind) => LedFrame {
                power: true,
                charge: false,
                fault: Self::blink_code_level(self.phase_ms, kind.blink_code()),
            },
        }
    }

    /// `count` blinks of `FAULT_BLINK_MS`, then `FAULT_PAUSE_MS` dark.
    fn blink_code_level(phase_ms: u32, count: u8) -> bool {
        let burst = u32::from(count) * 2 * FAULT_BLINK_MS;
        let pos = phase_ms % (burst + FAULT_PAUSE_MS);
        pos < burst && (pos / FAULT_BLINK_MS) % 2 == 0
    }
}
