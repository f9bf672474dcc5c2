//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing application events to the `log`
//! facade, whichever logger the firmware installed.

use log::{error, info};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Telemetry(t) => {
                info!(
                    "TELEM | state={:?} ev={:?} | cp={}/{}mV | v1={}mV i={}mA | \
                     T={}m\u{00b0}C | offer={}mA relay={} | fault={}",
                    t.state,
                    t.event,
                    t.pwm_high_mv,
                    t.pwm_low_mv,
                    t.v1_max_mv,
                    t.i_max_ma,
                    t.temperature_mdeg,
                    t.offered_current_ma,
                    if t.relay_closed { "closed" } else { "open" },
                    t.fault.map_or("none".into(), |f| f.to_string()),
                );
            }
            AppEvent::Booted {
                grid,
                v1_peak_mv,
                v1_rms_mv,
            } => {
                info!(
                    "BOOT  | grid={:?} peak={}mV rms={}mV",
                    grid, v1_peak_mv, v1_rms_mv
                );
            }
            AppEvent::StateChanged { from, to } => {
                info!("STATE | {:?} -> {:?}", from, to);
            }
            AppEvent::FaultRaised(kind) if kind.is_latching() => {
                error!("FAULT | {} latched (code {})", kind, kind.blink_code());
            }
            AppEvent::FaultRaised(kind) => {
                info!("FAULT | {} (self-clearing)", kind);
            }
            AppEvent::FaultCleared(kind) => {
                info!("FAULT | {} cleared", kind);
            }
            AppEvent::ChargingStarted { offered_ma } => {
                info!("CHG   | started, offering {}mA", offered_ma);
            }
            AppEvent::ChargingStopped => {
                info!("CHG   | stopped");
            }
        }
    }
}
