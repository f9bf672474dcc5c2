//! Port traits: the hexagonal boundary between the control core and the
//! hardware.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ ChargeService (domain)
//! ```
//!
//! Driven adapters (relay and pilot drivers, RCD pins, metering front end,
//! temperature sensor, event sinks) implement these traits.  The
//! [`ChargeService`](super::service::ChargeService) consumes them through
//! generics, so the control core never touches a register.

use crate::drivers::{Led, PilotOutput, RelayState};
use crate::error::Result;
use crate::rcd::RcdOutputs;
use crate::sensors::supply::{MeteringChannel, RawWaveforms, ZeroCrossEdge};

// ───────────────────────────────────────────────────────────────
// Actuator port (domain → hardware)
// ───────────────────────────────────────────────────────────────

pub trait ActuatorPort {
    fn relay_open(&mut self) -> Result<()>;

    fn relay_close(&mut self) -> Result<()>;

    /// Real contact position from the read-back input, not the command.
    fn relay_read_state(&mut self) -> Result<RelayState>;

    fn set_pilot(&mut self, output: PilotOutput) -> Result<()>;

    fn led_on(&mut self, led: Led) -> Result<()>;

    fn led_off(&mut self, led: Led) -> Result<()>;

    fn led_toggle(&mut self, led: Led) -> Result<()>;
}

// ───────────────────────────────────────────────────────────────
// RCD port
// ───────────────────────────────────────────────────────────────

pub trait RcdPort {
    /// Drive the built-in test winding.
    fn set_test_stimulus(&mut self, active: bool) -> Result<()>;

    fn read_outputs(&mut self) -> Result<RcdOutputs>;

    /// Gate the detector interrupt.
    fn set_irq_enabled(&mut self, enabled: bool);
}

// ───────────────────────────────────────────────────────────────
// Metering front end
// ───────────────────────────────────────────────────────────────

/// The isolated metering IC.  Register access, CRC and bus framing live
/// in the implementation.
pub trait MeteringPort {
    fn read_waveforms(&mut self) -> Result<RawWaveforms>;

    /// Convert a raw code to millivolts (milliamps for `Current`).
    fn convert_to_millivolts(&self, channel: MeteringChannel, raw: i32) -> i32;

    fn set_data_ready_irq(&mut self, enabled: bool) -> Result<()>;

    fn set_zero_cross_irq(&mut self, enabled: bool) -> Result<()>;

    fn set_normal_mode(&mut self) -> Result<()>;

    fn select_zero_crossing(&mut self, channel: MeteringChannel, edge: ZeroCrossEdge)
    -> Result<()>;
}

// ───────────────────────────────────────────────────────────────
// Temperature sensor
// ───────────────────────────────────────────────────────────────

pub trait TemperaturePort {
    fn read_temperature_mdeg(&mut self) -> Result<i32>;
}

// ───────────────────────────────────────────────────────────────
// Event sink (domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}
