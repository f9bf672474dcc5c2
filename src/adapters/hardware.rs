//! Hardware adapter: bridges the `embedded-hal` drivers to the domain
//! port traits.
//!
//! Owns the relay, pilot, RCD and LED drivers plus the board-specific
//! metering front end and temperature sensor, and exposes them through
//! [`ActuatorPort`], [`RcdPort`], [`MeteringPort`] and [`TemperaturePort`].
//! This is the only module that touches pins.

use embedded_hal::digital::{InputPin, OutputPin, StatefulOutputPin};
use embedded_hal::pwm::SetDutyCycle;

use crate::app::ports::{ActuatorPort, MeteringPort, RcdPort, TemperaturePort};
use crate::drivers::{Led, PilotOutput, PilotPwm, RcdPins, RelayDriver, RelayState, StatusLeds};
use crate::error::Result;
use crate::irq::InterruptSignals;
use crate::rcd::RcdOutputs;
use crate::sensors::FrontEndSample;
use crate::sensors::supply::{MeteringChannel, RawWaveforms, ZeroCrossEdge};

/// Every charge-control peripheral behind the port traits.
pub struct HardwareAdapter<'a, Coil, Feedback, Pilot, Stimulus, Detector, LedPin, Metering, Sensor>
{
    relay: RelayDriver<Coil, Feedback>,
    pilot: PilotPwm<Pilot>,
    rcd: RcdPins<Stimulus, Detector>,
    leds: StatusLeds<LedPin>,
    metering: Metering,
    temperature: Sensor,
    /// The RCD interrupt gate lives with the ISR flags.
    signals: &'a InterruptSignals,
}

impl<'a, Coil, Feedback, Pilot, Stimulus, Detector, LedPin, Metering, Sensor>
    HardwareAdapter<'a, Coil, Feedback, Pilot, Stimulus, Detector, LedPin, Metering, Sensor>
where
    Coil: OutputPin,
    Feedback: InputPin,
    Pilot: SetDutyCycle,
    Stimulus: OutputPin,
    Detector: InputPin,
    LedPin: StatefulOutputPin,
    Metering: MeteringPort,
    Sensor: TemperaturePort,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        relay: RelayDriver<Coil, Feedback>,
        pilot: PilotPwm<Pilot>,
        rcd: RcdPins<Stimulus, Detector>,
        leds: StatusLeds<LedPin>,
        metering: Metering,
        temperature: Sensor,
        signals: &'a InterruptSignals,
    ) -> Self {
        Self {
            relay,
            pilot,
            rcd,
            leds,
            metering,
            temperature,
            signals,
        }
    }

    /// Body of the metering data-ready interrupt.
    pub fn on_data_ready(&mut self) -> Result<FrontEndSample> {
        self.signals.supply.poll_front_end(&mut self.metering)
    }

    pub fn pilot_output(&self) -> PilotOutput {
        self.pilot.output()
    }

    /// Last successfully commanded relay position.
    pub fn relay_commanded(&self) -> RelayState {
        self.relay.commanded()
    }

    pub fn led_is_on(&mut self, led: Led) -> bool {
        self.leds.is_on(led)
    }
}

// ── ActuatorPort ──────────────────────────────────────────────

impl<Coil, Feedback, Pilot, Stimulus, Detector, LedPin, Metering, Sensor> ActuatorPort
    for HardwareAdapter<'_, Coil, Feedback, Pilot, Stimulus, Detector, LedPin, Metering, Sensor>
where
    Coil: OutputPin,
    Feedback: InputPin,
    Pilot: SetDutyCycle,
    LedPin: StatefulOutputPin,
{
    fn relay_open(&mut self) -> Result<()> {
        self.relay.open()
    }

    fn relay_close(&mut self) -> Result<()> {
        self.relay.close()
    }

    fn relay_read_state(&mut self) -> Result<RelayState> {
        self.relay.read_state()
    }

    fn set_pilot(&mut self, output: PilotOutput) -> Result<()> {
        self.pilot.set(output)
    }

    fn led_on(&mut self, led: Led) -> Result<()> {
        self.leds.on(led)
    }

    fn led_off(&mut self, led: Led) -> Result<()> {
        self.leds.off(led)
    }

    fn led_toggle(&mut self, led: Led) -> Result<()> {
        self.leds.toggle(led)
    }
}

// ── RcdPort ───────────────────────────────────────────────────

impl<Coil, Feedback, Pilot, Stimulus, Detector, LedPin, Metering, Sensor> RcdPort
    for HardwareAdapter<'_, Coil, Feedback, Pilot, Stimulus, Detector, LedPin, Metering, Sensor>
where
    Stimulus: OutputPin,
    Detector: InputPin,
{
    fn set_test_stimulus(&mut self, active: bool) -> Result<()> {
        self.rcd.set_stimulus(active)
    }

    fn read_outputs(&mut self) -> Result<RcdOutputs> {
        self.rcd.read()
    }

    fn set_irq_enabled(&mut self, enabled: bool) {
        self.signals.set_rcd_irq_enabled(enabled);
    }
}

// ── MeteringPort ──────────────────────────────────────────────

impl<Coil, Feedback, Pilot, Stimulus, Detector, LedPin, Metering, Sensor> MeteringPort
    for HardwareAdapter<'_, Coil, Feedback, Pilot, Stimulus, Detector, LedPin, Metering, Sensor>
where
    Metering: MeteringPort,
{
    fn read_waveforms(&mut self) -> Result<RawWaveforms> {
        self.metering.read_waveforms()
    }

    fn convert_to_millivolts(&self, channel: MeteringChannel, raw: i32) -> i32 {
        self.metering.convert_to_millivolts(channel, raw)
    }

    fn set_data_ready_irq(&mut self, enabled: bool) -> Result<()> {
        self.metering.set_data_ready_irq(enabled)
    }

    fn set_zero_cross_irq(&mut self, enabled: bool) -> Result<()> {
        self.metering.set_zero_cross_irq(enabled)
    }

    fn set_normal_mode(&mut self) -> Result<()> {
        self.metering.set_normal_mode()
    }

    fn select_zero_crossing(
        &mut self,
        channel: MeteringChannel,
        edge: ZeroCrossEdge,
    ) -> Result<()> {
        self.metering.select_zero_crossing(channel, edge)
    }
}

// ── TemperaturePort ───────────────────────────────────────────

impl<Coil, Feedback, Pilot, Stimulus, Detector, LedPin, Metering, Sensor> TemperaturePort
    for HardwareAdapter<'_, Coil, Feedback, Pilot, Stimulus, Detector, LedPin, Metering, Sensor>
where
    Sensor: TemperaturePort,
{
    fn read_temperature_mdeg(&mut self) -> Result<i32> {
        self.temperature.read_temperature_mdeg()
    }
}
