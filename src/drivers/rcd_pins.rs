//! Residual-current detector pins: one test-stimulus output and the DC
//! and AC detector outputs.

use embedded_hal::digital::{InputPin, OutputPin};

use crate::error::{ActuatorError, Result, SensorError};
use crate::rcd::RcdOutputs;

pub struct RcdPins<Stimulus, Detector> {
    stimulus: Stimulus,
    dc: Detector,
    ac: Detector,
}

impl<Stimulus: OutputPin, Detector: InputPin> RcdPins<Stimulus, Detector> {
    pub fn new(stimulus: Stimulus, dc: Detector, ac: Detector) -> Self {
        Self { stimulus, dc, ac }
    }

    /// The stimulus is active low.
    pub fn set_stimulus(&mut self, active: bool) -> Result<()> {
        let res = if active {
            self.stimulus.set_low()
        } else {
            self.stimulus.set_high()
        };
        res.map_err(|_| ActuatorError::GpioWriteFailed.into())
    }

    pub fn read(&mut self) -> Result<RcdOutputs> {
        let dc = self.dc.is_high().map_err(|_| SensorError::GpioReadFailed)?;
        let ac = self.ac.is_high().map_err(|_| SensorError::GpioReadFailed)?;
        Ok(RcdOutputs { dc, ac })
    }
}
