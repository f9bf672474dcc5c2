//! Main contactor driver.
//!
//! One output drives the coil; an auxiliary contact wired to an input
//! reports the real contact position.  The read-back is what the stuck
//! contact checks trust, never the last command.
//!
//! ## Safety contract
//!
//! This driver is a dumb actuator.  Whether closing is allowed is decided
//! by the charge state machine.

use embedded_hal::digital::{InputPin, OutputPin};
use log::debug;

use crate::error::{ActuatorError, Result, SensorError};

/// Contact position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Open,
    Closed,
}

pub struct RelayDriver<Coil, Feedback> {
    coil: Coil,
    feedback: Feedback,
    commanded: RelayState,
}

impl<Coil: OutputPin, Feedback: InputPin> RelayDriver<Coil, Feedback> {
    /// The relay is assumed open until the first command.
    pub fn new(coil: Coil, feedback: Feedback) -> Self {
        Self {
            coil,
            feedback,
            commanded: RelayState::Open,
        }
    }

    pub fn open(&mut self) -> Result<()> {
        self.coil
            .set_low()
            .map_err(|_| ActuatorError::RelayWriteFailed)?;
        self.commanded = RelayState::Open;
        debug!("relay: coil released");
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        self.coil
            .set_high()
            .map_err(|_| ActuatorError::RelayWriteFailed)?;
        self.commanded = RelayState::Closed;
        debug!("relay: coil energised");
        Ok(())
    }

    /// Contact position from the auxiliary contact (high = closed).
    pub fn read_state(&mut self) -> Result<RelayState> {
        let closed = self
            .feedback
            .is_high()
            .map_err(|_| SensorError::GpioReadFailed)?;
        Ok(if closed {
            RelayState::Closed
        } else {
            RelayState::Open
        })
    }

    /// Last successfully commanded position.
    pub fn commanded(&self) -> RelayState {
        self.commanded
    }
}
