//! Front-panel status LEDs.
//!
//! Three discrete LEDs: power (green), charge (blue) and fault (red).

use embedded_hal::digital::StatefulOutputPin;

use crate::error::{ActuatorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Led {
    Power,
    Charge,
    Fault,
}

impl Led {
    pub const ALL: [Self; 3] = [Self::Power, Self::Charge, Self::Fault];
}

pub struct StatusLeds<Pin> {
    power: Pin,
    charge: Pin,
    fault: Pin,
}

impl<Pin: StatefulOutputPin> StatusLeds<Pin> {
    pub fn new(power: Pin, charge: Pin, fault: Pin) -> Self {
        Self {
            power,
            charge,
            fault,
        }
    }

    fn pin(&mut self, led: Led) -> &mut Pin {
        match led {
            Led::Power => &mut self.power,
            Led::Charge => &mut self.charge,
            Led::Fault => &mut self.fault,
        }
    }

    pub fn on(&mut self, led: Led) -> Result<()> {
        self.pin(led)
            .set_high()
            .map_err(|_| ActuatorError::GpioWriteFailed.into())
    }

    pub fn off(&mut self, led: Led) -> Result<()> {
        self.pin(led)
            .set_low()
            .map_err(|_| ActuatorError::GpioWriteFailed.into())
    }

    pub fn toggle(&mut self, led: Led) -> Result<()> {
        self.pin(led)
            .toggle()
            .map_err(|_| ActuatorError::GpioWriteFailed.into())
    }

    pub fn is_on(&mut self, led: Led) -> bool {
        self.pin(led).is_set_high().unwrap_or(false)
    }
}
