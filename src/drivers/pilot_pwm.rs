//! Control-pilot output stage.
//!
//! A 1 kHz PWM timer drives the ±12 V pilot buffer.  Three modes:
//!
//! | Mode | Timer        | Meaning on the wire                     |
//! |------|--------------|-----------------------------------------|
//! | Dc   | fully on     | constant +12 V, EVSE not ready          |
//! | Pwm  | duty ‰       | EVSE ready, duty encodes offered current |
//! | Off  | fully off    | constant −12 V, EVSE unavailable        |
//!
//! Offered current follows the usual 6–51 A rule, `duty % = I / 0.6 A`,
//! which in permille is `mA / 60`.

use embedded_hal::pwm::SetDutyCycle;
use log::debug;

use crate::error::{ActuatorError, Result};

/// Lowest and highest duty the current rule allows (10 % and 85 %).
const MIN_DUTY_PERMILLE: u16 = 100;
const MAX_DUTY_PERMILLE: u16 = 850;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PilotOutput {
    Dc,
    Off,
    Pwm { duty_permille: u16 },
}

impl PilotOutput {
    /// PWM output advertising `current_ma`.
    pub fn for_current_ma(current_ma: i32) -> Self {
        let permille = (current_ma.max(0) / 60) as u32;
        let duty = permille.clamp(u32::from(MIN_DUTY_PERMILLE), u32::from(MAX_DUTY_PERMILLE));
        Self::Pwm {
            duty_permille: duty as u16,
        }
    }

    /// Duty cycle in permille as seen by the timer.
    pub fn duty_permille(self) -> u16 {
        match self {
            Self::Dc => 1000,
            Self::Off => 0,
            Self::Pwm { duty_permille } => duty_permille,
        }
    }

    pub fn is_pwm(self) -> bool {
        matches!(self, Self::Pwm { .. })
    }
}

pub struct PilotPwm<Channel> {
    channel: Channel,
    output: PilotOutput,
}

impl<Channel: SetDutyCycle> PilotPwm<Channel> {
    /// Takes the channel and forces DC before returning.
    pub fn new(mut channel: Channel) -> Result<Self> {
        channel
            .set_duty_cycle_fully_on()
            .map_err(|_| ActuatorError::PwmWriteFailed)?;
        Ok(Self {
            channel,
            output: PilotOutput::Dc,
        })
    }

    pub fn set(&mut self, output: PilotOutput) -> Result<()> {
        let res = match output {
            PilotOutput::Dc => self.channel.set_duty_cycle_fully_on(),
            PilotOutput::Off => self.channel.set_duty_cycle_fully_off(),
            PilotOutput::Pwm { duty_permille } => self
                .channel
                .set_duty_cycle_fraction(duty_permille.min(1000), 1000),
        };
        res.map_err(|_| ActuatorError::PwmWriteFailed)?;
        debug!("pilot: {:?}", output);
        self.output = output;
        Ok(())
    }

    pub fn output(&self) -> PilotOutput {
        self.output
    }
}
