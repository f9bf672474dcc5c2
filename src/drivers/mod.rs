//! Actuator and indicator drivers over `embedded-hal` traits.

pub mod indicator;
pub mod pilot_pwm;
pub mod rcd_pins;
pub mod relay;
pub mod status_led;

pub use indicator::{IndicatorEngine, IndicatorPattern, LedFrame};
pub use pilot_pwm::{PilotOutput, PilotPwm};
pub use rcd_pins::RcdPins;
pub use relay::{RelayDriver, RelayState};
pub use status_led::{Led, StatusLeds};
