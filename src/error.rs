//! Unified error and fault types for the charge controller.
//!
//! Two distinct families live here:
//!
//! * [`FaultKind`]: safety faults the state machine latches and displays.
//!   These are *outcomes* of the control loop, never propagated with `?`.
//! * [`Error`]: failures of the collaborators (metering front end, relay
//!   driver, temperature sensor, configuration).  Every variant is `Copy`
//!   so it can be passed around the tick loop without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Safety faults
// ---------------------------------------------------------------------------

/// Fault taxonomy of the charge controller.
///
/// Every kind except [`FaultKind::InputUndervoltage`] is latching: once
/// entered, the relay is forced open, charging is stopped, the pilot is
/// forced to the not-ready level and only an external reset clears it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum FaultKind {
    /// Mains peak voltage below the grid's lower limit (recovers by itself).
    InputUndervoltage = 0x0001,
    /// Mains peak voltage above the grid's upper limit.
    InputOvervoltage = 0x0002,
    /// RCD tripped during operation or failed the interleaved self-test.
    RcdError = 0x0004,
    /// RCD failed the blocking self-test at boot.
    RcdInitError = 0x0008,
    /// Pilot wire shorted or open (high plateau below the floor).
    PilotError = 0x0010,
    /// No diode on the vehicle side (negative plateau not reached).
    DiodeError = 0x0020,
    /// Output current above the active or idle limit.
    OvercurrentError = 0x0040,
    /// Second temperature threshold exceeded.
    OvertemperatureError = 0x0080,
    /// Relay contacts stuck closed or failed to actuate.
    RelayError = 0x0100,
    /// Protective earth missing on the vehicle side.
    PeError = 0x0200,
    /// Protective earth missing upstream (mains side detector).
    PeUpstreamError = 0x0400,
}

impl FaultKind {
    /// Return the bitmask for this fault.
    pub const fn mask(self) -> u16 {
        self as u16
    }

    /// `false` only for the one self-clearing fault.
    pub const fn is_latching(self) -> bool {
        !matches!(self, Self::InputUndervoltage)
    }

    /// Number of blinks used by the fault indicator for this kind.
    pub const fn blink_code(self) -> u8 {
        match self {
            Self::InputUndervoltage | Self::InputOvervoltage => 1,
            Self::RcdError | Self::RcdInitError => 2,
            Self::PilotError => 3,
            Self::DiodeError => 4,
            Self::OvercurrentError => 5,
            Self::OvertemperatureError => 6,
            Self::RelayError => 7,
            Self::PeError | Self::PeUpstreamError => 8,
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InputUndervoltage => write!(f, "input undervoltage"),
            Self::InputOvervoltage => write!(f, "input overvoltage"),
            Self::RcdError => write!(f, "RCD error"),
            Self::RcdInitError => write!(f, "RCD self-test failed at boot"),
            Self::PilotError => write!(f, "control pilot error"),
            Self::DiodeError => write!(f, "vehicle diode missing"),
            Self::OvercurrentError => write!(f, "overcurrent"),
            Self::OvertemperatureError => write!(f, "overtemperature"),
            Self::RelayError => write!(f, "relay error"),
            Self::PeError => write!(f, "PE missing"),
            Self::PeUpstreamError => write!(f, "PE missing upstream"),
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible collaborator call in the controller funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A measurement source could not be read.
    Sensor(SensorError),
    /// An actuator command failed.
    Actuator(ActuatorError),
    /// Configuration is invalid.
    Config(ConfigError),
    /// Peripheral initialisation failed.
    Init(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Actuator(e) => write!(f, "actuator: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// Metering front end did not answer or failed its integrity check.
    MeteringReadFailed,
    /// Temperature sensor bus transaction failed.
    TemperatureReadFailed,
    /// GPIO read returned an error.
    GpioReadFailed,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MeteringReadFailed => write!(f, "metering read failed"),
            Self::TemperatureReadFailed => write!(f, "temperature read failed"),
            Self::GpioReadFailed => write!(f, "GPIO read failed"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Actuator errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorError {
    /// Relay coil GPIO write failed.
    RelayWriteFailed,
    /// PWM duty-cycle write failed.
    PwmWriteFailed,
    /// GPIO set failed.
    GpioWriteFailed,
    /// Interrupt line could not be (re)configured.
    IrqConfigFailed,
}

impl fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RelayWriteFailed => write!(f, "relay write failed"),
            Self::PwmWriteFailed => write!(f, "PWM write failed"),
            Self::GpioWriteFailed => write!(f, "GPIO write failed"),
            Self::IrqConfigFailed => write!(f, "IRQ configuration failed"),
        }
    }
}

impl From<ActuatorError> for Error {
    fn from(e: ActuatorError) -> Self {
        Self::Actuator(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The configuration document could not be parsed.
    Malformed,
    /// A field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "malformed configuration"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Controller-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
