//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements      | Connects to                          |
//! |------------|-----------------|--------------------------------------|
//! | `hardware` | ActuatorPort    | relay, pilot PWM, status LED pins    |
//! |            | RcdPort         | RCD stimulus / detector pins         |
//! |            | MeteringPort    | board metering front-end driver      |
//! |            | TemperaturePort | board temperature sensor driver      |
//! | `log_sink` | EventSink       | `log` facade                         |

pub mod hardware;
pub mod log_sink;
