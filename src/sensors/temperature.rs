//! Board temperature polling.
//!
//! The sensor sits on a shared bus and is read at a fixed cadence of
//! control ticks rather than every tick.  A failed read keeps the last
//! good value; the classifier simply skips that cadence slot.

use log::warn;

use crate::app::ports::TemperaturePort;

pub struct TemperatureMonitor {
    cadence_ticks: u32,
    ticks_since_read: u32,
    last_good_mdeg: i32,
    consecutive_failures: u32,
}

impl TemperatureMonitor {
    /// Start with a room-temperature placeholder until the first read.
    pub fn new(cadence_ticks: u32) -> Self {
        Self {
            cadence_ticks: cadence_ticks.max(1),
            ticks_since_read: 0,
            last_good_mdeg: 25_000,
            consecutive_failures: 0,
        }
    }

    /// Advance one tick.  Returns a fresh reading when the cadence
    /// elapsed and the read succeeded.
    pub fn poll(&mut self, port: &mut impl TemperaturePort) -> Option<i32> {
        self.ticks_since_read += 1;
        if self.ticks_since_read < self.cadence_ticks {
            return None;
        }
        self.ticks_since_read = 0;
        self.read_now(port)
    }

    /// Read immediately, regardless of cadence.
    pub fn read_now(&mut self, port: &mut impl TemperaturePort) -> Option<i32> {
        match port.read_temperature_mdeg() {
            Ok(mdeg) => {
                self.last_good_mdeg = mdeg;
                self.consecutive_failures = 0;
                Some(mdeg)
            }
            Err(e) => {
                self.consecutive_failures += 1;
                warn!(
                    "Temperature read failed ({}), keeping {} mdeg [{} in a row]",
                    e, self.last_good_mdeg, self.consecutive_failures
                );
                None
            }
        }
    }

    pub fn last_good_mdeg(&self) -> i32 {
        self.last_good_mdeg
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}
