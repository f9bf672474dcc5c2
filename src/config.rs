//! Charge controller configuration parameters
//!
//! Every threshold and timing constant the control loop uses lives here.
//! Voltages are millivolts, currents milliamps, temperatures
//! milli-degrees Celsius and times milliseconds unless a field says
//! otherwise.  Peak (not RMS) values are used for the mains.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Grid
// ---------------------------------------------------------------------------

/// Mains flavour, detected once at boot from the measured peak voltage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridVariant {
    Nominal230V,
    Nominal120V,
}

/// Allowed window for the per-cycle peak line voltage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoltageLimits {
    /// Below this the input is undervoltage.
    pub low_mv: i32,
    /// Above this the input is overvoltage.
    pub high_mv: i32,
}

// ---------------------------------------------------------------------------
// Scaling
// ---------------------------------------------------------------------------

/// Board revisions with a documented relay-side sense divider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoardRevision {
    RevA,
    RevD,
}

/// Rational scale from front-end millivolts to mains millivolts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoltageScaling {
    pub numerator: i64,
    pub denominator: i64,
}

impl VoltageScaling {
    /// Line-voltage divider, identical on every revision.
    pub const LINE: Self = Self {
        numerator: 1_001,
        denominator: 1,
    };

    /// Relay-side divider for a documented board revision.
    ///
    /// Revision D reuses the line divider.  Other revisions must supply an
    /// explicit scaling through the configuration.
    pub const fn relay_side_for(revision: BoardRevision) -> Self {
        match revision {
            BoardRevision::RevA => Self {
                numerator: 1_501,
                denominator: 1,
            },
            BoardRevision::RevD => Self::LINE,
        }
    }

    /// Apply the scale, saturating to the `i32` range.
    pub fn apply(&self, front_end_mv: i32) -> i32 {
        if self.denominator == 0 {
            return 0;
        }
        let scaled = i64::from(front_end_mv) * self.numerator / self.denominator;
        scaled.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
    }
}

/// Transfer function of the pilot measurement chain.
///
/// The ±12 V pilot is level-shifted and attenuated into the ADC range;
/// `pilot_mv = (adc_mv - zero_offset_mv) * gain_num / gain_den`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PilotAdcTransfer {
    pub full_scale_raw: u16,
    pub vref_mv: i32,
    pub zero_offset_mv: i32,
    pub gain_num: i32,
    pub gain_den: i32,
}

impl PilotAdcTransfer {
    /// Convert a raw ADC code into pilot millivolts.
    pub fn to_millivolts(&self, raw: u32) -> i32 {
        if self.full_scale_raw == 0 || self.gain_den == 0 {
            return 0;
        }
        let adc_mv = i64::from(raw) * i64::from(self.vref_mv) / i64::from(self.full_scale_raw);
        let pilot = (adc_mv - i64::from(self.zero_offset_mv)) * i64::from(self.gain_num)
            / i64::from(self.gain_den);
        pilot as i32
    }

    /// Inverse of [`to_millivolts`](Self::to_millivolts), clamped to the
    /// ADC range.  Used to synthesise captures on the host.
    pub fn to_raw(&self, pilot_mv: i32) -> u16 {
        if self.gain_num == 0 || self.vref_mv == 0 {
            return 0;
        }
        let adc_mv = i64::from(pilot_mv) * i64::from(self.gain_den) / i64::from(self.gain_num)
            + i64::from(self.zero_offset_mv);
        let raw = adc_mv * i64::from(self.full_scale_raw) / i64::from(self.vref_mv);
        raw.clamp(0, i64::from(self.full_scale_raw)) as u16
    }
}

// ---------------------------------------------------------------------------
// Pilot bands
// ---------------------------------------------------------------------------

/// Pilot high-plateau band edges.  Bands are `(lower, upper]`: a reading
/// exactly on an edge belongs to the band below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PilotBands {
    /// At or below: pilot wire shorted / open.
    pub floor_mv: i32,
    /// Upper edge of state D (ventilation).
    pub d_upper_mv: i32,
    /// Upper edge of state C (charging).
    pub c_upper_mv: i32,
    /// Upper edge of state B (connected).
    pub b_upper_mv: i32,
    /// Upper edge of state A (disconnected).  Above: implausible, ignored.
    pub a_upper_mv: i32,
    /// Low plateau above this means the vehicle diode is missing.
    pub diode_ceiling_mv: i32,
}

// ---------------------------------------------------------------------------
// RCD self-test timing
// ---------------------------------------------------------------------------

/// Offsets from the test trigger at which each sequencer step runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RcdTiming {
    /// Release the test stimulus.
    pub stimulus_release_ms: u32,
    /// First detector sample.
    pub first_sample_ms: u32,
    /// Second detector sample.
    pub second_sample_ms: u32,
    /// Third detector sample; the test completes here.
    pub third_sample_ms: u32,
    /// After a pass, further charging requests skip the test this long.
    pub cooldown_ms: u64,
}

impl RcdTiming {
    /// Step deadlines in step order.
    pub fn offsets_ms(&self) -> [u32; 4] {
        [
            self.stimulus_release_ms,
            self.first_sample_ms,
            self.second_sample_ms,
            self.third_sample_ms,
        ]
    }
}

// ---------------------------------------------------------------------------
// ChargeConfig
// ---------------------------------------------------------------------------

/// Core controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeConfig {
    // --- Timing ---
    /// Control loop period (milliseconds).
    pub tick_ms: u32,
    /// Ticks per supply measurement window (one line cycle at 50 Hz).
    pub supply_window_ticks: u32,
    /// Ticks between temperature reads.
    pub temperature_read_ticks: u32,
    /// Telemetry report interval (milliseconds).
    pub telemetry_interval_ms: u64,

    // --- Pilot ---
    pub pilot_bands: PilotBands,
    pub pilot_adc: PilotAdcTransfer,
    /// Vehicle must reach B within this long of idling/recovering.
    pub ev_connect_window_ms: u32,
    /// DC → PWM delay after the vehicle is connected.
    pub evse_ready_delay_ms: u32,
    /// Settle time before the diode check samples the low plateau.
    pub diode_check_delay_ms: u32,

    // --- Supply ---
    pub grid_230v: VoltageLimits,
    pub grid_120v: VoltageLimits,
    /// Boot peak voltage below this selects the 120 V grid.
    pub grid_detect_threshold_mv: i32,
    pub line_scaling: VoltageScaling,
    pub relay_side_scaling: VoltageScaling,

    // --- Current ---
    /// Offered current with nominal temperature.
    pub nominal_current_ma: i32,
    /// Offered current after the first temperature threshold.
    pub derated_current_ma: i32,
    /// Active overcurrent limit = offered current + margin.
    pub overcurrent_margin_ma: i32,
    /// Overcurrent limit while no charging session is active.
    pub idle_current_limit_ma: i32,
    /// Supply windows after the first over-limit window before the
    /// current is checked again; still over limit then latches.
    pub overcurrent_debounce_windows: u8,

    // --- Temperature ---
    pub derate_temperature_mdeg: i32,
    pub shutdown_temperature_mdeg: i32,
    pub temperature_hysteresis_mdeg: i32,

    // --- Relay check ---
    /// Supply windows averaged by the stuck-contact check.
    pub relay_check_windows: u8,
    /// Average relay-side peak above this means contacts are still closed.
    pub relay_stuck_threshold_mv: i32,

    // --- RCD ---
    pub rcd: RcdTiming,

    // --- Boot ---
    /// Waveform samples folded into the boot supply check.
    pub startup_supply_samples: u32,
    /// Delay between boot supply re-checks while undervoltage persists.
    pub startup_retry_delay_ms: u32,
}

impl Default for ChargeConfig {
    fn default() -> Self {
        Self {
            // Timing
            tick_ms: 20,
            supply_window_ticks: 1,
            temperature_read_ticks: 50, // 1 s
            telemetry_interval_ms: 10_000,

            // Pilot (+12 V A, +9 V B, +6 V C, +3 V D)
            pilot_bands: PilotBands {
                floor_mv: 1_500,
                d_upper_mv: 4_500,
                c_upper_mv: 7_500,
                b_upper_mv: 10_500,
                a_upper_mv: 13_500,
                diode_ceiling_mv: -10_500,
            },
            pilot_adc: PilotAdcTransfer {
                full_scale_raw: 4_095,
                vref_mv: 3_300,
                zero_offset_mv: 1_650,
                gain_num: 80,
                gain_den: 11,
            },
            ev_connect_window_ms: 2_000,
            evse_ready_delay_ms: 1_000,
            diode_check_delay_ms: 20,

            // Supply (peak values)
            grid_230v: VoltageLimits {
                low_mv: 276_000,
                high_mv: 374_000,
            },
            grid_120v: VoltageLimits {
                low_mv: 144_000,
                high_mv: 196_000,
            },
            grid_detect_threshold_mv: 240_000,
            line_scaling: VoltageScaling::LINE,
            relay_side_scaling: VoltageScaling::relay_side_for(BoardRevision::RevD),

            // Current
            nominal_current_ma: 16_000,
            derated_current_ma: 10_000,
            overcurrent_margin_ma: 2_000,
            idle_current_limit_ma: 500,
            overcurrent_debounce_windows: 5,

            // Temperature
            derate_temperature_mdeg: 70_000,
            shutdown_temperature_mdeg: 85_000,
            temperature_hysteresis_mdeg: 5_000,

            // Relay check
            relay_check_windows: 10,
            relay_stuck_threshold_mv: 50_000,

            // RCD
            rcd: RcdTiming {
                stimulus_release_ms: 60,
                first_sample_ms: 700,
                second_sample_ms: 1_400,
                third_sample_ms: 2_100,
                cooldown_ms: 30_000,
            },

            // Boot
            startup_supply_samples: 320,
            startup_retry_delay_ms: 100,
        }
    }
}

impl ChargeConfig {
    /// Limits for the detected grid.
    pub fn voltage_limits(&self, grid: GridVariant) -> VoltageLimits {
        match grid {
            GridVariant::Nominal230V => self.grid_230v,
            GridVariant::Nominal120V => self.grid_120v,
        }
    }

    /// Classify a boot-time peak line voltage.
    pub fn detect_grid(&self, v1_peak_mv: i32) -> GridVariant {
        if v1_peak_mv < self.grid_detect_threshold_mv {
            GridVariant::Nominal120V
        } else {
            GridVariant::Nominal230V
        }
    }

    /// Overcurrent limit while offering `offered_ma`.
    pub fn active_current_limit(&self, offered_ma: i32) -> i32 {
        offered_ma.saturating_add(self.overcurrent_margin_ma)
    }

    /// Convert a duration into whole ticks, rounding up.
    pub fn ms_to_ticks(&self, ms: u32) -> u32 {
        if self.tick_ms == 0 {
            return 0;
        }
        ms.div_ceil(self.tick_ms)
    }

    /// Parse a JSON document and validate it.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|_| ConfigError::Malformed)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the control loop unsafe or incoherent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_ms == 0 {
            return Err(ConfigError::ValidationFailed("tick_ms must be non-zero"));
        }
        if self.supply_window_ticks == 0 || self.temperature_read_ticks == 0 {
            return Err(ConfigError::ValidationFailed(
                "supply and temperature cadences must be non-zero",
            ));
        }

        let b = &self.pilot_bands;
        if !(b.floor_mv < b.d_upper_mv
            && b.d_upper_mv < b.c_upper_mv
            && b.c_upper_mv < b.b_upper_mv
            && b.b_upper_mv < b.a_upper_mv)
        {
            return Err(ConfigError::ValidationFailed(
                "pilot band edges must be strictly increasing",
            ));
        }
        if b.diode_ceiling_mv >= 0 {
            return Err(ConfigError::ValidationFailed(
                "diode ceiling must be a negative voltage",
            ));
        }
        if self.pilot_adc.full_scale_raw == 0 || self.pilot_adc.gain_den == 0 {
            return Err(ConfigError::ValidationFailed("pilot ADC transfer is degenerate"));
        }

        for limits in [self.grid_230v, self.grid_120v] {
            if limits.low_mv >= limits.high_mv {
                return Err(ConfigError::ValidationFailed(
                    "grid low limit must be below high limit",
                ));
            }
        }
        for scaling in [self.line_scaling, self.relay_side_scaling] {
            if scaling.numerator <= 0 || scaling.denominator <= 0 {
                return Err(ConfigError::ValidationFailed(
                    "voltage scaling must be a positive ratio",
                ));
            }
        }

        if self.derated_current_ma <= 0 || self.derated_current_ma > self.nominal_current_ma {
            return Err(ConfigError::ValidationFailed(
                "derated current must be positive and not above nominal",
            ));
        }
        if self.overcurrent_debounce_windows == 0 {
            return Err(ConfigError::ValidationFailed(
                "overcurrent debounce must be at least one window",
            ));
        }

        if self.shutdown_temperature_mdeg <= self.derate_temperature_mdeg {
            return Err(ConfigError::ValidationFailed(
                "shutdown temperature must be above derate temperature",
            ));
        }
        if self.temperature_hysteresis_mdeg < 0 {
            return Err(ConfigError::ValidationFailed("temperature hysteresis is negative"));
        }

        if self.relay_check_windows < 2 {
            return Err(ConfigError::ValidationFailed(
                "relay check needs at least two windows",
            ));
        }

        let offsets = self.rcd.offsets_ms();
        if offsets.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ConfigError::ValidationFailed(
                "RCD step offsets must be strictly increasing",
            ));
        }

        Ok(())
    }
}
