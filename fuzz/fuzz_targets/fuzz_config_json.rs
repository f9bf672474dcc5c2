//! Fuzz target: `ChargeConfig::from_json`
//!
//! Arbitrary text must either be rejected or yield a configuration that
//! passes validation and converts timings without panicking.
//!
//! cargo fuzz run fuzz_config_json

#![no_main]

use evsecore::config::{ChargeConfig, GridVariant};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };
    let Ok(config) = ChargeConfig::from_json(text) else {
        return;
    };

    assert!(config.validate().is_ok());
    let _ = config.ms_to_ticks(config.evse_ready_delay_ms);
    for grid in [GridVariant::Nominal230V, GridVariant::Nominal120V] {
        let limits = config.voltage_limits(grid);
        assert!(limits.low_mv < limits.high_mv);
    }
    let _ = config.active_current_limit(config.nominal_current_ma);
});
