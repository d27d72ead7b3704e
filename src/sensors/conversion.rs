//! Transducer transfer functions.
//!
//! Total, stateless and exact: no clamping and no rounding beyond native
//! `f64` precision. An out-of-range voltage converts to an out-of-range
//! physical value, which the interlock then judges.

use crate::config::LoadCellCalibration;

/// Pressure transducer output at the base reading.
pub const PRESSURE_ZERO_V: f64 = 0.8;
pub const PRESSURE_SENSITIVITY_V_PER_BAR: f64 = 0.032;
pub const PRESSURE_BASE_BAR: f64 = 1.27;

/// Thermocouple amplifier: 0-5 V spans 1000 °C starting at -250 °C.
pub const THERMOCOUPLE_SPAN_C: f64 = 1000.0;
pub const THERMOCOUPLE_FULL_SCALE_V: f64 = 5.0;
pub const THERMOCOUPLE_OFFSET_C: f64 = 250.0;

pub fn pressure_bar(voltage: f64) -> f64 {
    (voltage - PRESSURE_ZERO_V) / PRESSURE_SENSITIVITY_V_PER_BAR + PRESSURE_BASE_BAR
}

pub fn temperature_c(voltage: f64) -> f64 {
    voltage * THERMOCOUPLE_SPAN_C / THERMOCOUPLE_FULL_SCALE_V - THERMOCOUPLE_OFFSET_C
}

pub fn force_kg(raw: f64, calibration: &LoadCellCalibration) -> f64 {
    (raw - calibration.offset) / calibration.reference_unit
}

/// Inverse of [`pressure_bar`], used to synthesize transducer output.
pub fn pressure_to_voltage(bar: f64) -> f64 {
    (bar - PRESSURE_BASE_BAR) * PRESSURE_SENSITIVITY_V_PER_BAR + PRESSURE_ZERO_V
}

/// Inverse of [`temperature_c`].
pub fn temperature_to_voltage(celsius: f64) -> f64 {
    (celsius + THERMOCOUPLE_OFFSET_C) * THERMOCOUPLE_FULL_SCALE_V / THERMOCOUPLE_SPAN_C
}

/// Inverse of [`force_kg`]: the raw amplifier count for a given load.
pub fn force_to_raw(kg: f64, calibration: &LoadCellCalibration) -> f64 {
    kg * calibration.reference_unit + calibration.offset
}
