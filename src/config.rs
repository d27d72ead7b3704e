//! Firing configuration.
//!
//! Thresholds, timing constants, the channel map and the valve relay lines
//! are supplied once at run start and never mutated while a run is active.
//! Files are JSON; any field left out falls back to the test-stand defaults.

use crate::sensors::{Channel, QuantityKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_MAX_PRESSURE_BAR: f64 = 15.0;
const DEFAULT_MAX_TEMPERATURE_C: f64 = 25.0;
const DEFAULT_MAX_FORCE_KG: f64 = 5.0;
const DEFAULT_FIRE_DURATION_S: f64 = 7.0;
const DEFAULT_VALVE2_OPEN_DELAY_S: f64 = 2.0;

const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
const DEFAULT_SCAN_RATE_HZ: f64 = 1000.0;
// Ignored by drain reads, kept for adapters that block.
const DEFAULT_READ_TIMEOUT_S: f64 = 5.0;

// Relay lines on the stand's Raspberry Pi header (physical pins 37 and 38).
const DEFAULT_VALVE1_GPIO: u32 = 25;
const DEFAULT_VALVE2_GPIO: u32 = 28;

// HX711 calibration measured on the thrust stand.
const DEFAULT_LOAD_CELL_OFFSET: f64 = -68_571.0;
const DEFAULT_LOAD_CELL_REFERENCE_UNIT: f64 = -44_674.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Hard abort limits and sequence timing for one run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub max_pressure_bar: f64,
    pub max_temperature_c: f64,
    pub max_force_kg: f64,
    pub fire_duration_s: f64,
    pub valve2_open_delay_s: f64,
}

impl Thresholds {
    /// NaN maps to zero: the run ends on its first check.
    pub fn fire_duration(&self) -> Duration {
        seconds(self.fire_duration_s, Duration::ZERO)
    }

    /// Delays too long to represent saturate at `Duration::MAX`, so Valve2
    /// never opens. NaN is treated the same way.
    pub fn valve2_open_delay(&self) -> Duration {
        seconds(self.valve2_open_delay_s, Duration::MAX)
    }

    /// Limit for a quantity, in that quantity's unit.
    pub fn limit_for(&self, kind: QuantityKind) -> f64 {
        match kind {
            QuantityKind::Pressure => self.max_pressure_bar,
            QuantityKind::Temperature => self.max_temperature_c,
            QuantityKind::Force => self.max_force_kg,
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            max_pressure_bar: DEFAULT_MAX_PRESSURE_BAR,
            max_temperature_c: DEFAULT_MAX_TEMPERATURE_C,
            max_force_kg: DEFAULT_MAX_FORCE_KG,
            fire_duration_s: DEFAULT_FIRE_DURATION_S,
            valve2_open_delay_s: DEFAULT_VALVE2_OPEN_DELAY_S,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub id: u8,
    pub kind: QuantityKind,
}

impl From<ChannelConfig> for Channel {
    fn from(config: ChannelConfig) -> Self {
        Channel::new(config.id, config.kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValvePins {
    pub valve1_gpio: u32,
    pub valve2_gpio: u32,
}

impl Default for ValvePins {
    fn default() -> Self {
        Self {
            valve1_gpio: DEFAULT_VALVE1_GPIO,
            valve2_gpio: DEFAULT_VALVE2_GPIO,
        }
    }
}

/// Linear calibration of the load-cell amplifier: `kg = (raw - offset) / reference_unit`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadCellCalibration {
    pub offset: f64,
    pub reference_unit: f64,
}

impl Default for LoadCellCalibration {
    fn default() -> Self {
        Self {
            offset: DEFAULT_LOAD_CELL_OFFSET,
            reference_unit: DEFAULT_LOAD_CELL_REFERENCE_UNIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FiringConfig {
    pub thresholds: Thresholds,
    pub channels: Vec<ChannelConfig>,
    pub poll_interval_ms: u64,
    pub scan_rate_hz: f64,
    pub read_timeout_s: f64,
    pub valves: ValvePins,
    pub load_cell: LoadCellCalibration,
}

impl Default for FiringConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            channels: vec![
                ChannelConfig { id: 0, kind: QuantityKind::Pressure },
                ChannelConfig { id: 5, kind: QuantityKind::Temperature },
                ChannelConfig { id: 8, kind: QuantityKind::Force },
            ],
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            scan_rate_hz: DEFAULT_SCAN_RATE_HZ,
            read_timeout_s: DEFAULT_READ_TIMEOUT_S,
            valves: ValvePins::default(),
            load_cell: LoadCellCalibration::default(),
        }
    }
}

impl FiringConfig {
    /// Load and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        seconds(self.read_timeout_s, Duration::ZERO)
    }

    pub fn channel_list(&self) -> Vec<Channel> {
        self.channels.iter().copied().map(Channel::from).collect()
    }

    /// Reject configurations that would make the interlock meaningless.
    /// Invalid values are reported, never clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.thresholds;
        for (name, value) in [
            ("max_pressure_bar", t.max_pressure_bar),
            ("max_temperature_c", t.max_temperature_c),
            ("max_force_kg", t.max_force_kg),
        ] {
            if !value.is_finite() {
                return Err(invalid(format!("{name} must be finite, got {value}")));
            }
        }
        if t.max_pressure_bar <= 0.0 {
            return Err(invalid(format!(
                "max_pressure_bar must be positive, got {}",
                t.max_pressure_bar
            )));
        }
        if t.max_force_kg <= 0.0 {
            return Err(invalid(format!("max_force_kg must be positive, got {}", t.max_force_kg)));
        }
        if !t.fire_duration_s.is_finite()
            || t.fire_duration_s <= 0.0
            || Duration::try_from_secs_f64(t.fire_duration_s).is_err()
        {
            return Err(invalid(format!(
                "fire_duration_s must be a positive number of seconds, got {}",
                t.fire_duration_s
            )));
        }
        if !t.valve2_open_delay_s.is_finite() || t.valve2_open_delay_s < 0.0 {
            return Err(invalid(format!(
                "valve2_open_delay_s must be zero or more seconds, got {}",
                t.valve2_open_delay_s
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(invalid("poll_interval_ms must be greater than zero".into()));
        }
        if self.poll_interval() >= t.fire_duration() {
            return Err(invalid(format!(
                "poll interval ({} ms) must be shorter than fire_duration_s ({} s)",
                self.poll_interval_ms, t.fire_duration_s
            )));
        }
        if !self.scan_rate_hz.is_finite() || self.scan_rate_hz <= 0.0 {
            return Err(invalid(format!("scan_rate_hz must be positive, got {}", self.scan_rate_hz)));
        }
        if !self.read_timeout_s.is_finite() || self.read_timeout_s < 0.0 {
            return Err(invalid(format!(
                "read_timeout_s must be zero or more seconds, got {}",
                self.read_timeout_s
            )));
        }
        if self.channels.is_empty() {
            return Err(invalid("at least one channel must be configured".into()));
        }
        let mut seen = HashSet::new();
        for channel in &self.channels {
            if !seen.insert(channel.id) {
                return Err(invalid(format!("channel {} is configured twice", channel.id)));
            }
        }
        if self.valves.valve1_gpio == self.valves.valve2_gpio {
            return Err(invalid(format!(
                "valve1 and valve2 share GPIO line {}",
                self.valves.valve1_gpio
            )));
        }
        if !self.load_cell.offset.is_finite()
            || !self.load_cell.reference_unit.is_finite()
            || self.load_cell.reference_unit == 0.0
        {
            return Err(invalid("load cell calibration must be finite with a non-zero reference unit".into()));
        }
        Ok(())
    }
}

fn invalid(message: String) -> ConfigError {
    ConfigError::Invalid(message)
}

// Zero and negative values map to zero, values past the representable
// range saturate at `Duration::MAX`.
fn seconds(value: f64, not_a_number: Duration) -> Duration {
    if value.is_nan() {
        not_a_number
    } else if value <= 0.0 {
        Duration::ZERO
    } else {
        Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
    }
}
