pub mod acquisition;
pub mod conversion;
pub mod simulated;

pub use acquisition::{AcquisitionAdapter, AcquisitionError, ScanMode, ScanRead, ScanStatus};
pub use conversion::{force_kg, pressure_bar, temperature_c};
pub use simulated::{SimulatedDaq, VoltageProfile};

use crate::config::LoadCellCalibration;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuantityKind {
    Pressure,
    Temperature,
    Force,
}

impl QuantityKind {
    pub fn unit(self) -> Unit {
        match self {
            QuantityKind::Pressure => Unit::Bar,
            QuantityKind::Temperature => Unit::Celsius,
            QuantityKind::Force => Unit::Kilogram,
        }
    }
}

impl fmt::Display for QuantityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QuantityKind::Pressure => "pressure",
            QuantityKind::Temperature => "temperature",
            QuantityKind::Force => "force",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    Bar,
    Celsius,
    /// Load-cell output is calibrated in kilograms of thrust.
    Kilogram,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Unit::Bar => "bar",
            Unit::Celsius => "°C",
            Unit::Kilogram => "kg",
        };
        f.write_str(symbol)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: u8,
    pub kind: QuantityKind,
}

impl Channel {
    pub const fn new(id: u8, kind: QuantityKind) -> Self {
        Self { id, kind }
    }
}

/// One raw acquisition sample.
///
/// Load-cell channels carry the amplifier's raw count in `voltage`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub channel_id: u8,
    pub voltage: f64,
    /// Reading of the run's monotonic clock when the sample was taken.
    pub timestamp: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicalReading {
    pub channel_id: u8,
    pub kind: QuantityKind,
    pub value: f64,
    pub unit: Unit,
    pub timestamp: Duration,
}

/// Channel-to-quantity mapping for a run, plus what is needed to convert
/// each channel's samples.
#[derive(Debug, Clone)]
pub struct ChannelMap {
    channels: HashMap<u8, Channel>,
    load_cell: LoadCellCalibration,
}

impl ChannelMap {
    pub fn new(channels: &[Channel], load_cell: LoadCellCalibration) -> Self {
        Self {
            channels: channels.iter().map(|channel| (channel.id, *channel)).collect(),
            load_cell,
        }
    }

    pub fn get(&self, channel_id: u8) -> Option<&Channel> {
        self.channels.get(&channel_id)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Convert a sample to physical units. `None` when the sample comes from
    /// a channel that is not part of this run.
    pub fn convert(&self, sample: &Sample) -> Option<PhysicalReading> {
        let channel = self.channels.get(&sample.channel_id)?;
        let value = match channel.kind {
            QuantityKind::Pressure => pressure_bar(sample.voltage),
            QuantityKind::Temperature => temperature_c(sample.voltage),
            QuantityKind::Force => force_kg(sample.voltage, &self.load_cell),
        };
        Some(PhysicalReading {
            channel_id: sample.channel_id,
            kind: channel.kind,
            value,
            unit: channel.kind.unit(),
            timestamp: sample.timestamp,
        })
    }
}
