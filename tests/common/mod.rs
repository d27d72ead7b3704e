#![allow(dead_code)]

use hotfire::config::{FiringConfig, Thresholds};
use hotfire::controller::CancelToken;
use hotfire::sensors::acquisition::{AcquisitionAdapter, AcquisitionError, ScanMode, ScanRead, ScanStatus};
use hotfire::sensors::conversion::{pressure_to_voltage, temperature_to_voltage};
use hotfire::sensors::{Channel, PhysicalReading, QuantityKind, Sample};
use std::collections::VecDeque;
use std::time::Duration;

pub const PRESSURE_CH: u8 = 0;
pub const TEMPERATURE_CH: u8 = 5;
pub const FORCE_CH: u8 = 8;

pub fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// Default stand configuration with a slow scan so tests stay small.
pub fn test_config() -> FiringConfig {
    FiringConfig {
        scan_rate_hz: 10.0,
        ..FiringConfig::default()
    }
}

pub fn thresholds() -> Thresholds {
    Thresholds::default()
}

pub fn reading(kind: QuantityKind, value: f64) -> PhysicalReading {
    PhysicalReading {
        channel_id: match kind {
            QuantityKind::Pressure => PRESSURE_CH,
            QuantityKind::Temperature => TEMPERATURE_CH,
            QuantityKind::Force => FORCE_CH,
        },
        kind,
        value,
        unit: kind.unit(),
        timestamp: Duration::ZERO,
    }
}

pub fn pressure_sample(bar: f64, timestamp: Duration) -> Sample {
    Sample {
        channel_id: PRESSURE_CH,
        voltage: pressure_to_voltage(bar),
        timestamp,
    }
}

pub fn temperature_sample(celsius: f64, timestamp: Duration) -> Sample {
    Sample {
        channel_id: TEMPERATURE_CH,
        voltage: temperature_to_voltage(celsius),
        timestamp,
    }
}

/// One scan of the default channels well inside every limit.
pub fn nominal_scan(timestamp: Duration) -> Vec<Sample> {
    vec![
        pressure_sample(10.0, timestamp),
        temperature_sample(20.0, timestamp),
        // 0 raw counts on the load cell is about -1.5 kg with the default calibration.
        Sample {
            channel_id: FORCE_CH,
            voltage: 0.0,
            timestamp,
        },
    ]
}

/// Acquisition adapter that replays a fixed script of reads.
///
/// Once the script is exhausted every read returns an empty, running batch.
#[derive(Debug, Default)]
pub struct ScriptedDaq {
    script: VecDeque<Result<ScanRead, AcquisitionError>>,
    fail_start: bool,
    fail_teardown: bool,
    cancel_after: Option<(usize, CancelToken)>,
    pub started_with: Vec<Channel>,
    pub reads_taken: usize,
    pub stopped: bool,
    pub closed: bool,
}

impl ScriptedDaq {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_read(mut self, samples: Vec<Sample>) -> Self {
        self.script.push_back(Ok(ScanRead::running(samples)));
        self
    }

    pub fn then_status(mut self, samples: Vec<Sample>, status: ScanStatus) -> Self {
        self.script.push_back(Ok(ScanRead { samples, status }));
        self
    }

    pub fn then_error(mut self, error: AcquisitionError) -> Self {
        self.script.push_back(Err(error));
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Make `stop` and `close` report errors (they are still recorded).
    pub fn failing_teardown(mut self) -> Self {
        self.fail_teardown = true;
        self
    }

    /// Request cancellation right after the `reads`-th read has been served.
    pub fn cancel_after(mut self, reads: usize, token: CancelToken) -> Self {
        self.cancel_after = Some((reads, token));
        self
    }
}

impl AcquisitionAdapter for ScriptedDaq {
    fn start(&mut self, channels: &[Channel], _rate_hz: f64, _mode: ScanMode) -> Result<(), AcquisitionError> {
        if self.fail_start {
            return Err(AcquisitionError::Start("board not responding".into()));
        }
        self.started_with = channels.to_vec();
        Ok(())
    }

    fn read(&mut self, _timeout: Duration) -> Result<ScanRead, AcquisitionError> {
        self.reads_taken += 1;
        if let Some((after, token)) = &self.cancel_after {
            if self.reads_taken >= *after {
                token.cancel();
            }
        }
        self.script
            .pop_front()
            .unwrap_or_else(|| Ok(ScanRead::running(Vec::new())))
    }

    fn stop(&mut self) -> Result<(), AcquisitionError> {
        self.stopped = true;
        if self.fail_teardown {
            return Err(AcquisitionError::Stop("scan did not acknowledge stop".into()));
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), AcquisitionError> {
        self.closed = true;
        if self.fail_teardown {
            return Err(AcquisitionError::Close("device busy".into()));
        }
        Ok(())
    }
}
