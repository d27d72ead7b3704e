//! Boundary to the analog-input subsystem.
//!
//! The controller only relies on two guarantees from an adapter: samples of
//! one channel come back in chronological order, and an overrun flag means
//! samples were lost for good.

use super::{Channel, Sample};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("failed to start scan: {0}")]
    Start(String),
    #[error("scan read failed: {0}")]
    Read(String),
    #[error("failed to stop scan: {0}")]
    Stop(String),
    #[error("failed to release acquisition device: {0}")]
    Close(String),
    #[error("no scan is running")]
    NotRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanMode {
    /// Free-running scan drained by the caller.
    Continuous,
    /// Stop after a fixed number of samples per channel.
    Finite { samples_per_channel: u32 },
}

/// Status flags returned with every drain read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScanStatus {
    pub running: bool,
    pub hardware_overrun: bool,
    pub buffer_overrun: bool,
}

impl ScanStatus {
    pub const RUNNING: Self = Self {
        running: true,
        hardware_overrun: false,
        buffer_overrun: false,
    };

    pub fn is_overrun(&self) -> bool {
        self.hardware_overrun || self.buffer_overrun
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanRead {
    pub samples: Vec<Sample>,
    pub status: ScanStatus,
}

impl ScanRead {
    pub fn running(samples: Vec<Sample>) -> Self {
        Self {
            samples,
            status: ScanStatus::RUNNING,
        }
    }
}

pub trait AcquisitionAdapter {
    fn start(&mut self, channels: &[Channel], rate_hz: f64, mode: ScanMode) -> Result<(), AcquisitionError>;

    /// Drain every sample collected since the previous call. The timeout is
    /// only honoured by adapters that block; draining all available data
    /// returns immediately.
    fn read(&mut self, timeout: Duration) -> Result<ScanRead, AcquisitionError>;

    fn stop(&mut self) -> Result<(), AcquisitionError>;

    /// Release the device. Called once after `stop`, on every exit path.
    fn close(&mut self) -> Result<(), AcquisitionError>;
}

impl<A: AcquisitionAdapter + ?Sized> AcquisitionAdapter for Box<A> {
    fn start(&mut self, channels: &[Channel], rate_hz: f64, mode: ScanMode) -> Result<(), AcquisitionError> {
        (**self).start(channels, rate_hz, mode)
    }

    fn read(&mut self, timeout: Duration) -> Result<ScanRead, AcquisitionError> {
        (**self).read(timeout)
    }

    fn stop(&mut self) -> Result<(), AcquisitionError> {
        (**self).stop()
    }

    fn close(&mut self) -> Result<(), AcquisitionError> {
        (**self).close()
    }
}
