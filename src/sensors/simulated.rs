//! Simulated analog-input board for dry runs and tests.
//!
//! Behaves like a continuous hardware scan drained by the caller: every read
//! returns all scans that came due since the previous read, interleaved by
//! channel, stamped on the shared [`Clock`]. Falling behind by more than the
//! internal buffer reports a buffer overrun, exactly as the real board does.

use super::acquisition::{AcquisitionAdapter, AcquisitionError, ScanMode, ScanRead, ScanStatus};
use super::{Channel, Sample};
use crate::clock::Clock;
use std::collections::HashMap;
use std::time::Duration;

// Samples per channel held by the board between reads.
const DEFAULT_BUFFER_CAPACITY: u64 = 10_000;

/// Channel output as a function of time since scan start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VoltageProfile {
    Constant(f64),
    /// Linear from `start` to `end` over `over`, then holds `end`.
    Ramp { start: f64, end: f64, over: Duration },
    Step { before: f64, after: f64, at: Duration },
    /// `peak` in `[from, until)`, `base` elsewhere.
    Pulse { base: f64, peak: f64, from: Duration, until: Duration },
}

impl VoltageProfile {
    pub fn value_at(&self, t: Duration) -> f64 {
        match *self {
            VoltageProfile::Constant(v) => v,
            VoltageProfile::Ramp { start, end, over } => {
                if over.is_zero() || t >= over {
                    end
                } else {
                    start + (end - start) * (t.as_secs_f64() / over.as_secs_f64())
                }
            }
            VoltageProfile::Step { before, after, at } => {
                if t >= at {
                    after
                } else {
                    before
                }
            }
            VoltageProfile::Pulse { base, peak, from, until } => {
                if t >= from && t < until {
                    peak
                } else {
                    base
                }
            }
        }
    }
}

#[derive(Debug)]
struct ActiveScan {
    started_at: Duration,
    rate_hz: f64,
    limit: Option<u64>,
    scans_emitted: u64,
    latched: Option<ScanStatus>,
}

#[derive(Debug)]
pub struct SimulatedDaq<C: Clock> {
    clock: C,
    profiles: HashMap<u8, VoltageProfile>,
    channels: Vec<Channel>,
    buffer_capacity: u64,
    injected_overrun: Option<(Duration, ScanStatus)>,
    scan: Option<ActiveScan>,
    closed: bool,
}

impl<C: Clock> SimulatedDaq<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            profiles: HashMap::new(),
            channels: Vec::new(),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            injected_overrun: None,
            scan: None,
            closed: false,
        }
    }

    /// Output of `channel_id`. Channels without a profile read 0 V.
    pub fn with_profile(mut self, channel_id: u8, profile: VoltageProfile) -> Self {
        self.profiles.insert(channel_id, profile);
        self
    }

    pub fn with_buffer_capacity(mut self, samples_per_channel: u64) -> Self {
        self.buffer_capacity = samples_per_channel.max(1);
        self
    }

    /// Report a hardware overrun on the first read at or after `at` into the scan.
    pub fn with_hardware_overrun_at(mut self, at: Duration) -> Self {
        self.injected_overrun = Some((
            at,
            ScanStatus {
                running: false,
                hardware_overrun: true,
                buffer_overrun: false,
            },
        ));
        self
    }

    pub fn with_buffer_overrun_at(mut self, at: Duration) -> Self {
        self.injected_overrun = Some((
            at,
            ScanStatus {
                running: false,
                hardware_overrun: false,
                buffer_overrun: true,
            },
        ));
        self
    }

    pub fn is_running(&self) -> bool {
        self.scan.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn sample_scans(&self, first: u64, count: u64, scan: &ActiveScan, now: Duration) -> Vec<Sample> {
        let mut samples = Vec::with_capacity((count as usize).saturating_mul(self.channels.len()));
        for index in first..first + count {
            #[allow(clippy::cast_precision_loss)]
            let offset = Duration::from_secs_f64(index as f64 / scan.rate_hz);
            let timestamp = (scan.started_at + offset).min(now);
            for channel in &self.channels {
                let voltage = self
                    .profiles
                    .get(&channel.id)
                    .map_or(0.0, |profile| profile.value_at(offset));
                samples.push(Sample {
                    channel_id: channel.id,
                    voltage,
                    timestamp,
                });
            }
        }
        samples
    }
}

impl<C: Clock> AcquisitionAdapter for SimulatedDaq<C> {
    fn start(&mut self, channels: &[Channel], rate_hz: f64, mode: ScanMode) -> Result<(), AcquisitionError> {
        if self.closed {
            return Err(AcquisitionError::Start("device already closed".into()));
        }
        if self.scan.is_some() {
            return Err(AcquisitionError::Start("a scan is already running".into()));
        }
        if channels.is_empty() {
            return Err(AcquisitionError::Start("no channels selected".into()));
        }
        if !rate_hz.is_finite() || rate_hz <= 0.0 {
            return Err(AcquisitionError::Start(format!("unsupported scan rate {rate_hz} Hz")));
        }
        self.channels = channels.to_vec();
        self.scan = Some(ActiveScan {
            started_at: self.clock.now(),
            rate_hz,
            limit: match mode {
                ScanMode::Continuous => None,
                ScanMode::Finite { samples_per_channel } => Some(u64::from(samples_per_channel)),
            },
            scans_emitted: 0,
            latched: None,
        });
        Ok(())
    }

    fn read(&mut self, _timeout: Duration) -> Result<ScanRead, AcquisitionError> {
        let mut scan = self.scan.take().ok_or(AcquisitionError::NotRunning)?;
        let result = self.drain(&mut scan);
        self.scan = Some(scan);
        Ok(result)
    }

    fn stop(&mut self) -> Result<(), AcquisitionError> {
        self.scan
            .take()
            .map(|_| ())
            .ok_or_else(|| AcquisitionError::Stop("no scan is running".into()))
    }

    fn close(&mut self) -> Result<(), AcquisitionError> {
        if self.closed {
            return Err(AcquisitionError::Close("device already closed".into()));
        }
        self.scan = None;
        self.closed = true;
        Ok(())
    }
}

impl<C: Clock> SimulatedDaq<C> {
    fn drain(&self, scan: &mut ActiveScan) -> ScanRead {
        if let Some(status) = scan.latched {
            return ScanRead { samples: Vec::new(), status };
        }

        let now = self.clock.now();
        let elapsed = now.saturating_sub(scan.started_at);

        if let Some((at, status)) = self.injected_overrun {
            if elapsed >= at {
                scan.latched = Some(status);
                return ScanRead { samples: Vec::new(), status };
            }
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let mut due = (elapsed.as_secs_f64() * scan.rate_hz).floor() as u64 + 1;
        if let Some(limit) = scan.limit {
            due = due.min(limit);
        }
        let pending = due.saturating_sub(scan.scans_emitted);

        if pending > self.buffer_capacity {
            let status = ScanStatus {
                running: false,
                hardware_overrun: false,
                buffer_overrun: true,
            };
            scan.latched = Some(status);
            return ScanRead { samples: Vec::new(), status };
        }

        let samples = self.sample_scans(scan.scans_emitted, pending, scan, now);
        scan.scans_emitted = due;

        let finished = scan.limit.is_some_and(|limit| scan.scans_emitted >= limit);
        ScanRead {
            samples,
            status: ScanStatus {
                running: !finished,
                ..ScanStatus::default()
            },
        }
    }
}
