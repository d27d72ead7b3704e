//! Firing controller: the single driver of a run.
//!
//! Each poll drains the acquisition adapter, converts every sample, feeds
//! the readings to the [`Interlock`] in chronological order, applies the
//! returned actions to the valves and appends each reading to the run log.
//! The loop is cooperative and single threaded; the only blocking point is
//! the drain read. Cancellation is polled once per iteration and goes
//! through the same valve-close path as every other exit.

use crate::actuators::{ActuatorError, ValveActuator, ValveGuard, ValveId, ValveState};
use crate::clock::Clock;
use crate::config::{ConfigError, FiringConfig};
use crate::interlock::{Action, Interlock, PhaseTransition, RunPhase, StopReason};
use crate::logger::{LogRecord, RunLogger};
use crate::sensors::{AcquisitionAdapter, AcquisitionError, ChannelMap, Sample, ScanMode};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn};

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("a firing run is already active")]
    RunAlreadyActive,
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),
    #[error(transparent)]
    Actuator(#[from] ActuatorError),
}

/// Cooperative cancellation flag shared with whatever watches the operator.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    requested: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Single-occupancy slot: at most one run holds it at a time.
#[derive(Debug, Default)]
pub struct RunSlot {
    active: AtomicBool,
}

impl RunSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Result<RunPermit<'_>, ControllerError> {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ControllerError::RunAlreadyActive)?;
        Ok(RunPermit { slot: self })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// Held for the duration of a run; frees the slot when dropped.
#[derive(Debug)]
pub struct RunPermit<'a> {
    slot: &'a RunSlot,
}

impl Drop for RunPermit<'_> {
    fn drop(&mut self) {
        self.slot.active.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub batches: u32,
    pub samples_drained: u64,
    pub readings_processed: u64,
    pub records_logged: u64,
    pub log_failures: u64,
    pub valve_write_failures: u32,
    pub unmapped_samples: u64,
    pub largest_batch: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub reason: StopReason,
    /// Time from Valve1 opening to the last decision.
    pub elapsed: Duration,
    pub transitions: Vec<PhaseTransition>,
    pub stats: RunStats,
    /// Last commanded state of each valve.
    pub valves: [ValveState; 2],
}

impl RunReport {
    pub fn exit_code(&self) -> i32 {
        self.reason.exit_code()
    }

    pub fn is_nominal(&self) -> bool {
        !self.reason.is_abort()
    }

    pub fn valve(&self, valve: ValveId) -> ValveState {
        self.valves[valve.index()]
    }
}

pub struct FiringController<C: Clock> {
    config: FiringConfig,
    channel_map: ChannelMap,
    clock: C,
    slot: Arc<RunSlot>,
}

impl<C: Clock> FiringController<C> {
    pub fn new(config: FiringConfig, clock: C) -> Result<Self, ConfigError> {
        config.validate()?;
        let channel_map = ChannelMap::new(&config.channel_list(), config.load_cell);
        Ok(Self {
            config,
            channel_map,
            clock,
            slot: Arc::new(RunSlot::new()),
        })
    }

    /// Share a run slot with other controllers driving the same stand.
    pub fn with_run_slot(mut self, slot: Arc<RunSlot>) -> Self {
        self.slot = slot;
        self
    }

    pub fn config(&self) -> &FiringConfig {
        &self.config
    }

    pub fn run_slot(&self) -> Arc<RunSlot> {
        Arc::clone(&self.slot)
    }

    /// Execute one firing from Valve1 opening to both valves closed.
    ///
    /// Valves are commanded closed on entry and on every exit path,
    /// including errors and panics. Threshold breaches, overruns and
    /// cancellation are reported through [`RunReport::reason`]; only hard
    /// adapter or Valve1 failures come back as errors.
    pub fn run<A, V, L>(
        &self,
        adapter: &mut A,
        valves: &mut V,
        logger: &mut L,
        cancel: &CancelToken,
    ) -> Result<RunReport, ControllerError>
    where
        A: AcquisitionAdapter + ?Sized,
        V: ValveActuator + ?Sized,
        L: RunLogger + ?Sized,
    {
        let slot = Arc::clone(&self.slot);
        let _permit = slot.try_acquire()?;
        let span = info_span!("firing");
        let _entered = span.enter();

        let mut valves = ValveGuard::new(valves);
        let channels = self.config.channel_list();
        info!(
            channels = channels.len(),
            rate_hz = self.config.scan_rate_hz,
            "starting acquisition scan"
        );

        let result = match adapter.start(&channels, self.config.scan_rate_hz, ScanMode::Continuous) {
            Ok(()) => {
                let result = self.fire(adapter, &mut valves, logger, cancel);
                if let Err(e) = adapter.stop() {
                    warn!("failed to stop acquisition scan: {e}");
                }
                result
            }
            Err(e) => {
                error!("acquisition start failed: {e}");
                Err(e.into())
            }
        };

        if let Err(e) = adapter.close() {
            warn!("failed to release acquisition device: {e}");
        }
        valves.close_all();
        if let Err(e) = logger.flush() {
            warn!("failed to flush run log: {e}");
        }

        result.map(|mut report| {
            report.valves = valves.states();
            report.stats.valve_write_failures = valves.write_failures();
            info!(
                reason = %report.reason,
                elapsed_s = report.elapsed.as_secs_f64(),
                readings = report.stats.readings_processed,
                "firing finished, valves closed"
            );
            report
        })
    }

    fn fire<A, V, L>(
        &self,
        adapter: &mut A,
        valves: &mut ValveGuard<'_, V>,
        logger: &mut L,
        cancel: &CancelToken,
    ) -> Result<RunReport, ControllerError>
    where
        A: AcquisitionAdapter + ?Sized,
        V: ValveActuator + ?Sized,
        L: RunLogger + ?Sized,
    {
        let mut run = ActiveRun {
            interlock: Interlock::new(self.config.thresholds),
            fire_start: self.clock.now(),
            stats: RunStats::default(),
        };

        let action = run.interlock.begin_firing(run.fire_start);
        run.apply(action, valves)?;

        let reason = loop {
            if cancel.is_cancelled() {
                warn!("cancellation requested");
                break run.shut_down(StopReason::OperatorCancelled, valves);
            }

            let read = adapter.read(self.config.read_timeout())?;
            run.stats.batches += 1;

            if read.status.is_overrun() {
                error!(
                    hardware = read.status.hardware_overrun,
                    buffer = read.status.buffer_overrun,
                    "acquisition overrun, samples lost"
                );
                break run.shut_down(StopReason::AcquisitionOverrun, valves);
            }

            run.stats.samples_drained += read.samples.len() as u64;
            run.stats.largest_batch = run.stats.largest_batch.max(read.samples.len());
            self.process_batch(&mut run, read.samples, valves, logger)?;

            if !run.interlock.phase().is_shutdown() {
                if !read.status.running {
                    error!("acquisition scan is no longer running");
                    break run.shut_down(StopReason::AcquisitionStopped, valves);
                }
                let elapsed = self.clock.now().saturating_sub(run.fire_start);
                let action = run.interlock.on_tick(elapsed);
                run.apply(action, valves)?;
            }

            if run.interlock.is_completed() {
                break run.interlock.stop_reason().unwrap_or(StopReason::TimeLimitReached);
            }

            self.clock.sleep(self.config.poll_interval());
        };

        Ok(RunReport {
            reason,
            elapsed: run.interlock.elapsed(),
            transitions: run.interlock.transitions().to_vec(),
            stats: run.stats,
            valves: valves.states(),
        })
    }

    /// Every drained sample is judged, not only the newest per channel, so
    /// a transient spike between polls cannot slip through.
    fn process_batch<V, L>(
        &self,
        run: &mut ActiveRun,
        mut samples: Vec<Sample>,
        valves: &mut ValveGuard<'_, V>,
        logger: &mut L,
    ) -> Result<(), ControllerError>
    where
        V: ValveActuator + ?Sized,
        L: RunLogger + ?Sized,
    {
        // Stable: samples of one scan keep their channel order.
        samples.sort_by_key(|sample| sample.timestamp);

        for sample in &samples {
            let Some(reading) = self.channel_map.convert(sample) else {
                run.stats.unmapped_samples += 1;
                continue;
            };

            let elapsed = sample
                .timestamp
                .saturating_sub(run.fire_start)
                .max(run.interlock.elapsed());
            let action = run.interlock.on_reading(&reading, elapsed);
            run.apply(action, valves)?;
            run.stats.readings_processed += 1;

            let record = LogRecord::from_reading(&reading, run.interlock.elapsed());
            match logger.append(&record) {
                Ok(()) => run.stats.records_logged += 1,
                Err(e) => {
                    if run.stats.log_failures == 0 {
                        warn!("run log degraded, continuing with console reporting: {e}");
                    }
                    run.stats.log_failures += 1;
                    info!(
                        elapsed_s = record.elapsed.as_secs_f64(),
                        channel = record.channel_id,
                        quantity = %record.kind,
                        value = record.value,
                        "reading"
                    );
                }
            }

            if run.interlock.phase().is_shutdown() {
                break;
            }
        }
        Ok(())
    }
}

struct ActiveRun {
    interlock: Interlock,
    fire_start: Duration,
    stats: RunStats,
}

impl ActiveRun {
    fn apply<V: ValveActuator + ?Sized>(
        &mut self,
        action: Action,
        valves: &mut ValveGuard<'_, V>,
    ) -> Result<(), ControllerError> {
        match action {
            Action::NoOp => {}
            Action::OpenValve1 => {
                if let Err(e) = valves.open(ValveId::Valve1) {
                    error!("failed to open valve 1, aborting: {e}");
                    valves.close_all();
                    return Err(e.into());
                }
                info!("valve 1 open, firing started");
            }
            Action::OpenValve2 => match valves.open(ValveId::Valve2) {
                Ok(()) => info!(elapsed_s = self.interlock.elapsed().as_secs_f64(), "valve 2 open"),
                Err(e) => error!("failed to open valve 2: {e}"),
            },
            Action::CloseBoth => {
                valves.close_all();
                self.interlock.confirm_closed();
                match self.interlock.stop_reason() {
                    Some(reason) if reason.is_abort() => warn!(
                        %reason,
                        elapsed_s = self.interlock.elapsed().as_secs_f64(),
                        "run aborted, both valves closed"
                    ),
                    Some(reason) => info!(%reason, "both valves closed"),
                    None => debug!("both valves closed"),
                }
            }
        }
        debug_assert!(
            action != Action::OpenValve2 || self.interlock.phase() == RunPhase::Valve2Open,
            "valve 2 commanded open outside the Valve2Open phase"
        );
        Ok(())
    }

    fn shut_down<V: ValveActuator + ?Sized>(&mut self, reason: StopReason, valves: &mut ValveGuard<'_, V>) -> StopReason {
        let action = self.interlock.abort(reason);
        if let Err(e) = self.apply(action, valves) {
            error!(?action, "valve command failed during shutdown: {e}");
        }
        valves.close_all();
        self.interlock.stop_reason().unwrap_or(reason)
    }
}
