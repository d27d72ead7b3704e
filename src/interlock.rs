//! Safety interlock state machine.
//!
//! Pure decision logic: it owns the run phase, the elapsed time and the stop
//! reason, and answers every reading with an [`Action`] for the controller
//! to apply. It performs no I/O, never blocks and never fails.
//!
//! ```text
//! Idle ──▶ Valve1Open ──▶ Valve2Open ──▶ Completed      (fire duration reached)
//!              │               │
//!              └───────┬───────┘
//!                      ▼
//!                  Aborting ──▶ Completed                (limit breach, overrun, cancel)
//! ```
//!
//! On every reading the fire-duration check runs first, then the physical
//! limit checks, then the Valve2 delay. A reading that arrives together with
//! the time limit is therefore recorded as [`StopReason::TimeLimitReached`];
//! both outcomes close both valves.

use crate::config::Thresholds;
use crate::sensors::{PhysicalReading, QuantityKind};
use heapless::Vec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// Idle -> Valve1Open -> Valve2Open -> Aborting -> Completed is the longest path.
const MAX_TRANSITIONS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunPhase {
    Idle,
    Valve1Open,
    Valve2Open,
    Aborting,
    Completed,
}

impl RunPhase {
    /// True once no valve may ever open again in this run.
    pub fn is_shutdown(self) -> bool {
        matches!(self, RunPhase::Aborting | RunPhase::Completed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    TimeLimitReached,
    PressureLimitReached,
    TemperatureLimitReached,
    WeightLimitReached,
    AcquisitionOverrun,
    AcquisitionStopped,
    OperatorCancelled,
}

impl StopReason {
    /// Everything except reaching the planned fire duration is an abort.
    pub fn is_abort(self) -> bool {
        !matches!(self, StopReason::TimeLimitReached)
    }

    pub fn is_limit_breach(self) -> bool {
        matches!(
            self,
            StopReason::PressureLimitReached | StopReason::TemperatureLimitReached | StopReason::WeightLimitReached
        )
    }

    /// Process exit status reported by the operator binary.
    pub fn exit_code(self) -> i32 {
        match self {
            StopReason::TimeLimitReached => 0,
            StopReason::PressureLimitReached
            | StopReason::TemperatureLimitReached
            | StopReason::WeightLimitReached => 3,
            StopReason::AcquisitionOverrun | StopReason::AcquisitionStopped => 4,
            StopReason::OperatorCancelled => 5,
        }
    }

    fn for_limit(kind: QuantityKind) -> Self {
        match kind {
            QuantityKind::Pressure => StopReason::PressureLimitReached,
            QuantityKind::Temperature => StopReason::TemperatureLimitReached,
            QuantityKind::Force => StopReason::WeightLimitReached,
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StopReason::TimeLimitReached => "time limit reached",
            StopReason::PressureLimitReached => "pressure above limit",
            StopReason::TemperatureLimitReached => "temperature above limit",
            StopReason::WeightLimitReached => "weight limit reached",
            StopReason::AcquisitionOverrun => "acquisition overrun",
            StopReason::AcquisitionStopped => "acquisition stopped",
            StopReason::OperatorCancelled => "cancelled by operator",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    NoOp,
    OpenValve1,
    OpenValve2,
    CloseBoth,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub phase: RunPhase,
    /// Clock reading when Valve1 was opened.
    pub started_at: Option<Duration>,
    pub elapsed: Duration,
    pub stop_reason: Option<StopReason>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: RunPhase,
    pub to: RunPhase,
    pub elapsed: Duration,
    pub reason: Option<StopReason>,
}

#[derive(Debug)]
pub struct Interlock {
    thresholds: Thresholds,
    fire_duration: Duration,
    valve2_open_delay: Duration,
    state: RunState,
    transitions: Vec<PhaseTransition, MAX_TRANSITIONS>,
}

impl Interlock {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            fire_duration: thresholds.fire_duration(),
            valve2_open_delay: thresholds.valve2_open_delay(),
            state: RunState {
                phase: RunPhase::Idle,
                started_at: None,
                elapsed: Duration::ZERO,
                stop_reason: None,
            },
            transitions: Vec::new(),
        }
    }

    /// Start the sequence: Valve1 opens and the fire clock is anchored at `started_at`.
    pub fn begin_firing(&mut self, started_at: Duration) -> Action {
        if self.state.phase != RunPhase::Idle {
            return Action::NoOp;
        }
        self.state.started_at = Some(started_at);
        self.transition(RunPhase::Valve1Open, None);
        Action::OpenValve1
    }

    /// Judge one reading taken `elapsed` after Valve1 opened.
    pub fn on_reading(&mut self, reading: &PhysicalReading, elapsed: Duration) -> Action {
        if let Some(action) = self.settled_action() {
            return action;
        }
        self.advance(elapsed);

        if let Some(action) = self.check_fire_duration() {
            return action;
        }

        if reading.value >= self.thresholds.limit_for(reading.kind) {
            return self.begin_abort(StopReason::for_limit(reading.kind));
        }

        self.check_valve2_delay()
    }

    /// Timer-only evaluation for polls that drained no samples.
    pub fn on_tick(&mut self, elapsed: Duration) -> Action {
        if let Some(action) = self.settled_action() {
            return action;
        }
        self.advance(elapsed);

        if let Some(action) = self.check_fire_duration() {
            return action;
        }
        self.check_valve2_delay()
    }

    /// Abort for a reason observed outside the readings (overrun, cancellation).
    pub fn abort(&mut self, reason: StopReason) -> Action {
        if let Some(action) = self.settled_action() {
            return action;
        }
        self.begin_abort(reason)
    }

    /// Both valves have been commanded closed: `Aborting` becomes `Completed`.
    pub fn confirm_closed(&mut self) {
        if self.state.phase == RunPhase::Aborting {
            let reason = self.state.stop_reason;
            self.transition(RunPhase::Completed, reason);
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.state.phase
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn elapsed(&self) -> Duration {
        self.state.elapsed
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.state.stop_reason
    }

    pub fn is_completed(&self) -> bool {
        self.state.phase == RunPhase::Completed
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn transitions(&self) -> &[PhaseTransition] {
        &self.transitions
    }

    fn settled_action(&self) -> Option<Action> {
        match self.state.phase {
            RunPhase::Aborting => Some(Action::CloseBoth),
            RunPhase::Completed => Some(Action::NoOp),
            _ => None,
        }
    }

    // Elapsed never goes backwards, whatever the caller passes.
    fn advance(&mut self, elapsed: Duration) {
        self.state.elapsed = self.state.elapsed.max(elapsed);
    }

    fn check_fire_duration(&mut self) -> Option<Action> {
        if self.state.elapsed >= self.fire_duration {
            self.state.stop_reason = Some(StopReason::TimeLimitReached);
            self.transition(RunPhase::Completed, Some(StopReason::TimeLimitReached));
            return Some(Action::CloseBoth);
        }
        None
    }

    fn check_valve2_delay(&mut self) -> Action {
        if self.state.phase == RunPhase::Valve1Open && self.state.elapsed >= self.valve2_open_delay {
            self.transition(RunPhase::Valve2Open, None);
            return Action::OpenValve2;
        }
        Action::NoOp
    }

    fn begin_abort(&mut self, reason: StopReason) -> Action {
        self.state.stop_reason = Some(reason);
        self.transition(RunPhase::Aborting, Some(reason));
        Action::CloseBoth
    }

    fn transition(&mut self, to: RunPhase, reason: Option<StopReason>) {
        let record = PhaseTransition {
            from: self.state.phase,
            to,
            elapsed: self.state.elapsed,
            reason,
        };
        self.state.phase = to;
        let _ = self.transitions.push(record);
    }
}
