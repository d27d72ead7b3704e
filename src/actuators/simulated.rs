//! In-memory valve bank.
//!
//! Records every command so dry runs and tests can assert on the full
//! command history, and can be told to fail writes on a given valve.

use super::{ActuatorError, ValveActuator, ValveId, ValveState};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValveOp {
    Open,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValveCommand {
    pub valve: ValveId,
    pub op: ValveOp,
    /// False when the write was rejected by an injected fault.
    pub applied: bool,
}

#[derive(Debug, Default)]
pub struct SimulatedValves {
    states: [ValveState; 2],
    commands: Vec<ValveCommand>,
    failing: Vec<(ValveId, ValveOp)>,
}

impl SimulatedValves {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `op` on `valve` fail from now on.
    pub fn fail_on(&mut self, valve: ValveId, op: ValveOp) {
        if !self.failing.contains(&(valve, op)) {
            self.failing.push((valve, op));
        }
    }

    pub fn clear_faults(&mut self) {
        self.failing.clear();
    }

    pub fn state(&self, valve: ValveId) -> ValveState {
        self.states[valve.index()]
    }

    pub fn all_closed(&self) -> bool {
        self.states.iter().all(|state| *state == ValveState::Closed)
    }

    pub fn commands(&self) -> &[ValveCommand] {
        &self.commands
    }

    /// Number of applied `open` commands for `valve`.
    pub fn open_count(&self, valve: ValveId) -> usize {
        self.commands
            .iter()
            .filter(|c| c.valve == valve && c.op == ValveOp::Open && c.applied)
            .count()
    }

    fn apply(&mut self, valve: ValveId, op: ValveOp) -> Result<(), ActuatorError> {
        if self.failing.contains(&(valve, op)) {
            self.commands.push(ValveCommand { valve, op, applied: false });
            return Err(ActuatorError::Rejected {
                valve,
                reason: "injected fault".into(),
            });
        }
        self.states[valve.index()] = match op {
            ValveOp::Open => ValveState::Open,
            ValveOp::Close => ValveState::Closed,
        };
        self.commands.push(ValveCommand { valve, op, applied: true });
        Ok(())
    }
}

impl ValveActuator for SimulatedValves {
    fn open(&mut self, valve: ValveId) -> Result<(), ActuatorError> {
        self.apply(valve, ValveOp::Open)
    }

    fn close(&mut self, valve: ValveId) -> Result<(), ActuatorError> {
        self.apply(valve, ValveOp::Close)
    }
}
