pub mod gpio;
pub mod simulated;

pub use gpio::SysfsGpioValves;
pub use simulated::{SimulatedValves, ValveCommand, ValveOp};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValveId {
    Valve1,
    Valve2,
}

impl ValveId {
    pub const ALL: [ValveId; 2] = [ValveId::Valve1, ValveId::Valve2];

    pub fn index(self) -> usize {
        match self {
            ValveId::Valve1 => 0,
            ValveId::Valve2 => 1,
        }
    }
}

impl fmt::Display for ValveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValveId::Valve1 => f.write_str("valve 1"),
            ValveId::Valve2 => f.write_str("valve 2"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ValveState {
    #[default]
    Closed,
    Open,
}

#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("{valve}: I/O error on relay line: {source}")]
    Io {
        valve: ValveId,
        #[source]
        source: std::io::Error,
    },
    #[error("{valve}: command rejected: {reason}")]
    Rejected { valve: ValveId, reason: String },
}

/// Write-only, fire-and-forget valve driver.
///
/// Both operations must be idempotent: closing an already closed valve is a
/// no-op, not an error. The state is never read back from hardware.
pub trait ValveActuator {
    fn open(&mut self, valve: ValveId) -> Result<(), ActuatorError>;

    fn close(&mut self, valve: ValveId) -> Result<(), ActuatorError>;
}

impl<V: ValveActuator + ?Sized> ValveActuator for Box<V> {
    fn open(&mut self, valve: ValveId) -> Result<(), ActuatorError> {
        (**self).open(valve)
    }

    fn close(&mut self, valve: ValveId) -> Result<(), ActuatorError> {
        (**self).close(valve)
    }
}

/// Command every valve closed. A failure on one valve never prevents the
/// attempt on the next; returns the number of failed writes.
pub fn close_all<V: ValveActuator + ?Sized>(valves: &mut V) -> u32 {
    let mut failures = 0;
    for valve in ValveId::ALL {
        if let Err(e) = valves.close(valve) {
            error!(%valve, "failed to close valve: {e}");
            failures += 1;
        }
    }
    failures
}

/// Scoped ownership of the valve bank for one run.
///
/// Both valves are commanded closed when the guard is created and again when
/// it is dropped, so early returns, errors and panics all leave the stand
/// de-energized.
pub struct ValveGuard<'a, V: ValveActuator + ?Sized> {
    valves: &'a mut V,
    commanded: [ValveState; 2],
    write_failures: u32,
}

impl<'a, V: ValveActuator + ?Sized> ValveGuard<'a, V> {
    pub fn new(valves: &'a mut V) -> Self {
        let write_failures = close_all(&mut *valves);
        Self {
            valves,
            commanded: [ValveState::Closed; 2],
            write_failures,
        }
    }

    pub fn open(&mut self, valve: ValveId) -> Result<(), ActuatorError> {
        match self.valves.open(valve) {
            Ok(()) => {
                self.commanded[valve.index()] = ValveState::Open;
                Ok(())
            }
            Err(e) => {
                self.write_failures += 1;
                Err(e)
            }
        }
    }

    /// Close both valves, attempting each regardless of the other's result.
    /// Returns how many writes failed.
    pub fn close_all(&mut self) -> u32 {
        let mut failures = 0;
        for valve in ValveId::ALL {
            // Closed is recorded even on failure: nothing will try to reopen it.
            self.commanded[valve.index()] = ValveState::Closed;
            if let Err(e) = self.valves.close(valve) {
                error!(%valve, "failed to close valve: {e}");
                failures += 1;
            }
        }
        self.write_failures += failures;
        failures
    }

    pub fn state(&self, valve: ValveId) -> ValveState {
        self.commanded[valve.index()]
    }

    pub fn states(&self) -> [ValveState; 2] {
        self.commanded
    }

    pub fn write_failures(&self) -> u32 {
        self.write_failures
    }
}

impl<V: ValveActuator + ?Sized> Drop for ValveGuard<'_, V> {
    fn drop(&mut self) {
        close_all(&mut *self.valves);
    }
}
