//! Valve relays on Linux sysfs GPIO lines.
//!
//! Each valve is a relay on one output line: `1` energizes the relay and
//! opens the valve, `0` closes it. Every command is a plain write of the
//! target level, so repeating it is harmless.

use super::{ActuatorError, ValveActuator, ValveId};
use crate::config::ValvePins;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

#[derive(Debug, Clone)]
pub struct SysfsGpioValves {
    root: PathBuf,
    lines: [u32; 2],
}

impl SysfsGpioValves {
    pub fn new(pins: ValvePins) -> Self {
        Self::with_root(SYSFS_GPIO_ROOT, pins)
    }

    pub fn with_root(root: impl AsRef<Path>, pins: ValvePins) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            lines: [pins.valve1_gpio, pins.valve2_gpio],
        }
    }

    pub fn line(&self, valve: ValveId) -> u32 {
        self.lines[valve.index()]
    }

    /// Export both lines if needed, configure them as outputs and drive them low.
    pub fn setup(&self) -> Result<(), ActuatorError> {
        for valve in ValveId::ALL {
            let line = self.line(valve);
            let line_dir = self.line_dir(line);
            if !line_dir.exists() {
                debug!(line, "exporting GPIO line");
                fs::write(self.root.join("export"), line.to_string())
                    .map_err(|source| ActuatorError::Io { valve, source })?;
            }
            fs::write(line_dir.join("direction"), "out")
                .map_err(|source| ActuatorError::Io { valve, source })?;
            self.write_level(valve, false)?;
        }
        Ok(())
    }

    fn line_dir(&self, line: u32) -> PathBuf {
        self.root.join(format!("gpio{line}"))
    }

    fn write_level(&self, valve: ValveId, high: bool) -> Result<(), ActuatorError> {
        let path = self.line_dir(self.line(valve)).join("value");
        fs::write(path, if high { "1" } else { "0" }).map_err(|source| ActuatorError::Io { valve, source })
    }
}

impl ValveActuator for SysfsGpioValves {
    fn open(&mut self, valve: ValveId) -> Result<(), ActuatorError> {
        self.write_level(valve, true)
    }

    fn close(&mut self, valve: ValveId) -> Result<(), ActuatorError> {
        self.write_level(valve, false)
    }
}
