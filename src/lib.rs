//! # Hotfire
//!
//! Safety-interlock controller for static propulsion test firings.
//!
//! A firing opens Valve1, opens Valve2 after a configured delay, and closes
//! both when the planned fire duration is reached. While the valves are open
//! every pressure, temperature and force sample is checked against hard
//! limits; any breach closes both valves within the same processing step.
//!
//! ## Quick Start
//!
//! ```rust
//! use hotfire::actuators::SimulatedValves;
//! use hotfire::clock::ManualClock;
//! use hotfire::config::FiringConfig;
//! use hotfire::controller::{CancelToken, FiringController};
//! use hotfire::logger::MemoryRunLogger;
//! use hotfire::sensors::SimulatedDaq;
//!
//! let clock = ManualClock::new();
//! let config = FiringConfig { scan_rate_hz: 10.0, ..FiringConfig::default() };
//! let controller = FiringController::new(config, clock.clone()).unwrap();
//!
//! let mut daq = SimulatedDaq::new(clock);
//! let mut valves = SimulatedValves::new();
//! let mut log = MemoryRunLogger::new();
//!
//! let report = controller
//!     .run(&mut daq, &mut valves, &mut log, &CancelToken::new())
//!     .unwrap();
//! assert!(report.is_nominal());
//! assert!(valves.all_closed());
//! ```
//!
//! ## Architecture
//!
//! - [`sensors`] - samples, unit conversion and the acquisition adapter boundary
//! - [`actuators`] - valve drivers and the scoped valve guard
//! - [`interlock`] - the run state machine and abort decisions
//! - [`controller`] - the polling loop that drives a run
//! - [`logger`] - incremental run log persistence
//! - [`config`] - thresholds, timing and channel map
//! - [`clock`] - monotonic time sources

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

pub mod actuators;
pub mod clock;
pub mod config;
pub mod controller;
pub mod interlock;
pub mod logger;
pub mod sensors;

// Re-export main public types for convenience
pub use config::{FiringConfig, Thresholds};
pub use controller::{CancelToken, FiringController, RunReport};
pub use interlock::{Action, Interlock, RunPhase, StopReason};
pub use sensors::{PhysicalReading, QuantityKind, Sample};
