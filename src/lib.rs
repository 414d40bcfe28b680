//! # erpc-core
//!
//! Entropy-Regulated Power Control: a cycle-skipping gate for a switching
//! power converter output stage.
//!
//! ---
//!
//! ## The controller does not modulate duty. It decides whether to switch at all.
//!
//! Each tick samples output voltage and load current and folds them into one
//! scalar, the **entropy field**:
//!
//! ```text
//! error       = target − v_now
//! salience    = |v_now·i_now − v_prev·i_now|
//! gradient    = |v_now − v_prev|
//! correction  = 1 + α·salience − β·gradient
//! field       = error · correction
//! ```
//!
//! If `|field|` exceeds the threshold the stage switches at a fixed mid duty;
//! otherwise the cycle is skipped and the stage sits idle. Sudden power changes
//! (a load step) amplify the response. Fast voltage movement that is already
//! happening damps it.
//! > "Only switch when the output is actually wrong."
//!
//! ## The pipeline
//!
//! ```text
//! SensorSource → SampleState → field::compute → GatePolicy → ActuatorSink
//!                    ↓                                ↓
//!             TelemetrySnapshot ──────────→ TelemetryThrottle → reporter
//! ```
//!
//! ## Module overview
//!
//! | Module | Key types | What it does |
//! |--------|-----------|--------------|
//! | [`config`] | [`LoopConfig`], [`Coefficients`], [`FaultPolicy`] | Validated tuning parameters; optional TOML loading |
//! | [`state`] | [`Sample`], [`SampleState`] | Current/previous sample history and the tick counter |
//! | [`field`] | [`FieldTerms`] | The entropy-field computation, a pure function |
//! | [`gate`] | [`GateState`], [`ThresholdGate`], [`HysteresisGate`], [`EntropyDecision`] | Gate decision and duty selection |
//! | [`io`] | [`SensorSource`], [`ActuatorSink`] | Hardware seams |
//! | [`driver`] | [`ControlLoop`], [`Clock`] | Fixed-rate tick scheduling, fault handling, console commands |
//! | [`telemetry`] | [`TelemetrySnapshot`], [`TelemetryThrottle`] | Read-only snapshots, record format, emission cadence |
//! | [`command`] | [`Command`] | Debug console parsing |
//! | [`plant`] | [`SimulatedConverter`] | First-order converter model for closing the loop without hardware |
//! | `analysis` | `AnalysisReport` | Offline telemetry-log analysis (requires `std`) |
//!
//! ## `no_std`
//!
//! This crate is `#![no_std]` by default with no heap required. Enable `std`
//! for the wall clock, the blocking run loop, cross-thread snapshot
//! publication and log analysis. Enable `serde` for serialisable config and
//! snapshots, `toml` for config files, `plot` for SVG performance charts, and
//! `cli` for the `erpc-analyze` binary.
//!
//! ## License
//!
//! Business Source License 1.1. Free for evaluation and non-production use.

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[cfg(feature = "std")]
extern crate std;

pub mod command;
pub mod config;
pub mod driver;
pub mod error;
pub mod field;
pub mod gate;
pub mod io;
pub mod plant;
pub mod state;
pub mod telemetry;

#[cfg(feature = "std")]
pub mod analysis;
#[cfg(feature = "plot")]
pub mod plot;

pub use command::{Command, CommandResponse};
pub use config::{Coefficients, FaultPolicy, LoopConfig};
pub use driver::{Clock, ControlLoop, LoopPhase, TickReport};
pub use error::{ConfigError, SensorFault};
pub use field::FieldTerms;
pub use gate::{Duty, EntropyDecision, GatePolicy, GateState, HysteresisGate, ThresholdGate};
pub use io::{ActuatorSink, SensorSource};
pub use plant::{PlantParams, SimulatedConverter};
pub use state::{Sample, SampleState};
pub use telemetry::{TelemetrySnapshot, TelemetryThrottle};

#[cfg(feature = "std")]
pub use driver::StdClock;
#[cfg(feature = "std")]
pub use telemetry::SnapshotCell;
