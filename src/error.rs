//! Error types.
//!
//! Three failure classes exist at runtime and load time:
//!
//! - [`ConfigError`]: a coefficient or loop parameter violates its invariant.
//!   Raised only while building a [`LoopConfig`](crate::config::LoopConfig),
//!   never mid-loop.
//! - [`SensorFault`]: an acquisition produced an out-of-domain value. Faults are
//!   surfaced by the driver, not repaired.
//! - [`CommandError`]: an unrecognised console command.
//!
//! Timing overruns are not errors; the driver counts them (see
//! [`ControlLoop::overrun_count`](crate::driver::ControlLoop::overrun_count)).

use thiserror::Error;

/// A configuration value violates its invariant.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum ConfigError {
    /// A coefficient is NaN or infinite.
    #[error("coefficient `{name}` must be finite, got {value}")]
    NonFinite {
        /// Coefficient name.
        name: &'static str,
        /// Rejected value.
        value: f32,
    },
    /// A weight that must be non-negative is negative.
    #[error("coefficient `{name}` must be >= 0, got {value}")]
    Negative {
        /// Coefficient name.
        name: &'static str,
        /// Rejected value.
        value: f32,
    },
    /// The decision threshold is zero or negative.
    #[error("threshold must be > 0, got {0}")]
    NonPositiveThreshold(f32),
    /// The sampling rate is zero.
    #[error("sample_rate_hz must be > 0")]
    ZeroSampleRate,
    /// The sampling rate is too high to express as a whole-microsecond period.
    #[error("sample_rate_hz {0} exceeds 1 MHz")]
    SampleRateTooHigh(u32),
    /// Hysteresis exit band is above the enter band, or either is not positive.
    #[error("hysteresis requires enter >= exit > 0, got enter={enter} exit={exit}")]
    InvalidHysteresis {
        /// Enter threshold.
        enter: f32,
        /// Exit threshold.
        exit: f32,
    },
    /// The fault latch would never trigger.
    #[error("fault latch needs at least one consecutive fault")]
    ZeroFaultLatch,
}

/// Which sensor channel faulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Channel {
    /// Output voltage.
    Voltage,
    /// Load current.
    LoadCurrent,
}

/// A sensor acquisition fault.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SensorFault {
    /// The reading was NaN or infinite.
    #[error("{0:?} reading is not finite")]
    NonFinite(Channel),
    /// The source flagged a fault out of band.
    #[error("sensor source reported fault code {0}")]
    Reported(u16),
}

/// Console command parse failure.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// Input was empty after trimming.
    #[error("empty command")]
    Empty,
    /// Input did not match any known command.
    #[error("unknown command (try `h` for help)")]
    Unknown,
}
