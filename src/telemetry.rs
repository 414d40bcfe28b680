//! Telemetry snapshot, record format, and emission cadence.
//!
//! The reporter never touches the live [`SampleState`]. The driver hands out a
//! [`TelemetrySnapshot`] by value (it is `Copy`), and under `std` can publish
//! each one whole into a [`SnapshotCell`] for a reporter on another thread.
//!
//! # Record format
//!
//! One line per emission, field order fixed:
//!
//! ```text
//! Samples: 1234 | Vout: 5.012V | Iload: 1.250A | E: -0.012 | A: 0.004 | ∇S: 0.002 | Corr: 1.000 | ΔS: -0.012 | Gate: OFF | PWM: 0
//! ```
//!
//! | Label | Field |
//! |-------|-------|
//! | `E` | error |
//! | `A` | salience |
//! | `∇S` | gradient |
//! | `Corr` | correction |
//! | `ΔS` | entropy field |
//!
//! [`SampleState`]: crate::state::SampleState

use core::fmt;

use crate::gate::EntropyDecision;
use crate::state::SampleState;

/// Byte capacity of a rendered telemetry line.
pub const LINE_CAPACITY: usize = 256;

/// Fixed-capacity telemetry line; no allocator needed.
pub type TelemetryLine = heapless::String<LINE_CAPACITY>;

/// Read-only copy of the latest state and decision.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TelemetrySnapshot {
    /// History exactly as the decision saw it, captured before the end-of-tick
    /// advance. `sample_count` is therefore the zero-based index of the tick.
    pub state: SampleState,
    /// That tick's decision.
    pub decision: EntropyDecision,
}

impl TelemetrySnapshot {
    /// Render as a telemetry line.
    ///
    /// Fails only if the rendering exceeds [`LINE_CAPACITY`], which takes
    /// absurd magnitudes (values beyond ~1e30).
    pub fn to_line(&self) -> Result<TelemetryLine, fmt::Error> {
        let mut line = TelemetryLine::new();
        fmt::write(&mut line, format_args!("{}", self))?;
        Ok(line)
    }
}

impl fmt::Display for TelemetrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.decision;
        write!(
            f,
            "Samples: {} | Vout: {:.3}V | Iload: {:.3}A | E: {:.3} | A: {:.3} | ∇S: {:.3} | Corr: {:.3} | ΔS: {:.3} | Gate: {} | PWM: {}",
            self.state.sample_count,
            self.state.voltage_now,
            self.state.current_now,
            d.error,
            d.salience,
            d.gradient,
            d.correction,
            d.entropy_field,
            d.gate().label(),
            d.duty.raw(),
        )
    }
}

// ─── Cadence ─────────────────────────────────────────────────────────────────

/// Decides when the low-rate reporter should emit, independently of the
/// sampling rate. Also carries the console's on/off toggle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TelemetryThrottle {
    interval_us: u64,
    last_emit_us: Option<u64>,
    enabled: bool,
}

impl TelemetryThrottle {
    /// Emit at most once per `interval_us`. Starts enabled.
    pub fn new(interval_us: u64) -> Self {
        Self { interval_us, last_emit_us: None, enabled: true }
    }

    /// `true` if an emission is due at `now_us`; records the emission.
    ///
    /// The first call after enabling is always due.
    pub fn due(&mut self, now_us: u64) -> bool {
        if !self.enabled {
            return false;
        }
        let due = match self.last_emit_us {
            None => true,
            Some(last) => now_us.saturating_sub(last) >= self.interval_us,
        };
        if due {
            self.last_emit_us = Some(now_us);
        }
        due
    }

    /// Flip emission on/off. Returns the new state.
    pub fn toggle(&mut self) -> bool {
        self.set_enabled(!self.enabled);
        self.enabled
    }

    /// Force emission on or off.
    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled && !self.enabled {
            self.last_emit_us = None;
        }
        self.enabled = enabled;
    }

    /// Whether emission is on.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Configured interval.
    pub fn interval_us(&self) -> u64 {
        self.interval_us
    }
}

// ─── Cross-thread publication ────────────────────────────────────────────────

#[cfg(feature = "std")]
pub use self::shared::SnapshotCell;

#[cfg(feature = "std")]
mod shared {
    use std::sync::{Arc, Mutex, MutexGuard};

    use super::TelemetrySnapshot;

    /// Latest-value cell shared between the control loop and a reporter thread.
    ///
    /// The snapshot is replaced whole under the lock, so a reader sees either
    /// the previous tick or the new one, never a mix.
    #[derive(Clone, Debug, Default)]
    pub struct SnapshotCell {
        inner: Arc<Mutex<Option<TelemetrySnapshot>>>,
    }

    impl SnapshotCell {
        /// Empty cell.
        pub fn new() -> Self {
            Self::default()
        }

        /// Replace the published snapshot.
        pub fn publish(&self, snapshot: TelemetrySnapshot) {
            *self.lock() = Some(snapshot);
        }

        /// Copy out the latest snapshot, if any tick has run.
        pub fn latest(&self) -> Option<TelemetrySnapshot> {
            *self.lock()
        }

        fn lock(&self) -> MutexGuard<'_, Option<TelemetrySnapshot>> {
            // A panicked writer cannot leave a half-written `Copy` value behind.
            match self.inner.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            }
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
