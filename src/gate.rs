/*
 * This source code is licensed under the Business Source License 1.1.
 * See LICENSE in the root directory for full details.
 */

//! Gate decision: switch this cycle, or skip it.
//!
//! - [`GateState`]: the binary outcome, with the duty it implies.
//! - [`GatePolicy`]: the seam the driver calls once per tick.
//! - [`ThresholdGate`]: the reference policy. Memoryless, symmetric,
//!   strict inequality.
//! - [`HysteresisGate`]: opt-in Schmitt trigger variant for installations that
//!   see enable/disable chatter near the threshold. Never the default.
//! - [`EntropyDecision`]: field terms plus gate outcome for one tick.
//!
//! # Invariants
//!
//! - Enabled iff `|entropy_field| > threshold`. Exactly `threshold` skips.
//! - NaN never enables (every comparison with NaN is false).
//! - Enabled duty is always [`Duty::MID`]; skipped duty is always [`Duty::OFF`].
//!   Duty is not proportional to error.

use crate::error::ConfigError;
use crate::field::FieldTerms;

// ─── Duty ────────────────────────────────────────────────────────────────────

/// 8-bit PWM duty value, 0–255.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Duty(pub u8);

impl Duty {
    /// Zero duty: the stage does not switch.
    pub const OFF: Duty = Duty(0);
    /// The fixed mid-range duty requested whenever switching is enabled.
    pub const MID: Duty = Duty(128);
    /// Full-scale duty.
    pub const MAX: Duty = Duty(u8::MAX);

    /// Raw 8-bit value.
    pub fn raw(self) -> u8 {
        self.0
    }

    /// Duty as a fraction in [0.0, 1.0].
    pub fn fraction(self) -> f32 {
        f32::from(self.0) / f32::from(u8::MAX)
    }
}

// ─── GateState ───────────────────────────────────────────────────────────────

/// Outcome of one gate decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GateState {
    /// Hold off this cycle. Duty zero.
    #[default]
    CycleSkip,
    /// Actively switch at [`Duty::MID`].
    Switching,
}

impl GateState {
    /// Reference classification: `|entropy_field| > threshold`.
    pub fn classify(entropy_field: f32, threshold: f32) -> GateState {
        if entropy_field > threshold || entropy_field < -threshold {
            GateState::Switching
        } else {
            GateState::CycleSkip
        }
    }

    /// `true` for [`GateState::Switching`].
    pub fn is_enabled(self) -> bool {
        matches!(self, GateState::Switching)
    }

    /// Duty implied by this state.
    pub fn duty(self) -> Duty {
        match self {
            GateState::Switching => Duty::MID,
            GateState::CycleSkip => Duty::OFF,
        }
    }

    /// Telemetry label.
    pub fn label(self) -> &'static str {
        match self {
            GateState::Switching => "ON",
            GateState::CycleSkip => "OFF",
        }
    }
}

// ─── Policies ────────────────────────────────────────────────────────────────

/// Maps the entropy field to a gate state, once per tick.
pub trait GatePolicy {
    /// Decide the gate for this tick.
    fn decide(&mut self, entropy_field: f32) -> GateState;

    /// Forget any internal memory. The reference policy has none.
    fn reset(&mut self) {}
}

/// The reference policy: fresh threshold comparison every tick, no memory.
///
/// Near `±threshold` a noisy field will toggle the gate tick to tick. That is
/// the reference behaviour; use [`HysteresisGate`] if it is a problem.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ThresholdGate {
    threshold: f32,
}

impl ThresholdGate {
    /// Build from a threshold already validated by
    /// [`Coefficients`](crate::config::Coefficients).
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// The decision boundary.
    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

impl GatePolicy for ThresholdGate {
    fn decide(&mut self, entropy_field: f32) -> GateState {
        GateState::classify(entropy_field, self.threshold)
    }
}

/// Schmitt trigger variant of [`ThresholdGate`].
///
/// While skipping, switching starts only when `|entropy_field| > enter`.
/// While switching, it continues as long as `|entropy_field| > exit`.
/// With `enter == exit` this is identical to the reference policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HysteresisGate {
    enter: f32,
    exit: f32,
    state: GateState,
}

impl HysteresisGate {
    /// Build with explicit bands. Requires `enter >= exit > 0`, both finite.
    pub fn new(enter: f32, exit: f32) -> Result<Self, ConfigError> {
        let valid = enter.is_finite() && exit.is_finite() && exit > 0.0 && enter >= exit;
        if !valid {
            return Err(ConfigError::InvalidHysteresis { enter, exit });
        }
        Ok(Self { enter, exit, state: GateState::CycleSkip })
    }

    /// Symmetric deadband around a threshold: enter at `threshold + band/2`,
    /// exit at `threshold − band/2`.
    pub fn around(threshold: f32, band: f32) -> Result<Self, ConfigError> {
        Self::new(threshold + band * 0.5, threshold - band * 0.5)
    }

    /// Gate state carried from the last decision.
    pub fn state(&self) -> GateState {
        self.state
    }
}

impl GatePolicy for HysteresisGate {
    fn decide(&mut self, entropy_field: f32) -> GateState {
        let band = match self.state {
            GateState::Switching => self.exit,
            GateState::CycleSkip => self.enter,
        };
        self.state = GateState::classify(entropy_field, band);
        self.state
    }

    fn reset(&mut self) {
        self.state = GateState::CycleSkip;
    }
}

// ─── EntropyDecision ─────────────────────────────────────────────────────────

/// Everything decided in one tick. Not retained past the tick except as a
/// telemetry snapshot copy.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntropyDecision {
    /// `target_voltage − voltage_now`.
    pub error: f32,
    /// Power-change magnitude.
    pub salience: f32,
    /// Voltage-change magnitude.
    pub gradient: f32,
    /// `1 + alpha·salience − beta·gradient`.
    pub correction: f32,
    /// `error × correction`.
    pub entropy_field: f32,
    /// Whether the stage switches this tick.
    pub gate_enabled: bool,
    /// Duty sent to the actuator.
    pub duty: Duty,
}

impl EntropyDecision {
    /// Combine field terms with a gate outcome.
    pub fn new(terms: &FieldTerms, gate: GateState) -> Self {
        Self {
            error: terms.error,
            salience: terms.salience,
            gradient: terms.gradient,
            correction: terms.correction,
            entropy_field: terms.entropy_field,
            gate_enabled: gate.is_enabled(),
            duty: gate.duty(),
        }
    }

    /// Gate outcome as a [`GateState`].
    pub fn gate(&self) -> GateState {
        if self.gate_enabled {
            GateState::Switching
        } else {
            GateState::CycleSkip
        }
    }
}

impl Default for EntropyDecision {
    fn default() -> Self {
        Self::new(&FieldTerms::QUIESCENT, GateState::CycleSkip)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_field_skips() {
        assert_eq!(GateState::classify(0.0, 0.5), GateState::CycleSkip);
    }

    #[test]
    fn test_exact_threshold_skips() {
        assert_eq!(GateState::classify(0.5, 0.5), GateState::CycleSkip);
        assert_eq!(GateState::classify(-0.5, 0.5), GateState::CycleSkip);
    }

    #[test]
    fn test_just_above_threshold_switches() {
        let above = f32::from_bits(0.5f32.to_bits() + 1);
        assert_eq!(GateState::classify(above, 0.5), GateState::Switching);
        assert_eq!(GateState::classify(-above, 0.5), GateState::Switching);
    }

    #[test]
    fn test_symmetric_around_zero() {
        for &x in &[0.6_f32, 1.0, 2.9, 100.0] {
            assert_eq!(GateState::classify(x, 0.5), GateState::classify(-x, 0.5));
            assert!(GateState::classify(x, 0.5).is_enabled());
        }
    }

    #[test]
    fn test_nan_never_enables() {
        assert_eq!(GateState::classify(f32::NAN, 0.5), GateState::CycleSkip);
    }

    #[test]
    fn test_duty_is_fixed_not_proportional() {
        assert_eq!(GateState::classify(0.51, 0.5).duty(), Duty::MID);
        assert_eq!(GateState::classify(500.0, 0.5).duty(), Duty::MID);
        assert_eq!(GateState::classify(0.1, 0.5).duty(), Duty::OFF);
    }

    #[test]
    fn test_duty_fraction() {
        assert_eq!(Duty::OFF.fraction(), 0.0);
        assert_eq!(Duty::MAX.fraction(), 1.0);
        let mid = Duty::MID.fraction();
        assert!(mid > 0.49 && mid < 0.51, "mid fraction {}", mid);
    }

    #[test]
    fn test_threshold_gate_has_no_memory() {
        let mut g = ThresholdGate::new(0.5);
        assert!(g.decide(0.8).is_enabled());
        // Immediately drops back; no hold-over from the previous tick.
        assert!(!g.decide(0.49).is_enabled());
        assert!(g.decide(-0.51).is_enabled());
    }

    #[test]
    fn test_hysteresis_enter_hold_exit() {
        let mut g = HysteresisGate::new(0.6, 0.4).unwrap();
        assert_eq!(g.decide(0.55), GateState::CycleSkip, "below enter");
        assert_eq!(g.decide(0.61), GateState::Switching, "above enter");
        assert_eq!(g.decide(0.45), GateState::Switching, "held above exit");
        assert_eq!(g.decide(-0.45), GateState::Switching, "held, symmetric");
        assert_eq!(g.decide(0.4), GateState::CycleSkip, "at exit drops");
        assert_eq!(g.decide(0.55), GateState::CycleSkip, "needs enter again");
    }

    #[test]
    fn test_hysteresis_reset() {
        let mut g = HysteresisGate::new(0.6, 0.4).unwrap();
        g.decide(1.0);
        g.reset();
        assert_eq!(g.state(), GateState::CycleSkip);
        assert_eq!(g.decide(0.5), GateState::CycleSkip);
    }

    #[test]
    fn test_hysteresis_equal_bands_match_reference() {
        let mut h = HysteresisGate::new(0.5, 0.5).unwrap();
        let mut t = ThresholdGate::new(0.5);
        for &x in &[0.0_f32, 0.6, 0.5, -0.7, 0.2, 0.51, -0.5] {
            assert_eq!(h.decide(x), t.decide(x), "field {}", x);
        }
    }

    #[test]
    fn test_hysteresis_rejects_inverted_bands() {
        assert!(HysteresisGate::new(0.4, 0.6).is_err());
        assert!(HysteresisGate::new(0.4, 0.0).is_err());
        assert!(HysteresisGate::around(0.5, 2.0).is_err());
        assert!(HysteresisGate::around(0.5, 0.2).is_ok());
    }

    #[test]
    fn test_decision_copies_terms() {
        let terms = FieldTerms {
            error: 1.0,
            power_now: 8.0,
            power_prev: 10.0,
            salience: 2.0,
            gradient: 1.0,
            correction: 1.1,
            entropy_field: 1.1,
        };
        let d = EntropyDecision::new(&terms, GateState::Switching);
        assert_eq!(d.salience, 2.0);
        assert!(d.gate_enabled);
        assert_eq!(d.duty, Duty::MID);
        assert_eq!(d.gate(), GateState::Switching);
    }
}
