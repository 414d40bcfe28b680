/*
 * This source code is licensed under the Business Source License 1.1.
 * See LICENSE in the root directory for full details.
 */

//! The entropy field: the scalar that decides whether the power stage switches.
//!
//! ```text
//! error         = target − v_now
//! power_now     = v_now  × i_now
//! power_prev    = v_prev × i_now
//! salience      = |power_now − power_prev|
//! gradient      = |v_now − v_prev|
//! correction    = 1 + α·salience − β·gradient
//! entropy_field = error × correction
//! ```
//!
//! `power_prev` multiplies the previous voltage by the *current* load current.
//! Salience therefore measures power change caused by voltage motion alone,
//! `|i_now| · |v_now − v_prev|`, not a true two-sample power derivative. This is
//! the documented control law and must stay that way.
//!
//! # Invariants
//!
//! - Pure: no state, no side effects. Same inputs, same outputs.
//! - Total: NaN or infinite readings propagate into the result unchanged. Fault
//!   handling belongs to the caller.
//! - No intermediate clamping; `f32` throughout.

use crate::config::Coefficients;
use crate::state::SampleState;

/// Every term of one entropy-field evaluation, in evaluation order.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldTerms {
    /// `target_voltage − voltage_now`. Positive means undervoltage.
    pub error: f32,
    /// `voltage_now × current_now`.
    pub power_now: f32,
    /// `voltage_prev × current_now`.
    pub power_prev: f32,
    /// `|power_now − power_prev|`.
    pub salience: f32,
    /// `|voltage_now − voltage_prev|`.
    pub gradient: f32,
    /// `1 + alpha·salience − beta·gradient`.
    pub correction: f32,
    /// `error × correction`.
    pub entropy_field: f32,
}

impl FieldTerms {
    /// The terms of a perfectly regulated, motionless sample.
    pub const QUIESCENT: FieldTerms = FieldTerms {
        error: 0.0,
        power_now: 0.0,
        power_prev: 0.0,
        salience: 0.0,
        gradient: 0.0,
        correction: 1.0,
        entropy_field: 0.0,
    };

    /// `true` when the decision scalar is a usable number.
    pub fn is_finite(&self) -> bool {
        self.entropy_field.is_finite()
    }
}

/// Evaluate the entropy field for the readings held in `state`.
pub fn compute(state: &SampleState, coefficients: &Coefficients) -> FieldTerms {
    compute_raw(
        state.voltage_now,
        state.current_now,
        state.voltage_prev,
        state.current_prev,
        coefficients,
    )
}

/// Evaluate the entropy field from bare readings.
///
/// `current_prev` is accepted for signature symmetry with the stored state but
/// does not enter the control law (see module docs).
pub fn compute_raw(
    voltage_now: f32,
    current_now: f32,
    voltage_prev: f32,
    _current_prev: f32,
    coefficients: &Coefficients,
) -> FieldTerms {
    let error = coefficients.target_voltage() - voltage_now;

    let power_now = voltage_now * current_now;
    let power_prev = voltage_prev * current_now;
    let salience = (power_now - power_prev).abs();

    let gradient = (voltage_now - voltage_prev).abs();

    let correction = 1.0 + coefficients.alpha() * salience - coefficients.beta() * gradient;
    let entropy_field = error * correction;

    FieldTerms {
        error,
        power_now,
        power_prev,
        salience,
        gradient,
        correction,
        entropy_field,
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Sample;

    const EPS: f32 = 1e-5;

    fn coeffs() -> Coefficients {
        Coefficients::new(0.3, 0.5, 0.5, 5.0).unwrap()
    }

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < EPS
    }

    #[test]
    fn test_at_target_and_still_is_quiescent() {
        let state = SampleState::seeded(Sample::new(5.0, 2.0));
        let t = compute(&state, &coeffs());
        assert_eq!(t.error, 0.0);
        assert_eq!(t.salience, 0.0);
        assert_eq!(t.gradient, 0.0);
        assert_eq!(t.correction, 1.0);
        assert_eq!(t.entropy_field, 0.0);
    }

    #[test]
    fn test_pure_and_repeatable() {
        let c = coeffs();
        let a = compute_raw(4.7, 1.3, 4.9, 1.1, &c);
        let b = compute_raw(4.7, 1.3, 4.9, 1.1, &c);
        assert_eq!(a, b);
    }

    #[test]
    fn test_load_step_uses_current_now_for_prev_power() {
        // v 5.0 → 4.0, i 0 → 2.0. power_prev is 5.0 × 2.0 (current_now), not
        // 5.0 × 0.0 (current_prev).
        let t = compute_raw(4.0, 2.0, 5.0, 0.0, &coeffs());
        assert!(close(t.error, 1.0), "error {}", t.error);
        assert!(close(t.power_now, 8.0), "power_now {}", t.power_now);
        assert!(close(t.power_prev, 10.0), "power_prev {}", t.power_prev);
        assert!(close(t.salience, 2.0), "salience {}", t.salience);
        assert!(close(t.gradient, 1.0), "gradient {}", t.gradient);
        // 1 + 0.3·2 − 0.5·1
        assert!(close(t.correction, 1.1), "correction {}", t.correction);
        assert!(close(t.entropy_field, 1.1), "entropy {}", t.entropy_field);
    }

    #[test]
    fn test_prev_current_is_ignored() {
        let c = coeffs();
        let a = compute_raw(4.0, 2.0, 5.0, 0.0, &c);
        let b = compute_raw(4.0, 2.0, 5.0, 17.0, &c);
        assert_eq!(a, b);
    }

    #[test]
    fn test_small_overshoot() {
        let t = compute_raw(5.05, 1.0, 5.0, 1.0, &coeffs());
        assert!(close(t.error, -0.05), "error {}", t.error);
        assert!(close(t.salience, 0.05), "salience {}", t.salience);
        assert!(close(t.gradient, 0.05), "gradient {}", t.gradient);
        assert!(close(t.correction, 0.99), "correction {}", t.correction);
        assert!(close(t.entropy_field, -0.0495), "entropy {}", t.entropy_field);
    }

    #[test]
    fn test_sign_follows_error_when_correction_positive() {
        let c = coeffs();
        // Equal |motion| either side of target keeps correction identical.
        let under = compute_raw(4.8, 1.0, 5.0, 1.0, &c);
        let over = compute_raw(5.2, 1.0, 5.0, 1.0, &c);
        assert!(under.correction > 0.0);
        assert!(close(under.correction, over.correction));
        assert!(under.entropy_field > 0.0);
        assert!(over.entropy_field < 0.0);
        assert!(close(under.entropy_field, -over.entropy_field));
    }

    #[test]
    fn test_correction_can_go_negative() {
        // Large voltage swing with no load: gradient term dominates.
        let t = compute_raw(1.0, 0.0, 5.0, 0.0, &coeffs());
        assert!(close(t.gradient, 4.0));
        assert!(close(t.correction, -1.0));
        assert!(close(t.entropy_field, -4.0));
    }

    #[test]
    fn test_non_finite_propagates() {
        let t = compute_raw(f32::NAN, 1.0, 5.0, 1.0, &coeffs());
        assert!(t.entropy_field.is_nan());
        assert!(!t.is_finite());

        let t = compute_raw(5.0, f32::INFINITY, 4.9, 1.0, &coeffs());
        assert!(!t.is_finite());
    }

    #[test]
    fn test_quiescent_constant_matches_compute() {
        let state = SampleState::seeded(Sample::new(5.0, 0.0));
        let t = compute(&state, &coeffs());
        assert_eq!(t, FieldTerms::QUIESCENT);
    }
}
