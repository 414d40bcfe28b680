/*
 * This source code is licensed under the Business Source License 1.1.
 * See LICENSE in the root directory for full details.
 */

//! Control-law coefficients and loop configuration.
//!
//! Everything here is fixed at configuration time. Construction validates the
//! invariants once so the control loop never has to.
//!
//! # Invariants
//!
//! - `alpha`, `beta`, `threshold`, `target_voltage` are finite.
//! - `alpha >= 0`, `beta >= 0`, `threshold > 0`.
//! - `sample_rate_hz` is in `1..=1_000_000`.

use crate::error::ConfigError;

/// Default telemetry emission interval, independent of the sampling rate.
pub const DEFAULT_TELEMETRY_INTERVAL_MS: u32 = 100;

/// Consecutive faulted ticks before [`FaultPolicy::LatchOff`] forces the gate off
/// when no explicit count is given.
pub const DEFAULT_FAULT_LATCH: u8 = 2;

// ─── Coefficients ────────────────────────────────────────────────────────────

/// Immutable entropy-field coefficients.
///
/// Fields are private: the only way to get a `Coefficients` is through
/// [`Coefficients::new`], which rejects values that break the invariants.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "RawCoefficients"))]
pub struct Coefficients {
    alpha: f32,
    beta: f32,
    threshold: f32,
    target_voltage: f32,
}

impl Coefficients {
    /// Validate and build a coefficient set.
    ///
    /// - `alpha`: salience weight, typically 0–1.
    /// - `beta`: gradient weight, typically 0–0.5.
    /// - `threshold`: decision boundary in volts.
    /// - `target_voltage`: regulation setpoint in volts.
    pub fn new(
        alpha: f32,
        beta: f32,
        threshold: f32,
        target_voltage: f32,
    ) -> Result<Self, ConfigError> {
        finite("alpha", alpha)?;
        finite("beta", beta)?;
        finite("threshold", threshold)?;
        finite("target_voltage", target_voltage)?;
        if alpha < 0.0 {
            return Err(ConfigError::Negative { name: "alpha", value: alpha });
        }
        if beta < 0.0 {
            return Err(ConfigError::Negative { name: "beta", value: beta });
        }
        if threshold <= 0.0 {
            return Err(ConfigError::NonPositiveThreshold(threshold));
        }
        Ok(Self { alpha, beta, threshold, target_voltage })
    }

    /// Salience weight.
    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Gradient weight.
    pub fn beta(&self) -> f32 {
        self.beta
    }

    /// Decision boundary (volts).
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Regulation setpoint (volts).
    pub fn target_voltage(&self) -> f32 {
        self.target_voltage
    }
}

impl Default for Coefficients {
    /// The bench-tuned 5 V reference set: alpha 0.3, beta 0.5, threshold 0.5.
    fn default() -> Self {
        Self {
            alpha: 0.3,
            beta: 0.5,
            threshold: 0.5,
            target_voltage: 5.0,
        }
    }
}

fn finite(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NonFinite { name, value })
    }
}

/// Unvalidated wire form of [`Coefficients`].
#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
struct RawCoefficients {
    alpha: f32,
    beta: f32,
    threshold: f32,
    target_voltage: f32,
}

#[cfg(feature = "serde")]
impl TryFrom<RawCoefficients> for Coefficients {
    type Error = ConfigError;

    fn try_from(raw: RawCoefficients) -> Result<Self, Self::Error> {
        Coefficients::new(raw.alpha, raw.beta, raw.threshold, raw.target_voltage)
    }
}

// ─── Fault policy ────────────────────────────────────────────────────────────

/// What the driver does with the gate while sensor readings are faulted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FaultPolicy {
    /// Faulty values flow through the entropy calculation and the gate decides
    /// on whatever comes out. This is the reference behaviour.
    #[default]
    PassThrough,
    /// Force switching off once `consecutive` faulted ticks have been seen in a
    /// row. Released by the first clean tick.
    LatchOff {
        /// Faulted ticks in a row before the latch engages.
        consecutive: u8,
    },
}

impl FaultPolicy {
    /// `LatchOff` with [`DEFAULT_FAULT_LATCH`].
    pub const fn latch_off() -> Self {
        FaultPolicy::LatchOff { consecutive: DEFAULT_FAULT_LATCH }
    }
}

// ─── LoopConfig ──────────────────────────────────────────────────────────────

/// Complete control-loop configuration, loaded once before the loop starts.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LoopConfig {
    /// Entropy-field coefficients.
    pub coefficients: Coefficients,
    /// Sampling rate in Hz; the tick period is `1_000_000 / sample_rate_hz` µs.
    pub sample_rate_hz: u32,
    /// Telemetry emission interval in milliseconds.
    #[cfg_attr(feature = "serde", serde(default = "default_telemetry_interval"))]
    pub telemetry_interval_ms: u32,
    /// Gate behaviour under sensor faults.
    #[cfg_attr(feature = "serde", serde(default))]
    pub fault_policy: FaultPolicy,
}

#[cfg(feature = "serde")]
fn default_telemetry_interval() -> u32 {
    DEFAULT_TELEMETRY_INTERVAL_MS
}

impl LoopConfig {
    /// Build and validate a configuration with default telemetry cadence and
    /// the pass-through fault policy.
    pub fn new(coefficients: Coefficients, sample_rate_hz: u32) -> Result<Self, ConfigError> {
        let config = Self {
            coefficients,
            sample_rate_hz,
            telemetry_interval_ms: DEFAULT_TELEMETRY_INTERVAL_MS,
            fault_policy: FaultPolicy::PassThrough,
        };
        config.validate()?;
        Ok(config)
    }

    /// Replace the fault policy.
    pub fn with_fault_policy(mut self, policy: FaultPolicy) -> Result<Self, ConfigError> {
        self.fault_policy = policy;
        self.validate()?;
        Ok(self)
    }

    /// Replace the telemetry interval.
    pub fn with_telemetry_interval_ms(mut self, interval_ms: u32) -> Self {
        self.telemetry_interval_ms = interval_ms;
        self
    }

    /// Check loop-level invariants. Coefficients are already valid by construction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate_hz == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        if self.sample_rate_hz > 1_000_000 {
            return Err(ConfigError::SampleRateTooHigh(self.sample_rate_hz));
        }
        if let FaultPolicy::LatchOff { consecutive: 0 } = self.fault_policy {
            return Err(ConfigError::ZeroFaultLatch);
        }
        Ok(())
    }

    /// Tick period in microseconds; 0 for a zero rate, which
    /// [`validate`](Self::validate) rejects.
    pub fn sample_period_us(&self) -> u64 {
        1_000_000u64
            .checked_div(u64::from(self.sample_rate_hz))
            .unwrap_or(0)
    }

    /// Telemetry interval in microseconds.
    pub fn telemetry_interval_us(&self) -> u64 {
        u64::from(self.telemetry_interval_ms) * 1_000
    }

    /// Parse and validate a TOML document.
    ///
    /// ```toml
    /// sample_rate_hz = 1000
    /// telemetry_interval_ms = 100
    ///
    /// [coefficients]
    /// alpha = 0.3
    /// beta = 0.5
    /// threshold = 0.5
    /// target_voltage = 5.0
    ///
    /// [fault_policy.latch_off]
    /// consecutive = 2
    /// ```
    ///
    /// `fault_policy` may also be the bare string `"pass_through"`, and may be
    /// omitted entirely.
    #[cfg(feature = "toml")]
    pub fn from_toml_str(text: &str) -> Result<Self, LoadError> {
        let config: LoopConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }
}

/// Failure loading a [`LoopConfig`] from text.
#[cfg(feature = "toml")]
#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    /// The document did not parse, or a coefficient failed validation during
    /// deserialization.
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// The document parsed but a loop parameter is invalid.
    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_coefficients_are_valid() {
        let c = Coefficients::default();
        let rebuilt = Coefficients::new(c.alpha(), c.beta(), c.threshold(), c.target_voltage());
        assert_eq!(rebuilt, Ok(c));
    }

    #[test]
    fn test_negative_threshold_rejected() {
        assert_eq!(
            Coefficients::new(0.3, 0.5, -0.5, 5.0),
            Err(ConfigError::NonPositiveThreshold(-0.5))
        );
    }

    #[test]
    fn test_zero_threshold_rejected() {
        assert!(matches!(
            Coefficients::new(0.3, 0.5, 0.0, 5.0),
            Err(ConfigError::NonPositiveThreshold(_))
        ));
    }

    #[test]
    fn test_negative_weights_rejected() {
        assert!(matches!(
            Coefficients::new(-0.1, 0.5, 0.5, 5.0),
            Err(ConfigError::Negative { name: "alpha", .. })
        ));
        assert!(matches!(
            Coefficients::new(0.3, -0.5, 0.5, 5.0),
            Err(ConfigError::Negative { name: "beta", .. })
        ));
    }

    #[test]
    fn test_non_finite_rejected() {
        assert!(matches!(
            Coefficients::new(f32::NAN, 0.5, 0.5, 5.0),
            Err(ConfigError::NonFinite { name: "alpha", .. })
        ));
        assert!(matches!(
            Coefficients::new(0.3, 0.5, 0.5, f32::INFINITY),
            Err(ConfigError::NonFinite { name: "target_voltage", .. })
        ));
    }

    #[test]
    fn test_zero_weights_allowed() {
        assert!(Coefficients::new(0.0, 0.0, 0.1, -12.0).is_ok());
    }

    #[test]
    fn test_sample_period() {
        let cfg = LoopConfig::new(Coefficients::default(), 1_000).unwrap();
        assert_eq!(cfg.sample_period_us(), 1_000);
        assert_eq!(cfg.telemetry_interval_us(), 100_000);
    }

    #[test]
    fn test_zero_rate_literal_is_not_masked() {
        let mut cfg = LoopConfig::new(Coefficients::default(), 1_000).unwrap();
        cfg.sample_rate_hz = 0;
        assert_eq!(cfg.sample_period_us(), 0);
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroSampleRate));
    }

    #[test]
    fn test_zero_sample_rate_rejected() {
        assert_eq!(
            LoopConfig::new(Coefficients::default(), 0),
            Err(ConfigError::ZeroSampleRate)
        );
    }

    #[test]
    fn test_excessive_sample_rate_rejected() {
        assert_eq!(
            LoopConfig::new(Coefficients::default(), 2_000_000),
            Err(ConfigError::SampleRateTooHigh(2_000_000))
        );
    }

    #[test]
    fn test_zero_fault_latch_rejected() {
        let cfg = LoopConfig::new(Coefficients::default(), 1_000).unwrap();
        assert_eq!(
            cfg.with_fault_policy(FaultPolicy::LatchOff { consecutive: 0 }),
            Err(ConfigError::ZeroFaultLatch)
        );
    }

    #[cfg(feature = "toml")]
    #[test]
    fn test_toml_round_trip_defaults() {
        let cfg = LoopConfig::from_toml_str(
            "sample_rate_hz = 1000\n[coefficients]\nalpha = 0.3\nbeta = 0.5\nthreshold = 0.5\ntarget_voltage = 5.0\n",
        )
        .unwrap();
        assert_eq!(cfg.coefficients, Coefficients::default());
        assert_eq!(cfg.telemetry_interval_ms, DEFAULT_TELEMETRY_INTERVAL_MS);
        assert_eq!(cfg.fault_policy, FaultPolicy::PassThrough);
    }

    #[cfg(feature = "toml")]
    #[test]
    fn test_toml_fault_policy() {
        let cfg = LoopConfig::from_toml_str(
            "sample_rate_hz = 1000\n[coefficients]\nalpha = 0.3\nbeta = 0.5\nthreshold = 0.5\n\
             target_voltage = 5.0\n[fault_policy.latch_off]\nconsecutive = 3\n",
        )
        .unwrap();
        assert_eq!(cfg.fault_policy, FaultPolicy::LatchOff { consecutive: 3 });
    }

    #[cfg(feature = "toml")]
    #[test]
    fn test_toml_rejects_bad_threshold() {
        let err = LoopConfig::from_toml_str(
            "sample_rate_hz = 1000\n[coefficients]\nalpha = 0.3\nbeta = 0.5\nthreshold = -1.0\ntarget_voltage = 5.0\n",
        );
        assert!(matches!(err, Err(LoadError::Parse(_))));
    }

    #[cfg(feature = "toml")]
    #[test]
    fn test_toml_rejects_zero_rate() {
        let err = LoopConfig::from_toml_str(
            "sample_rate_hz = 0\n[coefficients]\nalpha = 0.3\nbeta = 0.5\nthreshold = 0.5\ntarget_voltage = 5.0\n",
        );
        assert!(matches!(err, Err(LoadError::Invalid(ConfigError::ZeroSampleRate))));
    }
}
