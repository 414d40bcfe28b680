//! Offline analysis of captured telemetry logs.
//!
//! Reads the text a serial monitor captured from the telemetry reporter and
//! answers the bench questions: how much switching did the gate avoid, how did
//! the field behave in each voltage region, and how well did the output hold
//! up across load bands.
//!
//! The baseline is a conventional PWM stage that switches every sample, so
//! switching reduction is `(samples − gate transitions) / samples`.

use std::str::FromStr;
use std::vec::Vec;

use thiserror::Error;

use crate::telemetry::TelemetrySnapshot;

/// Records at or below this voltage are treated as "no power" and dropped.
pub const DEFAULT_MIN_VOLTAGE: f32 = 0.5;
/// Records at or above this voltage are treated as bench adjustment and dropped.
pub const DEFAULT_MAX_VOLTAGE: f32 = 12.0;
/// A load change larger than this between consecutive records is a transition.
pub const LOAD_TRANSITION_AMPS: f32 = 0.5;

/// Analysis failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    /// A line did not match the telemetry record format.
    #[error("malformed telemetry line: {0}")]
    Malformed(&'static str),
    /// Nothing survived the voltage filter.
    #[error("no valid samples after filtering ({total} parsed)")]
    NoValidSamples {
        /// Records parsed before filtering.
        total: usize,
    },
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// One parsed telemetry line.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TelemetryRecord {
    /// Sample counter.
    pub samples: u32,
    /// Output voltage (V).
    pub vout: f32,
    /// Load current (A).
    pub iload: f32,
    /// Voltage error (`E`).
    pub error: f32,
    /// Salience (`A`).
    pub salience: f32,
    /// Gradient (`∇S`).
    pub gradient: f32,
    /// Correction (`Corr`).
    pub correction: f32,
    /// Entropy field (`ΔS`).
    pub entropy_field: f32,
    /// Gate ON.
    pub gate_on: bool,
    /// PWM duty.
    pub pwm: u8,
}

impl From<&TelemetrySnapshot> for TelemetryRecord {
    fn from(s: &TelemetrySnapshot) -> Self {
        let d = &s.decision;
        Self {
            samples: s.state.sample_count,
            vout: s.state.voltage_now,
            iload: s.state.current_now,
            error: d.error,
            salience: d.salience,
            gradient: d.gradient,
            correction: d.correction,
            entropy_field: d.entropy_field,
            gate_on: d.gate_enabled,
            pwm: d.duty.raw(),
        }
    }
}

impl FromStr for TelemetryRecord {
    type Err = AnalysisError;

    /// Parse a line, ignoring anything before `Samples:` (serial monitors
    /// often prefix a timestamp).
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let start = line.find("Samples:").ok_or(AnalysisError::Malformed("no Samples field"))?;
        let mut fields = line[start..].split('|').map(str::trim);

        let samples = number(labelled(&mut fields, "Samples:")?, "Samples")?;
        let vout = reading(unit(labelled(&mut fields, "Vout:")?, 'V'), "Vout")?;
        let iload = reading(unit(labelled(&mut fields, "Iload:")?, 'A'), "Iload")?;
        let error = reading(labelled(&mut fields, "E:")?, "E")?;
        let salience = reading(labelled(&mut fields, "A:")?, "A")?;
        let gradient = reading(labelled(&mut fields, "∇S:")?, "∇S")?;
        let correction = reading(labelled(&mut fields, "Corr:")?, "Corr")?;
        let entropy_field = reading(labelled(&mut fields, "ΔS:")?, "ΔS")?;
        let gate_on = match labelled(&mut fields, "Gate:")? {
            "ON" => true,
            "OFF" => false,
            _ => return Err(AnalysisError::Malformed("Gate")),
        };
        let pwm = number(labelled(&mut fields, "PWM:")?, "PWM")?;

        Ok(Self {
            samples,
            vout,
            iload,
            error,
            salience,
            gradient,
            correction,
            entropy_field,
            gate_on,
            pwm,
        })
    }
}

fn labelled<'a>(
    fields: &mut impl Iterator<Item = &'a str>,
    label: &'static str,
) -> Result<&'a str, AnalysisError> {
    fields
        .next()
        .and_then(|f| f.strip_prefix(label))
        .map(str::trim)
        .ok_or(AnalysisError::Malformed(label))
}

fn unit(value: &str, suffix: char) -> &str {
    value.strip_suffix(suffix).unwrap_or(value)
}

fn number<T: FromStr>(value: &str, label: &'static str) -> Result<T, AnalysisError> {
    value.parse().map_err(|_| AnalysisError::Malformed(label))
}

/// A measured value. `NaN` and `inf` parse as `f32` but mark a faulted
/// tick, so the line is rejected.
fn reading(value: &str, label: &'static str) -> Result<f32, AnalysisError> {
    let v: f32 = number(value, label)?;
    if v.is_finite() {
        Ok(v)
    } else {
        Err(AnalysisError::Malformed(label))
    }
}

/// Every well-formed telemetry record in `text`, in order. Other lines,
/// including those carrying non-finite readings, are skipped.
pub fn parse_log(text: &str) -> Vec<TelemetryRecord> {
    text.lines().filter_map(|line| line.parse().ok()).collect()
}

// ─── Filtering ───────────────────────────────────────────────────────────────

/// Records kept by [`filter_valid`] and how many were dropped.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterOutcome {
    /// Records inside the voltage window.
    pub records: Vec<TelemetryRecord>,
    /// Records before filtering.
    pub total: usize,
}

impl FilterOutcome {
    /// Records kept.
    pub fn valid(&self) -> usize {
        self.records.len()
    }

    /// Records dropped.
    pub fn excluded(&self) -> usize {
        self.total - self.records.len()
    }

    /// Dropped share in percent; 0 when nothing was parsed.
    pub fn excluded_percent(&self) -> f64 {
        percent(self.excluded(), self.total)
    }
}

/// Keep records with `min_voltage < vout < max_voltage`.
pub fn filter_valid(records: &[TelemetryRecord], min_voltage: f32, max_voltage: f32) -> FilterOutcome {
    FilterOutcome {
        records: records
            .iter()
            .filter(|r| r.vout > min_voltage && r.vout < max_voltage)
            .copied()
            .collect(),
        total: records.len(),
    }
}

// ─── Switching efficiency ────────────────────────────────────────────────────

/// Gate transition statistics against an every-sample PWM baseline.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SwitchingStats {
    /// Records analysed.
    pub total_samples: usize,
    /// OFF→ON plus ON→OFF transitions.
    pub switch_count: usize,
    /// Switches a conventional stage would make (one per sample).
    pub baseline_switches: usize,
    /// `(baseline − switches) / baseline × 100`.
    pub reduction_percent: f64,
    /// Mean run length between transitions.
    pub avg_samples_per_switch: f64,
    /// Transitions per sample.
    pub transitions_per_sample: f64,
}

/// Count gate transitions and compare with the baseline.
pub fn switching_efficiency(records: &[TelemetryRecord]) -> SwitchingStats {
    let total = records.len();
    let switches = records.windows(2).filter(|w| w[0].gate_on != w[1].gate_on).count();
    let reduction = if total == 0 {
        0.0
    } else {
        (total - switches.min(total)) as f64 / total as f64 * 100.0
    };
    let avg_run = if switches > 0 {
        total as f64 / (switches + 1) as f64
    } else {
        total as f64
    };
    SwitchingStats {
        total_samples: total,
        switch_count: switches,
        baseline_switches: total,
        reduction_percent: reduction,
        avg_samples_per_switch: avg_run,
        transitions_per_sample: ratio(switches, total),
    }
}

// ─── Operating regions ───────────────────────────────────────────────────────

/// Statistics for one output-voltage region.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Region {
    /// Records in the region.
    pub count: usize,
    /// Mean `E` (voltage error); 0 when empty.
    pub mean_error: f64,
    /// Mean `ΔS` (entropy field); 0 when empty.
    pub mean_entropy_field: f64,
}

impl Region {
    fn collect<'a>(records: impl Iterator<Item = &'a TelemetryRecord>) -> Self {
        let mut region = Region::default();
        let (mut err_sum, mut field_sum) = (0.0f64, 0.0f64);
        for r in records {
            region.count += 1;
            err_sum += f64::from(r.error);
            field_sum += f64::from(r.entropy_field);
        }
        if region.count > 0 {
            region.mean_error = err_sum / region.count as f64;
            region.mean_entropy_field = field_sum / region.count as f64;
        }
        region
    }
}

/// Region breakdown and gate duty.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RegionStats {
    /// 4.5 V ≤ vout ≤ 6.0 V.
    pub nominal: Region,
    /// vout > 7.0 V.
    pub overvoltage: Region,
    /// 0.5 V < vout < 3.0 V.
    pub undervoltage: Region,
    /// Share of records with the gate ON, percent.
    pub gate_on_percent: f64,
    /// Share of records with the gate OFF, percent.
    pub gate_off_percent: f64,
}

/// Break records down by output-voltage region.
pub fn operating_regions(records: &[TelemetryRecord]) -> RegionStats {
    let on = records.iter().filter(|r| r.gate_on).count();
    let off = records.len() - on;
    RegionStats {
        nominal: Region::collect(records.iter().filter(|r| (4.5..=6.0).contains(&r.vout))),
        overvoltage: Region::collect(records.iter().filter(|r| r.vout > 7.0)),
        undervoltage: Region::collect(records.iter().filter(|r| r.vout > 0.5 && r.vout < 3.0)),
        gate_on_percent: percent(on, records.len()),
        gate_off_percent: percent(off, records.len()),
    }
}

// ─── Load response ───────────────────────────────────────────────────────────

/// Output-voltage statistics for one load band.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LoadBand {
    /// Records in the band.
    pub count: usize,
    /// Mean output voltage; 0 when empty.
    pub mean_vout: f64,
    /// Population standard deviation of output voltage; 0 when empty.
    pub std_vout: f64,
}

impl LoadBand {
    fn collect<'a>(records: impl Iterator<Item = &'a TelemetryRecord>) -> Self {
        let vout: Vec<f64> = records.map(|r| f64::from(r.vout)).collect();
        if vout.is_empty() {
            return LoadBand::default();
        }
        let n = vout.len() as f64;
        let mean = vout.iter().sum::<f64>() / n;
        let var = vout.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        LoadBand { count: vout.len(), mean_vout: mean, std_vout: var.sqrt() }
    }
}

/// Regulation quality across load bands.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LoadResponse {
    /// Consecutive-record load changes above [`LOAD_TRANSITION_AMPS`].
    pub load_transitions: usize,
    /// iload < 1 A.
    pub light: LoadBand,
    /// 1 A ≤ iload < 3 A.
    pub medium: LoadBand,
    /// iload ≥ 3 A.
    pub heavy: LoadBand,
}

/// Group records by load band.
pub fn load_response(records: &[TelemetryRecord]) -> LoadResponse {
    LoadResponse {
        load_transitions: records
            .windows(2)
            .filter(|w| (w[1].iload - w[0].iload).abs() > LOAD_TRANSITION_AMPS)
            .count(),
        light: LoadBand::collect(records.iter().filter(|r| r.iload < 1.0)),
        medium: LoadBand::collect(records.iter().filter(|r| r.iload >= 1.0 && r.iload < 3.0)),
        heavy: LoadBand::collect(records.iter().filter(|r| r.iload >= 3.0)),
    }
}

// ─── Report ──────────────────────────────────────────────────────────────────

/// Everything the analyzer reports for one log.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AnalysisReport {
    /// Records parsed from the log.
    pub parsed: usize,
    /// Records inside the voltage window.
    pub valid: usize,
    /// Records dropped by the voltage window.
    pub excluded: usize,
    /// Switching efficiency.
    pub switching: SwitchingStats,
    /// Region breakdown.
    pub regions: RegionStats,
    /// Load response.
    pub load: LoadResponse,
}

impl AnalysisReport {
    /// Filter then analyse. Fails when nothing survives the filter.
    pub fn from_records(
        records: &[TelemetryRecord],
        min_voltage: f32,
        max_voltage: f32,
    ) -> Result<Self, AnalysisError> {
        let outcome = filter_valid(records, min_voltage, max_voltage);
        if outcome.valid() == 0 {
            return Err(AnalysisError::NoValidSamples { total: outcome.total });
        }
        let kept = &outcome.records;
        Ok(Self {
            parsed: outcome.total,
            valid: outcome.valid(),
            excluded: outcome.excluded(),
            switching: switching_efficiency(kept),
            regions: operating_regions(kept),
            load: load_response(kept),
        })
    }

    /// Share of parsed records dropped by the voltage window, percent.
    pub fn excluded_percent(&self) -> f64 {
        percent(self.excluded, self.parsed)
    }

    /// Parse, filter with the default window, and analyse.
    pub fn from_log(text: &str) -> Result<Self, AnalysisError> {
        Self::from_records(&parse_log(text), DEFAULT_MIN_VOLTAGE, DEFAULT_MAX_VOLTAGE)
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    ratio(part, whole) * 100.0
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const LINE_ON: &str = "Samples: 7 | Vout: 4.000V | Iload: 2.000A | E: 1.000 | A: 2.000 | ∇S: 1.000 | Corr: 1.100 | ΔS: 1.100 | Gate: ON | PWM: 128";

    fn rec(vout: f32, iload: f32, gate_on: bool) -> TelemetryRecord {
        TelemetryRecord {
            samples: 0,
            vout,
            iload,
            error: 5.0 - vout,
            salience: 0.0,
            gradient: 0.0,
            correction: 1.0,
            entropy_field: 5.0 - vout,
            gate_on,
            pwm: if gate_on { 128 } else { 0 },
        }
    }

    #[test]
    fn test_parse_line() {
        let r: TelemetryRecord = LINE_ON.parse().unwrap();
        assert_eq!(r.samples, 7);
        assert_eq!(r.vout, 4.0);
        assert_eq!(r.iload, 2.0);
        assert_eq!(r.error, 1.0);
        assert_eq!(r.gradient, 1.0);
        assert!((r.entropy_field - 1.1).abs() < 1e-6);
        assert!(r.gate_on);
        assert_eq!(r.pwm, 128);
    }

    #[test]
    fn test_parse_line_with_monitor_prefix() {
        let line = format!("12:00:01.123 -> {}", LINE_ON);
        assert!(line.parse::<TelemetryRecord>().is_ok());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("hello".parse::<TelemetryRecord>().is_err());
        assert!(LINE_ON.replace("Gate: ON", "Gate: MAYBE").parse::<TelemetryRecord>().is_err());
        assert!(LINE_ON.replace("| PWM: 128", "").parse::<TelemetryRecord>().is_err());
    }

    #[test]
    fn test_parse_rejects_non_finite_readings() {
        let faulted = LINE_ON.replace("Iload: 2.000A", "Iload: NaNA").replace("ΔS: 1.100", "ΔS: NaN");
        assert_eq!(faulted.parse::<TelemetryRecord>(), Err(AnalysisError::Malformed("Iload")));
        let only_field = LINE_ON.replace("ΔS: 1.100", "ΔS: NaN");
        assert_eq!(only_field.parse::<TelemetryRecord>(), Err(AnalysisError::Malformed("ΔS")));
        let infinite = LINE_ON.replace("Vout: 4.000V", "Vout: infV");
        assert!(infinite.parse::<TelemetryRecord>().is_err());
    }

    #[test]
    fn test_faulted_lines_do_not_poison_report() {
        let faulted = LINE_ON.replace("Iload: 2.000A", "Iload: NaNA").replace("ΔS: 1.100", "ΔS: NaN");
        let text = format!("{}\n{}\n", LINE_ON, faulted);
        let report = AnalysisReport::from_log(&text).unwrap();
        assert_eq!(report.parsed, 1);
        assert_eq!(report.valid, 1);
        assert_eq!(report.load.medium.count, 1);
        assert!(report.regions.undervoltage.mean_entropy_field.is_finite());
        assert!(report.regions.nominal.mean_entropy_field.is_finite());
    }

    #[test]
    fn test_parse_log_skips_noise() {
        let text = format!("ERPC boot\n{}\n\n{}\ncommands: d = toggle\n", LINE_ON, LINE_ON);
        assert_eq!(parse_log(&text).len(), 2);
    }

    #[test]
    fn test_filter_is_exclusive() {
        let records = [rec(0.5, 0.0, false), rec(0.6, 0.0, false), rec(11.9, 0.0, false), rec(12.0, 0.0, false)];
        let out = filter_valid(&records, DEFAULT_MIN_VOLTAGE, DEFAULT_MAX_VOLTAGE);
        assert_eq!(out.valid(), 2);
        assert_eq!(out.excluded(), 2);
        assert!((out.excluded_percent() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_switching_counts_both_edges() {
        let gates = [false, false, true, true, false, false, false, true, false, false];
        let records: Vec<_> = gates.iter().map(|&g| rec(5.0, 1.0, g)).collect();
        let s = switching_efficiency(&records);
        assert_eq!(s.total_samples, 10);
        assert_eq!(s.switch_count, 4);
        assert_eq!(s.baseline_switches, 10);
        assert!((s.reduction_percent - 60.0).abs() < 1e-9);
        assert!((s.avg_samples_per_switch - 2.0).abs() < 1e-9);
        assert!((s.transitions_per_sample - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_switching_no_transitions() {
        let records = [rec(5.0, 0.0, false); 4];
        let s = switching_efficiency(&records);
        assert_eq!(s.switch_count, 0);
        assert_eq!(s.avg_samples_per_switch, 4.0);
        assert_eq!(s.reduction_percent, 100.0);
    }

    #[test]
    fn test_switching_empty() {
        let s = switching_efficiency(&[]);
        assert_eq!(s.total_samples, 0);
        assert_eq!(s.reduction_percent, 0.0);
        assert_eq!(s.transitions_per_sample, 0.0);
    }

    #[test]
    fn test_regions() {
        let records = [
            rec(5.0, 1.0, false),
            rec(4.5, 1.0, true),
            rec(8.0, 1.0, true),
            rec(2.0, 1.0, true),
            rec(6.5, 1.0, false),
        ];
        let r = operating_regions(&records);
        assert_eq!(r.nominal.count, 2);
        assert!((r.nominal.mean_error - 0.25).abs() < 1e-6);
        assert_eq!(r.overvoltage.count, 1);
        assert!((r.overvoltage.mean_entropy_field + 3.0).abs() < 1e-6);
        assert_eq!(r.undervoltage.count, 1);
        assert!((r.gate_on_percent - 60.0).abs() < 1e-9);
        assert!((r.gate_off_percent - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_load_bands() {
        let records = [
            rec(5.0, 0.2, false),
            rec(5.2, 0.4, false),
            rec(4.8, 1.5, false),
            rec(4.4, 3.0, true),
            rec(4.6, 3.5, true),
        ];
        let l = load_response(&records);
        // 0.4 → 1.5 and 1.5 → 3.0
        assert_eq!(l.load_transitions, 2);
        assert_eq!(l.light.count, 2);
        assert!((l.light.mean_vout - 5.1).abs() < 1e-5);
        assert!((l.light.std_vout - 0.1).abs() < 1e-5);
        assert_eq!(l.medium.count, 1);
        assert_eq!(l.medium.std_vout, 0.0);
        assert_eq!(l.heavy.count, 2);
        assert!((l.heavy.mean_vout - 4.5).abs() < 1e-5);
    }

    #[test]
    fn test_report_requires_valid_samples() {
        let records = [rec(0.1, 0.0, false), rec(13.0, 0.0, false)];
        assert_eq!(
            AnalysisReport::from_records(&records, DEFAULT_MIN_VOLTAGE, DEFAULT_MAX_VOLTAGE),
            Err(AnalysisError::NoValidSamples { total: 2 })
        );
    }

    #[test]
    fn test_report_excluded_percent() {
        let records = [rec(0.1, 0.0, false), rec(5.0, 0.0, false), rec(5.1, 0.0, false), rec(13.0, 0.0, false)];
        let report = AnalysisReport::from_records(&records, DEFAULT_MIN_VOLTAGE, DEFAULT_MAX_VOLTAGE).unwrap();
        assert_eq!(report.excluded, 2);
        assert!((report.excluded_percent() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_report_from_log() {
        let text = format!("{}\n{}\n", LINE_ON, LINE_ON.replace("Gate: ON | PWM: 128", "Gate: OFF | PWM: 0"));
        let report = AnalysisReport::from_log(&text).unwrap();
        assert_eq!(report.parsed, 2);
        assert_eq!(report.valid, 2);
        assert_eq!(report.switching.switch_count, 1);
    }
}
