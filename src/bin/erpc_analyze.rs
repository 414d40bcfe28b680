//! Telemetry Log Analyzer
//!
//! Reads a serial-monitor capture of controller telemetry and reports
//! switching efficiency, operating-region behaviour and load response.
//!
//! Usage:
//!   erpc-analyze <LOG> [OPTIONS]
//!
//! Options:
//!   --format <FMT>        Output format: ascii, json (default: ascii)
//!   --min-voltage <V>     Drop records at or below this voltage (default: 0.5)
//!   --max-voltage <V>     Drop records at or above this voltage (default: 12.0)
//!   --plot <PATH>         Write a four-panel SVG performance chart
//!
//! Example:
//!   erpc-analyze capture.txt --format json
//!   erpc-analyze capture.txt --plot perf.svg

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use erpc_core::analysis::{
    filter_valid, parse_log, AnalysisReport, LoadBand, Region, DEFAULT_MAX_VOLTAGE,
    DEFAULT_MIN_VOLTAGE,
};
use erpc_core::plot::{render_performance, PlotSettings};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Ascii,
    Json,
}

#[derive(Parser)]
#[command(name = "erpc-analyze")]
#[command(version, about = "Analyze entropy-regulated power control telemetry logs")]
struct Cli {
    /// Captured telemetry log
    log: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Ascii)]
    format: Format,

    /// Records at or below this output voltage are dropped
    #[arg(long, default_value_t = DEFAULT_MIN_VOLTAGE)]
    min_voltage: f32,

    /// Records at or above this output voltage are dropped
    #[arg(long, default_value_t = DEFAULT_MAX_VOLTAGE)]
    max_voltage: f32,

    /// Write a four-panel SVG performance chart to this path
    #[arg(long, value_name = "PATH")]
    plot: Option<PathBuf>,
}

// ============================================================================
// Main
// ============================================================================

fn main() -> Result<()> {
    let cli = Cli::parse();

    let text = fs::read_to_string(&cli.log)
        .with_context(|| format!("reading {}", cli.log.display()))?;
    let records = parse_log(&text);
    let report = AnalysisReport::from_records(&records, cli.min_voltage, cli.max_voltage)
        .with_context(|| format!("analyzing {}", cli.log.display()))?;

    match cli.format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        Format::Ascii => print_ascii(&report),
    }

    if let Some(path) = &cli.plot {
        let valid = filter_valid(&records, cli.min_voltage, cli.max_voltage);
        render_performance(&valid.records, &PlotSettings::default(), path)
            .with_context(|| format!("writing {}", path.display()))?;
        eprintln!("Chart written to {}", path.display());
    }
    Ok(())
}

// ============================================================================
// ASCII Output
// ============================================================================

fn print_ascii(report: &AnalysisReport) {
    let line = "=".repeat(64);

    println!("{}", line);
    println!("  ERPC TELEMETRY ANALYSIS");
    println!("{}", line);
    println!(
        "  Parsed: {}   Valid: {}   Excluded: {} ({:.1}%)",
        report.parsed,
        report.valid,
        report.excluded,
        report.excluded_percent()
    );

    let s = &report.switching;
    println!();
    println!("  SWITCHING EFFICIENCY");
    println!("  Gate transitions:        {}", s.switch_count);
    println!("  Baseline PWM switches:   {}", s.baseline_switches);
    println!("  Switching reduction:     {:.1}%", s.reduction_percent);
    println!("  Samples per switch:      {:.1}", s.avg_samples_per_switch);
    println!("  Transitions per sample:  {:.4}", s.transitions_per_sample);

    let r = &report.regions;
    println!();
    println!("  OPERATING REGIONS");
    print_region("Nominal (4.5-6.0V)", &r.nominal);
    print_region("Overvoltage (>7.0V)", &r.overvoltage);
    print_region("Undervoltage (<3.0V)", &r.undervoltage);
    println!(
        "  Gate ON: {:.1}%   Gate OFF: {:.1}%",
        r.gate_on_percent, r.gate_off_percent
    );

    let l = &report.load;
    println!();
    println!("  LOAD RESPONSE");
    println!("  Load transitions (>0.5A): {}", l.load_transitions);
    print_band("Light (<1A)", &l.light);
    print_band("Medium (1-3A)", &l.medium);
    print_band("Heavy (>=3A)", &l.heavy);
    println!("{}", line);
}

fn print_region(name: &str, region: &Region) {
    if region.count == 0 {
        println!("  {:<22} no samples", name);
    } else {
        println!(
            "  {:<22} n={:<6} mean E={:+.3}  mean ΔS={:+.3}",
            name, region.count, region.mean_error, region.mean_entropy_field
        );
    }
}

fn print_band(name: &str, band: &LoadBand) {
    if band.count == 0 {
        println!("  {:<22} no samples", name);
    } else {
        println!(
            "  {:<22} n={:<6} Vout={:.3}V ± {:.3}V",
            name, band.count, band.mean_vout, band.std_vout
        );
    }
}
