//! Four-panel performance chart for an analysed telemetry log.
//!
//! | Panel | Series | Guides |
//! |-------|--------|--------|
//! | 1 | output voltage | target, 4.5–6.0 V regulation band |
//! | 2 | load current | |
//! | 3 | entropy field `ΔS` | zero, ±threshold |
//! | 4 | gate state | switching-event count in the caption |
//!
//! The x axis is the record index within the filtered log, so counter resets
//! from the console do not fold the trace back on itself.

use std::path::Path;

use plotters::prelude::*;
use thiserror::Error;

use crate::analysis::TelemetryRecord;

/// Chart rendering failure.
#[derive(Error, Debug)]
pub enum PlotError {
    /// No records to draw.
    #[error("no records to plot")]
    Empty,
    /// The drawing backend failed.
    #[error("plot rendering failed: {0}")]
    Draw(String),
}

fn draw_err<E: std::fmt::Display>(e: E) -> PlotError {
    PlotError::Draw(e.to_string())
}

/// Guide lines drawn on the chart.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlotSettings {
    /// Regulation target (V).
    pub target_voltage: f32,
    /// Gate threshold on `|ΔS|`.
    pub threshold: f32,
    /// Image size in pixels.
    pub size: (u32, u32),
}

impl Default for PlotSettings {
    fn default() -> Self {
        Self {
            target_voltage: 5.0,
            threshold: 0.5,
            size: (1280, 1120),
        }
    }
}

/// Render `records` as an SVG at `path`.
pub fn render_performance(
    records: &[TelemetryRecord],
    settings: &PlotSettings,
    path: &Path,
) -> Result<(), PlotError> {
    if records.is_empty() {
        return Err(PlotError::Empty);
    }
    let x_end = records.len() as f64;
    let target = f64::from(settings.target_voltage);
    let threshold = f64::from(settings.threshold);
    let indexed = |f: fn(&TelemetryRecord) -> f32| {
        records
            .iter()
            .enumerate()
            .map(move |(i, r)| (i as f64, f64::from(f(r))))
    };

    let root = SVGBackend::new(path, settings.size).into_drawing_area();
    root.fill(&WHITE).map_err(draw_err)?;
    let panels = root.split_evenly((4, 1));

    // Output voltage.
    {
        let (lo, hi) = span(records.iter().map(|r| r.vout), &[4.5, 6.0, settings.target_voltage]);
        let mut chart = ChartBuilder::on(&panels[0])
            .margin(10)
            .caption("Output voltage", ("sans-serif", 20))
            .set_label_area_size(LabelAreaPosition::Left, 60)
            .set_label_area_size(LabelAreaPosition::Bottom, 30)
            .build_cartesian_2d(0.0..x_end, lo..hi)
            .map_err(draw_err)?;
        chart.configure_mesh().y_desc("Vout (V)").draw().map_err(draw_err)?;
        for band in [4.5, 6.0] {
            chart
                .draw_series(LineSeries::new([(0.0, band), (x_end, band)], &YELLOW))
                .map_err(draw_err)?;
        }
        chart
            .draw_series(LineSeries::new([(0.0, target), (x_end, target)], GREEN.stroke_width(2)))
            .map_err(draw_err)?;
        chart
            .draw_series(LineSeries::new(indexed(|r| r.vout), &BLUE))
            .map_err(draw_err)?;
    }

    // Load current.
    {
        let (lo, hi) = span(records.iter().map(|r| r.iload), &[0.0]);
        let mut chart = ChartBuilder::on(&panels[1])
            .margin(10)
            .caption("Load current", ("sans-serif", 20))
            .set_label_area_size(LabelAreaPosition::Left, 60)
            .set_label_area_size(LabelAreaPosition::Bottom, 30)
            .build_cartesian_2d(0.0..x_end, lo..hi)
            .map_err(draw_err)?;
        chart.configure_mesh().y_desc("Iload (A)").draw().map_err(draw_err)?;
        chart
            .draw_series(AreaSeries::new(indexed(|r| r.iload), 0.0, RED.mix(0.2)).border_style(&RED))
            .map_err(draw_err)?;
    }

    // Entropy field.
    {
        let t = settings.threshold;
        let (lo, hi) = span(records.iter().map(|r| r.entropy_field), &[-t, t]);
        let mut chart = ChartBuilder::on(&panels[2])
            .margin(10)
            .caption("Entropy field", ("sans-serif", 20))
            .set_label_area_size(LabelAreaPosition::Left, 60)
            .set_label_area_size(LabelAreaPosition::Bottom, 30)
            .build_cartesian_2d(0.0..x_end, lo..hi)
            .map_err(draw_err)?;
        chart.configure_mesh().y_desc("ΔS").draw().map_err(draw_err)?;
        chart
            .draw_series(LineSeries::new([(0.0, 0.0), (x_end, 0.0)], &BLACK))
            .map_err(draw_err)?;
        for guide in [threshold, -threshold] {
            chart
                .draw_series(LineSeries::new([(0.0, guide), (x_end, guide)], YELLOW.stroke_width(2)))
                .map_err(draw_err)?;
        }
        chart
            .draw_series(LineSeries::new(indexed(|r| r.entropy_field), &MAGENTA))
            .map_err(draw_err)?;
    }

    // Gate state.
    {
        let switches = records.windows(2).filter(|w| w[0].gate_on != w[1].gate_on).count();
        let mut chart = ChartBuilder::on(&panels[3])
            .margin(10)
            .caption(format!("Gate state ({} switching events)", switches), ("sans-serif", 20))
            .set_label_area_size(LabelAreaPosition::Left, 60)
            .set_label_area_size(LabelAreaPosition::Bottom, 40)
            .build_cartesian_2d(0.0..x_end, -0.1..1.2)
            .map_err(draw_err)?;
        chart
            .configure_mesh()
            .x_desc("Record")
            .y_desc("Gate (1 = ON)")
            .draw()
            .map_err(draw_err)?;
        let steps = records.iter().enumerate().flat_map(|(i, r)| {
            let g = if r.gate_on { 1.0 } else { 0.0 };
            [(i as f64, g), (i as f64 + 1.0, g)]
        });
        chart
            .draw_series(AreaSeries::new(steps, 0.0, GREEN.mix(0.35)).border_style(&GREEN))
            .map_err(draw_err)?;
    }

    root.present().map_err(draw_err)?;
    Ok(())
}

/// Padded `(min, max)` over `values` and `guides`, never zero-width.
fn span(values: impl Iterator<Item = f32>, guides: &[f32]) -> (f64, f64) {
    let (lo, hi) = values
        .chain(guides.iter().copied())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let (lo, hi) = (f64::from(lo), f64::from(hi));
    let pad = ((hi - lo) * 0.1).max(0.1);
    (lo - pad, hi + pad)
}
