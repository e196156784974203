//! SVG line charts of per-class centrality over time
//!
//! One chart per FQN per score matrix, written to
//! `centrality_changes/<score>/<sanitized fqn>.svg`. Missing cells break the
//! line instead of being drawn as zero.

use crate::snapshot::{atomic_write, matrix_dir, plots_dir};
use crate::timeseries::{read_matrix, TimeSeriesMatrix};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::OnceLock;
use tracing::info;

const WIDTH: f64 = 1000.0;
const HEIGHT: f64 = 500.0;
const MARGIN_LEFT: f64 = 90.0;
const MARGIN_RIGHT: f64 = 30.0;
const MARGIN_TOP: f64 = 70.0;
const MARGIN_BOTTOM: f64 = 100.0;
const LINE_COLOR: &str = "#add8e6";
const MAX_X_LABELS: usize = 24;
const Y_TICKS: usize = 5;

/// Replace characters that are unsafe in file names with `_`
pub fn sanitize_filename(name: &str) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    let re = UNSAFE.get_or_init(|| Regex::new(r#"[\\/*?:"<>|]"#).unwrap());
    re.replace_all(name, "_").into_owned()
}

/// Escape XML special characters
fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

struct Frame {
    t0: i64,
    span: i64,
    lo: f64,
    hi: f64,
}

impl Frame {
    fn new(series: &[(DateTime<Utc>, Option<f64>)]) -> Self {
        let t0 = series.first().map(|(t, _)| t.timestamp()).unwrap_or(0);
        let t1 = series.last().map(|(t, _)| t.timestamp()).unwrap_or(t0);

        let values = series.iter().filter_map(|(_, v)| *v);
        let (mut lo, mut hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
        if !lo.is_finite() || !hi.is_finite() {
            lo = 0.0;
            hi = 1.0;
        } else if lo == hi {
            let pad = if lo == 0.0 { 0.5 } else { lo.abs() * 0.1 };
            lo -= pad;
            hi += pad;
        }

        Frame {
            t0,
            span: t1 - t0,
            lo,
            hi,
        }
    }

    fn x(&self, t: &DateTime<Utc>) -> f64 {
        let plot_width = WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
        if self.span == 0 {
            return MARGIN_LEFT + plot_width / 2.0;
        }
        let fraction = (t.timestamp() - self.t0) as f64 / self.span as f64;
        MARGIN_LEFT + fraction * plot_width
    }

    fn y(&self, v: f64) -> f64 {
        let plot_height = HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
        let fraction = (v - self.lo) / (self.hi - self.lo);
        HEIGHT - MARGIN_BOTTOM - fraction * plot_height
    }
}

/// Render one entity's series as a standalone SVG document
pub fn render_series_svg(
    score_name: &str,
    fqn: &str,
    series: &[(DateTime<Utc>, Option<f64>)],
) -> String {
    let frame = Frame::new(series);
    let bottom = HEIGHT - MARGIN_BOTTOM;
    let right = WIDTH - MARGIN_RIGHT;

    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="sans-serif">
<rect width="100%" height="100%" fill="white"/>
<text x="{cx}" y="28" font-size="18" text-anchor="middle">{score} Over Time</text>
<text x="{cx}" y="50" font-size="14" text-anchor="middle">{fqn}</text>
<line x1="{left}" y1="{bottom}" x2="{right}" y2="{bottom}" stroke="black"/>
<line x1="{left}" y1="{top}" x2="{left}" y2="{bottom}" stroke="black"/>
<text x="{cx}" y="{xlabel}" font-size="12" text-anchor="middle">Time</text>
<text x="20" y="{cy}" font-size="12" text-anchor="middle" transform="rotate(-90 20 {cy})">{score}</text>
"#,
        w = WIDTH,
        h = HEIGHT,
        cx = WIDTH / 2.0,
        cy = (MARGIN_TOP + bottom) / 2.0,
        left = MARGIN_LEFT,
        top = MARGIN_TOP,
        bottom = bottom,
        right = right,
        xlabel = HEIGHT - 12.0,
        score = xml_escape(score_name),
        fqn = xml_escape(fqn),
    );

    for i in 0..=Y_TICKS {
        let v = frame.lo + (frame.hi - frame.lo) * i as f64 / Y_TICKS as f64;
        let y = frame.y(v);
        let _ = writeln!(
            svg,
            r#"<line x1="{l}" y1="{y:.2}" x2="{r}" y2="{y:.2}" stroke="gainsboro"/><text x="{tx}" y="{ty:.2}" font-size="10" text-anchor="end">{v:.4}</text>"#,
            l = MARGIN_LEFT,
            r = right,
            tx = MARGIN_LEFT - 6.0,
            ty = y + 3.0,
        );
    }

    let step = series.len().div_ceil(MAX_X_LABELS).max(1);
    for (t, _) in series.iter().step_by(step) {
        let x = frame.x(t);
        let _ = writeln!(
            svg,
            r#"<text x="{x:.2}" y="{y}" font-size="10" text-anchor="end" transform="rotate(-45 {x:.2} {y})">{label}</text>"#,
            y = bottom + 14.0,
            label = t.format("%Y-%m-%d"),
        );
    }

    // Consecutive present values form one polyline; a missing cell starts a new one
    let mut segment: Vec<String> = Vec::new();
    let mut segments: Vec<Vec<String>> = Vec::new();
    for (t, value) in series {
        match value {
            Some(v) => segment.push(format!("{:.2},{:.2}", frame.x(t), frame.y(*v))),
            None => {
                if !segment.is_empty() {
                    segments.push(std::mem::take(&mut segment));
                }
            }
        }
    }
    if !segment.is_empty() {
        segments.push(segment);
    }

    for points in &segments {
        if points.len() > 1 {
            let _ = writeln!(
                svg,
                r#"<polyline points="{}" fill="none" stroke="{}" stroke-width="2"/>"#,
                points.join(" "),
                LINE_COLOR
            );
        }
    }

    for (t, value) in series {
        if let Some(v) = value {
            let _ = writeln!(
                svg,
                r#"<circle cx="{:.2}" cy="{:.2}" r="3" fill="{}"/>"#,
                frame.x(t),
                frame.y(*v),
                LINE_COLOR
            );
        }
    }

    svg.push_str("</svg>\n");
    svg
}

/// Write one chart per entity of `matrix` below `dir/<score>`
pub fn plot_matrix(
    matrix: &TimeSeriesMatrix,
    dir: &Path,
    mut on_plotted: impl FnMut(&str),
) -> Result<usize> {
    let target = dir.join(&matrix.score_name);
    let mut count = 0;

    for fqn in matrix.rows.keys() {
        let Some(series) = matrix.series(fqn) else {
            continue;
        };
        let svg = render_series_svg(&matrix.score_name, fqn, &series);
        let path = target.join(format!("{}.svg", sanitize_filename(fqn)));
        atomic_write(&path, svg)?;
        on_plotted(fqn);
        count += 1;
    }

    info!(score = %matrix.score_name, charts = count, "rendered charts");
    Ok(count)
}

/// Plot every matrix under `<output>/centrality_matrix`
pub fn plot_outputs(
    output_dir: &Path,
    mut on_plotted: impl FnMut(&str, &str),
) -> Result<usize> {
    let source = matrix_dir(output_dir);
    let mut paths: Vec<_> = std::fs::read_dir(&source)
        .with_context(|| format!("failed to read {}", source.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "csv"))
        .collect();
    paths.sort();

    let target = plots_dir(output_dir);
    let mut total = 0;
    for path in paths {
        let matrix = read_matrix(&path)?;
        total += plot_matrix(&matrix, &target, |fqn| on_plotted(&matrix.score_name, fqn))?;
    }
    Ok(total)
}
