//! Line charts for tabular query results
//!
//! Each metric column of a result set becomes one [`LineChart`], plotted
//! against the configured time column and rendered to SVG with `plotters`.

use crate::config::ResearchConfig;
use crate::error::{ResearchError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use plotters::prelude::*;
use serde_json::Value;
use std::ops::Range;

const WIDTH: u32 = 960;
const HEIGHT: u32 = 540;

/// What the x coordinates mean
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XAxis {
    /// Seconds since the Unix epoch
    Time,
    /// Row position, used when the result has no parseable time column
    Index,
}

/// One metric plotted over time
#[derive(Debug, Clone, PartialEq)]
pub struct LineChart {
    pub column: String,
    pub x_label: String,
    pub x_axis: XAxis,
    /// Points sorted by x
    pub points: Vec<(f64, f64)>,
}

impl LineChart {
    /// Object-store file name for this chart
    pub fn file_name(&self) -> String {
        let safe: String = self
            .column
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        format!("{safe}.svg")
    }

    /// Render the chart as a standalone SVG document
    pub fn render_svg(&self) -> Result<String> {
        let x_range = padded(self.points.iter().map(|p| p.0));
        let y_range = padded(self.points.iter().map(|p| p.1));
        let x_axis = self.x_axis;
        let format_x = move |x: &f64| match x_axis {
            XAxis::Time => DateTime::from_timestamp(*x as i64, 0)
                .map_or_else(|| format!("{x:.0}"), |dt| dt.format("%Y-%m-%d").to_string()),
            XAxis::Index => format!("{x:.0}"),
        };

        let mut svg = String::new();
        {
            let root = SVGBackend::with_string(&mut svg, (WIDTH, HEIGHT)).into_drawing_area();
            root.fill(&WHITE).map_err(render_error)?;

            let mut chart = ChartBuilder::on(&root)
                .caption(format!("{} over time", self.column), ("sans-serif", 24))
                .margin(20)
                .x_label_area_size(48)
                .y_label_area_size(72)
                .build_cartesian_2d(x_range, y_range)
                .map_err(render_error)?;

            chart
                .configure_mesh()
                .x_desc(self.x_label.as_str())
                .y_desc(self.column.as_str())
                .x_labels(8)
                .x_label_formatter(&format_x)
                .draw()
                .map_err(render_error)?;

            chart
                .draw_series(LineSeries::new(self.points.iter().copied(), &BLUE))
                .map_err(render_error)?;

            root.present().map_err(render_error)?;
        }
        Ok(svg)
    }
}

fn render_error(err: impl std::fmt::Display) -> ResearchError {
    ResearchError::Render(err.to_string())
}

/// Axis range over `values`, widened when all values coincide
fn padded(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !min.is_finite() || !max.is_finite() {
        return 0.0..1.0;
    }
    if (max - min).abs() < f64::EPSILON {
        let pad = if min.abs() < f64::EPSILON { 1.0 } else { min.abs() * 0.05 };
        return (min - pad)..(max + pad);
    }
    let pad = (max - min) * 0.05;
    (min - pad)..(max + pad)
}

/// One chart per column that is not the time axis or a partition column
///
/// Columns without a single numeric value are skipped. When the time column
/// is missing or unparseable, row positions are used for x.
pub fn line_charts(
    column_names: &[String],
    rows: &[Vec<Value>],
    config: &ResearchConfig,
) -> Vec<LineChart> {
    let time_index = column_names
        .iter()
        .position(|c| c.eq_ignore_ascii_case(&config.time_column));

    let timestamps: Vec<Option<f64>> = rows
        .iter()
        .map(|row| time_index.and_then(|i| row.get(i)).and_then(parse_timestamp))
        .collect();
    let x_axis = if timestamps.iter().any(Option::is_some) {
        XAxis::Time
    } else {
        XAxis::Index
    };

    column_names
        .iter()
        .enumerate()
        .filter(|(_, name)| !config.is_axis_column(name))
        .filter_map(|(col, name)| {
            let mut points: Vec<(f64, f64)> = rows
                .iter()
                .enumerate()
                .filter_map(|(i, row)| {
                    let x = match x_axis {
                        XAxis::Time => timestamps[i]?,
                        XAxis::Index => i as f64,
                    };
                    let y = row.get(col).and_then(numeric)?;
                    Some((x, y))
                })
                .collect();
            if points.is_empty() {
                return None;
            }
            points.sort_by(|a, b| a.0.total_cmp(&b.0));
            Some(LineChart {
                column: name.clone(),
                x_label: match x_axis {
                    XAxis::Time => config.time_column.clone(),
                    XAxis::Index => "row".to_string(),
                },
                x_axis,
                points,
            })
        })
        .collect()
}

/// Numeric cell value; numeric strings are accepted
pub fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

/// Cell value as seconds since the Unix epoch
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.f]`, `YYYY-MM-DD` and epoch
/// seconds given as a number or a numeric string.
pub fn parse_timestamp(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.timestamp() as f64);
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
                return Some(dt.and_utc().timestamp() as f64);
            }
            if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                return date
                    .and_hms_opt(0, 0, 0)
                    .map(|dt| dt.and_utc().timestamp() as f64);
            }
            s.parse::<f64>().ok()
        }
        _ => None,
    }
}
