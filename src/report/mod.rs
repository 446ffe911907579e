//! Trend reporter: renders plant score history as a PNG line chart.

pub mod chart;

use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};

use crate::config::ReportConfig;
use crate::db::{Database, ScorePoint};
use crate::error::Result;

pub struct TrendReporter {
    config: ReportConfig,
}

impl TrendReporter {
    pub fn new(config: ReportConfig) -> Self {
        Self { config }
    }

    pub fn chart_path(&self) -> &Path {
        &self.config.chart_path
    }

    /// Render the score history to the configured chart path.
    ///
    /// Returns `None`, without touching the filesystem, when there is nothing
    /// to plot.
    pub fn render_trend_chart(&self, db: &Database) -> Result<Option<PathBuf>> {
        let series = db.score_series()?;
        if series.is_empty() {
            tracing::info!("No analyses recorded yet; skipping chart");
            return Ok(None);
        }

        let points = chart_series(series);
        if points.is_empty() {
            tracing::info!("No scored analyses yet; skipping chart");
            return Ok(None);
        }

        self.write_chart(&points).map(Some)
    }

    fn write_chart(&self, points: &[ScorePoint]) -> Result<PathBuf> {
        let path = &self.config.chart_path;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let img = chart::render(points, self.config.width, self.config.height);
        img.save_with_format(path, image::ImageFormat::Png)?;

        tracing::info!(
            points = points.len(),
            path = %path.display(),
            "Rendered plant score chart"
        );
        Ok(path.clone())
    }

    /// Text posted alongside the chart.
    pub fn weekly_report_message() -> &'static str {
        "📊 **Weekly Plant Health Report**\n\nHere's your plant's health score trend for this week!"
    }
}

/// Plottable points: unscored analyses dropped, oldest capture first.
pub fn chart_series<I>(series: I) -> Vec<ScorePoint>
where
    I: IntoIterator<Item = (NaiveDateTime, Option<f64>)>,
{
    let mut points: Vec<ScorePoint> = series
        .into_iter()
        .filter_map(|(captured_at, score)| {
            score.map(|plant_score| ScorePoint {
                captured_at,
                plant_score,
            })
        })
        .collect();
    points.sort_by_key(|p| p.captured_at);
    points
}
