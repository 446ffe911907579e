use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::db::{format_timestamp, Database, Observation};
use crate::error::Result;

/// Export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    /// Pick a format from the output file extension; CSV unless it says `.json`.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ExportFormat::Json,
            _ => ExportFormat::Csv,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "CSV",
            ExportFormat::Json => "JSON",
        }
    }
}

/// One analysis row as written to disk.
#[derive(Debug, Serialize)]
pub struct ExportedObservation {
    pub photo_id: i64,
    pub photo_path: String,
    pub captured_at: String,
    pub analyzed_at: String,
    pub plant_score: Option<f64>,
    pub description: String,
}

impl From<&Observation> for ExportedObservation {
    fn from(obs: &Observation) -> Self {
        Self {
            photo_id: obs.photo_id,
            photo_path: obs.photo_path.clone(),
            captured_at: format_timestamp(&obs.captured_at),
            analyzed_at: format_timestamp(&obs.analyzed_at),
            plant_score: obs.plant_score,
            description: obs.description.clone(),
        }
    }
}

/// Export the full analysis history, oldest capture first.
pub fn export_history(db: &Database, output_path: &Path, format: ExportFormat) -> Result<usize> {
    let observations = db.all_observations()?;
    match format {
        ExportFormat::Csv => export_csv(&observations, output_path)?,
        ExportFormat::Json => export_json(&observations, output_path)?,
    }
    tracing::info!(
        rows = observations.len(),
        format = format.name(),
        "Exported history to {:?}",
        output_path
    );
    Ok(observations.len())
}

pub fn export_csv(observations: &[Observation], output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path)?;

    wtr.write_record([
        "photo_id",
        "photo_path",
        "captured_at",
        "analyzed_at",
        "plant_score",
        "description",
    ])?;

    for obs in observations.iter().map(ExportedObservation::from) {
        wtr.write_record([
            &obs.photo_id.to_string(),
            &obs.photo_path,
            &obs.captured_at,
            &obs.analyzed_at,
            &obs.plant_score.map(|v| v.to_string()).unwrap_or_default(),
            &obs.description,
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

pub fn export_json(observations: &[Observation], output_path: &Path) -> Result<()> {
    let rows: Vec<ExportedObservation> = observations.iter().map(Into::into).collect();
    let json = serde_json::to_string_pretty(&rows).map_err(std::io::Error::from)?;
    let mut file = File::create(output_path)?;
    file.write_all(json.as_bytes())?;
    Ok(())
}
