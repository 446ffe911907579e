//! Analysis orchestration: newest capture → vision oracle → score → store.
//!
//! The oracle round-trip is the primary deliverable of a run. Persistence is
//! best-effort: a store failure is logged and the reply is still returned.

use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::db::AnalysisSink;
use crate::error::Result;
use crate::llm::VisionOracle;
use crate::scanner::{capture_time, latest_image, mime_type_for};
use crate::scoring::{extract_plant_score, normalize_score};

pub const DEFAULT_PROMPT: &str = "Respond in JSON with 'plant_score' and 'plant_care' fields. \
     Plant score is out of 100 and give plant-care suggestions.";

/// Keys the description may arrive under, highest priority first.
const DESCRIPTION_KEYS: &[&str] = &[
    "plant_care",
    "care_suggestions",
    "care",
    "description",
    "analysis",
    "summary",
];

#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub photos_dir: PathBuf,
    pub image_extensions: Vec<String>,
    pub prompt: String,
}

impl AnalyzerConfig {
    pub fn from_config(config: &Config, photos_override: Option<&Path>) -> Self {
        Self {
            photos_dir: config.photos_dir(photos_override),
            image_extensions: config.photos.image_extensions.clone(),
            prompt: config
                .oracle
                .prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_PROMPT.to_string()),
        }
    }
}

/// Outcome of analyzing one capture.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureAnalysis {
    pub photo_path: PathBuf,
    /// The oracle's reply, verbatim.
    pub raw_response: String,
    pub plant_score: Option<f64>,
    pub description: String,
    /// `None` when the photo could not be registered.
    pub photo_id: Option<i64>,
}

/// Fields recovered from a JSON reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedReply {
    pub plant_score: Option<f64>,
    pub description: Option<String>,
}

pub struct Analyzer {
    oracle: Box<dyn VisionOracle>,
    config: AnalyzerConfig,
}

impl Analyzer {
    pub fn new(oracle: Box<dyn VisionOracle>, config: AnalyzerConfig) -> Self {
        Self { oracle, config }
    }

    pub fn photos_dir(&self) -> &Path {
        &self.config.photos_dir
    }

    /// Analyze the most recently modified image in the photo directory.
    pub fn analyze_latest_capture(&self, sink: &dyn AnalysisSink) -> Result<CaptureAnalysis> {
        let latest = latest_image(&self.config.photos_dir, &self.config.image_extensions)?;
        let photo = std::fs::canonicalize(&latest).unwrap_or(latest);
        self.analyze_photo(&photo, sink)
    }

    pub fn analyze_photo(&self, photo: &Path, sink: &dyn AnalysisSink) -> Result<CaptureAnalysis> {
        let image = std::fs::read(photo)?;
        let mime_type = mime_type_for(photo);

        tracing::info!(
            photo = %photo.display(),
            mime_type,
            bytes = image.len(),
            provider = self.oracle.provider_name(),
            "Submitting photo for analysis"
        );
        let raw_response = self
            .oracle
            .analyze_image(&self.config.prompt, &image, mime_type)?;

        let (plant_score, description) = interpret_reply(&raw_response);
        if plant_score.is_none() {
            tracing::warn!(photo = %photo.display(), "No plant score in oracle reply");
        }

        let photo_id = persist(sink, photo, &description, plant_score);

        Ok(CaptureAnalysis {
            photo_path: photo.to_path_buf(),
            raw_response,
            plant_score,
            description,
            photo_id,
        })
    }
}

fn persist(
    sink: &dyn AnalysisSink,
    photo: &Path,
    description: &str,
    plant_score: Option<f64>,
) -> Option<i64> {
    let photo_id = match sink.register_photo(photo, capture_time(photo)) {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(photo = %photo.display(), "Failed to register photo: {}", e);
            return None;
        }
    };

    if let Err(e) = sink.record_analysis(photo_id, description, plant_score) {
        tracing::warn!(photo_id, "Failed to record analysis: {}", e);
    }
    Some(photo_id)
}

/// Score and description for a raw reply, with fallbacks applied.
///
/// The score comes from the JSON `plant_score` when usable, else from the text
/// heuristics. The description falls back to the raw reply itself.
pub fn interpret_reply(raw: &str) -> (Option<f64>, String) {
    let parsed = parse_reply(raw);
    let plant_score = parsed.plant_score.or_else(|| extract_plant_score(raw));
    let description = parsed
        .description
        .unwrap_or_else(|| raw.trim().to_string());
    (plant_score, description)
}

/// Pull `plant_score` and a description out of a JSON reply.
///
/// Markdown code fences are tolerated, as is a top-level array whose first
/// element is the object. Anything unparseable yields an empty result.
pub fn parse_reply(raw: &str) -> ParsedReply {
    let value: Value = match serde_json::from_str(&extract_json(raw)) {
        Ok(v) => v,
        Err(_) => return ParsedReply::default(),
    };

    let object = match &value {
        Value::Object(map) => map,
        Value::Array(items) => match items.first() {
            Some(Value::Object(map)) => map,
            _ => return ParsedReply::default(),
        },
        _ => return ParsedReply::default(),
    };

    let plant_score = object.get("plant_score").and_then(score_from_value);
    let description = DESCRIPTION_KEYS
        .iter()
        .filter_map(|key| object.get(*key))
        .find_map(render_description);

    ParsedReply {
        plant_score,
        description,
    }
}

fn score_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().and_then(normalize_score),
        Value::String(s) => s.trim().parse::<f64>().ok().and_then(normalize_score),
        _ => None,
    }
}

fn render_description(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            })
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Extract JSON from a string that might contain markdown code blocks
fn extract_json(content: &str) -> String {
    let trimmed = content.trim();

    if trimmed.starts_with("```") {
        if let Some(start) = trimmed.find('\n') {
            let after_first_line = &trimmed[start + 1..];
            if let Some(end) = after_first_line.rfind("```") {
                return after_first_line[..end].trim().to_string();
            }
        }
    }

    trimmed.to_string()
}
