//! Plant score extraction from free-form oracle output.
//!
//! The oracle is asked for JSON, but replies are not always well formed. When no
//! structured `plant_score` is available the orchestrator falls back to
//! [`extract_plant_score`], which looks for the two phrasings models tend to use:
//! `Score: 85` and `7/10`.

use regex::Regex;
use std::sync::OnceLock;

fn score_label_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)score[:\s]*(\d+)").expect("valid score regex"))
}

fn out_of_ten_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // `\b` keeps "85/100" from being read as "85/10"
    RE.get_or_init(|| Regex::new(r"(\d+)\s*/\s*10\b").expect("valid ratio regex"))
}

/// Extract a 0-100 plant score from free text.
///
/// Tries `score <n>` first (accepted when `n` is within 0..=100), then `<n>/10`
/// (accepted when `n` is within 0..=10, scaled to 0..=100). Returns `None` when
/// neither pattern yields an in-range value.
pub fn extract_plant_score(text: &str) -> Option<f64> {
    if let Some(caps) = score_label_pattern().captures(text) {
        if let Ok(score) = caps[1].parse::<u64>() {
            if score <= 100 {
                return Some(score as f64);
            }
        }
    }

    if let Some(caps) = out_of_ten_pattern().captures(text) {
        if let Ok(score) = caps[1].parse::<u64>() {
            if score <= 10 {
                return Some((score as f64 / 10.0) * 100.0);
            }
        }
    }

    None
}

/// Accept a structured score only if it is a finite value in 0..=100.
pub fn normalize_score(value: f64) -> Option<f64> {
    if value.is_finite() && (0.0..=100.0).contains(&value) {
        Some(value)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labelled_score() {
        assert_eq!(extract_plant_score("Score: 85"), Some(85.0));
        assert_eq!(extract_plant_score("Healthy, score 92"), Some(92.0));
        assert_eq!(extract_plant_score("PLANT SCORE:70 overall"), Some(70.0));
        assert_eq!(extract_plant_score("score0"), Some(0.0));
    }

    #[test]
    fn test_out_of_ten_score() {
        assert_eq!(extract_plant_score("score of 7/10"), Some(70.0));
        assert_eq!(extract_plant_score("I'd rate it 10 / 10"), Some(100.0));
        assert_eq!(extract_plant_score("85/100"), None);
    }

    #[test]
    fn test_out_of_range_and_missing() {
        assert_eq!(extract_plant_score("health: 150"), None);
        assert_eq!(extract_plant_score("no numbers here"), None);
        assert_eq!(extract_plant_score("Score: 150"), None);
        assert_eq!(extract_plant_score(""), None);
    }

    #[test]
    fn test_out_of_range_label_falls_through_to_ratio() {
        assert_eq!(extract_plant_score("Score: 150, roughly 8/10"), Some(80.0));
    }

    #[test]
    fn test_huge_number_does_not_panic() {
        assert_eq!(extract_plant_score("score 999999999999999999999999"), None);
    }

    #[test]
    fn test_normalize_score() {
        assert_eq!(normalize_score(72.5), Some(72.5));
        assert_eq!(normalize_score(0.0), Some(0.0));
        assert_eq!(normalize_score(100.0), Some(100.0));
        assert_eq!(normalize_score(-1.0), None);
        assert_eq!(normalize_score(f64::NAN), None);
    }
}
