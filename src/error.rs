//! Error types for the observation pipeline.

use std::path::PathBuf;

/// Errors raised by the store, the orchestrator, the reporter and the notifier.
///
/// A missing plant score is not an error: the extractor returns `None` and the
/// analysis is stored with a null score.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("No photos found in {}", .0.display())]
    NoPhotosFound(PathBuf),
    #[error("Photo {0} does not exist; cannot record analysis")]
    Referential(i64),
    #[error("Vision oracle unavailable: {0}")]
    OracleUnavailable(String),
    #[error("Notification delivery failed: {0}")]
    Delivery(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Database error: {0}")]
    Store(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Chart rendering failed: {0}")]
    Chart(#[from] image::ImageError),
    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),
}

impl PipelineError {
    /// Whether the next scheduled run can reasonably expect to succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PipelineError::NoPhotosFound(_)
                | PipelineError::OracleUnavailable(_)
                | PipelineError::Delivery(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::NoPhotosFound(PathBuf::from("/srv/photos"));
        assert_eq!(err.to_string(), "No photos found in /srv/photos");

        let err = PipelineError::Referential(9999);
        assert_eq!(
            err.to_string(),
            "Photo 9999 does not exist; cannot record analysis"
        );

        let err = PipelineError::OracleUnavailable("timed out".to_string());
        assert_eq!(err.to_string(), "Vision oracle unavailable: timed out");
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(PipelineError::OracleUnavailable(String::new()).is_recoverable());
        assert!(PipelineError::Delivery(String::new()).is_recoverable());
        assert!(!PipelineError::Referential(1).is_recoverable());
    }

    #[test]
    fn test_from_sqlite_error() {
        let err: PipelineError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, PipelineError::Store(_)));
    }
}
