//! Observation store: SQLite-backed record of captured photos and their analyses.
//!
//! Two tables, `photos` and `ai_analysis`, linked 1:0-or-1 by `photo_id`.
//! Every write runs in its own IMMEDIATE transaction so that overlapping runs
//! (two cron invocations, say) are serialized by SQLite rather than by us.

mod analysis;
mod photos;
mod schema;

use chrono::NaiveDateTime;
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

use crate::error::Result;

pub use schema::SCHEMA;

/// Format used for timestamps written by the application.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// A captured image registered in the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Photo {
    pub id: i64,
    pub path: String,
    pub captured_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

/// Joined view of a photo and its analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub photo_id: i64,
    pub photo_path: String,
    pub captured_at: NaiveDateTime,
    pub description: String,
    pub plant_score: Option<f64>,
    pub analyzed_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScorePoint {
    pub captured_at: NaiveDateTime,
    pub plant_score: f64,
}

/// Result of [`Database::record_analysis`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// A new analysis row was created; carries its row id.
    Inserted(i64),
    /// An existing analysis was overwritten; carries the photo id it belongs to.
    Updated(i64),
}

impl RecordOutcome {
    /// The identity of the analysis now associated with the photo.
    ///
    /// For an overwrite this is the photo id, not an analysis row id.
    pub fn id(&self) -> i64 {
        match self {
            RecordOutcome::Inserted(id) | RecordOutcome::Updated(id) => *id,
        }
    }

    pub fn is_update(&self) -> bool {
        matches!(self, RecordOutcome::Updated(_))
    }
}

/// The write half of the store, as seen by the analysis orchestrator.
pub trait AnalysisSink {
    fn register_photo(&self, path: &Path, captured_at: Option<NaiveDateTime>) -> Result<i64>;

    fn record_analysis(
        &self,
        photo_id: i64,
        description: &str,
        plant_score: Option<f64>,
    ) -> Result<RecordOutcome>;
}

pub struct Database {
    pub(crate) conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::configure(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure(conn)
    }

    fn configure(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(Self { conn })
    }

    pub fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }
}

impl AnalysisSink for Database {
    fn register_photo(&self, path: &Path, captured_at: Option<NaiveDateTime>) -> Result<i64> {
        Database::register_photo(self, path, captured_at)
    }

    fn record_analysis(
        &self,
        photo_id: i64,
        description: &str,
        plant_score: Option<f64>,
    ) -> Result<RecordOutcome> {
        Database::record_analysis(self, photo_id, description, plant_score)
    }
}

#[cfg(test)]
pub(crate) fn test_db() -> Database {
    let db = Database::open_in_memory().unwrap();
    db.initialize().unwrap();
    db
}
