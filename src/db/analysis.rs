use chrono::{Duration, NaiveDateTime};
use rusqlite::{params, OptionalExtension, Transaction, TransactionBehavior};

use super::{Database, Observation, RecordOutcome, ScorePoint};
use crate::error::{PipelineError, Result};

const OBSERVATION_SELECT: &str = r#"
    SELECT p.id, p.photo_path, p.captured_at, a.description, a.plant_score, a.analyzed_at
    FROM ai_analysis a
    JOIN photos p ON a.photo_id = p.id
"#;

impl Database {
    /// Record the AI analysis of a photo, overwriting any previous one.
    ///
    /// Fails with [`PipelineError::Referential`] if the photo was never
    /// registered; the analysis table is left unchanged in that case.
    pub fn record_analysis(
        &self,
        photo_id: i64,
        description: &str,
        plant_score: Option<f64>,
    ) -> Result<RecordOutcome> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;

        let photo_exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM photos WHERE id = ?1)",
            [photo_id],
            |row| row.get(0),
        )?;
        if !photo_exists {
            return Err(PipelineError::Referential(photo_id));
        }

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM ai_analysis WHERE photo_id = ?1",
                [photo_id],
                |row| row.get(0),
            )
            .optional()?;

        tx.execute(
            r#"
            INSERT INTO ai_analysis (photo_id, description, plant_score)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(photo_id) DO UPDATE SET
                description = excluded.description,
                plant_score = excluded.plant_score
            "#,
            params![photo_id, description, plant_score],
        )?;

        let outcome = match existing {
            Some(_) => RecordOutcome::Updated(photo_id),
            None => RecordOutcome::Inserted(tx.last_insert_rowid()),
        };
        tx.commit()?;

        tracing::info!(
            photo_id,
            score = ?plant_score,
            overwritten = outcome.is_update(),
            "Recorded analysis"
        );
        Ok(outcome)
    }

    /// The most recently analyzed observation, if any.
    pub fn latest_analysis(&self) -> Result<Option<Observation>> {
        let sql = format!(
            "{} ORDER BY a.analyzed_at DESC, a.id DESC LIMIT 1",
            OBSERVATION_SELECT
        );
        let observation = self
            .conn
            .query_row(&sql, [], row_to_observation)
            .optional()?;
        Ok(observation)
    }

    /// Observations analyzed within the trailing `window`, newest first.
    pub fn analyses_since(&self, window: Duration) -> Result<Vec<Observation>> {
        let modifier = format!("-{} seconds", window.num_seconds().max(0));
        let sql = format!(
            "{}
             WHERE a.analyzed_at >= strftime('%Y-%m-%d %H:%M:%f', 'now', ?1)
             ORDER BY a.analyzed_at DESC, a.id DESC",
            OBSERVATION_SELECT
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let observations = stmt
            .query_map([modifier], row_to_observation)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(observations)
    }

    /// The `limit` most recently captured scores, newest first.
    ///
    /// Unscored analyses are skipped. Charting needs the reverse order; the
    /// reporter re-sorts.
    pub fn score_history(&self, limit: usize) -> Result<Vec<ScorePoint>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT p.captured_at, a.plant_score
            FROM ai_analysis a
            JOIN photos p ON a.photo_id = p.id
            WHERE a.plant_score IS NOT NULL
            ORDER BY p.captured_at DESC, a.id DESC
            LIMIT ?1
            "#,
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let points = stmt
            .query_map([limit], |row| {
                Ok(ScorePoint {
                    captured_at: row.get(0)?,
                    plant_score: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(points)
    }

    /// Every analysis as `(captured_at, plant_score)`, oldest capture first.
    pub fn score_series(&self) -> Result<Vec<(NaiveDateTime, Option<f64>)>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT p.captured_at, a.plant_score
            FROM ai_analysis a
            JOIN photos p ON a.photo_id = p.id
            ORDER BY p.captured_at ASC, a.id ASC
            "#,
        )?;
        let series = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(series)
    }

    /// Full history, oldest capture first.
    pub fn all_observations(&self) -> Result<Vec<Observation>> {
        let sql = format!("{} ORDER BY p.captured_at ASC, a.id ASC", OBSERVATION_SELECT);
        let mut stmt = self.conn.prepare(&sql)?;
        let observations = stmt
            .query_map([], row_to_observation)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(observations)
    }

    pub fn analysis_count(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM ai_analysis", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn row_to_observation(row: &rusqlite::Row) -> rusqlite::Result<Observation> {
    Ok(Observation {
        photo_id: row.get(0)?,
        photo_path: row.get(1)?,
        captured_at: row.get(2)?,
        description: row.get(3)?,
        plant_score: row.get(4)?,
        analyzed_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use crate::scoring::extract_plant_score;
    use chrono::NaiveDate;
    use std::path::Path;

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, d)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap()
    }

    fn set_analyzed_at(db: &Database, photo_id: i64, ts: &str) {
        db.conn
            .execute(
                "UPDATE ai_analysis SET analyzed_at = ?1 WHERE photo_id = ?2",
                params![ts, photo_id],
            )
            .unwrap();
    }

    #[test]
    fn test_upsert_keeps_one_row_with_latest_fields() {
        let db = test_db();
        let photo_id = db.register_photo(Path::new("p1.jpg"), None).unwrap();

        let first = db.record_analysis(photo_id, "Looks thirsty", Some(40.0)).unwrap();
        assert!(matches!(first, RecordOutcome::Inserted(_)));

        let second = db.record_analysis(photo_id, "Recovered", Some(88.0)).unwrap();
        assert_eq!(second, RecordOutcome::Updated(photo_id));

        assert_eq!(db.analysis_count().unwrap(), 1);
        let latest = db.latest_analysis().unwrap().unwrap();
        assert_eq!(latest.description, "Recovered");
        assert_eq!(latest.plant_score, Some(88.0));
    }

    #[test]
    fn test_overwrite_can_clear_score() {
        let db = test_db();
        let photo_id = db.register_photo(Path::new("p1.jpg"), None).unwrap();
        db.record_analysis(photo_id, "Score: 70", Some(70.0)).unwrap();
        db.record_analysis(photo_id, "unclear", None).unwrap();
        assert_eq!(db.latest_analysis().unwrap().unwrap().plant_score, None);
    }

    #[test]
    fn test_unknown_photo_is_referential_error() {
        let db = test_db();
        let err = db.record_analysis(9999, "orphan", Some(50.0)).unwrap_err();
        assert!(matches!(err, PipelineError::Referential(9999)));
        assert_eq!(db.analysis_count().unwrap(), 0);
    }

    #[test]
    fn test_latest_analysis_empty_store() {
        let db = test_db();
        assert!(db.latest_analysis().unwrap().is_none());
    }

    #[test]
    fn test_latest_analysis_orders_by_analyzed_at() {
        let db = test_db();
        let old = db.register_photo(Path::new("old.jpg"), Some(day(5))).unwrap();
        let new = db.register_photo(Path::new("new.jpg"), Some(day(1))).unwrap();
        db.record_analysis(old, "old", Some(10.0)).unwrap();
        db.record_analysis(new, "new", Some(20.0)).unwrap();
        set_analyzed_at(&db, old, "2024-06-10 09:00:00.000");
        set_analyzed_at(&db, new, "2024-06-11 09:00:00.000");

        let latest = db.latest_analysis().unwrap().unwrap();
        assert_eq!(latest.photo_path, "new.jpg");
    }

    #[test]
    fn test_analyses_since_window() {
        let db = test_db();
        let stale = db.register_photo(Path::new("stale.jpg"), Some(day(1))).unwrap();
        let fresh = db.register_photo(Path::new("fresh.jpg"), Some(day(2))).unwrap();
        db.record_analysis(stale, "stale", Some(30.0)).unwrap();
        db.record_analysis(fresh, "fresh", Some(60.0)).unwrap();
        set_analyzed_at(&db, stale, "2000-01-01 00:00:00.000");

        let recent = db.analyses_since(Duration::days(7)).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].photo_path, "fresh.jpg");
    }

    fn set_analyzed_ago(db: &Database, photo_id: i64, modifier: &str) {
        db.conn
            .execute(
                "UPDATE ai_analysis
                 SET analyzed_at = strftime('%Y-%m-%d %H:%M:%f', 'now', ?1)
                 WHERE photo_id = ?2",
                params![modifier, photo_id],
            )
            .unwrap();
    }

    #[test]
    fn test_analyses_since_newest_first() {
        let db = test_db();
        let first = db.register_photo(Path::new("first.jpg"), Some(day(1))).unwrap();
        let second = db.register_photo(Path::new("second.jpg"), Some(day(2))).unwrap();
        let stale = db.register_photo(Path::new("stale.jpg"), Some(day(3))).unwrap();
        db.record_analysis(first, "first", Some(30.0)).unwrap();
        db.record_analysis(second, "second", Some(60.0)).unwrap();
        db.record_analysis(stale, "stale", Some(90.0)).unwrap();

        // Reverse of insertion order.
        set_analyzed_ago(&db, first, "-1 hours");
        set_analyzed_ago(&db, second, "-2 hours");
        set_analyzed_ago(&db, stale, "-30 days");

        let recent = db.analyses_since(Duration::days(1)).unwrap();
        let paths: Vec<_> = recent.iter().map(|o| o.photo_path.as_str()).collect();
        assert_eq!(paths, vec!["first.jpg", "second.jpg"]);
    }

    #[test]
    fn test_latest_analysis_breaks_ties_by_id() {
        let db = test_db();
        let a = db.register_photo(Path::new("a.jpg"), Some(day(2))).unwrap();
        let b = db.register_photo(Path::new("b.jpg"), Some(day(1))).unwrap();
        db.record_analysis(a, "a", Some(10.0)).unwrap();
        db.record_analysis(b, "b", Some(20.0)).unwrap();
        set_analyzed_at(&db, a, "2024-06-10 09:00:00.000");
        set_analyzed_at(&db, b, "2024-06-10 09:00:00.000");

        assert_eq!(db.latest_analysis().unwrap().unwrap().photo_path, "b.jpg");

        let recent = db.analyses_since(Duration::days(36500)).unwrap();
        let paths: Vec<_> = recent.iter().map(|o| o.photo_path.as_str()).collect();
        assert_eq!(paths, vec!["b.jpg", "a.jpg"]);
    }

    #[test]
    fn test_score_history_skips_nulls_newest_first() {
        let db = test_db();
        for (name, d, score) in [
            ("a.jpg", 1, Some(50.0)),
            ("b.jpg", 2, None),
            ("c.jpg", 3, Some(70.0)),
            ("d.jpg", 4, Some(90.0)),
        ] {
            let id = db.register_photo(Path::new(name), Some(day(d))).unwrap();
            db.record_analysis(id, name, score).unwrap();
        }

        let history = db.score_history(2).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].captured_at, day(4));
        assert_eq!(history[0].plant_score, 90.0);
        assert_eq!(history[1].captured_at, day(3));
    }

    #[test]
    fn test_score_series_is_chronological() {
        let db = test_db();
        for (name, d) in [("day3.jpg", 3), ("day1.jpg", 1), ("day2.jpg", 2)] {
            let id = db.register_photo(Path::new(name), Some(day(d))).unwrap();
            db.record_analysis(id, name, Some(d as f64 * 10.0)).unwrap();
        }

        let series = db.score_series().unwrap();
        let captured: Vec<_> = series.iter().map(|(ts, _)| *ts).collect();
        assert_eq!(captured, vec![day(1), day(2), day(3)]);
    }

    #[test]
    fn test_end_to_end_fallback_score() {
        let db = test_db();
        let photo_id = db.register_photo(Path::new("p1.jpg"), None).unwrap();
        db.record_analysis(photo_id, "Healthy, score 92", None).unwrap();

        let latest = db.latest_analysis().unwrap().unwrap();
        let score = extract_plant_score(&latest.description);
        assert_eq!(score, Some(92.0));

        db.record_analysis(photo_id, &latest.description, score).unwrap();
        let latest = db.latest_analysis().unwrap().unwrap();
        assert_eq!(latest.photo_path, "p1.jpg");
        assert_eq!(latest.plant_score, Some(92.0));
    }
}
