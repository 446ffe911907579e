use chrono::{Local, NaiveDateTime};
use rusqlite::{params, OptionalExtension, Transaction, TransactionBehavior};
use std::path::Path;

use super::{format_timestamp, Database, Photo};
use crate::error::Result;

impl Database {
    /// Register a captured photo, returning its id.
    ///
    /// Re-registering a known path returns the existing id and leaves its
    /// `captured_at` untouched. `captured_at` defaults to the current local time.
    pub fn register_photo(&self, path: &Path, captured_at: Option<NaiveDateTime>) -> Result<i64> {
        let path_str = path.to_string_lossy().to_string();
        let captured_at = captured_at.unwrap_or_else(|| Local::now().naive_local());

        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let inserted = tx.execute(
            r#"
            INSERT INTO photos (photo_path, captured_at)
            VALUES (?1, ?2)
            ON CONFLICT(photo_path) DO NOTHING
            "#,
            params![path_str, format_timestamp(&captured_at)],
        )?;
        let id: i64 = tx.query_row(
            "SELECT id FROM photos WHERE photo_path = ?1",
            [&path_str],
            |row| row.get(0),
        )?;
        tx.commit()?;

        if inserted == 0 {
            tracing::debug!(photo_id = id, path = %path_str, "Photo already registered");
        } else {
            tracing::info!(photo_id = id, path = %path_str, "Registered photo");
        }
        Ok(id)
    }

    pub fn get_photo(&self, id: i64) -> Result<Option<Photo>> {
        let photo = self
            .conn
            .query_row(
                "SELECT id, photo_path, captured_at, created_at FROM photos WHERE id = ?1",
                [id],
                row_to_photo,
            )
            .optional()?;
        Ok(photo)
    }

    pub fn find_photo_by_path(&self, path: &Path) -> Result<Option<Photo>> {
        let path_str = path.to_string_lossy().to_string();
        let photo = self
            .conn
            .query_row(
                "SELECT id, photo_path, captured_at, created_at FROM photos WHERE photo_path = ?1",
                [&path_str],
                row_to_photo,
            )
            .optional()?;
        Ok(photo)
    }

    pub fn photo_count(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM photos", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn row_to_photo(row: &rusqlite::Row) -> rusqlite::Result<Photo> {
    Ok(Photo {
        id: row.get(0)?,
        path: row.get(1)?,
        captured_at: row.get(2)?,
        created_at: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn ts(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_register_is_idempotent() {
        let db = test_db();
        let first = db.register_photo(Path::new("/photos/p1.jpg"), None).unwrap();
        let second = db.register_photo(Path::new("/photos/p1.jpg"), None).unwrap();
        assert_eq!(first, second);
        assert_eq!(db.photo_count().unwrap(), 1);
    }

    #[test]
    fn test_reregister_keeps_captured_at() {
        let db = test_db();
        let id = db
            .register_photo(Path::new("/photos/p1.jpg"), Some(ts(1, 9)))
            .unwrap();
        db.register_photo(Path::new("/photos/p1.jpg"), Some(ts(2, 9)))
            .unwrap();

        let photo = db.get_photo(id).unwrap().unwrap();
        assert_eq!(photo.captured_at, ts(1, 9));
        assert_eq!(photo.path, "/photos/p1.jpg");
    }

    #[test]
    fn test_ids_are_monotonic() {
        let db = test_db();
        let a = db.register_photo(Path::new("a.jpg"), None).unwrap();
        let b = db.register_photo(Path::new("b.jpg"), None).unwrap();
        let c = db.register_photo(Path::new("c.jpg"), None).unwrap();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_default_captured_at_is_now() {
        let db = test_db();
        let before = Local::now().naive_local() - chrono::Duration::seconds(2);
        let id = db.register_photo(Path::new("now.jpg"), None).unwrap();
        let photo = db.get_photo(id).unwrap().unwrap();
        assert!(photo.captured_at >= before);
    }

    #[test]
    fn test_find_photo_by_path() {
        let db = test_db();
        assert!(db.find_photo_by_path(Path::new("missing.jpg")).unwrap().is_none());
        let id = db.register_photo(Path::new("p2.png"), Some(ts(3, 12))).unwrap();
        let photo = db.find_photo_by_path(Path::new("p2.png")).unwrap().unwrap();
        assert_eq!(photo.id, id);
    }

    #[test]
    fn test_two_connections_share_one_row() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plantwatch.db");
        let db1 = Database::open(&path).unwrap();
        db1.initialize().unwrap();
        let db2 = Database::open(&path).unwrap();

        let a = db1.register_photo(Path::new("shared.jpg"), None).unwrap();
        let b = db2.register_photo(Path::new("shared.jpg"), None).unwrap();
        assert_eq!(a, b);
        assert_eq!(db2.photo_count().unwrap(), 1);
    }
}
