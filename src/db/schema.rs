pub const SCHEMA: &str = r#"
-- Photos table: one row per captured image, keyed by path
CREATE TABLE IF NOT EXISTS photos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    photo_path TEXT NOT NULL UNIQUE,
    captured_at TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_photos_captured_at ON photos(captured_at);

-- AI analysis: at most one per photo, overwritten on re-analysis
CREATE TABLE IF NOT EXISTS ai_analysis (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    photo_id INTEGER NOT NULL UNIQUE,
    description TEXT NOT NULL,
    plant_score REAL,
    analyzed_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
    FOREIGN KEY (photo_id) REFERENCES photos(id)
);

CREATE INDEX IF NOT EXISTS idx_ai_analysis_analyzed_at ON ai_analysis(analyzed_at);
"#;

