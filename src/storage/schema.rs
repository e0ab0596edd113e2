//! Sink schema definitions

/// SQL schema for a record sink
pub const SCHEMA_SQL: &str = r#"
-- One row per extracted record; identifier is the deduplication key
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    identifier INTEGER NOT NULL UNIQUE,
    raw_payload TEXT NOT NULL,
    faction TEXT NOT NULL DEFAULT '',
    name TEXT NOT NULL DEFAULT '',
    commander TEXT NOT NULL DEFAULT '',
    points INTEGER NOT NULL DEFAULT 0,
    origin TEXT NOT NULL,
    captured_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_faction ON records(faction);
CREATE INDEX IF NOT EXISTS idx_records_points ON records(points);
"#;

/// Creates the sink tables if they do not exist
pub fn initialize_schema(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)
}

/// True when the connection holds a `records` table
pub fn has_records_table(conn: &rusqlite::Connection) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'records'",
        [],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}
