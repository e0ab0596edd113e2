//! SQLite sink implementation
//!
//! This module provides a SQLite-based implementation of the Sink trait.

use crate::storage::schema::{has_records_table, initialize_schema};
use crate::storage::traits::{Sink, SinkError, SinkResult};
use crate::storage::{InsertOutcome, Origin, Record};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row, Statement};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How long a writer waits on a locked database before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(60);

const RECORD_COLUMNS: &str =
    "identifier, raw_payload, faction, name, commander, points, origin, captured_at";

/// SQLite record sink
pub struct SqliteSink {
    conn: Connection,
    path: PathBuf,
}

impl SqliteSink {
    /// Opens or creates a sink for writing
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file; parent directories are created
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteSink)` - Successfully opened/created sink
    /// * `Err(SinkError)` - Failed to open the database
    pub fn new(path: &Path) -> SinkResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        // Concurrent readers (stats, merge) while the worker writes
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Opens an existing sink read-only
    ///
    /// Fails with [`SinkError::Unavailable`] when the file is missing or holds
    /// no `records` table, and with [`SinkError::Sqlite`] when it is not a
    /// database at all.
    pub fn open_existing(path: &Path) -> SinkResult<Self> {
        if !path.exists() {
            return Err(SinkError::Unavailable(format!(
                "{} does not exist",
                path.display()
            )));
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        if !has_records_table(&conn)? {
            return Err(SinkError::Unavailable(format!(
                "{} has no records table",
                path.display()
            )));
        }

        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Creates an in-memory sink (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> SinkResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn,
            path: PathBuf::from(":memory:"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Inserts a batch inside one transaction, ignoring known identifiers
    ///
    /// Returns the number of rows actually inserted.
    pub fn insert_batch(&mut self, records: &[Record]) -> SinkResult<u64> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0u64;
        {
            let mut stmt = tx.prepare(&insert_sql())?;
            for record in records {
                inserted += execute_insert(&mut stmt, record)? as u64;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Reads up to `limit` records ordered by identifier, after `after` if given
    pub fn records_after(&self, after: Option<i64>, limit: usize) -> SinkResult<Vec<Record>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM records WHERE identifier > ?1 ORDER BY identifier LIMIT ?2",
            RECORD_COLUMNS
        ))?;

        let records = stmt
            .query_map(
                params![after.unwrap_or(i64::MIN), limit as i64],
                row_to_record,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }
}

impl Sink for SqliteSink {
    fn contains(&self, identifier: i64) -> SinkResult<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM records WHERE identifier = ?1",
                params![identifier],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn insert_or_ignore(&mut self, record: &Record) -> SinkResult<InsertOutcome> {
        let mut stmt = self.conn.prepare_cached(&insert_sql())?;
        match execute_insert(&mut stmt, record)? {
            0 => Ok(InsertOutcome::Ignored),
            _ => Ok(InsertOutcome::Inserted),
        }
    }

    fn get(&self, identifier: i64) -> SinkResult<Option<Record>> {
        let record = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM records WHERE identifier = ?1",
                    RECORD_COLUMNS
                ),
                params![identifier],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn max_identifier(&self) -> SinkResult<Option<i64>> {
        let max = self
            .conn
            .query_row("SELECT MAX(identifier) FROM records", [], |row| row.get(0))?;
        Ok(max)
    }

    fn min_identifier(&self) -> SinkResult<Option<i64>> {
        let min = self
            .conn
            .query_row("SELECT MIN(identifier) FROM records", [], |row| row.get(0))?;
        Ok(min)
    }

    fn max_identifier_between(&self, low: i64, high: i64) -> SinkResult<Option<i64>> {
        let max = self.conn.query_row(
            "SELECT MAX(identifier) FROM records WHERE identifier BETWEEN ?1 AND ?2",
            params![low, high],
            |row| row.get(0),
        )?;
        Ok(max)
    }

    fn count(&self) -> SinkResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn faction_counts(&self) -> SinkResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT faction, COUNT(*) AS n FROM records GROUP BY faction ORDER BY n DESC, faction",
        )?;

        let counts = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(counts)
    }

    fn points_range(&self) -> SinkResult<Option<(i64, i64)>> {
        let range: (Option<i64>, Option<i64>) = self.conn.query_row(
            "SELECT MIN(points), MAX(points) FROM records",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        match range {
            (Some(min), Some(max)) => Ok(Some((min, max))),
            _ => Ok(None),
        }
    }
}

fn insert_sql() -> String {
    format!(
        "INSERT OR IGNORE INTO records ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        RECORD_COLUMNS
    )
}

fn execute_insert(stmt: &mut Statement<'_>, record: &Record) -> rusqlite::Result<usize> {
    stmt.execute(params![
        record.identifier,
        record.raw_payload,
        record.faction,
        record.name,
        record.commander,
        record.points,
        record.origin.to_db_string(),
        record.captured_at.to_rfc3339(),
    ])
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<Record> {
    let captured_at: String = row.get(7)?;
    let captured_at = DateTime::parse_from_rfc3339(&captured_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?;

    Ok(Record {
        identifier: row.get(0)?,
        raw_payload: row.get(1)?,
        faction: row.get(2)?,
        name: row.get(3)?,
        commander: row.get(4)?,
        points: row.get(5)?,
        origin: Origin::from_db_string(&row.get::<_, String>(6)?).unwrap_or(Origin::Shared),
        captured_at,
    })
}
