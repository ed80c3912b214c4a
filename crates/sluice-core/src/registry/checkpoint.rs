//! Checkpoint storage for derived authorization state.
//!
//! Checkpoints persist a projection's folded state at a specific event
//! cursor, so derivation replays only the suffix of the stream instead of
//! the whole history. They live in their own `SQLite` database and can
//! always be rebuilt from the event stream if lost.

// SQLite returns i64 for row IDs and counts, but they're always non-negative.
// Timestamps won't overflow u64 until the year 2554.
#![allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, OpenFlags, params};
use thiserror::Error;

const SCHEMA: &str = r"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA busy_timeout = 5000;

CREATE TABLE IF NOT EXISTS checkpoints (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    projection TEXT NOT NULL,
    cursor INTEGER NOT NULL,
    state_data TEXT NOT NULL,
    created_at_ns INTEGER NOT NULL,
    UNIQUE(projection, cursor)
);

CREATE INDEX IF NOT EXISTS idx_checkpoints_projection_cursor
    ON checkpoints(projection, cursor DESC);
";

/// Errors from checkpoint operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CheckpointStoreError {
    /// Database error from `SQLite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No checkpoint exists for the projection.
    #[error("no checkpoint found for projection '{projection}'")]
    NotFound {
        /// The projection that was queried.
        projection: String,
    },
}

/// A saved projection checkpoint.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    /// Row id, assigned on save.
    pub id: Option<u64>,

    /// Name of the projection this checkpoint belongs to.
    pub projection: String,

    /// Event cursor the state was folded up to.
    pub cursor: u64,

    /// Serialized projection state (JSON).
    pub state_data: String,

    /// When the checkpoint was created.
    pub created_at_ns: u64,
}

impl Checkpoint {
    /// Creates a checkpoint stamped with the current wall clock.
    #[must_use]
    pub fn new(projection: impl Into<String>, cursor: u64, state_data: String) -> Self {
        let created_at_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);

        Self {
            id: None,
            projection: projection.into(),
            cursor,
            state_data,
            created_at_ns,
        }
    }
}

/// `SQLite`-backed checkpoint store.
pub struct CheckpointStore {
    conn: Connection,
}

impl CheckpointStore {
    /// Opens or creates a store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CheckpointStoreError> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Creates an in-memory store for testing.
    pub fn in_memory() -> Result<Self, CheckpointStoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Saves a checkpoint, replacing any existing one at the same cursor.
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<u64, CheckpointStoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO checkpoints (projection, cursor, state_data, created_at_ns)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                checkpoint.projection,
                checkpoint.cursor as i64,
                checkpoint.state_data,
                checkpoint.created_at_ns as i64,
            ],
        )?;
        Ok(self.conn.last_insert_rowid() as u64)
    }

    /// Loads the checkpoint with the highest cursor for `projection`.
    pub fn load_latest(&self, projection: &str) -> Result<Checkpoint, CheckpointStoreError> {
        self.query_one(
            "SELECT id, projection, cursor, state_data, created_at_ns
             FROM checkpoints WHERE projection = ?1
             ORDER BY cursor DESC LIMIT 1",
            params![projection],
            projection,
        )
    }

    /// Loads the newest checkpoint at or before `cursor`, for replaying from
    /// an explicit starting point.
    pub fn load_at_or_before(
        &self,
        projection: &str,
        cursor: u64,
    ) -> Result<Checkpoint, CheckpointStoreError> {
        self.query_one(
            "SELECT id, projection, cursor, state_data, created_at_ns
             FROM checkpoints WHERE projection = ?1 AND cursor <= ?2
             ORDER BY cursor DESC LIMIT 1",
            params![projection, cursor as i64],
            projection,
        )
    }

    /// Deletes checkpoints with `cursor < keep_after`; returns how many.
    pub fn prune(&self, projection: &str, keep_after: u64) -> Result<usize, CheckpointStoreError> {
        let deleted = self.conn.execute(
            "DELETE FROM checkpoints WHERE projection = ?1 AND cursor < ?2",
            params![projection, keep_after as i64],
        )?;
        Ok(deleted)
    }

    fn query_one(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
        projection: &str,
    ) -> Result<Checkpoint, CheckpointStoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        stmt.query_row(params, |row| {
            Ok(Checkpoint {
                id: Some(row.get::<_, i64>(0)? as u64),
                projection: row.get(1)?,
                cursor: row.get::<_, i64>(2)? as u64,
                state_data: row.get(3)?,
                created_at_ns: row.get::<_, i64>(4)? as u64,
            })
        })
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => CheckpointStoreError::NotFound {
                projection: projection.to_string(),
            },
            other => CheckpointStoreError::Database(other),
        })
    }
}
