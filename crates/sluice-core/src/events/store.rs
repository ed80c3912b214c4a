//! `SQLite`-backed append-only event store.
//!
//! Two tables share one database: `guard_events` journals every guard
//! operation for off-chain audit, and `auth_events` mirrors the registry's
//! authorization-change stream so derivation can replay locally instead of
//! re-reading the chain. Both are append-only; rows are never updated or
//! deleted.

// SQLite returns i64 for row IDs and counts, but they're always non-negative.
// Timestamps won't overflow u64 until the year 2554.
#![allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]

use std::path::Path;
use std::str::FromStr;

use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use thiserror::Error;

use super::{AuthorizationEvent, GuardEvent};
use crate::types::Address;

const SCHEMA: &str = r"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA busy_timeout = 5000;

CREATE TABLE IF NOT EXISTS guard_events (
    seq_id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_type TEXT NOT NULL,
    payload TEXT NOT NULL,
    recorded_at_ns INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS auth_events (
    ordinal INTEGER PRIMARY KEY,
    address TEXT NOT NULL,
    authorized INTEGER NOT NULL,
    observed_at_ns INTEGER NOT NULL
);
";

/// Errors from the event store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EventStoreError {
    /// Database error from `SQLite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored row could not be decoded.
    #[error("corrupt row at {context}: {reason}")]
    Corrupt {
        /// Which table/row produced the failure.
        context: String,
        /// Decode failure detail.
        reason: String,
    },
}

/// Append-only store for guard and authorization events.
pub struct EventStore {
    conn: Connection,
}

impl EventStore {
    /// Opens or creates the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EventStoreError> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Creates an in-memory store for testing.
    pub fn in_memory() -> Result<Self, EventStoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Journals a guard event; returns its sequence id.
    pub fn record_guard_event(
        &self,
        event: &GuardEvent,
        recorded_at_ns: u64,
    ) -> Result<u64, EventStoreError> {
        let payload = serde_json::to_string(event).map_err(|e| EventStoreError::Corrupt {
            context: "guard_events encode".to_string(),
            reason: e.to_string(),
        })?;

        self.conn.execute(
            "INSERT INTO guard_events (event_type, payload, recorded_at_ns)
             VALUES (?1, ?2, ?3)",
            params![event.event_type(), payload, recorded_at_ns as i64],
        )?;

        Ok(self.conn.last_insert_rowid() as u64)
    }

    /// Reads guard events with `seq_id > after`, oldest first, up to `limit`.
    pub fn read_guard_events(
        &self,
        after: u64,
        limit: usize,
    ) -> Result<Vec<(u64, GuardEvent)>, EventStoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT seq_id, payload FROM guard_events
             WHERE seq_id > ?1 ORDER BY seq_id ASC LIMIT ?2",
        )?;

        let rows = stmt
            .query_map(params![after as i64, limit as i64], |row| {
                Ok((row.get::<_, i64>(0)? as u64, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(seq_id, payload)| {
                let event =
                    serde_json::from_str(&payload).map_err(|e| EventStoreError::Corrupt {
                        context: format!("guard_events seq_id={seq_id}"),
                        reason: e.to_string(),
                    })?;
                Ok((seq_id, event))
            })
            .collect()
    }

    /// Mirrors an observed authorization event.
    ///
    /// Inserting the same ordinal twice is a no-op, so re-fetching an
    /// overlapping range from the registry is harmless.
    pub fn record_authorization(
        &self,
        event: &AuthorizationEvent,
        observed_at_ns: u64,
    ) -> Result<(), EventStoreError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO auth_events (ordinal, address, authorized, observed_at_ns)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                event.ordinal as i64,
                event.address.to_string(),
                i64::from(event.authorized),
                observed_at_ns as i64,
            ],
        )?;
        Ok(())
    }

    /// Reads mirrored authorization events with `ordinal > after`, in order.
    pub fn read_authorizations_after(
        &self,
        after: u64,
    ) -> Result<Vec<AuthorizationEvent>, EventStoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT ordinal, address, authorized FROM auth_events
             WHERE ordinal > ?1 ORDER BY ordinal ASC",
        )?;

        let rows = stmt
            .query_map(params![after as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)? as u64,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)? != 0,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(ordinal, address, authorized)| {
                let address =
                    Address::from_str(&address).map_err(|e| EventStoreError::Corrupt {
                        context: format!("auth_events ordinal={ordinal}"),
                        reason: e.to_string(),
                    })?;
                Ok(AuthorizationEvent {
                    ordinal,
                    address,
                    authorized,
                })
            })
            .collect()
    }

    /// Highest mirrored authorization ordinal, or 0 when none exist.
    pub fn max_authorization_ordinal(&self) -> Result<u64, EventStoreError> {
        let max: Option<i64> = self
            .conn
            .query_row("SELECT MAX(ordinal) FROM auth_events", [], |row| row.get(0))
            .optional()?
            .flatten();
        Ok(max.unwrap_or(0) as u64)
    }

    /// Number of journaled guard events.
    pub fn guard_event_count(&self) -> Result<u64, EventStoreError> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM guard_events", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
