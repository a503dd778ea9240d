//! Storage layer for the time-split timer.
//!
//! Provides persistence for the split catalog, timesheet groups, the timesheet
//! ledger and tag associations using `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! Share it between threads behind a mutex, e.g. `lockin_core::SharedLedger<Database>`,
//! or open one `Database` per thread: writes to the ledger run in `IMMEDIATE`
//! transactions, so concurrent connections serialize on the SQLite write lock.
//!
//! # Schema
//!
//! The table layout is fixed for compatibility with existing timesheets:
//!
//! - `time_split` / `time_split_timer`: split templates and their phases. Phases
//!   carry no position column; their order is the table's insertion (rowid) order.
//! - `timesheet_group`: one row per session run.
//! - `timesheet`: finalized intervals. `start_time` is the primary key and
//!   `end_time` is unique, both across all groups.
//! - `tag` / `timesheet_tag`: labels and their many-to-many link to groups.
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in ISO 8601 format with millisecond precision
//! (e.g., `2024-01-15T10:30:00.000Z`). The fixed width keeps lexicographic ordering
//! identical to chronological ordering, so range and overlap checks run in SQL.
//!
//! Phase lengths (`time_split_timer.len`) are stored as integer milliseconds.

mod catalog;
mod tags;
mod timesheet;

use std::fmt;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use lockin_core::{ConflictKey, GroupId, LedgerError, ValidationError};
use rusqlite::Connection;
use thiserror::Error;

pub use timesheet::GroupSummary;

/// How long a connection waits on another writer before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Kinds of catalog records that can be looked up by ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    TimeSplit,
    TimesheetGroup,
    Tag,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TimeSplit => "time split",
            Self::TimesheetGroup => "timesheet group",
            Self::Tag => "tag",
        })
    }
}

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// The referenced record does not exist (or is hidden by a soft delete).
    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: i64 },
    /// A unique key is already taken.
    #[error("conflict: {0}")]
    Conflict(ConflictKey),
    /// An interval intersects an existing entry of the same group.
    #[error("entry {start} .. {end} overlaps an existing entry in group {group}")]
    Overlap {
        group: GroupId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// A value failed domain validation.
    #[error("invalid value: {0}")]
    Validation(#[from] ValidationError),
    /// A stored timestamp could not be parsed.
    #[error("invalid stored timestamp: {value}")]
    TimestampParse {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

impl DbError {
    pub(crate) const fn not_found(entity: Entity, id: i64) -> Self {
        Self::NotFound { entity, id }
    }
}

impl From<DbError> for LedgerError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound {
                entity: Entity::TimesheetGroup,
                id,
            } => Self::GroupNotFound(GroupId::new(id)),
            DbError::Conflict(key) => Self::Conflict(key),
            DbError::Overlap { group, start, end } => Self::Overlap { group, start, end },
            DbError::Validation(err) => Self::Invalid(err),
            other => Self::Storage(Box::new(other)),
        }
    }
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema and the reserved `_paused_` split.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS time_split (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                description TEXT,
                deleted BOOLEAN NOT NULL DEFAULT FALSE
            );

            -- Phases have no position column: rowid order is phase order.
            -- len: phase length in milliseconds
            CREATE TABLE IF NOT EXISTS time_split_timer (
                time_split_id INTEGER NOT NULL,
                len INTEGER NOT NULL,
                name TEXT NOT NULL,
                work BOOLEAN NOT NULL,
                FOREIGN KEY (time_split_id) REFERENCES time_split(id)
            );

            CREATE INDEX IF NOT EXISTS idx_time_split_timer_split
                ON time_split_timer(time_split_id);

            CREATE TABLE IF NOT EXISTS timesheet_group (
                timesheet_group INTEGER PRIMARY KEY AUTOINCREMENT,
                time_split_id INTEGER NOT NULL,
                FOREIGN KEY (time_split_id) REFERENCES time_split(id)
            );

            -- start_time/end_time: ISO 8601 with milliseconds (e.g. '2024-01-15T10:30:00.000Z')
            CREATE TABLE IF NOT EXISTS timesheet (
                timesheet_group INTEGER NOT NULL,
                start_time TEXT NOT NULL PRIMARY KEY,
                end_time TEXT NOT NULL UNIQUE,
                work BOOLEAN NOT NULL,
                FOREIGN KEY (timesheet_group) REFERENCES timesheet_group(timesheet_group)
            );

            CREATE INDEX IF NOT EXISTS idx_timesheet_group ON timesheet(timesheet_group);

            CREATE TABLE IF NOT EXISTS tag (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tag TEXT NOT NULL UNIQUE,
                deleted BOOLEAN NOT NULL DEFAULT FALSE
            );

            CREATE TABLE IF NOT EXISTS timesheet_tag (
                timesheet_group INTEGER NOT NULL,
                tag_id INTEGER NOT NULL,
                PRIMARY KEY (timesheet_group, tag_id),
                FOREIGN KEY (timesheet_group) REFERENCES timesheet_group(timesheet_group),
                FOREIGN KEY (tag_id) REFERENCES tag(id)
            );

            CREATE INDEX IF NOT EXISTS idx_timesheet_tag_tag ON timesheet_tag(tag_id);

            INSERT OR IGNORE INTO time_split (id, name, description, deleted)
                VALUES (0, '_paused_', NULL, FALSE);

            INSERT INTO time_split_timer (time_split_id, len, name, work)
                SELECT 0, 0, '_paused_', FALSE
                WHERE NOT EXISTS (SELECT 1 FROM time_split_timer WHERE time_split_id = 0);
            ",
        )?;
        Ok(())
    }
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            value: value.to_string(),
            source,
        })
}

pub(crate) fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}
