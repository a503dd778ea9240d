//! The timesheet ledger contract and an in-memory implementation.
//!
//! A ledger is strictly append-only: it accepts finalized intervals, rejects any
//! that collide with an existing `start_time`/`end_time` anywhere or overlap an
//! interval of the same group, and never updates or deletes.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{ConflictKey, GroupId, TimesheetEntry, ValidationError};

/// Ledger errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The entry's group does not exist.
    #[error("timesheet group {0} not found")]
    GroupNotFound(GroupId),

    /// A globally unique timestamp is already taken.
    #[error("conflict: {0}")]
    Conflict(ConflictKey),

    /// The interval intersects an existing entry of the same group.
    #[error("entry {start} .. {end} overlaps an existing entry in group {group}")]
    Overlap {
        group: GroupId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// The entry itself is malformed.
    #[error("invalid entry: {0}")]
    Invalid(#[from] ValidationError),

    /// The backing store failed.
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// A half-open time window used to filter entries.
///
/// An entry matches when `start_time >= from` and `end_time < to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    pub const fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, entry: &TimesheetEntry) -> bool {
        entry.start_time >= self.from && entry.end_time < self.to
    }
}

/// Append-only store of finalized timesheet entries.
pub trait Ledger {
    /// Persists one entry atomically, returning the stored value.
    fn append(&mut self, entry: TimesheetEntry) -> Result<TimesheetEntry, LedgerError>;

    /// Persists several entries as one unit: either all are stored or none.
    ///
    /// The default implementation appends one at a time and is only atomic for
    /// single-entry batches; stores that can do better override it.
    fn append_batch(
        &mut self,
        entries: &[TimesheetEntry],
    ) -> Result<Vec<TimesheetEntry>, LedgerError> {
        entries.iter().map(|entry| self.append(*entry)).collect()
    }

    /// Lists a group's entries ordered by `start_time` ascending.
    ///
    /// Fails with [`LedgerError::GroupNotFound`] for an unknown group.
    fn list_entries(
        &self,
        group: GroupId,
        range: Option<TimeRange>,
    ) -> Result<Vec<TimesheetEntry>, LedgerError>;

    /// Sums the lengths of a group's work entries, in milliseconds.
    fn total_work_ms(&self, group: GroupId) -> Result<i64, LedgerError> {
        Ok(self
            .list_entries(group, None)?
            .iter()
            .filter(|entry| entry.work)
            .map(TimesheetEntry::length_ms)
            .sum())
    }
}

/// Checks an entry against the ledger invariants.
///
/// Duplicate keys are reported before overlaps, so a same-instant start in the
/// same group surfaces as a conflict.
pub fn check_append<'a>(
    entry: &TimesheetEntry,
    existing: impl IntoIterator<Item = &'a TimesheetEntry>,
) -> Result<(), LedgerError> {
    if entry.end_time <= entry.start_time {
        return Err(ValidationError::EmptyInterval {
            start: entry.start_time,
            end: entry.end_time,
        }
        .into());
    }
    let mut overlap = false;
    for other in existing {
        if other.start_time == entry.start_time {
            return Err(LedgerError::Conflict(ConflictKey::StartTime(
                entry.start_time,
            )));
        }
        if other.end_time == entry.end_time {
            return Err(LedgerError::Conflict(ConflictKey::EndTime(entry.end_time)));
        }
        overlap |= other.group == entry.group && other.overlaps(entry);
    }
    if overlap {
        return Err(LedgerError::Overlap {
            group: entry.group,
            start: entry.start_time,
            end: entry.end_time,
        });
    }
    Ok(())
}

/// An in-memory append-only ledger.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    entries: Vec<TimesheetEntry>,
    groups: HashSet<GroupId>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a group so entries may be appended to it.
    pub fn add_group(&mut self, group: GroupId) {
        self.groups.insert(group);
    }

    /// Number of entries across all groups.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Ledger for MemoryLedger {
    fn append(&mut self, entry: TimesheetEntry) -> Result<TimesheetEntry, LedgerError> {
        if !self.groups.contains(&entry.group) {
            return Err(LedgerError::GroupNotFound(entry.group));
        }
        check_append(&entry, &self.entries)?;
        self.entries.push(entry);
        Ok(entry)
    }

    fn append_batch(
        &mut self,
        entries: &[TimesheetEntry],
    ) -> Result<Vec<TimesheetEntry>, LedgerError> {
        let committed = self.entries.len();
        for entry in entries {
            if let Err(err) = self.append(*entry) {
                self.entries.truncate(committed);
                return Err(err);
            }
        }
        Ok(entries.to_vec())
    }

    fn list_entries(
        &self,
        group: GroupId,
        range: Option<TimeRange>,
    ) -> Result<Vec<TimesheetEntry>, LedgerError> {
        if !self.groups.contains(&group) {
            return Err(LedgerError::GroupNotFound(group));
        }
        let mut entries: Vec<TimesheetEntry> = self
            .entries
            .iter()
            .filter(|entry| entry.group == group)
            .filter(|entry| range.is_none_or(|range| range.contains(entry)))
            .copied()
            .collect();
        entries.sort_by_key(|entry| entry.start_time);
        Ok(entries)
    }
}

/// A cloneable handle that serializes access to a ledger.
///
/// The lock is held only for the duration of a single call, so sessions of
/// different groups contend only while actually writing.
#[derive(Debug)]
pub struct SharedLedger<L> {
    inner: Arc<Mutex<L>>,
}

impl<L> Clone for SharedLedger<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: Ledger> SharedLedger<L> {
    pub fn new(ledger: L) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ledger)),
        }
    }

    /// Runs `f` with exclusive access to the underlying ledger.
    pub fn with<T>(&self, f: impl FnOnce(&mut L) -> T) -> T {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

impl<L: Ledger> Ledger for SharedLedger<L> {
    fn append(&mut self, entry: TimesheetEntry) -> Result<TimesheetEntry, LedgerError> {
        self.with(|ledger| ledger.append(entry))
    }

    fn append_batch(
        &mut self,
        entries: &[TimesheetEntry],
    ) -> Result<Vec<TimesheetEntry>, LedgerError> {
        self.with(|ledger| ledger.append_batch(entries))
    }

    fn list_entries(
        &self,
        group: GroupId,
        range: Option<TimeRange>,
    ) -> Result<Vec<TimesheetEntry>, LedgerError> {
        self.with(|ledger| ledger.list_entries(group, range))
    }
}
