//! Timesheet groups and the append-only entry ledger.

use chrono::{DateTime, Utc};
use lockin_core::{
    ConflictKey, GroupId, Ledger, LedgerError, SplitId, TimeRange, TimesheetEntry,
    TimesheetGroup, ValidationError, truncate_to_millis,
};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use serde::Serialize;

use crate::{Database, DbError, Entity, format_timestamp, parse_timestamp};

/// Totals for one timesheet group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GroupSummary {
    pub group: GroupId,
    pub entries: usize,
    pub work_ms: i64,
    pub break_ms: i64,
    pub first_start: Option<DateTime<Utc>>,
    pub last_end: Option<DateTime<Utc>>,
}

impl GroupSummary {
    /// Summarizes entries already loaded for `group`.
    pub fn from_entries(group: GroupId, entries: &[TimesheetEntry]) -> Self {
        let mut summary = Self {
            group,
            entries: entries.len(),
            work_ms: 0,
            break_ms: 0,
            first_start: entries.iter().map(|entry| entry.start_time).min(),
            last_end: entries.iter().map(|entry| entry.end_time).max(),
        };
        for entry in entries {
            if entry.work {
                summary.work_ms += entry.length_ms();
            } else {
                summary.break_ms += entry.length_ms();
            }
        }
        summary
    }
}

impl Database {
    /// Opens a new timesheet group for a selectable split.
    pub fn create_group(&mut self, split: SplitId) -> Result<TimesheetGroup, DbError> {
        if !self.time_split_exists(split)? {
            return Err(DbError::not_found(Entity::TimeSplit, split.get()));
        }
        self.conn.execute(
            "INSERT INTO timesheet_group (time_split_id) VALUES (?1)",
            [split.get()],
        )?;
        let group = TimesheetGroup {
            id: GroupId::new(self.conn.last_insert_rowid()),
            time_split_id: split,
        };
        tracing::debug!(group = %group.id, split = %split, "created timesheet group");
        Ok(group)
    }

    pub fn get_group(&self, id: GroupId) -> Result<TimesheetGroup, DbError> {
        self.conn
            .query_row(
                "SELECT time_split_id FROM timesheet_group WHERE timesheet_group = ?1",
                [id.get()],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
            .map(|split| TimesheetGroup {
                id,
                time_split_id: SplitId::new(split),
            })
            .ok_or_else(|| DbError::not_found(Entity::TimesheetGroup, id.get()))
    }

    /// Lists all groups ordered by ID.
    pub fn list_groups(&self) -> Result<Vec<TimesheetGroup>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT timesheet_group, time_split_id FROM timesheet_group
             ORDER BY timesheet_group",
        )?;
        let groups = stmt
            .query_map([], |row| {
                Ok(TimesheetGroup {
                    id: GroupId::new(row.get(0)?),
                    time_split_id: SplitId::new(row.get(1)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(groups)
    }

    /// Appends one entry.
    ///
    /// Checks run in order: the group must exist, `start_time` and `end_time`
    /// must be unused across all groups, then the interval must not overlap
    /// another entry of the same group.
    pub fn append_entry(&mut self, entry: TimesheetEntry) -> Result<TimesheetEntry, DbError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let stored = insert_entry(&tx, &entry)?;
        tx.commit()?;
        tracing::debug!(group = %stored.group, "appended timesheet entry");
        Ok(stored)
    }

    /// Appends entries in one transaction: all are stored or none.
    pub fn append_entries(
        &mut self,
        entries: &[TimesheetEntry],
    ) -> Result<Vec<TimesheetEntry>, DbError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let stored = entries
            .iter()
            .map(|entry| insert_entry(&tx, entry))
            .collect::<Result<Vec<_>, _>>()?;
        tx.commit()?;

        if !stored.is_empty() {
            tracing::debug!(count = stored.len(), "appended timesheet entries");
        }
        Ok(stored)
    }

    /// Lists a group's entries ordered by start time, optionally limited to a range.
    pub fn list_group_entries(
        &self,
        group: GroupId,
        range: Option<TimeRange>,
    ) -> Result<Vec<TimesheetEntry>, DbError> {
        self.get_group(group)?;
        let (from, to) = range_bounds(range);
        let mut stmt = self.conn.prepare(
            "SELECT timesheet_group, start_time, end_time, work FROM timesheet
             WHERE timesheet_group = ?1
               AND (?2 IS NULL OR start_time >= ?2)
               AND (?3 IS NULL OR end_time < ?3)
             ORDER BY start_time",
        )?;
        let rows = stmt
            .query_map(params![group.get(), from, to], entry_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(EntryRow::into_entry).collect()
    }

    /// Entries of every group with `start_time >= from` and `end_time < to`.
    pub fn timesheet_between(&self, range: TimeRange) -> Result<Vec<TimesheetEntry>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT timesheet_group, start_time, end_time, work FROM timesheet
             WHERE start_time >= ?1 AND end_time < ?2
             ORDER BY start_time",
        )?;
        let rows = stmt
            .query_map(
                params![format_timestamp(range.from), format_timestamp(range.to)],
                entry_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(EntryRow::into_entry).collect()
    }

    /// Totals for all of a group's entries.
    pub fn group_summary(&self, group: GroupId) -> Result<GroupSummary, DbError> {
        let entries = self.list_group_entries(group, None)?;
        Ok(GroupSummary::from_entries(group, &entries))
    }

    pub(crate) fn group_exists(&self, id: GroupId) -> Result<bool, DbError> {
        group_exists(&self.conn, id)
    }
}

impl Ledger for Database {
    fn append(&mut self, entry: TimesheetEntry) -> Result<TimesheetEntry, LedgerError> {
        Ok(self.append_entry(entry)?)
    }

    fn append_batch(
        &mut self,
        entries: &[TimesheetEntry],
    ) -> Result<Vec<TimesheetEntry>, LedgerError> {
        Ok(self.append_entries(entries)?)
    }

    fn list_entries(
        &self,
        group: GroupId,
        range: Option<TimeRange>,
    ) -> Result<Vec<TimesheetEntry>, LedgerError> {
        Ok(self.list_group_entries(group, range)?)
    }
}

fn group_exists(conn: &Connection, id: GroupId) -> Result<bool, DbError> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM timesheet_group WHERE timesheet_group = ?1)",
        [id.get()],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn insert_entry(conn: &Connection, entry: &TimesheetEntry) -> Result<TimesheetEntry, DbError> {
    let entry = normalize(entry)?;
    check_entry(conn, &entry)?;
    conn.execute(
        "INSERT INTO timesheet (timesheet_group, start_time, end_time, work)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            entry.group.get(),
            format_timestamp(entry.start_time),
            format_timestamp(entry.end_time),
            entry.work,
        ],
    )?;
    Ok(entry)
}

fn normalize(entry: &TimesheetEntry) -> Result<TimesheetEntry, DbError> {
    let start_time = truncate_to_millis(entry.start_time);
    let end_time = truncate_to_millis(entry.end_time);
    if end_time <= start_time {
        return Err(ValidationError::EmptyInterval {
            start: start_time,
            end: end_time,
        }
        .into());
    }
    Ok(TimesheetEntry {
        start_time,
        end_time,
        ..*entry
    })
}

fn check_entry(conn: &Connection, entry: &TimesheetEntry) -> Result<(), DbError> {
    if !group_exists(conn, entry.group)? {
        return Err(DbError::not_found(
            Entity::TimesheetGroup,
            entry.group.get(),
        ));
    }

    let start = format_timestamp(entry.start_time);
    let end = format_timestamp(entry.end_time);

    let start_taken: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM timesheet WHERE start_time = ?1)",
        [&start],
        |row| row.get(0),
    )?;
    if start_taken {
        return Err(DbError::Conflict(ConflictKey::StartTime(entry.start_time)));
    }
    let end_taken: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM timesheet WHERE end_time = ?1)",
        [&end],
        |row| row.get(0),
    )?;
    if end_taken {
        return Err(DbError::Conflict(ConflictKey::EndTime(entry.end_time)));
    }

    let overlaps: bool = conn.query_row(
        "SELECT EXISTS(
             SELECT 1 FROM timesheet
             WHERE timesheet_group = ?1 AND start_time < ?3 AND end_time > ?2
         )",
        params![entry.group.get(), start, end],
        |row| row.get(0),
    )?;
    if overlaps {
        return Err(DbError::Overlap {
            group: entry.group,
            start: entry.start_time,
            end: entry.end_time,
        });
    }
    Ok(())
}

fn range_bounds(range: Option<TimeRange>) -> (Option<String>, Option<String>) {
    range.map_or((None, None), |range| {
        (
            Some(format_timestamp(range.from)),
            Some(format_timestamp(range.to)),
        )
    })
}

struct EntryRow {
    group: i64,
    start_time: String,
    end_time: String,
    work: bool,
}

impl EntryRow {
    fn into_entry(self) -> Result<TimesheetEntry, DbError> {
        Ok(TimesheetEntry {
            group: GroupId::new(self.group),
            start_time: parse_timestamp(&self.start_time)?,
            end_time: parse_timestamp(&self.end_time)?,
            work: self.work,
        })
    }
}

fn entry_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntryRow> {
    Ok(EntryRow {
        group: row.get(0)?,
        start_time: row.get(1)?,
        end_time: row.get(2)?,
        work: row.get(3)?,
    })
}
