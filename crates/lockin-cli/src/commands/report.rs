//! Report command: a timesheet group's entries, totals and tags.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use lockin_core::{GroupId, SplitId, TimeRange, TimesheetEntry};
use lockin_db::{Database, GroupSummary};
use serde::Serialize;

use super::util::{format_duration, format_time};

/// Last representable instant of year 9999, the open end of a `--from`-only range.
const FAR_FUTURE_SECS: i64 = 253_402_300_799;

// ========== Report Data ==========

#[derive(Debug, Serialize)]
pub struct SplitInfo {
    pub id: SplitId,
    pub name: String,
    pub deleted: bool,
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub group: GroupId,
    pub split: SplitInfo,
    pub tags: Vec<String>,
    pub summary: GroupSummary,
    pub entries: Vec<TimesheetEntry>,
}

/// Builds the half-open range `[from, to)` from optional bounds.
pub fn time_range(
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> Result<Option<TimeRange>> {
    if from.is_none() && to.is_none() {
        return Ok(None);
    }
    let from = from.unwrap_or(DateTime::UNIX_EPOCH);
    let to = match to {
        Some(to) => to,
        None => DateTime::from_timestamp(FAR_FUTURE_SECS, 0).context("invalid range end")?,
    };
    if to <= from {
        anyhow::bail!("--to ({to}) must be after --from ({from})");
    }
    Ok(Some(TimeRange::new(from, to)))
}

/// Collects a group's entries within `range` with their totals.
pub fn build(db: &Database, group: GroupId, range: Option<TimeRange>) -> Result<Report> {
    let group = db
        .get_group(group)
        .with_context(|| format!("failed to load timesheet group {group}"))?;
    // The split may have been deleted since the group ran.
    let split = db.get_time_split_including_deleted(group.time_split_id)?;
    let tags = db
        .tags_for_group(group.id)?
        .into_iter()
        .map(|tag| tag.tag)
        .collect();
    let entries = db.list_group_entries(group.id, range)?;

    Ok(Report {
        group: group.id,
        split: SplitInfo {
            id: split.id,
            name: split.name,
            deleted: split.deleted,
        },
        tags,
        summary: GroupSummary::from_entries(group.id, &entries),
        entries,
    })
}

// ========== Human-Readable Output ==========

pub fn format_report<W: Write>(writer: &mut W, report: &Report) -> Result<()> {
    let deleted = if report.split.deleted { " (deleted)" } else { "" };
    writeln!(writer, "Group {}: {}{deleted}", report.group, report.split.name)?;
    if report.tags.is_empty() {
        writeln!(writer, "Tags: (none)")?;
    } else {
        writeln!(writer, "Tags: {}", report.tags.join(", "))?;
    }
    writeln!(writer)?;

    if report.entries.is_empty() {
        writeln!(writer, "No entries.")?;
        return Ok(());
    }

    writeln!(
        writer,
        "{:<19}  {:<19}  {:<5}  {:>7}",
        "Start", "End", "Kind", "Length"
    )?;
    writeln!(
        writer,
        "───────────────────  ───────────────────  ─────  ───────"
    )?;
    for entry in &report.entries {
        let kind = if entry.work { "work" } else { "break" };
        writeln!(
            writer,
            "{:<19}  {:<19}  {kind:<5}  {:>7}",
            format_time(entry.start_time),
            format_time(entry.end_time),
            format_duration(entry.length_ms())
        )?;
    }
    writeln!(writer)?;
    writeln!(
        writer,
        "Work: {}  Break: {}  Entries: {}",
        format_duration(report.summary.work_ms),
        format_duration(report.summary.break_ms),
        report.summary.entries
    )?;
    Ok(())
}

// ========== Public Interface ==========

pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    group: GroupId,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    json: bool,
) -> Result<()> {
    let report = build(db, group, time_range(from, to)?)?;
    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&report)?)?;
    } else {
        format_report(writer, &report)?;
    }
    Ok(())
}
