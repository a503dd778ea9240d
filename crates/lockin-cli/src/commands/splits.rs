//! Time split catalog commands: `lockin splits ...`.

use std::io::Write;

use anyhow::{Context, Result};
use lockin_core::{SplitId, TimeSplit, TimerPhase};
use lockin_db::Database;

use super::util::{format_duration, parse_phase};

/// Prints splits as a table, or as JSON.
pub fn list<W: Write>(
    writer: &mut W,
    db: &Database,
    include_deleted: bool,
    json: bool,
) -> Result<()> {
    let splits = db.list_time_splits(include_deleted)?;

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&splits)?)?;
        return Ok(());
    }

    if splits.is_empty() {
        writeln!(writer, "No time splits.")?;
        writeln!(writer)?;
        writeln!(
            writer,
            "Hint: Run 'lockin splits create <name> --phase Work=25m --phase Break=5m:break'."
        )?;
        return Ok(());
    }

    writeln!(writer, "{:<4}  {:<24}  {:>6}  {:>8}", "ID", "Name", "Phases", "Cycle")?;
    writeln!(writer, "────  ────────────────────────  ──────  ────────")?;
    for split in &splits {
        let mut name = truncate(&split.name, 24);
        if split.deleted {
            name = truncate(&format!("{name} (deleted)"), 24);
        }
        writeln!(
            writer,
            "{:<4}  {:<24}  {:>6}  {:>8}",
            split.id,
            name,
            split.phases.len(),
            format_duration(split.cycle_length_ms().unwrap_or(i64::MAX))
        )?;
    }
    Ok(())
}

/// Prints one split with its phases in running order.
pub fn show<W: Write>(writer: &mut W, db: &Database, id: SplitId) -> Result<()> {
    let split = db
        .get_time_split_including_deleted(id)
        .with_context(|| format!("failed to load time split {id}"))?;
    write_split(writer, &split)
}

/// Creates a split from `NAME=DURATION[:work|:break]` phase arguments.
pub fn create<W: Write>(
    writer: &mut W,
    db: &mut Database,
    name: &str,
    description: Option<&str>,
    phases: &[String],
) -> Result<()> {
    let phases = phases
        .iter()
        .map(|phase| parse_phase(phase))
        .collect::<Result<Vec<TimerPhase>>>()?;
    let split = db
        .create_time_split(name, description, &phases)
        .context("failed to create time split")?;
    tracing::info!(split = %split.id, "created time split");

    writeln!(writer, "Created time split {}: {}", split.id, split.name)?;
    Ok(())
}

/// Soft-deletes a split.
pub fn delete<W: Write>(writer: &mut W, db: &Database, id: SplitId) -> Result<()> {
    db.soft_delete_time_split(id)
        .with_context(|| format!("failed to delete time split {id}"))?;
    writeln!(writer, "Deleted time split {id}")?;
    Ok(())
}

fn write_split<W: Write>(writer: &mut W, split: &TimeSplit) -> Result<()> {
    let deleted = if split.deleted { " (deleted)" } else { "" };
    writeln!(writer, "Time split {}: {}{deleted}", split.id, split.name)?;
    if let Some(description) = &split.description {
        writeln!(writer, "{description}")?;
    }
    writeln!(writer)?;
    for (index, phase) in split.phases.iter().enumerate() {
        let kind = if phase.work { "work" } else { "break" };
        writeln!(
            writer,
            "{:>3}. {:<20}  {:>7}  {kind}",
            index + 1,
            truncate(&phase.name, 20),
            format_duration(phase.length_ms)
        )?;
    }
    writeln!(writer)?;
    let cycle = split.cycle_length_ms().unwrap_or(i64::MAX);
    writeln!(writer, "Cycle: {}", format_duration(cycle))?;
    Ok(())
}

/// Truncates by characters, not bytes, so multi-byte names never split.
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        format!("{}...", s.chars().take(max - 3).collect::<String>())
    } else {
        s.to_string()
    }
}
