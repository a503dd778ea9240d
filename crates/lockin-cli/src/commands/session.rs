//! Session commands: `lockin session ...`.
//!
//! Each invocation loads the group's session from the state file, applies one
//! engine command against the database ledger, and saves the result. A command
//! the engine rejects leaves both the ledger and the state file untouched.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use lockin_core::{
    Command, GroupId, Session, SessionState, SkipPolicy, SplitId, TimesheetEntry, validate_split,
};
use lockin_db::Database;

use super::util::{format_duration, format_time};
use crate::state::SessionStore;

/// Opens a new timesheet group for `split` and starts its first phase.
pub fn start<W: Write>(
    writer: &mut W,
    db: &mut Database,
    store: &mut SessionStore,
    split: SplitId,
    skip_policy: SkipPolicy,
    now: DateTime<Utc>,
) -> Result<()> {
    let split = db
        .get_time_split(split)
        .with_context(|| format!("failed to load time split {split}"))?;
    // Reject unusable splits before a group is created for them.
    validate_split(&split)?;

    let group = db.create_group(split.id)?;
    let mut session = Session::new(group.id, split).with_skip_policy(skip_policy);
    session.start(now)?;

    writeln!(writer, "Started group {}: {}", group.id, session.split().name)?;
    writeln!(writer, "{}", describe(&session, now))?;

    store.put(session);
    store.save()
}

/// Applies `command` to a group's active session.
pub fn run<W: Write>(
    writer: &mut W,
    db: &mut Database,
    store: &mut SessionStore,
    group: GroupId,
    command: Command,
    now: DateTime<Utc>,
) -> Result<()> {
    let mut session = store
        .get(group)
        .cloned()
        .with_context(|| format!("no active session for group {group}"))?;

    let recorded = match command {
        Command::Tick => session.tick(db, now)?,
        Command::Pause => session.pause(db, now)?,
        Command::Resume => {
            session.resume(now)?;
            Vec::new()
        }
        Command::Skip => session.skip(db, now)?,
        Command::Stop => session.stop(db, now)?,
        Command::Start => {
            anyhow::bail!("group {group} is already started; use 'lockin session start <split>'")
        }
    };

    for entry in &recorded {
        write_entry(writer, entry)?;
    }
    writeln!(writer, "{}", describe(&session, now))?;

    if session.is_completed() {
        store.remove(group);
    } else {
        store.put(session);
    }
    store.save()
}

/// One-line summary of where a session stands at `now`.
pub fn describe(session: &Session, now: DateTime<Utc>) -> String {
    let group = session.group();
    let state = session.state();
    let Some((index, phase)) = state.phase_index().zip(session.current_phase()) else {
        return format!("Group {group}: {}", state.name());
    };

    let position = format!("{}/{}", index + 1, session.split().phases.len());
    let remaining = format_duration(session.remaining_ms(now));
    match state {
        SessionState::Paused { .. } => {
            format!("Group {group}: {} ({position}) paused, {remaining} left", phase.name)
        }
        _ => format!("Group {group}: {} ({position}) running, {remaining} left", phase.name),
    }
}

fn write_entry<W: Write>(writer: &mut W, entry: &TimesheetEntry) -> Result<()> {
    let kind = if entry.work { "work" } else { "break" };
    writeln!(
        writer,
        "Recorded {kind:<5} {} - {} ({})",
        format_time(entry.start_time),
        format_time(entry.end_time),
        format_duration(entry.length_ms())
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration;
    use insta::assert_snapshot;
    use lockin_core::{Ledger, TimerPhase};
    use tempfile::TempDir;

    struct Fixture {
        db: Database,
        store: SessionStore,
        _temp: TempDir,
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-06T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn fixture() -> Fixture {
        let temp = tempfile::tempdir().unwrap();
        let mut db = Database::open_in_memory().unwrap();
        db.create_time_split(
            "Pomodoro",
            None,
            &[
                TimerPhase::work_minutes("Work", 25).unwrap(),
                TimerPhase::break_minutes("Break", 5).unwrap(),
                TimerPhase::work_minutes("Work", 25).unwrap(),
                TimerPhase::break_minutes("Long Break", 15).unwrap(),
            ],
        )
        .unwrap();
        let store = SessionStore::open(&temp.path().join("sessions.json")).unwrap();
        Fixture {
            db,
            store,
            _temp: temp,
        }
    }

    fn at(minutes: i64) -> DateTime<Utc> {
        t0() + Duration::minutes(minutes)
    }

    #[test]
    fn pomodoro_session_through_the_cli() {
        let mut f = fixture();
        let group = GroupId::new(1);
        let mut output = Vec::new();

        start(
            &mut output,
            &mut f.db,
            &mut f.store,
            SplitId::new(1),
            SkipPolicy::Record,
            at(0),
        )
        .unwrap();
        run(&mut output, &mut f.db, &mut f.store, group, Command::Tick, at(30)).unwrap();
        run(&mut output, &mut f.db, &mut f.store, group, Command::Pause, at(40)).unwrap();
        run(&mut output, &mut f.db, &mut f.store, group, Command::Resume, at(50)).unwrap();
        run(&mut output, &mut f.db, &mut f.store, group, Command::Stop, at(55)).unwrap();

        let output = String::from_utf8(output).unwrap();
        assert_snapshot!(output, @r"
        Started group 1: Pomodoro
        Group 1: Work (1/4) running, 25m left
        Recorded work  2025-01-06 09:00:00 - 2025-01-06 09:25:00 (25m)
        Recorded break 2025-01-06 09:25:00 - 2025-01-06 09:30:00 (5m)
        Group 1: Work (3/4) running, 25m left
        Group 1: Work (3/4) paused, 15m left
        Group 1: Work (3/4) running, 15m left
        Recorded work  2025-01-06 09:40:00 - 2025-01-06 09:55:00 (15m)
        Group 1: completed
        ");

        assert!(f.store.get(group).is_none());
        assert_eq!(f.db.total_work_ms(group).unwrap(), 40 * 60_000);
    }

    #[test]
    fn rejected_command_leaves_state_unchanged() {
        let mut f = fixture();
        let group = GroupId::new(1);
        let mut output = Vec::new();
        start(
            &mut output,
            &mut f.db,
            &mut f.store,
            SplitId::new(1),
            SkipPolicy::Record,
            at(0),
        )
        .unwrap();
        let before = f.store.get(group).cloned().unwrap();

        let err = run(&mut output, &mut f.db, &mut f.store, group, Command::Resume, at(5))
            .unwrap_err();
        assert!(err.to_string().contains("cannot resume a session that is running"));

        let err = run(&mut output, &mut f.db, &mut f.store, group, Command::Tick, at(-5))
            .unwrap_err();
        assert!(err.to_string().contains("time went backwards"));

        assert_eq!(f.store.get(group), Some(&before));
    }

    #[test]
    fn skip_follows_the_configured_policy() {
        let mut f = fixture();
        let mut output = Vec::new();
        start(
            &mut output,
            &mut f.db,
            &mut f.store,
            SplitId::new(1),
            SkipPolicy::Discard,
            at(0),
        )
        .unwrap();
        run(
            &mut output,
            &mut f.db,
            &mut f.store,
            GroupId::new(1),
            Command::Skip,
            at(10),
        )
        .unwrap();

        assert!(f.db.list_entries(GroupId::new(1), None).unwrap().is_empty());
        let session = f.store.get(GroupId::new(1)).unwrap();
        assert_eq!(session.state().phase_index(), Some(1));
    }

    #[test]
    fn unknown_group_has_no_session() {
        let mut f = fixture();
        let mut output = Vec::new();
        let err = run(
            &mut output,
            &mut f.db,
            &mut f.store,
            GroupId::new(7),
            Command::Tick,
            at(1),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "no active session for group 7");
    }

    #[test]
    fn unusable_split_creates_no_group() {
        let mut f = fixture();
        let zero = f
            .db
            .create_time_split("Zero", None, &[TimerPhase::work_minutes("Nothing", 0).unwrap()])
            .unwrap();
        let mut output = Vec::new();

        let err = start(
            &mut output,
            &mut f.db,
            &mut f.store,
            zero.id,
            SkipPolicy::Record,
            at(0),
        )
        .unwrap_err();
        assert!(err.to_string().contains("zero total length"));
        assert!(f.db.list_groups().unwrap().is_empty());
    }
}
