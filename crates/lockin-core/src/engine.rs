//! Session engine: drives one timesheet group through its split's phases.
//!
//! The engine is a caller-clocked state machine. It has no internal thread or
//! timer; an external driver supplies `now` with every command.
//!
//! ## State Transitions
//!
//! ```text
//! Idle --start--> Running <--pause/resume--> Paused
//!                    |  \--tick/skip--> Running (next phase)
//!                    +--stop--> Completed <--stop-- Paused, Idle
//! ```
//!
//! Every command first computes the entries it would finalize and the state it
//! would move to, hands all entries to the ledger as one batch, and only then
//! commits the new state. A command the ledger rejects leaves the session
//! exactly as it was, so it can be retried.
//!
//! Finalized phases are recorded as `[phase start, phase start + length)`, never
//! with the wall clock `now`, so a late tick does not stretch an interval.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::{Ledger, LedgerError};
use crate::types::{GroupId, SplitId, TimeSplit, TimerPhase, TimesheetEntry, truncate_to_millis};

/// What to do with the partial interval of a skipped phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkipPolicy {
    /// Record the elapsed part of the phase as a short entry.
    #[default]
    Record,
    /// Drop the elapsed part of the phase.
    Discard,
}

impl fmt::Display for SkipPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Record => "record",
            Self::Discard => "discard",
        })
    }
}

/// Engine commands, used in error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Tick,
    Pause,
    Resume,
    Skip,
    Stop,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Start => "start",
            Self::Tick => "tick",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Skip => "skip",
            Self::Stop => "stop",
        })
    }
}

/// State of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    /// Created but not started.
    Idle,
    /// Counting down `phase_index`, which (re)started at `phase_started_at`.
    ///
    /// After a resume, `phase_started_at` is shifted back by the time already
    /// spent in the phase, so it is not necessarily a wall-clock instant.
    Running {
        phase_index: usize,
        phase_started_at: DateTime<Utc>,
    },
    /// Suspended `elapsed_ms` into `phase_index` at `paused_at`.
    Paused {
        phase_index: usize,
        elapsed_ms: i64,
        paused_at: DateTime<Utc>,
    },
    /// Stopped; accepts no further commands.
    Completed,
}

impl SessionState {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running { .. } => "running",
            Self::Paused { .. } => "paused",
            Self::Completed => "completed",
        }
    }

    pub const fn phase_index(&self) -> Option<usize> {
        match self {
            Self::Running { phase_index, .. } | Self::Paused { phase_index, .. } => {
                Some(*phase_index)
            }
            Self::Idle | Self::Completed => None,
        }
    }
}

/// Session engine errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No session is known for the group.
    #[error("no session for timesheet group {0}")]
    NotFound(GroupId),

    /// The split cannot drive a session.
    #[error("time split {split_id} cannot run a session: {reason}")]
    InvalidSplit {
        split_id: SplitId,
        reason: &'static str,
    },

    /// The supplied time is earlier than one already observed.
    #[error("time went backwards: {now} is before last observed {last}")]
    NonMonotonicTime {
        last: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    /// The command is not valid in the session's current state.
    #[error("cannot {command} a session that is {state}")]
    InvalidTransition {
        command: Command,
        state: &'static str,
    },

    /// The ledger rejected the finalized entries.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Checks that a split can start a session.
pub fn validate_split(split: &TimeSplit) -> Result<(), SessionError> {
    if split.deleted {
        return Err(SessionError::InvalidSplit {
            split_id: split.id,
            reason: "split is deleted",
        });
    }
    check_cycle(split)
}

/// Checks that a split's phases form a cycle that makes progress.
///
/// Running sessions only need this; a split soft-deleted mid-session keeps
/// running.
fn check_cycle(split: &TimeSplit) -> Result<(), SessionError> {
    let reason = if split.phases.is_empty() {
        "split has no phases"
    } else {
        match split.cycle_length_ms() {
            None => "split cycle is too long",
            Some(length) if length <= 0 => "split has zero total length",
            Some(_) => return Ok(()),
        }
    };
    Err(SessionError::InvalidSplit {
        split_id: split.id,
        reason,
    })
}

/// One timesheet group's run through a split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    group: GroupId,
    split: TimeSplit,
    state: SessionState,
    last_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    skip_policy: SkipPolicy,
}

/// Outcome of planning a command: the state to move to and what to persist.
struct Plan {
    state: SessionState,
    entries: Vec<TimesheetEntry>,
}

impl Session {
    /// Creates an idle session for `group` running `split`.
    pub fn new(group: GroupId, split: TimeSplit) -> Self {
        Self {
            group,
            split,
            state: SessionState::Idle,
            last_seen: None,
            skip_policy: SkipPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_skip_policy(mut self, skip_policy: SkipPolicy) -> Self {
        self.skip_policy = skip_policy;
        self
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub const fn group(&self) -> GroupId {
        self.group
    }

    pub const fn split(&self) -> &TimeSplit {
        &self.split
    }

    pub const fn state(&self) -> SessionState {
        self.state
    }

    pub const fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.last_seen
    }

    pub const fn skip_policy(&self) -> SkipPolicy {
        self.skip_policy
    }

    pub const fn is_completed(&self) -> bool {
        matches!(self.state, SessionState::Completed)
    }

    pub fn current_phase(&self) -> Option<&TimerPhase> {
        self.state
            .phase_index()
            .and_then(|index| self.split.phases.get(index))
    }

    /// Time spent so far in the current phase, capped at the phase length.
    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> i64 {
        let length = self.current_phase().map_or(0, |phase| phase.length_ms);
        let elapsed = match self.state {
            SessionState::Running {
                phase_started_at, ..
            } => (now - phase_started_at).num_milliseconds(),
            SessionState::Paused { elapsed_ms, .. } => elapsed_ms,
            SessionState::Idle | SessionState::Completed => 0,
        };
        elapsed.clamp(0, length)
    }

    /// Time left in the current phase.
    pub fn remaining_ms(&self, now: DateTime<Utc>) -> i64 {
        let length = self.current_phase().map_or(0, |phase| phase.length_ms);
        length - self.elapsed_ms(now)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Starts the session at phase 0.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        let now = self.observe(Command::Start, now)?;
        if self.state != SessionState::Idle {
            return Err(self.invalid(Command::Start));
        }
        validate_split(&self.split)?;
        self.commit(
            now,
            Plan {
                state: SessionState::Running {
                    phase_index: 0,
                    phase_started_at: now,
                },
                entries: Vec::new(),
            },
        );
        tracing::info!(group = %self.group, split = %self.split.id, "session started");
        Ok(())
    }

    /// Finalizes every phase that has fully elapsed by `now`.
    ///
    /// Ticking a paused session only records the observed time.
    pub fn tick<L: Ledger + ?Sized>(
        &mut self,
        ledger: &mut L,
        now: DateTime<Utc>,
    ) -> Result<Vec<TimesheetEntry>, SessionError> {
        let now = self.observe(Command::Tick, now)?;
        let plan = match self.state {
            SessionState::Running {
                phase_index,
                phase_started_at,
            } => self.catch_up(phase_index, phase_started_at, now)?,
            SessionState::Paused { .. } => Plan {
                state: self.state,
                entries: Vec::new(),
            },
            SessionState::Idle | SessionState::Completed => {
                return Err(self.invalid(Command::Tick));
            }
        };
        self.persist_and_commit(ledger, now, plan)
    }

    /// Suspends the current phase, discarding nothing already finalized.
    ///
    /// The partial phase is not written; resuming continues it.
    pub fn pause<L: Ledger + ?Sized>(
        &mut self,
        ledger: &mut L,
        now: DateTime<Utc>,
    ) -> Result<Vec<TimesheetEntry>, SessionError> {
        let now = self.observe(Command::Pause, now)?;
        let SessionState::Running {
            phase_index,
            phase_started_at,
        } = self.state
        else {
            return Err(self.invalid(Command::Pause));
        };
        let mut plan = self.catch_up(phase_index, phase_started_at, now)?;
        if let SessionState::Running {
            phase_index,
            phase_started_at,
        } = plan.state
        {
            plan.state = SessionState::Paused {
                phase_index,
                elapsed_ms: (now - phase_started_at).num_milliseconds(),
                paused_at: now,
            };
        }
        self.persist_and_commit(ledger, now, plan)
    }

    /// Continues the paused phase where it left off.
    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        let now = self.observe(Command::Resume, now)?;
        let SessionState::Paused {
            phase_index,
            elapsed_ms,
            ..
        } = self.state
        else {
            return Err(self.invalid(Command::Resume));
        };
        let phase_started_at = self.shift_back(now, elapsed_ms)?;
        self.commit(
            now,
            Plan {
                state: SessionState::Running {
                    phase_index,
                    phase_started_at,
                },
                entries: Vec::new(),
            },
        );
        tracing::info!(group = %self.group, phase_index, "session resumed");
        Ok(())
    }

    /// Abandons the current phase and starts the next one at `now`.
    ///
    /// The elapsed part of the abandoned phase is kept or dropped according to
    /// the session's [`SkipPolicy`].
    pub fn skip<L: Ledger + ?Sized>(
        &mut self,
        ledger: &mut L,
        now: DateTime<Utc>,
    ) -> Result<Vec<TimesheetEntry>, SessionError> {
        let now = self.observe(Command::Skip, now)?;
        let (mut plan, partial) = match self.state {
            SessionState::Running {
                phase_index,
                phase_started_at,
            } => self.catch_up_with_partial(phase_index, phase_started_at, now)?,
            SessionState::Paused {
                phase_index,
                elapsed_ms,
                paused_at,
            } => self.paused_partial(phase_index, elapsed_ms, paused_at)?,
            SessionState::Idle | SessionState::Completed => {
                return Err(self.invalid(Command::Skip));
            }
        };
        let Some(phase_index) = plan.state.phase_index() else {
            return Err(self.invalid(Command::Skip));
        };
        if let Some(entry) = partial {
            if self.skip_policy == SkipPolicy::Record {
                plan.entries.push(entry);
            }
        }
        plan.state = SessionState::Running {
            phase_index: self.next_phase(phase_index),
            phase_started_at: now,
        };
        self.persist_and_commit(ledger, now, plan)
    }

    /// Ends the session, recording the elapsed part of the current phase.
    pub fn stop<L: Ledger + ?Sized>(
        &mut self,
        ledger: &mut L,
        now: DateTime<Utc>,
    ) -> Result<Vec<TimesheetEntry>, SessionError> {
        let now = self.observe(Command::Stop, now)?;
        let (mut plan, partial) = match self.state {
            SessionState::Idle => (
                Plan {
                    state: SessionState::Idle,
                    entries: Vec::new(),
                },
                None,
            ),
            SessionState::Running {
                phase_index,
                phase_started_at,
            } => self.catch_up_with_partial(phase_index, phase_started_at, now)?,
            SessionState::Paused {
                phase_index,
                elapsed_ms,
                paused_at,
            } => self.paused_partial(phase_index, elapsed_ms, paused_at)?,
            SessionState::Completed => return Err(self.invalid(Command::Stop)),
        };
        plan.entries.extend(partial);
        plan.state = SessionState::Completed;
        self.persist_and_commit(ledger, now, plan)
    }

    // ── Internals ────────────────────────────────────────────────────

    /// Normalizes `now` and rejects time regressions.
    fn observe(
        &self,
        command: Command,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, SessionError> {
        let now = truncate_to_millis(now);
        if let Some(last) = self.last_seen {
            if now < last {
                tracing::warn!(group = %self.group, %command, %last, %now, "rejected time regression");
                return Err(SessionError::NonMonotonicTime { last, now });
            }
        }
        Ok(now)
    }

    fn invalid(&self, command: Command) -> SessionError {
        tracing::warn!(group = %self.group, %command, state = self.state.name(), "rejected command");
        SessionError::InvalidTransition {
            command,
            state: self.state.name(),
        }
    }

    fn next_phase(&self, phase_index: usize) -> usize {
        (phase_index + 1) % self.split.phases.len()
    }

    fn phase(&self, phase_index: usize) -> Result<&TimerPhase, SessionError> {
        self.split
            .phases
            .get(phase_index)
            .ok_or(SessionError::InvalidSplit {
                split_id: self.split.id,
                reason: "phase index out of range",
            })
    }

    /// `at - ms`, failing if the result is not a representable time.
    fn shift_back(&self, at: DateTime<Utc>, ms: i64) -> Result<DateTime<Utc>, SessionError> {
        Duration::try_milliseconds(ms)
            .and_then(|delta| at.checked_sub_signed(delta))
            .ok_or(SessionError::InvalidSplit {
                split_id: self.split.id,
                reason: "phase starts outside the representable time range",
            })
    }

    fn entry(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        work: bool,
    ) -> Result<TimesheetEntry, SessionError> {
        TimesheetEntry::new(self.group, start, end, work)
            .map_err(|err| SessionError::Ledger(err.into()))
    }

    /// Walks forward through every phase whose end is at or before `now`,
    /// looping back to phase 0 after the last one.
    fn catch_up(
        &self,
        mut phase_index: usize,
        mut phase_started_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Plan, SessionError> {
        check_cycle(&self.split)?;
        let mut entries = Vec::new();
        loop {
            let phase = self.phase(phase_index)?;
            // An end past the representable range has not been reached yet.
            let Some(phase_end) = Duration::try_milliseconds(phase.length_ms)
                .and_then(|length| phase_started_at.checked_add_signed(length))
                .filter(|end| *end <= now)
            else {
                break;
            };
            if phase.length_ms > 0 {
                entries.push(self.entry(phase_started_at, phase_end, phase.work)?);
            }
            phase_index = self.next_phase(phase_index);
            phase_started_at = phase_end;
        }
        Ok(Plan {
            state: SessionState::Running {
                phase_index,
                phase_started_at,
            },
            entries,
        })
    }

    /// Like [`Self::catch_up`], also returning the unfinished remainder of the
    /// phase that is current at `now`, if any time has passed in it.
    fn catch_up_with_partial(
        &self,
        phase_index: usize,
        phase_started_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(Plan, Option<TimesheetEntry>), SessionError> {
        let plan = self.catch_up(phase_index, phase_started_at, now)?;
        let partial = match plan.state {
            SessionState::Running {
                phase_index,
                phase_started_at,
            } if now > phase_started_at => {
                let phase = self.phase(phase_index)?;
                Some(self.entry(phase_started_at, now, phase.work)?)
            }
            _ => None,
        };
        Ok((plan, partial))
    }

    /// The interval a paused phase had covered before it was paused.
    fn paused_partial(
        &self,
        phase_index: usize,
        elapsed_ms: i64,
        paused_at: DateTime<Utc>,
    ) -> Result<(Plan, Option<TimesheetEntry>), SessionError> {
        let partial = if elapsed_ms > 0 {
            let phase = self.phase(phase_index)?;
            let start = self.shift_back(paused_at, elapsed_ms)?;
            Some(self.entry(start, paused_at, phase.work)?)
        } else {
            None
        };
        Ok((
            Plan {
                state: self.state,
                entries: Vec::new(),
            },
            partial,
        ))
    }

    fn persist_and_commit<L: Ledger + ?Sized>(
        &mut self,
        ledger: &mut L,
        now: DateTime<Utc>,
        plan: Plan,
    ) -> Result<Vec<TimesheetEntry>, SessionError> {
        let stored = if plan.entries.is_empty() {
            Vec::new()
        } else {
            ledger.append_batch(&plan.entries).inspect_err(|err| {
                tracing::warn!(group = %self.group, error = %err, "ledger rejected entries");
            })?
        };
        let from = self.state.name();
        self.commit(now, plan);
        if !stored.is_empty() || from != self.state.name() {
            tracing::info!(
                group = %self.group,
                from,
                to = self.state.name(),
                entries = stored.len(),
                "session advanced"
            );
        }
        Ok(stored)
    }

    fn commit(&mut self, now: DateTime<Utc>, plan: Plan) {
        self.state = plan.state;
        self.last_seen = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::ledger::MemoryLedger;
    use crate::types::{ConflictKey, TimerPhase};

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-06T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn mins(n: i64) -> Duration {
        Duration::minutes(n)
    }

    fn pomodoro() -> TimeSplit {
        TimeSplit {
            id: SplitId::new(1),
            name: "Pomodoro".to_string(),
            description: None,
            deleted: false,
            phases: vec![
                TimerPhase::work_minutes("Work", 25).unwrap(),
                TimerPhase::break_minutes("Break", 5).unwrap(),
                TimerPhase::work_minutes("Work", 25).unwrap(),
                TimerPhase::break_minutes("Long Break", 15).unwrap(),
            ],
        }
    }

    fn setup(split: TimeSplit) -> (Session, MemoryLedger) {
        let group = GroupId::new(1);
        let mut ledger = MemoryLedger::new();
        ledger.add_group(group);
        (Session::new(group, split), ledger)
    }

    fn started() -> (Session, MemoryLedger) {
        let (mut session, ledger) = setup(pomodoro());
        session.start(t0()).unwrap();
        (session, ledger)
    }

    #[test]
    fn pomodoro_scenario_cycles_through_phases() {
        let (mut session, mut ledger) = started();

        let mut produced = Vec::new();
        for offset in [25, 30, 55, 70, 95] {
            let entries = session.tick(&mut ledger, t0() + mins(offset)).unwrap();
            assert_eq!(entries.len(), 1, "tick at +{offset}m");
            produced.extend(entries);
        }

        let work: Vec<bool> = produced.iter().map(|e| e.work).collect();
        assert_eq!(work, vec![true, false, true, false, true]);
        let lengths: Vec<i64> = produced.iter().map(|e| e.length().num_minutes()).collect();
        assert_eq!(lengths, vec![25, 5, 25, 15, 25]);
        assert_eq!(produced[4].start_time, t0() + mins(70));
        assert_eq!(
            session.state(),
            SessionState::Running {
                phase_index: 1,
                phase_started_at: t0() + mins(95),
            }
        );
    }

    #[test]
    fn entries_are_contiguous_and_ordered() {
        let (mut session, mut ledger) = started();
        for offset in [10, 25, 31, 56, 71, 100, 130] {
            session.tick(&mut ledger, t0() + mins(offset)).unwrap();
        }
        let entries = ledger.list_entries(GroupId::new(1), None).unwrap();
        assert_eq!(entries.first().unwrap().start_time, t0());
        for pair in entries.windows(2) {
            assert_eq!(pair[0].end_time, pair[1].start_time);
            assert!(!pair[0].overlaps(&pair[1]));
        }
    }

    #[test]
    fn late_tick_does_not_stretch_entry() {
        let (mut session, mut ledger) = started();
        let entries = session.tick(&mut ledger, t0() + mins(27)).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].end_time, t0() + mins(25));
    }

    #[test]
    fn large_gap_finalizes_every_elapsed_phase() {
        let (mut session, mut ledger) = started();
        // Two full 70 minute cycles plus the first work phase.
        let entries = session.tick(&mut ledger, t0() + mins(165)).unwrap();
        assert_eq!(entries.len(), 9);
        let work: Vec<bool> = entries.iter().map(|e| e.work).collect();
        assert_eq!(
            work,
            vec![true, false, true, false, true, false, true, false, true]
        );
        assert_eq!(session.state().phase_index(), Some(1));
    }

    #[test]
    fn tick_before_phase_end_writes_nothing() {
        let (mut session, mut ledger) = started();
        let entries = session.tick(&mut ledger, t0() + mins(24)).unwrap();
        assert!(entries.is_empty());
        assert!(ledger.is_empty());
        assert_eq!(session.remaining_ms(t0() + mins(24)), 60_000);
    }

    #[test]
    fn tick_rejects_time_regression() {
        let (mut session, mut ledger) = started();
        session.tick(&mut ledger, t0() + mins(10)).unwrap();
        let before = session.clone();

        let err = session.tick(&mut ledger, t0() + mins(5)).unwrap_err();
        assert!(matches!(err, SessionError::NonMonotonicTime { .. }));
        assert_eq!(session, before);
        assert!(ledger.is_empty());
    }

    #[test]
    fn equal_timestamps_are_monotonic() {
        let (mut session, mut ledger) = started();
        session.tick(&mut ledger, t0()).unwrap();
        session.tick(&mut ledger, t0()).unwrap();
    }

    #[test]
    fn pause_then_immediate_resume_is_a_no_op() {
        let (mut session, mut ledger) = started();
        let now = t0() + mins(10);
        session.tick(&mut ledger, now).unwrap();
        let before = session.state();

        let entries = session.pause(&mut ledger, now).unwrap();
        assert!(entries.is_empty());
        session.resume(now).unwrap();

        assert_eq!(session.state(), before);
        assert!(ledger.is_empty());
    }

    #[test]
    fn paused_time_does_not_count_toward_phase() {
        let (mut session, mut ledger) = started();
        session.pause(&mut ledger, t0() + mins(10)).unwrap();
        assert_eq!(
            session.state(),
            SessionState::Paused {
                phase_index: 0,
                elapsed_ms: 10 * 60_000,
                paused_at: t0() + mins(10),
            }
        );
        // Ticking while paused records nothing.
        assert!(session.tick(&mut ledger, t0() + mins(40)).unwrap().is_empty());

        session.resume(t0() + mins(50)).unwrap();
        assert!(session.tick(&mut ledger, t0() + mins(64)).unwrap().is_empty());

        let entries = session.tick(&mut ledger, t0() + mins(65)).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].start_time, t0() + mins(40));
        assert_eq!(entries[0].end_time, t0() + mins(65));
        assert!(entries[0].work);
    }

    #[test]
    fn pause_finalizes_phases_already_elapsed() {
        let (mut session, mut ledger) = started();
        let entries = session.pause(&mut ledger, t0() + mins(27)).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            session.state(),
            SessionState::Paused {
                phase_index: 1,
                elapsed_ms: 2 * 60_000,
                paused_at: t0() + mins(27),
            }
        );
    }

    #[test]
    fn pause_and_resume_require_matching_state() {
        let (mut session, mut ledger) = started();
        assert!(matches!(
            session.resume(t0()).unwrap_err(),
            SessionError::InvalidTransition {
                command: Command::Resume,
                state: "running"
            }
        ));
        session.pause(&mut ledger, t0() + mins(1)).unwrap();
        assert!(matches!(
            session.pause(&mut ledger, t0() + mins(2)).unwrap_err(),
            SessionError::InvalidTransition {
                command: Command::Pause,
                ..
            }
        ));
    }

    #[test]
    fn skip_records_partial_phase_by_default() {
        let (mut session, mut ledger) = started();
        let entries = session.skip(&mut ledger, t0() + mins(10)).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].start_time, t0());
        assert_eq!(entries[0].end_time, t0() + mins(10));
        assert_eq!(
            session.state(),
            SessionState::Running {
                phase_index: 1,
                phase_started_at: t0() + mins(10),
            }
        );

        // The break now runs its full five minutes from the skip.
        let entries = session.tick(&mut ledger, t0() + mins(15)).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].work);
    }

    #[test]
    fn skip_discard_policy_drops_partial_phase() {
        let (session, mut ledger) = setup(pomodoro());
        let mut session = session.with_skip_policy(SkipPolicy::Discard);
        session.start(t0()).unwrap();

        let entries = session.skip(&mut ledger, t0() + mins(10)).unwrap();
        assert!(entries.is_empty());
        assert_eq!(session.state().phase_index(), Some(1));
    }

    #[test]
    fn skip_at_phase_start_records_nothing() {
        let (mut session, mut ledger) = started();
        let entries = session.skip(&mut ledger, t0()).unwrap();
        assert!(entries.is_empty());
        assert_eq!(session.state().phase_index(), Some(1));
    }

    #[test]
    fn skip_while_paused_records_time_before_pause() {
        let (mut session, mut ledger) = started();
        session.pause(&mut ledger, t0() + mins(10)).unwrap();
        let entries = session.skip(&mut ledger, t0() + mins(20)).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].start_time, t0());
        assert_eq!(entries[0].end_time, t0() + mins(10));
        assert_eq!(
            session.state(),
            SessionState::Running {
                phase_index: 1,
                phase_started_at: t0() + mins(20),
            }
        );
    }

    #[test]
    fn skip_wraps_from_last_phase() {
        let (mut session, mut ledger) = started();
        session.tick(&mut ledger, t0() + mins(55)).unwrap();
        assert_eq!(session.state().phase_index(), Some(3));
        session.skip(&mut ledger, t0() + mins(60)).unwrap();
        assert_eq!(session.state().phase_index(), Some(0));
    }

    #[test]
    fn stop_records_partial_phase_and_completes() {
        let (mut session, mut ledger) = started();
        let entries = session.stop(&mut ledger, t0() + mins(40)).unwrap();
        let lengths: Vec<i64> = entries.iter().map(|e| e.length().num_minutes()).collect();
        assert_eq!(lengths, vec![25, 5, 10]);
        assert!(session.is_completed());

        let err = session.tick(&mut ledger, t0() + mins(60)).unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidTransition {
                command: Command::Tick,
                state: "completed"
            }
        ));
        assert!(matches!(
            session.stop(&mut ledger, t0() + mins(60)).unwrap_err(),
            SessionError::InvalidTransition { .. }
        ));
    }

    #[test]
    fn stop_at_phase_boundary_records_no_empty_entry() {
        let (mut session, mut ledger) = started();
        let entries = session.stop(&mut ledger, t0() + mins(25)).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].length().num_minutes(), 25);
    }

    #[test]
    fn stop_while_paused_records_time_before_pause() {
        let (mut session, mut ledger) = started();
        session.pause(&mut ledger, t0() + mins(7)).unwrap();
        let entries = session.stop(&mut ledger, t0() + mins(30)).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].end_time, t0() + mins(7));
    }

    #[test]
    fn stop_from_idle_completes_without_entries() {
        let (mut session, mut ledger) = setup(pomodoro());
        assert!(session.stop(&mut ledger, t0()).unwrap().is_empty());
        assert!(session.is_completed());
    }

    #[test]
    fn start_rejects_invalid_splits() {
        let mut deleted = pomodoro();
        deleted.deleted = true;
        let mut empty = pomodoro();
        empty.phases.clear();
        let paused = TimeSplit {
            id: crate::PAUSED_SPLIT_ID,
            name: crate::PAUSED_SPLIT_NAME.to_string(),
            description: None,
            deleted: false,
            phases: vec![TimerPhase::new("_paused_", Duration::zero(), false).unwrap()],
        };

        for (split, reason) in [
            (deleted, "split is deleted"),
            (empty, "split has no phases"),
            (paused, "split has zero total length"),
        ] {
            let (mut session, _) = setup(split);
            let err = session.start(t0()).unwrap_err();
            assert!(
                matches!(err, SessionError::InvalidSplit { reason: r, .. } if r == reason),
                "expected {reason}, got {err}"
            );
            assert_eq!(session.state(), SessionState::Idle);
        }
    }

    #[test]
    fn start_twice_is_rejected() {
        let (mut session, _) = started();
        assert!(matches!(
            session.start(t0() + mins(1)).unwrap_err(),
            SessionError::InvalidTransition {
                command: Command::Start,
                ..
            }
        ));
    }

    #[test]
    fn commands_before_start_are_rejected() {
        let (mut session, mut ledger) = setup(pomodoro());
        assert!(session.tick(&mut ledger, t0()).is_err());
        assert!(session.pause(&mut ledger, t0()).is_err());
        assert!(session.skip(&mut ledger, t0()).is_err());
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn zero_length_phases_are_passed_over() {
        let split = TimeSplit {
            id: SplitId::new(2),
            name: "Blocks".to_string(),
            description: None,
            deleted: false,
            phases: vec![
                TimerPhase::work_minutes("Focus", 50).unwrap(),
                TimerPhase::new("Marker", Duration::zero(), false).unwrap(),
                TimerPhase::break_minutes("Rest", 10).unwrap(),
            ],
        };
        let (mut session, mut ledger) = setup(split);
        session.start(t0()).unwrap();
        let entries = session.tick(&mut ledger, t0() + mins(60)).unwrap();
        let work: Vec<bool> = entries.iter().map(|e| e.work).collect();
        assert_eq!(work, vec![true, false]);
        assert_eq!(entries[1].start_time, t0() + mins(50));
        assert_eq!(session.state().phase_index(), Some(0));
    }

    fn endless(phases: Vec<TimerPhase>) -> TimeSplit {
        TimeSplit {
            id: SplitId::new(3),
            name: "Endless".to_string(),
            description: None,
            deleted: false,
            phases,
        }
    }

    fn raw_phase(length_ms: i64) -> TimerPhase {
        TimerPhase {
            name: "Forever".to_string(),
            length_ms,
            work: true,
        }
    }

    #[test]
    fn phase_ending_past_time_range_keeps_running() {
        let (mut session, mut ledger) = setup(endless(vec![raw_phase(i64::MAX / 2)]));
        session.start(t0()).unwrap();

        assert!(session.tick(&mut ledger, t0() + mins(1)).unwrap().is_empty());
        assert!(session.tick(&mut ledger, t0() + mins(2)).unwrap().is_empty());
        assert_eq!(
            session.state(),
            SessionState::Running {
                phase_index: 0,
                phase_started_at: t0(),
            }
        );

        let entries = session.stop(&mut ledger, t0() + mins(3)).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].end_time, t0() + mins(3));
        assert_eq!(session.state(), SessionState::Completed);
    }

    #[test]
    fn overflowing_cycle_cannot_start() {
        let (mut session, _) = setup(endless(vec![raw_phase(i64::MAX), raw_phase(i64::MAX)]));
        let err = session.start(t0()).unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidSplit {
                reason: "split cycle is too long",
                ..
            }
        ));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn rejected_append_leaves_session_retryable() {
        let (mut session, mut ledger) = started();
        // Another group already holds the instant this session's phase ends at.
        let other = GroupId::new(2);
        ledger.add_group(other);
        ledger
            .append(TimesheetEntry::new(other, t0() + mins(20), t0() + mins(30), false).unwrap())
            .unwrap();

        let before = session.clone();
        let err = session.tick(&mut ledger, t0() + mins(31)).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Ledger(LedgerError::Conflict(ConflictKey::EndTime(_)))
        ));
        assert_eq!(session, before);
        assert_eq!(ledger.list_entries(GroupId::new(1), None).unwrap().len(), 0);
    }

    #[test]
    fn sub_millisecond_time_is_truncated() {
        let (mut session, mut ledger) = setup(pomodoro());
        let start = t0() + Duration::microseconds(1_500);
        session.start(start).unwrap();
        let entries = session.tick(&mut ledger, start + mins(25)).unwrap();
        assert_eq!(entries[0].start_time, t0() + Duration::milliseconds(1));
    }

    #[test]
    fn session_state_serializes_with_tag() {
        let (session, _) = started();
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["state"]["state"], "running");
        assert_eq!(json["state"]["phase_index"], 0);
        assert_eq!(json["skip_policy"], "record");
        let parsed: Session = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, session);
    }
}
