//! Active sessions keyed by timesheet group.
//!
//! Each session sits behind its own mutex, so at most one command runs per
//! group while different groups proceed in parallel. The shared ledger is
//! locked only for the duration of each append batch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};

use crate::engine::{Session, SessionError};
use crate::ledger::{Ledger, SharedLedger};
use crate::types::{GroupId, TimesheetEntry};

type SessionSlot = Arc<Mutex<Session>>;

/// Registry of in-flight sessions sharing one ledger.
pub struct SessionRegistry<L> {
    ledger: SharedLedger<L>,
    sessions: Mutex<HashMap<GroupId, SessionSlot>>,
}

impl<L: Ledger> SessionRegistry<L> {
    pub fn new(ledger: SharedLedger<L>) -> Self {
        Self {
            ledger,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub const fn ledger(&self) -> &SharedLedger<L> {
        &self.ledger
    }

    /// Adds a session, replacing any previous one for the same group.
    pub fn insert(&self, session: Session) -> Option<Session> {
        let group = session.group();
        let previous = self
            .lock_sessions()
            .insert(group, Arc::new(Mutex::new(session)));
        previous.map(|slot| lock(&slot).clone())
    }

    /// Removes and returns a group's session.
    pub fn remove(&self, group: GroupId) -> Option<Session> {
        let slot = self.lock_sessions().remove(&group)?;
        let session = lock(&slot).clone();
        Some(session)
    }

    /// Groups with a registered session, in ascending order.
    pub fn groups(&self) -> Vec<GroupId> {
        let mut groups: Vec<GroupId> = self.lock_sessions().keys().copied().collect();
        groups.sort_unstable();
        groups
    }

    /// A copy of a group's current session.
    pub fn snapshot(&self, group: GroupId) -> Result<Session, SessionError> {
        let slot = self.slot(group)?;
        let session = lock(&slot).clone();
        Ok(session)
    }

    pub fn start(&self, group: GroupId, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.command(group, |session, _| session.start(now))
    }

    pub fn tick(
        &self,
        group: GroupId,
        now: DateTime<Utc>,
    ) -> Result<Vec<TimesheetEntry>, SessionError> {
        self.command(group, |session, ledger| session.tick(ledger, now))
    }

    pub fn pause(
        &self,
        group: GroupId,
        now: DateTime<Utc>,
    ) -> Result<Vec<TimesheetEntry>, SessionError> {
        self.command(group, |session, ledger| session.pause(ledger, now))
    }

    pub fn resume(&self, group: GroupId, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.command(group, |session, _| session.resume(now))
    }

    pub fn skip(
        &self,
        group: GroupId,
        now: DateTime<Utc>,
    ) -> Result<Vec<TimesheetEntry>, SessionError> {
        self.command(group, |session, ledger| session.skip(ledger, now))
    }

    /// Stops a group's session. The completed session stays registered until
    /// removed so its final state can still be inspected.
    pub fn stop(
        &self,
        group: GroupId,
        now: DateTime<Utc>,
    ) -> Result<Vec<TimesheetEntry>, SessionError> {
        self.command(group, |session, ledger| session.stop(ledger, now))
    }

    /// Ticks every running session, collecting per-group outcomes.
    pub fn tick_all(
        &self,
        now: DateTime<Utc>,
    ) -> Vec<(GroupId, Result<Vec<TimesheetEntry>, SessionError>)> {
        self.groups()
            .into_iter()
            .filter(|group| {
                self.snapshot(*group)
                    .is_ok_and(|session| session.state().phase_index().is_some())
            })
            .map(|group| (group, self.tick(group, now)))
            .collect()
    }

    /// Runs one command against a group's session under that group's lock.
    fn command<T>(
        &self,
        group: GroupId,
        f: impl FnOnce(&mut Session, &mut SharedLedger<L>) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        let slot = self.slot(group)?;
        let mut session = lock(&slot);
        let mut ledger = self.ledger.clone();
        f(&mut session, &mut ledger)
    }

    fn slot(&self, group: GroupId) -> Result<SessionSlot, SessionError> {
        self.lock_sessions()
            .get(&group)
            .cloned()
            .ok_or(SessionError::NotFound(group))
    }

    fn lock_sessions(&self) -> std::sync::MutexGuard<'_, HashMap<GroupId, SessionSlot>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn lock(slot: &Mutex<Session>) -> std::sync::MutexGuard<'_, Session> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}
