//! Core domain logic for the time-split timer.
//!
//! This crate contains the fundamental types and logic for:
//! - Time splits: ordered cycles of work/break phases
//! - Session engine: the state machine that runs a group through a split
//! - Ledger: the append-only contract finalized intervals are written to

pub mod engine;
pub mod ledger;
mod registry;
pub mod types;

pub use engine::{Command, Session, SessionError, SessionState, SkipPolicy, validate_split};
pub use ledger::{Ledger, LedgerError, MemoryLedger, SharedLedger, TimeRange};
pub use registry::SessionRegistry;
pub use types::{
    ConflictKey, GroupId, MAX_PHASE_MS, PAUSED_SPLIT_ID, PAUSED_SPLIT_NAME, SplitId, Tag, TagId,
    TimeSplit, TimerPhase, TimesheetEntry, TimesheetGroup, ValidationError, check_phase_length,
    truncate_to_millis, validate_tag_label,
};
