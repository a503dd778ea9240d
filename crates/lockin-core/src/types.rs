//! Core type definitions with validation.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// A phase length was negative.
    #[error("phase length must be non-negative, got {value_ms} ms")]
    NegativeLength { value_ms: i64 },

    /// A phase length exceeded [`MAX_PHASE_MS`].
    #[error("phase length must be at most {max_ms} ms, got {value_ms} ms")]
    TooLong { value_ms: i64, max_ms: i64 },

    /// An interval did not end strictly after it started.
    #[error("interval must end after it starts: {start} .. {end}")]
    EmptyInterval {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// Generates an integer ID newtype with common trait implementations.
macro_rules! define_int_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw database identifier.
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Returns the raw identifier.
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map(Self)
            }
        }
    };
}

define_int_id!(
    /// Identifier of a [`TimeSplit`] template.
    SplitId
);

define_int_id!(
    /// Identifier of a [`TimesheetGroup`], i.e. one session run.
    GroupId
);

define_int_id!(
    /// Identifier of a [`Tag`].
    TagId
);

/// The reserved split representing "no active split".
///
/// It holds a single zero-length break phase and is never offered for selection.
pub const PAUSED_SPLIT_ID: SplitId = SplitId::new(0);

/// Name of the reserved paused split and of its only phase.
pub const PAUSED_SPLIT_NAME: &str = "_paused_";

/// Longest accepted phase: one week.
pub const MAX_PHASE_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// Checks that a phase length lies in `0..=MAX_PHASE_MS`.
pub const fn check_phase_length(length_ms: i64) -> Result<i64, ValidationError> {
    if length_ms < 0 {
        return Err(ValidationError::NegativeLength {
            value_ms: length_ms,
        });
    }
    if length_ms > MAX_PHASE_MS {
        return Err(ValidationError::TooLong {
            value_ms: length_ms,
            max_ms: MAX_PHASE_MS,
        });
    }
    Ok(length_ms)
}

/// Truncates a timestamp to millisecond precision.
///
/// Entries are stored with millisecond resolution, so every timestamp entering
/// the engine or the ledger goes through here first.
pub fn truncate_to_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at)
}

/// One named, timed segment of a [`TimeSplit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerPhase {
    pub name: String,
    /// Phase length in milliseconds.
    pub length_ms: i64,
    /// `true` for productive time, `false` for a break.
    pub work: bool,
}

impl TimerPhase {
    /// Creates a phase after validation.
    pub fn new(
        name: impl Into<String>,
        length: Duration,
        work: bool,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::Empty {
                field: "phase name",
            });
        }
        let length_ms = check_phase_length(length.num_milliseconds())?;
        Ok(Self {
            name,
            length_ms,
            work,
        })
    }

    /// Shorthand for a work phase of `minutes` minutes.
    pub fn work_minutes(name: impl Into<String>, minutes: i64) -> Result<Self, ValidationError> {
        Self::new(name, minutes_or_max(minutes), true)
    }

    /// Shorthand for a break phase of `minutes` minutes.
    pub fn break_minutes(name: impl Into<String>, minutes: i64) -> Result<Self, ValidationError> {
        Self::new(name, minutes_or_max(minutes), false)
    }
}

fn minutes_or_max(minutes: i64) -> Duration {
    Duration::try_minutes(minutes).unwrap_or(if minutes < 0 {
        Duration::MIN
    } else {
        Duration::MAX
    })
}

/// A named, reusable template defining an ordered cycle of phases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSplit {
    pub id: SplitId,
    pub name: String,
    pub description: Option<String>,
    pub deleted: bool,
    /// Phases in the order they run.
    pub phases: Vec<TimerPhase>,
}

impl TimeSplit {
    /// Total length of one full cycle through the phases, in milliseconds.
    ///
    /// `None` if the sum does not fit in an `i64`.
    pub fn cycle_length_ms(&self) -> Option<i64> {
        self.phases
            .iter()
            .try_fold(0_i64, |total, phase| total.checked_add(phase.length_ms))
    }
}

/// A user-defined label attachable to sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub tag: String,
    pub deleted: bool,
}

/// Validates a tag label, returning it trimmed.
pub fn validate_tag_label(label: &str) -> Result<&str, ValidationError> {
    let label = label.trim();
    if label.is_empty() {
        return Err(ValidationError::Empty { field: "tag" });
    }
    Ok(label)
}

/// One run of a [`TimeSplit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimesheetGroup {
    pub id: GroupId,
    pub time_split_id: SplitId,
}

/// One immutable, finalized interval produced by running a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimesheetEntry {
    pub group: GroupId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub work: bool,
}

impl TimesheetEntry {
    /// Creates an entry, truncating both ends to milliseconds.
    ///
    /// Fails unless `end_time > start_time` after truncation.
    pub fn new(
        group: GroupId,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        work: bool,
    ) -> Result<Self, ValidationError> {
        let start_time = truncate_to_millis(start_time);
        let end_time = truncate_to_millis(end_time);
        if end_time <= start_time {
            return Err(ValidationError::EmptyInterval {
                start: start_time,
                end: end_time,
            });
        }
        Ok(Self {
            group,
            start_time,
            end_time,
            work,
        })
    }

    pub fn length(&self) -> Duration {
        self.end_time - self.start_time
    }

    pub fn length_ms(&self) -> i64 {
        self.length().num_milliseconds()
    }

    /// Whether the half-open intervals `[start, end)` of both entries intersect.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start_time < other.end_time && other.start_time < self.end_time
    }
}

/// Which unique key a rejected write collided with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictKey {
    TagLabel(String),
    StartTime(DateTime<Utc>),
    EndTime(DateTime<Utc>),
}

impl fmt::Display for ConflictKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TagLabel(label) => write!(f, "tag {label:?} already exists"),
            Self::StartTime(at) => write!(f, "an entry already starts at {at}"),
            Self::EndTime(at) => write!(f, "an entry already ends at {at}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn phase_rejects_blank_name() {
        assert_eq!(
            TimerPhase::work_minutes("  ", 25).unwrap_err(),
            ValidationError::Empty {
                field: "phase name"
            }
        );
    }

    #[test]
    fn phase_rejects_negative_length() {
        let err = TimerPhase::new("Work", Duration::seconds(-1), true).unwrap_err();
        assert_eq!(err, ValidationError::NegativeLength { value_ms: -1000 });
    }

    #[test]
    fn phase_allows_zero_length() {
        let phase = TimerPhase::new("_paused_", Duration::zero(), false).unwrap();
        assert_eq!(phase.length_ms, 0);
    }

    #[test]
    fn entry_requires_positive_length() {
        let t = at("2025-01-01T09:00:00Z");
        assert!(TimesheetEntry::new(GroupId::new(1), t, t, true).is_err());
        assert!(TimesheetEntry::new(GroupId::new(1), t, t - Duration::seconds(1), true).is_err());
    }

    #[test]
    fn entry_truncates_to_millis() {
        let start = at("2025-01-01T09:00:00.123456Z");
        let end = at("2025-01-01T09:25:00.999999Z");
        let entry = TimesheetEntry::new(GroupId::new(1), start, end, true).unwrap();
        assert_eq!(entry.start_time, at("2025-01-01T09:00:00.123Z"));
        assert_eq!(entry.end_time, at("2025-01-01T09:25:00.999Z"));
    }

    #[test]
    fn sub_millisecond_entry_is_empty_after_truncation() {
        let start = at("2025-01-01T09:00:00.000100Z");
        let end = at("2025-01-01T09:00:00.000900Z");
        assert!(TimesheetEntry::new(GroupId::new(1), start, end, true).is_err());
    }

    #[test]
    fn touching_entries_do_not_overlap() {
        let g = GroupId::new(1);
        let entry = |start: &str, end: &str, work| {
            TimesheetEntry::new(g, at(start), at(end), work).unwrap()
        };
        let a = entry("2025-01-01T09:00:00Z", "2025-01-01T09:25:00Z", true);
        let b = entry("2025-01-01T09:25:00Z", "2025-01-01T09:30:00Z", false);
        let c = entry("2025-01-01T09:10:00Z", "2025-01-01T09:26:00Z", true);
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(c.overlaps(&b));
    }

    #[test]
    fn cycle_length_sums_phases() {
        let split = TimeSplit {
            id: SplitId::new(1),
            name: "Pomodoro".to_string(),
            description: None,
            deleted: false,
            phases: vec![
                TimerPhase::work_minutes("Work", 25).unwrap(),
                TimerPhase::break_minutes("Break", 5).unwrap(),
            ],
        };
        assert_eq!(split.cycle_length_ms(), Some(30 * 60_000));
    }

    #[test]
    fn cycle_length_overflow_is_none() {
        let huge = TimerPhase {
            name: "Forever".to_string(),
            length_ms: i64::MAX,
            work: true,
        };
        let split = TimeSplit {
            id: SplitId::new(1),
            name: "Huge".to_string(),
            description: None,
            deleted: false,
            phases: vec![huge.clone(), huge],
        };
        assert_eq!(split.cycle_length_ms(), None);
    }

    #[test]
    fn phase_rejects_length_over_a_week() {
        assert!(TimerPhase::new("Week", Duration::milliseconds(MAX_PHASE_MS), true).is_ok());
        let err = TimerPhase::new("Long", Duration::milliseconds(MAX_PHASE_MS + 1), true)
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::TooLong {
                value_ms: MAX_PHASE_MS + 1,
                max_ms: MAX_PHASE_MS,
            }
        );
        assert!(matches!(
            TimerPhase::work_minutes("Huge", i64::MAX).unwrap_err(),
            ValidationError::TooLong { .. }
        ));
    }

    #[test]
    fn tag_label_is_trimmed() {
        assert_eq!(validate_tag_label("  deep work ").unwrap(), "deep work");
        assert!(validate_tag_label("   ").is_err());
    }

    #[test]
    fn ids_serialize_transparently() {
        let json = serde_json::to_string(&GroupId::new(42)).unwrap();
        assert_eq!(json, "42");
        let parsed: GroupId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, GroupId::new(42));
        assert_eq!("7".parse::<TagId>().unwrap(), TagId::new(7));
    }

    #[test]
    fn ids_honor_format_width() {
        assert_eq!(format!("{:>4}|{:<3}|", SplitId::new(7), GroupId::new(12)), "   7|12 |");
    }
}
