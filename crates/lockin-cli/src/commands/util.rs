//! Shared utilities for CLI commands.

use std::sync::LazyLock;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use lockin_core::TimerPhase;
use regex::Regex;

/// Pre-compiled regex for relative time parsing.
static RELATIVE_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\s+(second|minute|hour|day|week)s?\s+ago$").expect("valid regex")
});

/// Phase durations such as `25m`, `1h30m`, `90s` or a bare minute count.
static PHASE_DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(\d+)h)?(?:(\d+)m)?(?:(\d+)s)?$").expect("valid regex")
});

/// Conservative bounds for relative time parsing (~1000 years in seconds).
const MAX_RELATIVE_SECONDS: i64 = 1000 * 365 * 24 * 60 * 60;

/// Parse a datetime string as either ISO 8601 or relative time.
///
/// Supports:
/// - ISO 8601: "2026-01-15T10:30:00Z"
/// - Relative: "2 hours ago", "30 minutes ago", "1 day ago", "1 week ago"
pub fn parse_datetime(s: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    let Some(caps) = RELATIVE_TIME_RE.captures(s.trim()) else {
        anyhow::bail!(
            "Invalid datetime: {s}. Use ISO 8601 (e.g., 2026-01-15T10:30:00Z) or relative (e.g., '5 minutes ago')"
        );
    };

    let n: i64 = caps[1]
        .parse()
        .context("failed to parse number in relative time")?;

    let seconds_per_unit = match &caps[2] {
        "second" => 1,
        "minute" => 60,
        "hour" => 60 * 60,
        "day" => 60 * 60 * 24,
        "week" => 60 * 60 * 24 * 7,
        unit => anyhow::bail!("Unknown time unit: {unit}"),
    };

    if n > MAX_RELATIVE_SECONDS / seconds_per_unit {
        anyhow::bail!("Relative time value too large: {n} {}", &caps[2]);
    }

    Ok(Utc::now() - Duration::seconds(n * seconds_per_unit))
}

/// Resolves an optional `--at` argument, defaulting to the current time.
pub fn parse_at(at: Option<&str>) -> anyhow::Result<DateTime<Utc>> {
    at.map_or_else(|| Ok(Utc::now()), parse_datetime)
}

/// Parse a phase length like `25m`, `1h30m`, `45s` or `25` (minutes).
pub fn parse_phase_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim();
    if let Ok(minutes) = s.parse::<i64>() {
        return Duration::try_minutes(minutes)
            .with_context(|| format!("duration out of range: {s}"));
    }

    let caps = PHASE_DURATION_RE
        .captures(s)
        .filter(|_| !s.is_empty())
        .with_context(|| format!("Invalid duration: {s}. Use e.g. 25m, 1h30m or 90s"))?;

    let part = |index: usize| -> anyhow::Result<i64> {
        caps.get(index).map_or(Ok(0), |m| {
            m.as_str()
                .parse::<i64>()
                .with_context(|| format!("duration out of range: {s}"))
        })
    };
    let (hours, minutes, seconds) = (part(1)?, part(2)?, part(3)?);
    hours
        .checked_mul(3600)
        .and_then(|total| total.checked_add(minutes.checked_mul(60)?))
        .and_then(|total| total.checked_add(seconds))
        .and_then(Duration::try_seconds)
        .with_context(|| format!("duration out of range: {s}"))
}

/// Parse a `NAME=DURATION[:work|:break]` phase argument.
///
/// Phases are work phases unless marked `:break`.
pub fn parse_phase(s: &str) -> anyhow::Result<TimerPhase> {
    let (name, rest) = s
        .split_once('=')
        .with_context(|| format!("Invalid phase: {s}. Use NAME=DURATION[:work|:break]"))?;

    let (duration, work) = match rest.rsplit_once(':') {
        Some((duration, "work")) => (duration, true),
        Some((duration, "break")) => (duration, false),
        Some((_, kind)) => anyhow::bail!("Unknown phase kind: {kind}. Use work or break"),
        None => (rest, true),
    };

    let length = parse_phase_duration(duration)?;
    TimerPhase::new(name.trim(), length, work).with_context(|| format!("Invalid phase: {s}"))
}

/// Formats a millisecond count as hours and minutes.
pub fn format_duration(ms: i64) -> String {
    if ms < 0 {
        return "0m".to_string();
    }
    let total_minutes = ms / 60_000;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;

    if hours >= 1 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// Formats a timestamp for human-readable output.
pub fn format_time(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}
