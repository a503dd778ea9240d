//! Status command for showing storage locations and active sessions.

use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, Utc};
use lockin_db::Database;

use super::session::describe;
use super::util::format_duration;
use crate::Config;
use crate::state::SessionStore;

pub fn run<W: Write>(
    writer: &mut W,
    config: &Config,
    db: &Database,
    store: &SessionStore,
    now: DateTime<Utc>,
) -> Result<()> {
    writeln!(writer, "Lockin status")?;
    writeln!(writer, "Database: {}", config.database_path.display())?;
    writeln!(writer, "Sessions: {}", config.state_path.display())?;
    writeln!(writer, "Skip policy: {}", config.skip_policy)?;

    let sessions = store.sessions();
    if sessions.is_empty() {
        writeln!(writer, "No active sessions.")?;
        return Ok(());
    }

    writeln!(writer, "Active sessions:")?;
    for session in sessions {
        let worked = db.group_summary(session.group())?.work_ms;
        writeln!(
            writer,
            "- {} [{}], {} worked",
            describe(session, now),
            session.split().name,
            format_duration(worked)
        )?;
    }
    Ok(())
}
