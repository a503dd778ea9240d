//! Time split catalog: split templates and their phases.

use lockin_core::{
    PAUSED_SPLIT_ID, SplitId, TimeSplit, TimerPhase, ValidationError, check_phase_length,
};
use rusqlite::{Connection, OptionalExtension, params};

use crate::{Database, DbError, Entity};

impl Database {
    /// Stores a new split template with its phases in order.
    ///
    /// Rejects an empty name, an empty phase list and phase lengths outside
    /// `0..=MAX_PHASE_MS`.
    pub fn create_time_split(
        &mut self,
        name: &str,
        description: Option<&str>,
        phases: &[TimerPhase],
    ) -> Result<TimeSplit, DbError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::Empty {
                field: "split name",
            }
            .into());
        }
        if phases.is_empty() {
            return Err(ValidationError::Empty { field: "phases" }.into());
        }
        for phase in phases {
            check_phase_length(phase.length_ms)?;
        }
        let description = description.map(str::trim).filter(|d| !d.is_empty());

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO time_split (name, description, deleted) VALUES (?1, ?2, FALSE)",
            params![name, description],
        )?;
        let id = SplitId::new(tx.last_insert_rowid());
        {
            let mut stmt = tx.prepare(
                "INSERT INTO time_split_timer (time_split_id, len, name, work)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for phase in phases {
                stmt.execute(params![id.get(), phase.length_ms, phase.name, phase.work])?;
            }
        }
        tx.commit()?;

        tracing::debug!(split = %id, phases = phases.len(), "created time split");
        Ok(TimeSplit {
            id,
            name: name.to_string(),
            description: description.map(str::to_string),
            deleted: false,
            phases: phases.to_vec(),
        })
    }

    /// Fetches a split that has not been soft-deleted.
    pub fn get_time_split(&self, id: SplitId) -> Result<TimeSplit, DbError> {
        let split = self.get_time_split_including_deleted(id)?;
        if split.deleted {
            return Err(DbError::not_found(Entity::TimeSplit, id.get()));
        }
        Ok(split)
    }

    /// Fetches a split regardless of its deleted flag.
    ///
    /// Historical groups keep pointing at splits deleted after they ran.
    pub fn get_time_split_including_deleted(&self, id: SplitId) -> Result<TimeSplit, DbError> {
        let row = self
            .conn
            .query_row(
                "SELECT name, description, deleted FROM time_split WHERE id = ?1",
                [id.get()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, bool>(2)?,
                    ))
                },
            )
            .optional()?;
        let Some((name, description, deleted)) = row else {
            return Err(DbError::not_found(Entity::TimeSplit, id.get()));
        };

        Ok(TimeSplit {
            id,
            name,
            description,
            deleted,
            phases: load_phases(&self.conn, id)?,
        })
    }

    /// Lists selectable splits ordered by ID.
    ///
    /// The reserved paused split is never included.
    pub fn list_time_splits(&self, include_deleted: bool) -> Result<Vec<TimeSplit>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, description, deleted FROM time_split
             WHERE id != ?1 AND (?2 OR deleted = FALSE)
             ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![PAUSED_SPLIT_ID.get(), include_deleted], |row| {
                Ok((
                    SplitId::new(row.get(0)?),
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, bool>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, name, description, deleted)| {
                Ok(TimeSplit {
                    id,
                    name,
                    description,
                    deleted,
                    phases: load_phases(&self.conn, id)?,
                })
            })
            .collect()
    }

    /// Marks a split as deleted. Deleting an already-deleted split is a no-op.
    ///
    /// The reserved paused split cannot be deleted; the call is ignored.
    pub fn soft_delete_time_split(&self, id: SplitId) -> Result<(), DbError> {
        if id == PAUSED_SPLIT_ID {
            tracing::debug!("ignoring delete of the reserved paused split");
            return Ok(());
        }
        let changed = self
            .conn
            .execute("UPDATE time_split SET deleted = TRUE WHERE id = ?1", [id.get()])?;
        if changed == 0 {
            return Err(DbError::not_found(Entity::TimeSplit, id.get()));
        }
        tracing::debug!(split = %id, "soft-deleted time split");
        Ok(())
    }

    pub(crate) fn time_split_exists(&self, id: SplitId) -> Result<bool, DbError> {
        let exists = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM time_split WHERE id = ?1 AND deleted = FALSE)",
            [id.get()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }
}

fn load_phases(conn: &Connection, id: SplitId) -> Result<Vec<TimerPhase>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT name, len, work FROM time_split_timer
         WHERE time_split_id = ?1
         ORDER BY rowid",
    )?;
    let phases = stmt
        .query_map([id.get()], |row| {
            Ok(TimerPhase {
                name: row.get(0)?,
                length_ms: row.get(1)?,
                work: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(phases)
}
