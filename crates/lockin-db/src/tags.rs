//! Tag catalog and the tag index linking tags to timesheet groups.

use lockin_core::{ConflictKey, GroupId, SplitId, Tag, TagId, TimesheetGroup, validate_tag_label};
use rusqlite::{ErrorCode, OptionalExtension, params};

use crate::{Database, DbError, Entity};

impl Database {
    /// Creates a tag. Labels are trimmed and compared case-sensitively.
    ///
    /// A label already in use, even by a deleted tag, is a conflict.
    pub fn create_tag(&mut self, label: &str) -> Result<Tag, DbError> {
        let label = validate_tag_label(label)?;
        if self.find_tag(label)?.is_some() {
            return Err(DbError::Conflict(ConflictKey::TagLabel(label.to_string())));
        }
        // A concurrent writer can take the label between the lookup and here.
        self.conn
            .execute("INSERT INTO tag (tag, deleted) VALUES (?1, FALSE)", [label])
            .map_err(|err| match err.sqlite_error_code() {
                Some(ErrorCode::ConstraintViolation) => {
                    DbError::Conflict(ConflictKey::TagLabel(label.to_string()))
                }
                _ => err.into(),
            })?;
        let tag = Tag {
            id: TagId::new(self.conn.last_insert_rowid()),
            tag: label.to_string(),
            deleted: false,
        };
        tracing::debug!(tag = %tag.id, label, "created tag");
        Ok(tag)
    }

    /// Fetches a tag by ID, including deleted ones.
    pub fn get_tag(&self, id: TagId) -> Result<Tag, DbError> {
        self.conn
            .query_row(
                "SELECT id, tag, deleted FROM tag WHERE id = ?1",
                [id.get()],
                tag_row,
            )
            .optional()?
            .ok_or_else(|| DbError::not_found(Entity::Tag, id.get()))
    }

    /// Looks a tag up by its exact label.
    pub fn find_tag(&self, label: &str) -> Result<Option<Tag>, DbError> {
        let tag = self
            .conn
            .query_row(
                "SELECT id, tag, deleted FROM tag WHERE tag = ?1",
                [label.trim()],
                tag_row,
            )
            .optional()?;
        Ok(tag)
    }

    /// Lists tags ordered by label.
    pub fn list_tags(&self, include_deleted: bool) -> Result<Vec<Tag>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, tag, deleted FROM tag
             WHERE ?1 OR deleted = FALSE
             ORDER BY tag",
        )?;
        let tags = stmt
            .query_map([include_deleted], tag_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tags)
    }

    /// Marks a tag as deleted. Existing associations are kept.
    pub fn soft_delete_tag(&self, id: TagId) -> Result<(), DbError> {
        let changed = self
            .conn
            .execute("UPDATE tag SET deleted = TRUE WHERE id = ?1", [id.get()])?;
        if changed == 0 {
            return Err(DbError::not_found(Entity::Tag, id.get()));
        }
        tracing::debug!(tag = %id, "soft-deleted tag");
        Ok(())
    }

    /// Attaches a tag to a group. Returns `false` if it was already attached.
    pub fn attach_tag(&self, group: GroupId, tag: TagId) -> Result<bool, DbError> {
        self.require_link_targets(group, tag)?;
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO timesheet_tag (timesheet_group, tag_id) VALUES (?1, ?2)",
            params![group.get(), tag.get()],
        )?;
        Ok(inserted > 0)
    }

    /// Detaches a tag from a group. Returns `false` if it was not attached.
    pub fn detach_tag(&self, group: GroupId, tag: TagId) -> Result<bool, DbError> {
        self.require_link_targets(group, tag)?;
        let removed = self.conn.execute(
            "DELETE FROM timesheet_tag WHERE timesheet_group = ?1 AND tag_id = ?2",
            params![group.get(), tag.get()],
        )?;
        Ok(removed > 0)
    }

    /// Tags attached to a group, ordered by label.
    pub fn tags_for_group(&self, group: GroupId) -> Result<Vec<Tag>, DbError> {
        if !self.group_exists(group)? {
            return Err(DbError::not_found(Entity::TimesheetGroup, group.get()));
        }
        let mut stmt = self.conn.prepare(
            "SELECT t.id, t.tag, t.deleted FROM tag t
             JOIN timesheet_tag tt ON tt.tag_id = t.id
             WHERE tt.timesheet_group = ?1
             ORDER BY t.tag",
        )?;
        let tags = stmt
            .query_map([group.get()], tag_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tags)
    }

    /// Groups carrying a tag, ordered by group ID.
    pub fn groups_with_tag(&self, tag: TagId) -> Result<Vec<TimesheetGroup>, DbError> {
        self.get_tag(tag)?;
        let mut stmt = self.conn.prepare(
            "SELECT g.timesheet_group, g.time_split_id FROM timesheet_group g
             JOIN timesheet_tag tt ON tt.timesheet_group = g.timesheet_group
             WHERE tt.tag_id = ?1
             ORDER BY g.timesheet_group",
        )?;
        let groups = stmt
            .query_map([tag.get()], |row| {
                Ok(TimesheetGroup {
                    id: GroupId::new(row.get(0)?),
                    time_split_id: SplitId::new(row.get(1)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(groups)
    }

    fn require_link_targets(&self, group: GroupId, tag: TagId) -> Result<(), DbError> {
        if !self.group_exists(group)? {
            return Err(DbError::not_found(Entity::TimesheetGroup, group.get()));
        }
        self.get_tag(tag)?;
        Ok(())
    }
}

fn tag_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: TagId::new(row.get(0)?),
        tag: row.get(1)?,
        deleted: row.get(2)?,
    })
}
