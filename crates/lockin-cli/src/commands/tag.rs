//! Tag index commands: `lockin tag ...`.

use std::io::Write;

use anyhow::{Context, Result};
use lockin_core::{GroupId, TagId};
use lockin_db::Database;

pub fn attach<W: Write>(writer: &mut W, db: &Database, group: GroupId, tag: TagId) -> Result<()> {
    let added = db
        .attach_tag(group, tag)
        .with_context(|| format!("failed to tag group {group}"))?;
    let label = db.get_tag(tag)?.tag;
    if added {
        writeln!(writer, "Tagged group {group} with '{label}'")?;
    } else {
        writeln!(writer, "Group {group} already tagged with '{label}'")?;
    }
    Ok(())
}

pub fn detach<W: Write>(writer: &mut W, db: &Database, group: GroupId, tag: TagId) -> Result<()> {
    let removed = db
        .detach_tag(group, tag)
        .with_context(|| format!("failed to untag group {group}"))?;
    let label = db.get_tag(tag)?.tag;
    if removed {
        writeln!(writer, "Removed '{label}' from group {group}")?;
    } else {
        writeln!(writer, "Group {group} was not tagged with '{label}'")?;
    }
    Ok(())
}

/// Lists the groups carrying a tag with the split each ran.
pub fn groups<W: Write>(writer: &mut W, db: &Database, tag: TagId) -> Result<()> {
    let label = db.get_tag(tag).context("failed to load tag")?.tag;
    let groups = db.groups_with_tag(tag)?;

    if groups.is_empty() {
        writeln!(writer, "No groups tagged '{label}'.")?;
        return Ok(());
    }

    writeln!(writer, "Groups tagged '{label}':")?;
    for group in groups {
        let split = db.get_time_split_including_deleted(group.time_split_id)?;
        writeln!(writer, "{:>6}  {}", group.id, split.name)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;
    use lockin_core::TimerPhase;

    fn setup() -> Database {
        let mut db = Database::open_in_memory().unwrap();
        let split = db
            .create_time_split(
                "Deep Work",
                None,
                &[TimerPhase::work_minutes("Focus", 50).unwrap()],
            )
            .unwrap();
        db.create_group(split.id).unwrap();
        db.create_group(split.id).unwrap();
        db.create_tag("client-a").unwrap();
        db
    }

    #[test]
    fn attach_detach_and_list_groups() {
        let db = setup();
        let tag = TagId::new(1);
        let mut output = Vec::new();
        attach(&mut output, &db, GroupId::new(2), tag).unwrap();
        attach(&mut output, &db, GroupId::new(2), tag).unwrap();
        attach(&mut output, &db, GroupId::new(1), tag).unwrap();
        groups(&mut output, &db, tag).unwrap();
        detach(&mut output, &db, GroupId::new(1), tag).unwrap();
        detach(&mut output, &db, GroupId::new(1), tag).unwrap();

        let output = String::from_utf8(output).unwrap();
        assert_snapshot!(output, @r"
        Tagged group 2 with 'client-a'
        Group 2 already tagged with 'client-a'
        Tagged group 1 with 'client-a'
        Groups tagged 'client-a':
             1  Deep Work
             2  Deep Work
        Removed 'client-a' from group 1
        Group 1 was not tagged with 'client-a'
        ");
    }

    #[test]
    fn unknown_group_is_an_error() {
        let db = setup();
        let mut output = Vec::new();
        let err = attach(&mut output, &db, GroupId::new(99), TagId::new(1)).unwrap_err();
        assert!(format!("{err:#}").contains("timesheet group 99 not found"));
    }

    #[test]
    fn tag_without_groups() {
        let db = setup();
        let mut output = Vec::new();
        groups(&mut output, &db, TagId::new(1)).unwrap();
        assert_snapshot!(String::from_utf8(output).unwrap(), @"No groups tagged 'client-a'.");
    }
}
