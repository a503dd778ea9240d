//! Tag catalog commands: `lockin tags ...`.

use std::io::Write;

use anyhow::{Context, Result};
use lockin_core::TagId;
use lockin_db::Database;

pub fn list<W: Write>(
    writer: &mut W,
    db: &Database,
    include_deleted: bool,
    json: bool,
) -> Result<()> {
    let tags = db.list_tags(include_deleted)?;

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&tags)?)?;
        return Ok(());
    }

    if tags.is_empty() {
        writeln!(writer, "No tags.")?;
        return Ok(());
    }
    for tag in &tags {
        let deleted = if tag.deleted { " (deleted)" } else { "" };
        writeln!(writer, "{:>4}  {}{deleted}", tag.id, tag.tag)?;
    }
    Ok(())
}

pub fn create<W: Write>(writer: &mut W, db: &mut Database, label: &str) -> Result<()> {
    let tag = db.create_tag(label).context("failed to create tag")?;
    tracing::info!(tag = %tag.id, label = %tag.tag, "created tag");
    writeln!(writer, "Created tag {}: {}", tag.id, tag.tag)?;
    Ok(())
}

pub fn delete<W: Write>(writer: &mut W, db: &Database, id: TagId) -> Result<()> {
    db.soft_delete_tag(id)
        .with_context(|| format!("failed to delete tag {id}"))?;
    writeln!(writer, "Deleted tag {id}")?;
    Ok(())
}
