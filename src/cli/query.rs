use anyhow::{bail, Context, Result};

use tagstore::{DbKind, Entry, OpenMode, SearchFlags, TagStore};

use super::Workspace;

pub fn query_tags(
    ws: Workspace,
    kind: DbKind,
    pattern: Option<String>,
    flags: SearchFlags,
    format: String,
) -> Result<()> {
    if !matches!(format.as_str(), "text" | "json") {
        bail!("Unknown format: {}", format);
    }

    let mut store = TagStore::open(&ws.dbpath, Some(ws.root.as_path()), kind, OpenMode::Read)
        .with_context(|| format!("cannot open {} in {}", kind.db_name(), ws.dbpath.display()))?;

    let mut entries: Vec<Entry> = Vec::new();
    for entry in store.iter(pattern.as_deref(), flags) {
        let entry = entry.with_context(|| format!("reading {}", kind.db_name()))?;
        if format == "text" {
            println!("{}", entry);
        } else {
            entries.push(entry);
        }
    }

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    }
    store.close()?;

    Ok(())
}
