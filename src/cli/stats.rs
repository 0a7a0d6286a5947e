use anyhow::{Context, Result};
use serde::Serialize;

use tagstore::index::gpath::PathMap;
use tagstore::{DbKind, OpenMode, TagStore};

use super::Workspace;

#[derive(Debug, Serialize)]
struct KindStats {
    kind: DbKind,
    name: &'static str,
    version: i64,
    compact: bool,
    compressed: bool,
    records: usize,
    size_bytes: u64,
}

pub fn show_stats(ws: Workspace, format: String) -> Result<()> {
    let map = PathMap::open(&ws.dbpath, OpenMode::Read)
        .with_context(|| format!("cannot open GPATH in {}", ws.dbpath.display()))?;
    let files = map.paths()?.len();
    map.close()?;

    let mut kinds = Vec::new();
    for kind in [DbKind::Definitions, DbKind::References, DbKind::Symbols] {
        let path = kind.path_in(&ws.dbpath);
        if !path.is_file() {
            continue;
        }
        let store = TagStore::open(&ws.dbpath, Some(ws.root.as_path()), kind, OpenMode::Read)
            .with_context(|| format!("cannot open {}", kind.db_name()))?;
        kinds.push(KindStats {
            kind,
            name: kind.db_name(),
            version: store.version(),
            compact: store.format().compact,
            compressed: store.format().compressed,
            records: store.count()?,
            size_bytes: std::fs::metadata(&path)?.len(),
        });
        store.close()?;
    }

    if format == "json" {
        let out = serde_json::json!({
            "dbpath": ws.dbpath.display().to_string(),
            "files": files,
            "databases": kinds,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Database directory: {}", ws.dbpath.display());
    println!("Files: {}", files);
    for k in &kinds {
        let format = match (k.compact, k.compressed) {
            (true, _) => "compact",
            (false, true) => "standard, compressed",
            (false, false) => "standard",
        };
        println!(
            "  {:<7} {:>8} records  {:>10.2} KB  version {} ({})",
            k.name,
            k.records,
            k.size_bytes as f64 / 1024.0,
            k.version,
            format
        );
    }

    Ok(())
}
