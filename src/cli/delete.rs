use anyhow::{Context, Result};
use tracing::{info, warn};

use tagstore::index::gpath::PathMap;
use tagstore::{DbKind, IdSet, OpenMode, TagStore};

use super::Workspace;

/// Remove the records of `paths` from every tag database that exists.
///
/// Paths are matched against GPATH as given, and with a leading `./` added.
pub fn delete_paths(ws: Workspace, paths: Vec<String>) -> Result<()> {
    let map = PathMap::open(&ws.dbpath, OpenMode::Read)
        .with_context(|| format!("cannot open GPATH in {}", ws.dbpath.display()))?;

    let mut ids = IdSet::new();
    for path in &paths {
        let dotted = if path.starts_with("./") {
            path.clone()
        } else {
            format!("./{}", path)
        };
        match map.path_to_id(path)?.or(map.path_to_id(&dotted)?) {
            Some(id) => {
                ids.insert(id);
            }
            None => warn!("{} is not in GPATH", path),
        }
    }
    map.close()?;

    if ids.is_empty() {
        println!("Nothing to delete");
        return Ok(());
    }

    for kind in [DbKind::Definitions, DbKind::References, DbKind::Symbols] {
        if !kind.path_in(&ws.dbpath).is_file() {
            continue;
        }
        let mut store = TagStore::open(&ws.dbpath, Some(ws.root.as_path()), kind, OpenMode::Modify)
            .with_context(|| format!("cannot open {}", kind.db_name()))?;
        let removed = store.delete(&ids)?;
        store.close()?;
        info!("{}: {} records removed", kind.db_name(), removed);
        println!("{:<7} {} records removed", kind.db_name(), removed);
    }

    Ok(())
}
