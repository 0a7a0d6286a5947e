use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use tracing::{info, warn};

use tagstore::tags::record::split_fields;
use tagstore::{DbKind, OpenMode, TagStore, WriteFlags};

use super::Workspace;

/// Feed `ctags -x` lines into the `kind` database.
///
/// Lines of one file must be contiguous for the compact databases.
pub fn load_tags(
    ws: Workspace,
    kind: DbKind,
    input: Option<PathBuf>,
    append: bool,
    flags: WriteFlags,
) -> Result<()> {
    std::fs::create_dir_all(&ws.dbpath)
        .with_context(|| format!("cannot create {}", ws.dbpath.display()))?;

    let reader: Box<dyn BufRead> = match &input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("cannot open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let mut store = if append {
        TagStore::open(&ws.dbpath, Some(ws.root.as_path()), kind, OpenMode::Modify)
    } else {
        TagStore::create(
            &ws.dbpath,
            Some(ws.root.as_path()),
            kind,
            Some(ws.config.tags.abbreviation.as_str()),
        )
    }
    .with_context(|| format!("cannot open {}", kind.db_name()))?;
    store.set_write_flags(flags);

    let mut loaded = 0usize;
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let tag = match split_fields(&line, 2).first() {
            Some(tag) => tag.to_string(),
            None => {
                warn!("line {}: no tag", n + 1);
                continue;
            }
        };
        store
            .put(&tag, &line)
            .with_context(|| format!("line {}", n + 1))?;
        loaded += 1;
    }
    store.close()?;

    info!("Loaded {} tags into {}", loaded, kind.db_name());
    println!("{} tags loaded into {}", loaded, kind.db_name());
    Ok(())
}
