// Tag database build: enumerate, tokenize, write GPATH/GTAGS/GRTAGS/GSYMS

pub mod parser;

use indicatif::ProgressBar;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Result, TagError};
use crate::find::SourceFile;
use crate::index::gpath::PathMap;
use crate::index::{DbKind, OpenMode};
use crate::tags::TagStore;

use parser::{parse_c, Occurrence, OccurrenceKind};

/// Counts reported at the end of a build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    pub files: usize,
    pub sources: usize,
    pub definitions: usize,
    pub references: usize,
    pub symbols: usize,
}

/// Builds the tag databases of one source tree.
pub struct Indexer {
    root: PathBuf,
    dbpath: PathBuf,
    config: Config,
}

impl Indexer {
    pub fn new(root: impl AsRef<Path>, dbpath: impl AsRef<Path>, config: Config) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            dbpath: dbpath.as_ref().to_path_buf(),
            config,
        }
    }

    /// Rebuild every database from `files`.
    ///
    /// Pass 1 registers all paths and writes definitions; pass 2 writes the
    /// other occurrences of names to the references database when a
    /// definition exists for them, and to the symbols database otherwise.
    pub fn build(&self, files: &[SourceFile], progress: &ProgressBar) -> Result<BuildStats> {
        let mut stats = BuildStats {
            files: files.len(),
            sources: files.iter().filter(|f| f.is_source).count(),
            ..BuildStats::default()
        };
        progress.set_length(2 * stats.sources as u64);

        PathMap::open(&self.dbpath, OpenMode::Create)?.close()?;

        // Pass 1
        let mut defs = TagStore::create(
            &self.dbpath,
            Some(self.root.as_path()),
            DbKind::Definitions,
            Some(self.config.tags.abbreviation.as_str()),
        )?;
        defs.set_write_flags(self.config.write_flags());
        let mut defined: HashSet<String> = HashSet::new();

        for file in files {
            defs.paths().get_or_insert(&file.path)?;
            if !file.is_source {
                continue;
            }
            progress.set_message(file.path.clone());
            for occurrence in self.occurrences(file) {
                if occurrence.kind != OccurrenceKind::Definition {
                    continue;
                }
                if put(&mut defs, &occurrence, &file.path)? {
                    defined.insert(occurrence.tag);
                    stats.definitions += 1;
                }
            }
            progress.inc(1);
        }
        defs.close()?;
        info!("Pass 1: {} definitions in {} files", stats.definitions, stats.sources);

        // Pass 2
        let mut refs = TagStore::create(&self.dbpath, Some(self.root.as_path()), DbKind::References, None)?;
        let mut syms = TagStore::create(&self.dbpath, Some(self.root.as_path()), DbKind::Symbols, None)?;
        refs.set_write_flags(self.config.write_flags());
        syms.set_write_flags(self.config.write_flags());

        for file in files.iter().filter(|f| f.is_source) {
            progress.set_message(file.path.clone());
            for occurrence in self.occurrences(file) {
                if occurrence.kind != OccurrenceKind::Other {
                    continue;
                }
                if defined.contains(&occurrence.tag) {
                    if put(&mut refs, &occurrence, &file.path)? {
                        stats.references += 1;
                    }
                } else if put(&mut syms, &occurrence, &file.path)? {
                    stats.symbols += 1;
                }
            }
            progress.inc(1);
        }
        refs.close()?;
        syms.close()?;
        info!(
            "Pass 2: {} references, {} other symbols",
            stats.references, stats.symbols
        );

        Ok(stats)
    }

    fn occurrences(&self, file: &SourceFile) -> Vec<Occurrence> {
        let full = self.root.join(file.path.strip_prefix("./").unwrap_or(&file.path));
        match std::fs::read(&full) {
            Ok(content) => {
                let found = parse_c(&content);
                debug!("{}: {} tag candidates", file.path, found.len());
                found
            }
            Err(e) => {
                warn!("Cannot read {}: {}", full.display(), e);
                Vec::new()
            }
        }
    }
}

/// Store one occurrence. Names too long to be tags are skipped.
fn put(store: &mut TagStore, occurrence: &Occurrence, path: &str) -> Result<bool> {
    match store.put(&occurrence.tag, &occurrence.tag_line(path)) {
        Ok(()) => Ok(true),
        Err(TagError::TagTooLong { len, .. }) => {
            warn!("{}:{}: tag of {} bytes skipped", path, occurrence.line, len);
            Ok(false)
        }
        Err(e) => Err(e),
    }
}
