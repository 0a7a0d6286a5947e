// Tag store: open/close, put/delete and first/next over one tag database

pub mod compress;
pub mod pool;
pub mod record;
pub mod search;

#[cfg(test)]
mod tests;

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{Result, TagError};
use crate::index::db::{OrderedStore, Scan};
use crate::index::gpath::PathMap;
use crate::index::{DbKind, OpenMode};

use compress::{Abbreviation, DEFAULT_ABBREVIATION};
use pool::CompactPool;
use record::{encode_standard, next_line_number, split_standard, StoredHead, TagLine, IDENT_LEN};

pub use record::{Entry, TagRecord};
pub use search::SearchFlags;

/// The only format version this engine reads and writes
pub const FORMAT_VERSION: i64 = 4;

const COMPACT_KEY: &str = "compact";
const COMPRESS_KEY: &str = "compress";

/// Set of file ids, as passed to `TagStore::delete`
pub type IdSet = HashSet<u32>;

/// Record format of a database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Format {
    /// Line numbers of one (file, tag) pair are stored as one list
    pub compact: bool,
    /// Line text goes through the abbreviation codec
    pub compressed: bool,
}

impl Format {
    /// Format given to a freshly created database of `kind`
    pub fn for_kind(kind: DbKind) -> Self {
        match kind {
            DbKind::Definitions => Format {
                compact: false,
                compressed: true,
            },
            DbKind::PathIndex | DbKind::References | DbKind::Symbols => Format {
                compact: true,
                compressed: false,
            },
        }
    }
}

/// Options for compact writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteFlags {
    /// Drop repeated line numbers of a tag within a file
    pub unique: bool,
    /// Store `Class::method` under the key `method`
    pub extract_method: bool,
}

/// Source file used to recover line text for compact records.
struct SourceReader {
    path: String,
    file: Option<BufReader<File>>,
    /// Last line number read, 0 before the first read
    line: u32,
    text: String,
    lines_read: u64,
}

impl SourceReader {
    fn open(path: &str, full: &Path) -> Self {
        let file = match File::open(full) {
            Ok(file) => Some(BufReader::new(file)),
            Err(e) => {
                warn!("source file '{}' is not available: {}", full.display(), e);
                None
            }
        };
        Self {
            path: path.to_string(),
            file,
            line: 0,
            text: String::new(),
            lines_read: 0,
        }
    }

    /// Text of line `target`; empty when the file could not be opened.
    fn line_at(&mut self, target: u32) -> Result<String> {
        let file = match self.file.as_mut() {
            Some(file) => file,
            None => return Ok(String::new()),
        };

        // same line as the previous record
        if target == self.line && self.line > 0 {
            return Ok(self.text.clone());
        }
        if target < self.line {
            file.seek(SeekFrom::Start(0))?;
            self.line = 0;
        }

        let mut buf = Vec::new();
        while self.line < target {
            buf.clear();
            if file.read_until(b'\n', &mut buf)? == 0 {
                return Err(TagError::UnexpectedEof {
                    path: self.path.clone(),
                    line: target,
                });
            }
            self.line += 1;
            self.lines_read += 1;
        }
        while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
            buf.pop();
        }

        self.text = String::from_utf8_lossy(&buf).into_owned();
        Ok(self.text.clone())
    }
}

/// A compact record being expanded one line number at a time.
struct Expansion {
    tag: String,
    path: String,
    list: String,
    pos: usize,
}

/// Handle on one tag database.
///
/// A handle is opened for reading or writing. Writers feed `ctags -x` lines
/// through [`TagStore::put`]; readers pull records with
/// [`TagStore::first`] / [`TagStore::next`] or [`TagStore::iter`].
/// [`TagStore::close`] must be called to flush pending compact records and
/// commit; dropping an unclosed handle does the same and logs failures.
pub struct TagStore {
    kind: DbKind,
    mode: OpenMode,
    format: Format,
    version: i64,
    root: Option<PathBuf>,
    db: OrderedStore,
    paths: PathMap,
    abbrev: Option<Abbreviation>,
    write_flags: WriteFlags,
    pool: CompactPool,
    search: SearchFlags,
    expansion: Option<Expansion>,
    source: Option<SourceReader>,
    closed: bool,
}

impl TagStore {
    /// Open the `kind` database under `dbpath`.
    ///
    /// `root` is the source tree root; it is required for compact databases,
    /// whose records are expanded by reading source files.
    pub fn open(
        dbpath: impl AsRef<Path>,
        root: Option<&Path>,
        kind: DbKind,
        mode: OpenMode,
    ) -> Result<Self> {
        match mode {
            OpenMode::Create => Self::create(dbpath, root, kind, None),
            OpenMode::Read | OpenMode::Modify => {
                let dbpath = dbpath.as_ref();
                let db = OrderedStore::open(kind.path_in(dbpath), kind.db_name(), mode)?;

                let version = db.get_version()?;
                if version > FORMAT_VERSION {
                    return Err(TagError::VersionTooNew {
                        db: kind.db_name(),
                        found: version,
                    });
                } else if version < FORMAT_VERSION {
                    return Err(TagError::VersionTooOld {
                        db: kind.db_name(),
                        found: version,
                    });
                }

                let abbrev = match db.get_option(COMPRESS_KEY)? {
                    Some(spec) => Some(Abbreviation::parse(&spec)?),
                    None => None,
                };
                let format = Format {
                    compact: db.get_option(COMPACT_KEY)?.is_some(),
                    compressed: abbrev.is_some(),
                };

                Self::assemble(dbpath, root, kind, mode, db, format, version, abbrev)
            }
        }
    }

    /// Create a fresh `kind` database, replacing any existing one.
    ///
    /// `abbreviation` overrides the default abbreviation table for
    /// compressed formats.
    pub fn create(
        dbpath: impl AsRef<Path>,
        root: Option<&Path>,
        kind: DbKind,
        abbreviation: Option<&str>,
    ) -> Result<Self> {
        let dbpath = dbpath.as_ref();
        let format = Format::for_kind(kind);
        if format.compact && root.is_none() {
            return Err(TagError::MissingSourceRoot);
        }
        let abbrev = if format.compressed {
            Some(Abbreviation::parse(abbreviation.unwrap_or(DEFAULT_ABBREVIATION))?)
        } else {
            None
        };

        let db = OrderedStore::open(kind.path_in(dbpath), kind.db_name(), OpenMode::Create)?;
        db.put_version(FORMAT_VERSION)?;
        if format.compact {
            db.put_option(COMPACT_KEY, None)?;
        }
        if let Some(abbrev) = &abbrev {
            db.put_option(COMPRESS_KEY, Some(abbrev.spec()))?;
        }

        Self::assemble(
            dbpath,
            root,
            kind,
            OpenMode::Create,
            db,
            format,
            FORMAT_VERSION,
            abbrev,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        dbpath: &Path,
        root: Option<&Path>,
        kind: DbKind,
        mode: OpenMode,
        db: OrderedStore,
        format: Format,
        version: i64,
        abbrev: Option<Abbreviation>,
    ) -> Result<Self> {
        if format.compact && root.is_none() {
            return Err(TagError::MissingSourceRoot);
        }

        let path_mode = if mode.is_write() {
            OpenMode::Modify
        } else {
            OpenMode::Read
        };
        // GPATH records and paths live in one file and one transaction
        let paths = if kind == DbKind::PathIndex {
            PathMap::attach(db.connection(), path_mode)?
        } else {
            PathMap::open(dbpath, path_mode)?
        };

        debug!(
            "Opened {} (version {}, compact={}, compressed={})",
            kind.db_name(),
            version,
            format.compact,
            format.compressed
        );

        Ok(Self {
            kind,
            mode,
            format,
            version,
            root: root.map(Path::to_path_buf),
            db,
            paths,
            abbrev,
            write_flags: WriteFlags::default(),
            pool: CompactPool::new(),
            search: SearchFlags::default(),
            expansion: None,
            source: None,
            closed: false,
        })
    }

    pub fn kind(&self) -> DbKind {
        self.kind
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn set_write_flags(&mut self, flags: WriteFlags) {
        self.write_flags = flags;
    }

    /// Path map shared by the databases of this tree
    pub fn paths(&mut self) -> &mut PathMap {
        &mut self.paths
    }

    /// Source lines read so far to recover compact record text
    pub fn source_lines_read(&self) -> u64 {
        self.source.as_ref().map_or(0, |s| s.lines_read)
    }

    /// Number of stored records
    pub fn count(&self) -> Result<usize> {
        self.db.count()
    }

    fn check_writable(&self) -> Result<()> {
        if self.mode.is_write() {
            Ok(())
        } else {
            Err(TagError::ReadOnly(self.kind.db_name()))
        }
    }

    /// Store one `ctags -x` line (`<tag> <lno> <path> <text>`) under `tag`.
    ///
    /// Compact databases expect the lines of one file to arrive together:
    /// the pending group is flushed whenever the path changes.
    pub fn put(&mut self, tag: &str, raw: &str) -> Result<()> {
        self.check_writable()?;
        if tag.len() > IDENT_LEN {
            return Err(TagError::TagTooLong {
                tag: tag.to_string(),
                len: tag.len(),
            });
        }
        let line = TagLine::parse(raw)?;

        if self.format.compact {
            if self.pool.needs_flush(line.path) {
                self.flush_pool()?;
            }
            if self.pool.current_path() != Some(line.path) {
                self.paths.get_or_insert(line.path)?;
                self.pool.set_path(line.path);
            }
            self.pool.add(tag, line.line);
        } else {
            let fid = self.paths.get_or_insert(line.path)?;
            let record = match &self.abbrev {
                Some(abbrev) => {
                    let text = abbrev.compress(line.text, line.tag);
                    encode_standard(fid, line.tag, line.line, &text)
                }
                None => encode_standard(fid, line.tag, line.line, line.text),
            };
            self.db.put(tag, &record)?;
        }

        Ok(())
    }

    fn flush_pool(&mut self) -> Result<()> {
        let (path, entries) = match self.pool.take() {
            Some(pending) => pending,
            None => return Ok(()),
        };
        let fid = self
            .paths
            .path_to_id(&path)?
            .ok_or_else(|| TagError::MissingFileId(path.clone()))?;

        let records = pool::serialize(fid, entries, self.write_flags);
        debug!("Flushing {} compact records for {}", records.len(), path);
        for (key, record) in &records {
            self.db.put(key, record)?;
        }

        Ok(())
    }

    /// Delete every record whose file id is in `ids`. Returns the number of
    /// records removed.
    pub fn delete(&mut self, ids: &IdSet) -> Result<usize> {
        self.check_writable()?;
        self.expansion = None;

        let mut removed = 0;
        let mut value = self.db.first(Scan::all())?;
        while let Some(record) = value {
            if let Some(fid) = leading_fid(&record) {
                if ids.contains(&fid) {
                    self.db.delete_current()?;
                    removed += 1;
                }
            }
            value = self.db.next()?;
        }
        self.db.reset();

        info!("Deleted {} records from {}", removed, self.kind.db_name());
        Ok(removed)
    }

    /// Start a search and return its first entry.
    ///
    /// `pattern` is a regular expression unless `flags.no_regex` is set;
    /// `None` or `.*` visits every record.
    pub fn first(&mut self, pattern: Option<&str>, flags: SearchFlags) -> Result<Option<Entry>> {
        self.search = flags;
        self.expansion = None;

        let scan = search::plan(pattern, &flags);
        let result = match self.db.first(scan) {
            Ok(Some(value)) => self.entry_for(value),
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };
        self.guard(result)
    }

    /// Next entry of the current search, `None` at the end.
    pub fn next(&mut self) -> Result<Option<Entry>> {
        let result = if self.expansion.is_some() {
            self.genrecord_compact().map(|r| Some(Entry::Record(r)))
        } else {
            match self.db.next() {
                Ok(Some(value)) => self.entry_for(value),
                Ok(None) => Ok(None),
                Err(e) => Err(e),
            }
        };
        self.guard(result)
    }

    /// Iterate a search from its first entry.
    pub fn iter<'a>(&'a mut self, pattern: Option<&str>, flags: SearchFlags) -> Entries<'a> {
        Entries {
            store: self,
            pattern: pattern.map(str::to_string),
            flags,
            started: false,
            done: false,
        }
    }

    // An error ends the current search
    fn guard(&mut self, result: Result<Option<Entry>>) -> Result<Option<Entry>> {
        if result.is_err() {
            self.expansion = None;
            self.db.reset();
        }
        result
    }

    fn entry_for(&mut self, value: String) -> Result<Option<Entry>> {
        if self.search.key_only {
            return Ok(Some(Entry::Key(value)));
        }
        self.genrecord(&value).map(|r| Some(Entry::Record(r)))
    }

    fn genrecord(&mut self, stored: &str) -> Result<TagRecord> {
        let head = StoredHead::parse(stored)?;
        let path = self
            .paths
            .id_to_path(head.fid)?
            .ok_or(TagError::MissingPath(head.fid))?;

        if self.format.compact {
            if !self.search.no_source {
                self.open_source(&path);
            }
            self.expansion = Some(Expansion {
                tag: head.tag.to_string(),
                path,
                list: head.rest.to_string(),
                pos: 0,
            });
            return self.genrecord_compact();
        }

        let (line, text) = split_standard(head.rest)?;
        let text = match &self.abbrev {
            Some(abbrev) => abbrev.uncompress(text, head.tag)?,
            None => text.to_string(),
        };

        Ok(TagRecord {
            tag: head.tag.to_string(),
            line,
            path,
            text,
        })
    }

    fn genrecord_compact(&mut self) -> Result<TagRecord> {
        let (tag, path, line, next_pos) = match &self.expansion {
            Some(exp) => {
                let (line, rest) = next_line_number(&exp.list[exp.pos..])?;
                let next_pos = rest.map(|r| exp.list.len() - r.len());
                (exp.tag.clone(), exp.path.clone(), line, next_pos)
            }
            None => return Err(TagError::IllegalCompactFormat(String::new())),
        };

        match (next_pos, self.expansion.as_mut()) {
            (Some(pos), Some(exp)) => exp.pos = pos,
            _ => self.expansion = None,
        }

        let text = match self.source.as_mut() {
            Some(source) if !self.search.no_source => source.line_at(line)?,
            _ => String::new(),
        };

        Ok(TagRecord {
            tag,
            line,
            path,
            text,
        })
    }

    fn open_source(&mut self, path: &str) {
        if self.source.as_ref().map_or(false, |s| s.path == path) {
            return;
        }
        let relative = path.strip_prefix("./").unwrap_or(path);
        let full = match &self.root {
            Some(root) => root.join(relative),
            None => PathBuf::from(relative),
        };
        self.source = Some(SourceReader::open(path, &full));
    }

    fn finish(&mut self) -> Result<()> {
        if self.mode.is_write() && self.format.compact {
            self.flush_pool()?;
        }
        self.source = None;
        self.expansion = None;
        self.db.commit()
    }

    /// Flush pending records, commit and release the database.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.finish()?;
        info!("Closed {}", self.kind.db_name());
        Ok(())
    }
}

impl Drop for TagStore {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.finish() {
                warn!("Failed to close {}: {}", self.kind.db_name(), e);
            }
        }
    }
}

/// File id at the head of a stored record
fn leading_fid(record: &str) -> Option<u32> {
    let end = record
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(record.len());
    record[..end].parse().ok()
}

/// Iterator returned by [`TagStore::iter`].
pub struct Entries<'a> {
    store: &'a mut TagStore,
    pattern: Option<String>,
    flags: SearchFlags,
    started: bool,
    done: bool,
}

impl Iterator for Entries<'_> {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = if self.started {
            self.store.next()
        } else {
            self.started = true;
            self.store.first(self.pattern.as_deref(), self.flags)
        };
        match result {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
