use regex::Regex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, info};

use super::schema::{init_tag_schema, set_page_size};
use super::OpenMode;
use crate::error::{Result, TagError};

/// Meta option holding the format version
pub const VERSION_KEY: &str = "version";

/// Version assumed when a database carries no version option
pub const LEGACY_VERSION: i64 = 1;

/// Rows pulled from SQLite per cursor refill
const FETCH_BATCH: i64 = 256;

/// Which keys a scan visits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanKey {
    /// Every record in key order
    All,
    /// Records whose key equals the given key
    Exact(String),
    /// Records whose key starts with the given prefix
    Prefix(String),
}

/// A cursor request: key range, optional regex on the key, and whether only
/// distinct keys are returned.
#[derive(Debug, Clone)]
pub struct Scan {
    pub key: ScanKey,
    pub filter: Option<Regex>,
    pub keys_only: bool,
}

impl Scan {
    pub fn all() -> Self {
        Self {
            key: ScanKey::All,
            filter: None,
            keys_only: false,
        }
    }

    pub fn exact(key: impl Into<String>) -> Self {
        Self {
            key: ScanKey::Exact(key.into()),
            ..Self::all()
        }
    }

    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self {
            key: ScanKey::Prefix(prefix.into()),
            ..Self::all()
        }
    }

    pub fn with_filter(mut self, filter: Regex) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn keys_only(mut self, keys_only: bool) -> Self {
        self.keys_only = keys_only;
        self
    }

    fn start(&self) -> (String, i64) {
        match &self.key {
            ScanKey::All => (String::new(), i64::MIN),
            ScanKey::Exact(key) | ScanKey::Prefix(key) => (key.clone(), i64::MIN),
        }
    }
}

struct StoredRow {
    seq: i64,
    key: String,
    dat: String,
}

struct Cursor {
    scan: Scan,
    /// Position of the last row fetched from SQLite
    after: (String, i64),
    buffer: VecDeque<StoredRow>,
    /// Row most recently returned, target of `delete_current`
    current: Option<i64>,
    done: bool,
}

/// Sorted, duplicate-key record store backed by one SQLite file.
///
/// Records are ordered by key, then by insertion order. A write-mode store
/// holds a single transaction from `open` until `close`.
pub struct OrderedStore {
    conn: Rc<Connection>,
    name: &'static str,
    path: PathBuf,
    mode: OpenMode,
    in_txn: bool,
    cursor: Option<Cursor>,
}

impl OrderedStore {
    /// Open the store at `path`. `name` is used in error messages.
    pub fn open(path: impl AsRef<Path>, name: &'static str, mode: OpenMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let conn = match mode {
            OpenMode::Read => {
                if !path.is_file() {
                    return Err(TagError::NotFound(name.to_string()));
                }
                Connection::open_with_flags(
                    &path,
                    OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )?
            }
            OpenMode::Create => {
                if path.exists() {
                    debug!("Replacing existing {}", path.display());
                    std::fs::remove_file(&path)?;
                }
                info!("Creating {} at {}", name, path.display());
                let conn = Connection::open(&path)?;
                set_page_size(&conn)?;
                init_tag_schema(&conn)?;
                conn
            }
            OpenMode::Modify => {
                if !path.is_file() {
                    return Err(TagError::NotFound(name.to_string()));
                }
                let conn = Connection::open(&path)?;
                init_tag_schema(&conn)?;
                conn
            }
        };

        if mode.is_write() {
            conn.execute_batch("BEGIN IMMEDIATE")?;
        }

        debug!("Opened {} ({:?})", path.display(), mode);

        Ok(Self {
            conn: Rc::new(conn),
            name,
            path,
            mode,
            in_txn: mode.is_write(),
            cursor: None,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Connection of this store, for tables kept in the same file.
    /// Writes through it join the store's transaction.
    pub fn connection(&self) -> Rc<Connection> {
        Rc::clone(&self.conn)
    }

    fn check_writable(&self) -> Result<()> {
        if self.mode.is_write() {
            Ok(())
        } else {
            Err(TagError::ReadOnly(self.name))
        }
    }

    /// Append a record. Duplicate keys are kept in insertion order.
    pub fn put(&self, key: &str, dat: &str) -> Result<()> {
        self.check_writable()?;
        let mut stmt = self
            .conn
            .prepare_cached("INSERT INTO tags (key, dat) VALUES (?1, ?2)")?;
        stmt.execute(params![key, dat])?;
        Ok(())
    }

    /// Position a new cursor and return its first value.
    ///
    /// Returns the record data, or the key when the scan is `keys_only`.
    pub fn first(&mut self, scan: Scan) -> Result<Option<String>> {
        let after = scan.start();
        self.cursor = Some(Cursor {
            scan,
            after,
            buffer: VecDeque::new(),
            current: None,
            done: false,
        });
        self.next()
    }

    /// Advance the cursor. `None` once the scan is exhausted.
    pub fn next(&mut self) -> Result<Option<String>> {
        loop {
            let cursor = match self.cursor.as_mut() {
                Some(cursor) => cursor,
                None => return Ok(None),
            };

            if cursor.buffer.is_empty() {
                if cursor.done {
                    return Ok(None);
                }
                let rows = fetch(&self.conn, &cursor.scan.key, &cursor.after)?;
                if (rows.len() as i64) < FETCH_BATCH {
                    cursor.done = true;
                }
                if let Some(last) = rows.last() {
                    cursor.after = (last.key.clone(), last.seq);
                }
                cursor.buffer.extend(rows);
            }

            let row = match cursor.buffer.pop_front() {
                Some(row) => row,
                None => return Ok(None),
            };

            if let ScanKey::Prefix(prefix) = &cursor.scan.key {
                if !row.key.starts_with(prefix.as_str()) {
                    cursor.buffer.clear();
                    cursor.done = true;
                    return Ok(None);
                }
            }

            if let Some(filter) = &cursor.scan.filter {
                if !filter.is_match(&row.key) {
                    continue;
                }
            }

            cursor.current = Some(row.seq);

            if cursor.scan.keys_only {
                while cursor
                    .buffer
                    .front()
                    .map_or(false, |next| next.key == row.key)
                {
                    cursor.buffer.pop_front();
                }
                if cursor.buffer.is_empty() {
                    // Skip whatever duplicates remain in SQLite
                    cursor.after = (row.key.clone(), i64::MAX);
                }
                return Ok(Some(row.key));
            }

            return Ok(Some(row.dat));
        }
    }

    /// Delete the record most recently returned by the cursor.
    pub fn delete_current(&mut self) -> Result<()> {
        self.check_writable()?;
        if let Some(seq) = self.cursor.as_ref().and_then(|c| c.current) {
            let mut stmt = self.conn.prepare_cached("DELETE FROM tags WHERE seq = ?1")?;
            stmt.execute([seq])?;
        }
        Ok(())
    }

    /// Drop the cursor, if any.
    pub fn reset(&mut self) {
        self.cursor = None;
    }

    /// Store a named meta option. `None` records the option as a bare flag.
    pub fn put_option(&self, name: &str, value: Option<&str>) -> Result<()> {
        self.check_writable()?;
        self.conn.execute(
            "INSERT OR REPLACE INTO meta (name, value) VALUES (?1, ?2)",
            params![name, value.unwrap_or("")],
        )?;
        Ok(())
    }

    pub fn get_option(&self, name: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM meta WHERE name = ?1", [name], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    pub fn put_version(&self, version: i64) -> Result<()> {
        self.put_option(VERSION_KEY, Some(&version.to_string()))
    }

    /// Stored format version, or `LEGACY_VERSION` when none was recorded.
    pub fn get_version(&self) -> Result<i64> {
        Ok(self
            .get_option(VERSION_KEY)?
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(LEGACY_VERSION))
    }

    /// Number of stored records
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM tags", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Number of distinct keys
    pub fn count_keys(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(DISTINCT key) FROM tags", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Commit the write transaction. Further writes fail afterwards.
    pub fn commit(&mut self) -> Result<()> {
        if self.in_txn {
            self.conn.execute_batch("COMMIT")?;
            self.in_txn = false;
            self.mode = OpenMode::Read;
        }
        Ok(())
    }

    /// Commit pending writes and release the database.
    pub fn close(mut self) -> Result<()> {
        self.commit()?;
        debug!("Closed {}", self.path.display());
        match Rc::try_unwrap(self.conn) {
            Ok(conn) => conn.close().map_err(|(_, e)| TagError::Sqlite(e)),
            // still shared; closed with the last user
            Err(_) => Ok(()),
        }
    }
}

fn fetch(conn: &Connection, key: &ScanKey, after: &(String, i64)) -> Result<Vec<StoredRow>> {
    let sql = match key {
        ScanKey::Exact(_) => {
            "SELECT seq, key, dat FROM tags
             WHERE key = ?1 AND seq > ?2
             ORDER BY seq LIMIT ?3"
        }
        ScanKey::All | ScanKey::Prefix(_) => {
            "SELECT seq, key, dat FROM tags
             WHERE (key, seq) > (?1, ?2)
             ORDER BY key, seq LIMIT ?3"
        }
    };

    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt
        .query_map(params![after.0, after.1, FETCH_BATCH], |row| {
            Ok(StoredRow {
                seq: row.get(0)?,
                key: row.get(1)?,
                dat: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}
