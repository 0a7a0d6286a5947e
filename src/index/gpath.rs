use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;
use tracing::debug;

use super::schema::init_path_schema;
use super::{DbKind, OpenMode};
use crate::error::{Result, TagError};

/// Bidirectional path <-> file id table kept in the GPATH database.
///
/// Insertions commit immediately so that several tag store handles of one
/// build can share the same GPATH file. A map attached to the connection of
/// the GPATH store itself commits with that store instead.
pub struct PathMap {
    conn: Rc<Connection>,
    mode: OpenMode,
    by_id: HashMap<u32, String>,
}

impl PathMap {
    /// Open GPATH under `dbpath`. Read mode requires an existing file,
    /// Create replaces it, Modify creates it when missing.
    pub fn open(dbpath: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        let path = DbKind::PathIndex.path_in(dbpath);

        let conn = match mode {
            OpenMode::Read => {
                if !path.is_file() {
                    return Err(TagError::NotFound(DbKind::PathIndex.db_name().to_string()));
                }
                Connection::open_with_flags(
                    &path,
                    OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )?
            }
            OpenMode::Create | OpenMode::Modify => {
                let conn = Connection::open(&path)?;
                conn.busy_timeout(Duration::from_secs(5))?;
                if mode == OpenMode::Create {
                    conn.execute("DROP TABLE IF EXISTS paths", [])?;
                }
                init_path_schema(&conn)?;
                conn
            }
        };

        debug!("Opened path map {} ({:?})", path.display(), mode);

        Ok(Self {
            conn: Rc::new(conn),
            mode,
            by_id: HashMap::new(),
        })
    }

    /// Path map over an already open GPATH connection.
    pub fn attach(conn: Rc<Connection>, mode: OpenMode) -> Result<Self> {
        if mode.is_write() {
            init_path_schema(&conn)?;
        }
        debug!("Attached path map ({:?})", mode);
        Ok(Self {
            conn,
            mode,
            by_id: HashMap::new(),
        })
    }

    pub fn path_to_id(&self, path: &str) -> Result<Option<u32>> {
        let id = self
            .conn
            .prepare_cached("SELECT id FROM paths WHERE path = ?1")?
            .query_row([path], |row| row.get::<_, i64>(0))
            .optional()?;
        Ok(id.map(|id| id as u32))
    }

    /// Resolve a file id. Lookups are cached for the lifetime of the map.
    pub fn id_to_path(&mut self, id: u32) -> Result<Option<String>> {
        if let Some(path) = self.by_id.get(&id) {
            return Ok(Some(path.clone()));
        }
        let path: Option<String> = self
            .conn
            .prepare_cached("SELECT path FROM paths WHERE id = ?1")?
            .query_row([id as i64], |row| row.get(0))
            .optional()?;
        if let Some(path) = &path {
            self.by_id.insert(id, path.clone());
        }
        Ok(path)
    }

    /// Id of `path`, assigning the next free id when it is new.
    pub fn get_or_insert(&mut self, path: &str) -> Result<u32> {
        if let Some(id) = self.path_to_id(path)? {
            return Ok(id);
        }
        if !self.mode.is_write() {
            return Err(TagError::ReadOnly(DbKind::PathIndex.db_name()));
        }
        self.conn.execute(
            "INSERT INTO paths (id, path)
             VALUES ((SELECT COALESCE(MAX(id), 0) + 1 FROM paths), ?1)",
            params![path],
        )?;
        let id = self.conn.last_insert_rowid() as u32;
        debug!("Registered {} as file id {}", path, id);
        self.by_id.insert(id, path.to_string());
        Ok(id)
    }

    /// All registered paths in id order
    pub fn paths(&self) -> Result<Vec<(u32, String)>> {
        let mut stmt = self.conn.prepare("SELECT id, path FROM paths ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)? as u32, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn close(self) -> Result<()> {
        match Rc::try_unwrap(self.conn) {
            Ok(conn) => conn.close().map_err(|(_, e)| TagError::Sqlite(e)),
            Err(_) => Ok(()),
        }
    }
}
