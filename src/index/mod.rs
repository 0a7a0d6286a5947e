// Index storage: ordered record store, schema and the path map

pub mod db;
pub mod gpath;
pub mod schema;

use std::path::{Path, PathBuf};
use std::str::FromStr;

/// The four tag databases kept for a source tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DbKind {
    PathIndex,
    Definitions,
    References,
    Symbols,
}

impl DbKind {
    pub const ALL: [DbKind; 4] = [
        DbKind::PathIndex,
        DbKind::Definitions,
        DbKind::References,
        DbKind::Symbols,
    ];

    /// Fixed file name of the database under the db directory.
    pub fn db_name(&self) -> &'static str {
        match self {
            DbKind::PathIndex => "GPATH",
            DbKind::Definitions => "GTAGS",
            DbKind::References => "GRTAGS",
            DbKind::Symbols => "GSYMS",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DbKind::PathIndex => "path-index",
            DbKind::Definitions => "definitions",
            DbKind::References => "references",
            DbKind::Symbols => "symbols",
        }
    }

    pub fn path_in(&self, dbpath: impl AsRef<Path>) -> PathBuf {
        dbpath.as_ref().join(self.db_name())
    }
}

impl std::fmt::Display for DbKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DbKind {
    type Err = String;

    /// Accepts the kind name or the database file name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "path-index" | "GPATH" => Ok(DbKind::PathIndex),
            "definitions" | "GTAGS" => Ok(DbKind::Definitions),
            "references" | "GRTAGS" => Ok(DbKind::References),
            "symbols" | "GSYMS" => Ok(DbKind::Symbols),
            _ => Err(format!("unknown database '{}'", s)),
        }
    }
}

/// How a database is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Existing database, no writes.
    Read,
    /// Fresh database; any existing file is replaced.
    Create,
    /// Existing database, writes allowed.
    Modify,
}

impl OpenMode {
    pub fn is_write(&self) -> bool {
        !matches!(self, OpenMode::Read)
    }
}
