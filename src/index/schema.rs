use rusqlite::{Connection, Result};
use tracing::{debug, info};

/// Page size used for every tag database. Compact records are split so a
/// single record stays well inside one page.
pub const PAGE_SIZE: usize = 8192;

/// Initialize the record and meta tables of a tag database
pub fn init_tag_schema(conn: &Connection) -> Result<()> {
    debug!("Initializing tag record schema");

    // Records keep insertion order among duplicate keys through `seq`
    conn.execute(
        "CREATE TABLE IF NOT EXISTS tags (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            key TEXT NOT NULL,
            dat TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tags_key
         ON tags(key, seq)",
        [],
    )?;

    init_meta_schema(conn)?;

    Ok(())
}

/// Initialize the meta side-channel (format version and options)
pub fn init_meta_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS meta (
            name TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

/// Initialize the path table of the GPATH database
pub fn init_path_schema(conn: &Connection) -> Result<()> {
    debug!("Initializing path schema");

    conn.execute(
        "CREATE TABLE IF NOT EXISTS paths (
            id INTEGER PRIMARY KEY,
            path TEXT NOT NULL UNIQUE
        )",
        [],
    )?;

    init_meta_schema(conn)?;

    Ok(())
}

/// Set the page size on a fresh database. Must run before any table exists.
pub fn set_page_size(conn: &Connection) -> Result<()> {
    info!("Using page size {}", PAGE_SIZE);
    conn.pragma_update(None, "page_size", PAGE_SIZE as i64)?;
    Ok(())
}
