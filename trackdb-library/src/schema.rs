use rusqlite::{params, Connection, Result as SqlResult};

/// Schema version written to `schema_version` on first open.
pub const SCHEMA_VERSION: i32 = 1;

/// Create all tables. Safe to run on an existing database.
pub fn create_tables(conn: &Connection) -> SqlResult<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, datetime('now'))",
        params![SCHEMA_VERSION],
    )?;
    Ok(())
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS directories (
    directory TEXT PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS cover_art (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    location TEXT NOT NULL,
    md5 TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS library (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    location TEXT NOT NULL UNIQUE,
    directory TEXT NOT NULL,
    filename TEXT NOT NULL,
    hidden INTEGER NOT NULL DEFAULT 0,
    cover_art INTEGER REFERENCES cover_art(id) ON DELETE SET NULL
);
CREATE INDEX IF NOT EXISTS library_directory ON library(directory);

CREATE TABLE IF NOT EXISTS crates (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    locked INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS crate_tracks (
    crate_id INTEGER NOT NULL REFERENCES crates(id) ON DELETE CASCADE,
    track_id INTEGER NOT NULL REFERENCES library(id) ON DELETE CASCADE,
    UNIQUE (crate_id, track_id)
);
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_tables_is_repeatable() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        create_tables(&conn).unwrap();
        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }
}
