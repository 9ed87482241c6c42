//! The library database handle owned by the worker thread.

use std::path::Path;

use rusqlite::{Connection, Result as SqlResult, Transaction};

use crate::error::LibraryResult;
use crate::schema;

/// Open SQLite connection with the library schema in place.
///
/// Every method takes `&self`: the connection is only ever reached from
/// the worker thread, one task at a time.
pub struct LibraryDb {
    conn: Connection,
}

impl LibraryDb {
    pub fn open(path: &Path) -> LibraryResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        log::info!(target: "library", "opened library database {}", path.display());
        Ok(Self::init(conn)?)
    }

    pub fn open_in_memory() -> LibraryResult<Self> {
        Ok(Self::init(Connection::open_in_memory()?)?)
    }

    fn init(conn: Connection) -> SqlResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::create_tables(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Start a transaction. Commit it explicitly; dropping rolls back.
    pub fn transaction(&self) -> SqlResult<Transaction<'_>> {
        self.conn.unchecked_transaction()
    }
}
