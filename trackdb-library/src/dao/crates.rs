use std::fmt;

use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult, Row};

use super::tracks::TrackId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CrateId(pub i64);

impl fmt::Display for CrateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Crate {
    pub id: CrateId,
    pub name: String,
    pub locked: bool,
    pub track_count: usize,
}

const CRATE_SELECT: &str = "SELECT c.id, c.name, c.locked, COUNT(ct.track_id)
    FROM crates c LEFT JOIN crate_tracks ct ON ct.crate_id = c.id";

fn crate_from_row(row: &Row<'_>) -> SqlResult<Crate> {
    Ok(Crate {
        id: CrateId(row.get(0)?),
        name: row.get(1)?,
        locked: row.get(2)?,
        track_count: row.get::<_, i64>(3)? as usize,
    })
}

pub fn create_crate(conn: &Connection, name: &str) -> SqlResult<CrateId> {
    conn.execute("INSERT INTO crates (name) VALUES (?1)", params![name])?;
    Ok(CrateId(conn.last_insert_rowid()))
}

pub fn crate_id_by_name(conn: &Connection, name: &str) -> SqlResult<Option<CrateId>> {
    conn.query_row(
        "SELECT id FROM crates WHERE name = ?1",
        params![name],
        |row| row.get(0).map(CrateId),
    )
    .optional()
}

pub fn get_crate(conn: &Connection, id: CrateId) -> SqlResult<Option<Crate>> {
    conn.query_row(
        &format!("{} WHERE c.id = ?1 GROUP BY c.id", CRATE_SELECT),
        params![id.0],
        crate_from_row,
    )
    .optional()
}

pub fn crates(conn: &Connection) -> SqlResult<Vec<Crate>> {
    let mut stmt = conn.prepare(&format!("{} GROUP BY c.id ORDER BY c.name", CRATE_SELECT))?;
    let rows = stmt.query_map([], crate_from_row)?;
    rows.collect()
}

pub fn rename_crate(conn: &Connection, id: CrateId, name: &str) -> SqlResult<bool> {
    let changed = conn.execute(
        "UPDATE crates SET name = ?2 WHERE id = ?1",
        params![id.0, name],
    )?;
    Ok(changed == 1)
}

pub fn delete_crate(conn: &Connection, id: CrateId) -> SqlResult<bool> {
    conn.execute("DELETE FROM crate_tracks WHERE crate_id = ?1", params![id.0])?;
    let deleted = conn.execute("DELETE FROM crates WHERE id = ?1", params![id.0])?;
    Ok(deleted == 1)
}

pub fn set_locked(conn: &Connection, id: CrateId, locked: bool) -> SqlResult<bool> {
    let changed = conn.execute(
        "UPDATE crates SET locked = ?2 WHERE id = ?1",
        params![id.0, locked],
    )?;
    Ok(changed == 1)
}

/// Add tracks to a crate, skipping ones already in it. Returns how many were added.
pub fn add_tracks(conn: &Connection, id: CrateId, tracks: &[TrackId]) -> SqlResult<usize> {
    let mut stmt =
        conn.prepare("INSERT OR IGNORE INTO crate_tracks (crate_id, track_id) VALUES (?1, ?2)")?;
    let mut added = 0;
    for track in tracks {
        added += stmt.execute(params![id.0, track.0])?;
    }
    Ok(added)
}

pub fn tracks_in_crate(conn: &Connection, id: CrateId) -> SqlResult<Vec<TrackId>> {
    let mut stmt =
        conn.prepare("SELECT track_id FROM crate_tracks WHERE crate_id = ?1 ORDER BY track_id")?;
    let rows = stmt.query_map(params![id.0], |row| row.get(0).map(TrackId))?;
    rows.collect()
}
