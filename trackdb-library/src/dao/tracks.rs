use std::fmt;
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult, Row};

use super::cover_art::CoverArtId;
use super::{dir_prefix, normalize_dir, IN_DIRECTORY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(pub i64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub id: TrackId,
    pub location: String,
    pub directory: String,
    pub filename: String,
    /// Removed from the library view but kept with its metadata.
    pub hidden: bool,
    pub cover_art: Option<CoverArtId>,
}

const TRACK_COLUMNS: &str = "id, location, directory, filename, hidden, cover_art";

fn track_from_row(row: &Row<'_>) -> SqlResult<Track> {
    Ok(Track {
        id: TrackId(row.get(0)?),
        location: row.get(1)?,
        directory: row.get(2)?,
        filename: row.get(3)?,
        hidden: row.get(4)?,
        cover_art: row.get::<_, Option<i64>>(5)?.map(CoverArtId),
    })
}

fn split_location(location: &str) -> (String, String) {
    let path = Path::new(location);
    let directory = path
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    let filename = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| location.to_string());
    (directory, filename)
}

/// Add a track by location, or return the existing one (un-hiding it).
pub fn add_track(conn: &Connection, location: &str) -> SqlResult<TrackId> {
    if let Some(id) = track_id(conn, location)? {
        conn.execute("UPDATE library SET hidden = 0 WHERE id = ?1", params![id.0])?;
        return Ok(id);
    }
    let (directory, filename) = split_location(location);
    conn.execute(
        "INSERT INTO library (location, directory, filename) VALUES (?1, ?2, ?3)",
        params![location, directory, filename],
    )?;
    Ok(TrackId(conn.last_insert_rowid()))
}

pub fn track_id(conn: &Connection, location: &str) -> SqlResult<Option<TrackId>> {
    conn.query_row(
        "SELECT id FROM library WHERE location = ?1",
        params![location],
        |row| row.get(0).map(TrackId),
    )
    .optional()
}

pub fn get_track(conn: &Connection, id: TrackId) -> SqlResult<Option<Track>> {
    conn.query_row(
        &format!("SELECT {} FROM library WHERE id = ?1", TRACK_COLUMNS),
        params![id.0],
        track_from_row,
    )
    .optional()
}

/// Tracks in `dir` or below it, hidden ones included.
pub fn tracks_in_directory(conn: &Connection, dir: &str) -> SqlResult<Vec<Track>> {
    let dir = normalize_dir(dir);
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM library WHERE {} ORDER BY location",
        TRACK_COLUMNS, IN_DIRECTORY
    ))?;
    let rows = stmt.query_map(params![dir, dir_prefix(&dir)], track_from_row)?;
    rows.collect()
}

/// Hide every track in or below `dir`. Returns the number of tracks changed.
pub fn hide_tracks_in(conn: &Connection, dir: &str) -> SqlResult<usize> {
    let dir = normalize_dir(dir);
    conn.execute(
        &format!("UPDATE library SET hidden = 1 WHERE hidden = 0 AND {}", IN_DIRECTORY),
        params![dir, dir_prefix(&dir)],
    )
}

/// Delete every track in or below `dir` along with its crate memberships.
pub fn purge_tracks_in(conn: &Connection, dir: &str) -> SqlResult<usize> {
    let dir = normalize_dir(dir);
    conn.execute(
        &format!("DELETE FROM library WHERE {}", IN_DIRECTORY),
        params![dir, dir_prefix(&dir)],
    )
}

pub fn set_cover_art(conn: &Connection, id: TrackId, cover: Option<CoverArtId>) -> SqlResult<bool> {
    let changed = conn.execute(
        "UPDATE library SET cover_art = ?2 WHERE id = ?1",
        params![id.0, cover.map(|c| c.0)],
    )?;
    Ok(changed == 1)
}
