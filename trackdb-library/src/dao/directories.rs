use rusqlite::{params, Connection, Result as SqlResult};

use super::tracks::TrackId;
use super::{dir_prefix, normalize_dir, IN_DIRECTORY};

/// Returns `false` if the directory was already in the library.
pub fn add_directory(conn: &Connection, dir: &str) -> SqlResult<bool> {
    let added = conn.execute(
        "INSERT OR IGNORE INTO directories (directory) VALUES (?1)",
        params![normalize_dir(dir)],
    )?;
    Ok(added == 1)
}

pub fn remove_directory(conn: &Connection, dir: &str) -> SqlResult<bool> {
    let removed = conn.execute(
        "DELETE FROM directories WHERE directory = ?1",
        params![normalize_dir(dir)],
    )?;
    Ok(removed == 1)
}

pub fn directories(conn: &Connection) -> SqlResult<Vec<String>> {
    let mut stmt = conn.prepare("SELECT directory FROM directories ORDER BY directory")?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    rows.collect()
}

/// Point `old_dir` and every track under it at `new_dir`.
///
/// Returns the ids of the tracks that moved. Run inside a transaction so a
/// location clash leaves nothing half-moved.
pub fn relocate_directory(conn: &Connection, old_dir: &str, new_dir: &str) -> SqlResult<Vec<TrackId>> {
    let old_dir = normalize_dir(old_dir);
    let new_dir = normalize_dir(new_dir);

    conn.execute(
        "UPDATE directories SET directory = ?2 WHERE directory = ?1",
        params![old_dir, new_dir],
    )?;

    let moved: Vec<(i64, String, String)> = {
        let mut stmt = conn.prepare(&format!(
            "SELECT id, location, directory FROM library WHERE {} ORDER BY id",
            IN_DIRECTORY
        ))?;
        let rows = stmt.query_map(params![old_dir, dir_prefix(&old_dir)], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?;
        rows.collect::<SqlResult<_>>()?
    };

    let mut update = conn.prepare("UPDATE library SET location = ?2, directory = ?3 WHERE id = ?1")?;
    let mut ids = Vec::with_capacity(moved.len());
    for (id, location, directory) in moved {
        let location = rebase(&location, &old_dir, &new_dir);
        let directory = rebase(&directory, &old_dir, &new_dir);
        update.execute(params![id, location, directory])?;
        ids.push(TrackId(id));
    }
    Ok(ids)
}

/// Swap the leading `old` of `path` for `new`. `path` must start with `old`.
fn rebase(path: &str, old: &str, new: &str) -> String {
    let rest = path[old.len()..].trim_start_matches('/');
    if rest.is_empty() {
        new.to_string()
    } else {
        format!("{}/{}", new.trim_end_matches('/'), rest)
    }
}
