use std::fmt;

use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoverArtId(pub i64);

impl fmt::Display for CoverArtId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store a cover, or return the id of the cover already stored under `md5`.
///
/// Covers without a hash are not stored.
pub fn save_cover_art(conn: &Connection, location: &str, md5: &str) -> SqlResult<Option<CoverArtId>> {
    if md5.is_empty() {
        return Ok(None);
    }
    if let Some(existing) = cover_art_id(conn, md5)? {
        return Ok(Some(existing));
    }
    conn.execute(
        "INSERT INTO cover_art (location, md5) VALUES (?1, ?2)",
        params![location, md5],
    )?;
    Ok(Some(CoverArtId(conn.last_insert_rowid())))
}

pub fn cover_art_id(conn: &Connection, md5: &str) -> SqlResult<Option<CoverArtId>> {
    if md5.is_empty() {
        return Ok(None);
    }
    conn.query_row(
        "SELECT id FROM cover_art WHERE md5 = ?1",
        params![md5],
        |row| row.get(0).map(CoverArtId),
    )
    .optional()
}

pub fn cover_art_location(conn: &Connection, id: CoverArtId) -> SqlResult<Option<String>> {
    conn.query_row(
        "SELECT location FROM cover_art WHERE id = ?1",
        params![id.0],
        |row| row.get(0),
    )
    .optional()
}

/// Delete covers no track refers to. Returns how many were removed.
pub fn delete_unused(conn: &Connection) -> SqlResult<usize> {
    conn.execute(
        "DELETE FROM cover_art WHERE id NOT IN
            (SELECT cover_art FROM library WHERE cover_art IS NOT NULL)",
        [],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::tracks;
    use crate::schema;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        schema::create_tables(&conn).unwrap();
        conn
    }

    #[test]
    fn empty_hash_is_not_saved() {
        let conn = conn();
        assert_eq!(save_cover_art(&conn, "/music/a/cover.jpg", "").unwrap(), None);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM cover_art", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn same_hash_reuses_id() {
        let conn = conn();
        let first = save_cover_art(&conn, "/music/a/cover.jpg", "abc").unwrap();
        let second = save_cover_art(&conn, "/music/b/cover.jpg", "abc").unwrap();
        assert!(first.is_some());
        assert_eq!(first, second);
        assert_eq!(
            cover_art_location(&conn, first.unwrap()).unwrap().as_deref(),
            Some("/music/a/cover.jpg")
        );
    }

    #[test]
    fn delete_unused_keeps_referenced_covers() {
        let conn = conn();
        let used = save_cover_art(&conn, "/music/a/cover.jpg", "used").unwrap();
        save_cover_art(&conn, "/music/b/cover.jpg", "orphan").unwrap();
        let track = tracks::add_track(&conn, "/music/a/one.flac").unwrap();
        tracks::set_cover_art(&conn, track, used).unwrap();

        assert_eq!(delete_unused(&conn).unwrap(), 1);
        assert_eq!(cover_art_id(&conn, "used").unwrap(), used);
        assert_eq!(cover_art_id(&conn, "orphan").unwrap(), None);
    }
}
