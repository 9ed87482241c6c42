//! Table access. Every function takes a plain connection so it can run
//! inside or outside a transaction.

pub mod cover_art;
pub mod crates;
pub mod directories;
pub mod tracks;

/// SQL fragment matching `directory` against `?1` itself or anything below it.
/// Bind `?1` to the directory and `?2` to the directory plus a trailing `/`.
pub(crate) const IN_DIRECTORY: &str =
    "(directory = ?1 OR substr(directory, 1, length(?2)) = ?2)";

/// Strip trailing separators, keeping a lone `/`.
pub(crate) fn normalize_dir(dir: &str) -> String {
    let trimmed = dir.trim_end_matches('/');
    if trimmed.is_empty() && dir.starts_with('/') {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

pub(crate) fn dir_prefix(dir: &str) -> String {
    if dir.ends_with('/') {
        dir.to_string()
    } else {
        format!("{}/", dir)
    }
}
