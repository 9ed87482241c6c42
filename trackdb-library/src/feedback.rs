use crate::dao::tracks::{Track, TrackId};

/// Events the library worker reports to the application.
///
/// Sent on an unbounded channel, so the worker never waits on the
/// receiver. The main loop drains them with
/// [`Library::drain_feedback`](crate::Library::drain_feedback).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibraryFeedback {
    /// Something the user should be told about.
    Notice { title: String, message: String },
    DirectoriesChanged,
    /// Tracks whose location changed in a directory relocation.
    TracksMoved(Vec<TrackId>),
    CratesChanged,
    /// Unreferenced cover art rows were deleted.
    CoverArtPurged(usize),
    /// A track resolved for a player when no player hook is attached.
    LoadTrack { track: Track, group: String },
}
