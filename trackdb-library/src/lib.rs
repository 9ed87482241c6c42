//! # trackdb-library
//!
//! Music library storage built on `trackdb-dispatch`. The SQLite
//! connection lives on a dedicated worker thread; [`Library`] turns each
//! operation into a labelled task and reports side effects through
//! [`LibraryFeedback`] events and the main-thread mailbox.

pub mod config;
pub mod dao;
pub mod db;
pub mod error;
pub mod feedback;
pub mod library;
pub mod schema;

pub use config::Config;
pub use dao::cover_art::CoverArtId;
pub use dao::crates::{Crate, CrateId};
pub use dao::tracks::{Track, TrackId};
pub use db::LibraryDb;
pub use error::{LibraryError, LibraryResult};
pub use feedback::LibraryFeedback;
pub use library::{Library, PlayerHook, RemovalType};
