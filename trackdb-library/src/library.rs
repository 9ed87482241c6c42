//! The library facade: every database operation the application needs,
//! each one shipped to the library worker as a labelled task.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use trackdb_dispatch::{
    DispatchConfig, Dispatcher, Engine, EngineBuilder, MainThreadMailbox, ShutdownReport,
    StatsSnapshot,
};

use crate::dao::cover_art::{self, CoverArtId};
use crate::dao::crates::{self, Crate, CrateId};
use crate::dao::directories;
use crate::dao::tracks::{self, Track, TrackId};
use crate::db::LibraryDb;
use crate::error::{LibraryError, LibraryResult};
use crate::feedback::LibraryFeedback;

/// What happens to a removed directory's tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemovalType {
    /// Hide them but keep their metadata in case they come back.
    #[default]
    HideTracks,
    /// Delete them and everything attached to them.
    PurgeTracks,
    LeaveTracksUnchanged,
}

impl FromStr for RemovalType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hide" => Ok(Self::HideTracks),
            "purge" => Ok(Self::PurgeTracks),
            "keep" | "leave" => Ok(Self::LeaveTracksUnchanged),
            other => Err(format!("unknown removal type '{}'", other)),
        }
    }
}

/// Receives tracks loaded with [`Library::load_location_to_player`].
/// Always called on the main thread.
pub type PlayerHook = Arc<dyn Fn(&Track, &str) + Send + Sync + 'static>;

pub struct Library {
    engine: Engine<LibraryDb>,
    mailbox: Arc<MainThreadMailbox>,
    feedback_tx: Sender<LibraryFeedback>,
    feedback_rx: Receiver<LibraryFeedback>,
    player: Option<PlayerHook>,
}

impl Library {
    /// Open (or create) the library database at `path` on a new worker.
    pub fn open(
        path: impl Into<PathBuf>,
        config: DispatchConfig,
        mailbox: &Arc<MainThreadMailbox>,
    ) -> LibraryResult<Self> {
        let path = path.into();
        Self::start(Engine::builder(move || LibraryDb::open(&path)), config, mailbox)
    }

    pub fn open_in_memory(config: DispatchConfig, mailbox: &Arc<MainThreadMailbox>) -> LibraryResult<Self> {
        Self::start(Engine::builder(LibraryDb::open_in_memory), config, mailbox)
    }

    fn start(
        builder: EngineBuilder<LibraryDb>,
        config: DispatchConfig,
        mailbox: &Arc<MainThreadMailbox>,
    ) -> LibraryResult<Self> {
        let engine = builder.config(config).mailbox(mailbox).start()?;
        let (feedback_tx, feedback_rx) = crossbeam_channel::unbounded();
        Ok(Self {
            engine,
            mailbox: Arc::clone(mailbox),
            feedback_tx,
            feedback_rx,
            player: None,
        })
    }

    pub fn dispatcher(&self) -> &Dispatcher<LibraryDb> {
        self.engine.dispatcher()
    }

    pub fn set_player<F>(&mut self, hook: F)
    where
        F: Fn(&Track, &str) + Send + Sync + 'static,
    {
        self.player = Some(Arc::new(hook));
    }

    // --- directories ---

    /// Add a music directory. Returns `false` (and emits a notice) if it
    /// was already in the library.
    pub fn add_directory(&self, dir: &str) -> LibraryResult<bool> {
        let dir = dir.to_string();
        let feedback = self.feedback_tx.clone();
        self.dispatcher()
            .submit_sync("Library::add_directory", move |db: &LibraryDb| -> LibraryResult<bool> {
                let added = directories::add_directory(db.conn(), &dir)?;
                if added {
                    log::info!(target: "library", "added directory {}", dir);
                    let _ = feedback.send(LibraryFeedback::DirectoriesChanged);
                } else {
                    let _ = feedback.send(LibraryFeedback::Notice {
                        title: "Add Directory to Library".to_string(),
                        message: "This directory is already in your library.".to_string(),
                    });
                }
                Ok(added)
            })?
    }

    /// Remove a directory, treating its tracks per `removal`. Returns the
    /// number of tracks hidden or purged.
    pub fn remove_directory(&self, dir: &str, removal: RemovalType) -> LibraryResult<usize> {
        let dir = dir.to_string();
        let feedback = self.feedback_tx.clone();
        self.dispatcher()
            .submit_sync("Library::remove_directory", move |db: &LibraryDb| -> LibraryResult<usize> {
                let tx = db.transaction()?;
                let affected = match removal {
                    RemovalType::HideTracks => tracks::hide_tracks_in(&tx, &dir)?,
                    RemovalType::PurgeTracks => tracks::purge_tracks_in(&tx, &dir)?,
                    RemovalType::LeaveTracksUnchanged => 0,
                };
                let removed = directories::remove_directory(&tx, &dir)?;
                tx.commit()?;

                log::info!(
                    target: "library",
                    "removed directory {} ({:?}, {} tracks affected)",
                    dir,
                    removal,
                    affected
                );
                if removed || affected > 0 {
                    let _ = feedback.send(LibraryFeedback::DirectoriesChanged);
                }
                Ok(affected)
            })?
    }

    /// Move a directory and its tracks to a new location. Returns the ids
    /// of the tracks that moved.
    pub fn relocate_directory(&self, old_dir: &str, new_dir: &str) -> LibraryResult<Vec<TrackId>> {
        let old_dir = old_dir.to_string();
        let new_dir = new_dir.to_string();
        let feedback = self.feedback_tx.clone();
        self.dispatcher()
            .submit_sync("Library::relocate_directory", move |db: &LibraryDb| -> LibraryResult<Vec<TrackId>> {
                let tx = db.transaction()?;
                let moved = directories::relocate_directory(&tx, &old_dir, &new_dir)?;
                tx.commit()?;

                log::info!(
                    target: "library",
                    "relocated {} -> {} ({} tracks)",
                    old_dir,
                    new_dir,
                    moved.len()
                );
                let _ = feedback.send(LibraryFeedback::DirectoriesChanged);
                if !moved.is_empty() {
                    let _ = feedback.send(LibraryFeedback::TracksMoved(moved.clone()));
                }
                Ok(moved)
            })?
    }

    pub fn directories(&self) -> LibraryResult<Vec<String>> {
        self.dispatcher()
            .submit_sync("Library::directories", |db: &LibraryDb| {
                directories::directories(db.conn()).map_err(LibraryError::from)
            })?
    }

    // --- tracks ---

    pub fn add_track(&self, location: &str) -> LibraryResult<TrackId> {
        let location = location.to_string();
        self.dispatcher()
            .submit_sync("Library::add_track", move |db: &LibraryDb| {
                tracks::add_track(db.conn(), &location).map_err(LibraryError::from)
            })?
    }

    pub fn track(&self, id: TrackId) -> LibraryResult<Option<Track>> {
        self.dispatcher()
            .submit_sync("Library::track", move |db: &LibraryDb| {
                tracks::get_track(db.conn(), id).map_err(LibraryError::from)
            })?
    }

    pub fn tracks_in_directory(&self, dir: &str) -> LibraryResult<Vec<Track>> {
        let dir = dir.to_string();
        self.dispatcher()
            .submit_sync("Library::tracks_in_directory", move |db: &LibraryDb| {
                tracks::tracks_in_directory(db.conn(), &dir).map_err(LibraryError::from)
            })?
    }

    /// Resolve `location` to a library track on the worker (adding it if
    /// needed) and hand it to the player on the main thread.
    ///
    /// Returns as soon as the lookup is queued.
    pub fn load_location_to_player(&self, location: &str, group: &str) -> LibraryResult<()> {
        let location = location.to_string();
        let group = group.to_string();
        let player = self.player.clone();
        let mailbox = Arc::clone(&self.mailbox);
        let feedback = self.feedback_tx.clone();

        self.dispatcher()
            .call_async("Library::load_location_to_player", move |db: &LibraryDb| {
                let conn = db.conn();
                let track = match tracks::add_track(conn, &location)
                    .and_then(|id| tracks::get_track(conn, id))
                {
                    Ok(Some(track)) => track,
                    Ok(None) => {
                        log::warn!(target: "library", "track {} vanished while loading", location);
                        return;
                    }
                    Err(e) => {
                        log::warn!(target: "library", "could not load {}: {}", location, e);
                        return;
                    }
                };

                match player {
                    Some(player) => {
                        let posted = mailbox.post_async("Library::load_track_to_player", move || {
                            player(&track, &group)
                        });
                        if let Err(e) = posted {
                            log::warn!(target: "library", "could not hand {} to the player: {}", location, e);
                        }
                    }
                    None => {
                        let _ = feedback.send(LibraryFeedback::LoadTrack { track, group });
                    }
                }
            })?;
        Ok(())
    }

    // --- crates ---

    pub fn crates(&self) -> LibraryResult<Vec<Crate>> {
        self.dispatcher()
            .submit_sync("Library::crates", |db: &LibraryDb| {
                crates::crates(db.conn()).map_err(LibraryError::from)
            })?
    }

    pub fn crate_tracks(&self, id: CrateId) -> LibraryResult<Vec<TrackId>> {
        self.dispatcher()
            .submit_sync("Library::crate_tracks", move |db: &LibraryDb| {
                crates::tracks_in_crate(db.conn(), id).map_err(LibraryError::from)
            })?
    }

    pub fn create_crate(&self, name: &str) -> LibraryResult<CrateId> {
        let name = crate_name(name)?;
        let feedback = self.feedback_tx.clone();
        self.dispatcher()
            .submit_sync("Library::create_crate", move |db: &LibraryDb| -> LibraryResult<CrateId> {
                if crates::crate_id_by_name(db.conn(), &name)?.is_some() {
                    return Err(LibraryError::CrateExists(name));
                }
                let id = crates::create_crate(db.conn(), &name)?;
                log::info!(target: "library", "created crate {} '{}'", id, name);
                let _ = feedback.send(LibraryFeedback::CratesChanged);
                Ok(id)
            })?
    }

    pub fn rename_crate(&self, id: CrateId, name: &str) -> LibraryResult<()> {
        let name = crate_name(name)?;
        let feedback = self.feedback_tx.clone();
        self.dispatcher()
            .submit_sync("Library::rename_crate", move |db: &LibraryDb| -> LibraryResult<()> {
                let current = editable_crate(db, id)?;
                if current.name == name {
                    return Ok(());
                }
                if crates::crate_id_by_name(db.conn(), &name)?.is_some() {
                    return Err(LibraryError::CrateExists(name));
                }
                crates::rename_crate(db.conn(), id, &name)?;
                let _ = feedback.send(LibraryFeedback::CratesChanged);
                Ok(())
            })?
    }

    pub fn delete_crate(&self, id: CrateId) -> LibraryResult<()> {
        let feedback = self.feedback_tx.clone();
        self.dispatcher()
            .submit_sync("Library::delete_crate", move |db: &LibraryDb| -> LibraryResult<()> {
                editable_crate(db, id)?;
                let tx = db.transaction()?;
                crates::delete_crate(&tx, id)?;
                tx.commit()?;
                let _ = feedback.send(LibraryFeedback::CratesChanged);
                Ok(())
            })?
    }

    pub fn set_crate_locked(&self, id: CrateId, locked: bool) -> LibraryResult<()> {
        let feedback = self.feedback_tx.clone();
        self.dispatcher()
            .submit_sync("Library::set_crate_locked", move |db: &LibraryDb| -> LibraryResult<()> {
                if !crates::set_locked(db.conn(), id, locked)? {
                    return Err(LibraryError::NoSuchCrate(id));
                }
                let _ = feedback.send(LibraryFeedback::CratesChanged);
                Ok(())
            })?
    }

    /// Add tracks to an unlocked crate. Returns how many were new to it.
    pub fn add_tracks_to_crate(&self, id: CrateId, track_ids: &[TrackId]) -> LibraryResult<usize> {
        let track_ids = track_ids.to_vec();
        let feedback = self.feedback_tx.clone();
        self.dispatcher()
            .submit_sync("Library::add_tracks_to_crate", move |db: &LibraryDb| -> LibraryResult<usize> {
                editable_crate(db, id)?;
                let tx = db.transaction()?;
                let added = crates::add_tracks(&tx, id, &track_ids)?;
                tx.commit()?;
                if added > 0 {
                    let _ = feedback.send(LibraryFeedback::CratesChanged);
                }
                Ok(added)
            })?
    }

    // --- cover art ---

    pub fn save_cover_art(&self, location: &str, md5: &str) -> LibraryResult<Option<CoverArtId>> {
        let location = location.to_string();
        let md5 = md5.to_string();
        self.dispatcher()
            .submit_sync("Library::save_cover_art", move |db: &LibraryDb| {
                cover_art::save_cover_art(db.conn(), &location, &md5).map_err(LibraryError::from)
            })?
    }

    pub fn set_cover_art(&self, track: TrackId, cover: Option<CoverArtId>) -> LibraryResult<bool> {
        self.dispatcher()
            .submit_sync("Library::set_cover_art", move |db: &LibraryDb| {
                tracks::set_cover_art(db.conn(), track, cover).map_err(LibraryError::from)
            })?
    }

    /// Queue removal of cover art no track refers to.
    pub fn delete_unused_cover_art(&self) -> LibraryResult<()> {
        let feedback = self.feedback_tx.clone();
        self.dispatcher()
            .call_async("Library::delete_unused_cover_art", move |db: &LibraryDb| {
                match cover_art::delete_unused(db.conn()) {
                    Ok(count) => {
                        log::info!(target: "library", "deleted {} unused cover art rows", count);
                        let _ = feedback.send(LibraryFeedback::CoverArtPurged(count));
                    }
                    Err(e) => log::warn!(target: "library", "cover art cleanup failed: {}", e),
                }
            })?;
        Ok(())
    }

    // --- main-thread side ---

    /// Collect all pending feedback without blocking.
    pub fn drain_feedback(&self) -> Vec<LibraryFeedback> {
        let mut out = Vec::new();
        while let Ok(msg) = self.feedback_rx.try_recv() {
            out.push(msg);
        }
        out
    }

    /// Receiver for `select!`-style main loops.
    pub fn feedback_receiver(&self) -> Receiver<LibraryFeedback> {
        self.feedback_rx.clone()
    }

    /// True while any thread is blocked on a library call.
    pub fn is_busy(&self) -> bool {
        self.dispatcher().is_busy()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.engine.stats()
    }

    /// Tidy up cover art, then stop the worker with the configured policy.
    pub fn shutdown(&mut self) -> ShutdownReport {
        if !self.engine.is_shut_down() {
            if let Err(e) = self.delete_unused_cover_art() {
                log::debug!(target: "library", "skipping cover art cleanup: {}", e);
            }
        }
        self.engine.shutdown()
    }
}

fn crate_name(name: &str) -> LibraryResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LibraryError::EmptyCrateName);
    }
    Ok(name.to_string())
}

/// The crate `id`, provided it exists and is not locked.
fn editable_crate(db: &LibraryDb, id: CrateId) -> LibraryResult<Crate> {
    match crates::get_crate(db.conn(), id)? {
        None => Err(LibraryError::NoSuchCrate(id)),
        Some(c) if c.locked => Err(LibraryError::CrateLocked(id)),
        Some(c) => Ok(c),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_removal_type() {
        assert_eq!("hide".parse::<RemovalType>(), Ok(RemovalType::HideTracks));
        assert_eq!("PURGE".parse::<RemovalType>(), Ok(RemovalType::PurgeTracks));
        assert_eq!("keep".parse::<RemovalType>(), Ok(RemovalType::LeaveTracksUnchanged));
        assert!("shred".parse::<RemovalType>().is_err());
    }

    #[test]
    fn crate_names_are_trimmed() {
        assert_eq!(crate_name("  Warmup ").unwrap(), "Warmup");
        assert!(matches!(crate_name("   "), Err(LibraryError::EmptyCrateName)));
    }
}
