use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::select;
use trackdb_dispatch::MainThreadMailbox;
use trackdb_library::{
    Config, CrateId, Library, LibraryError, LibraryFeedback, RemovalType, TrackId,
};

const USAGE: &str = "usage: trackdb [--verbose] [--db PATH] <command> [args]

commands:
  dirs                          list library directories
  add-dir DIR                   add a music directory
  remove-dir DIR [hide|purge|keep]
  relocate OLD NEW              move a directory and its tracks
  add-track LOCATION
  crates                        list crates
  create-crate NAME
  rename-crate ID NAME
  delete-crate ID
  lock-crate ID | unlock-crate ID
  crate-add ID TRACK_ID...
  cover LOCATION MD5            register cover art
  purge-covers                  delete unreferenced cover art
  load LOCATION GROUP           resolve a track and load it into a player";

/// How long the main loop waits for background work to report back.
const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

fn init_logging(verbose: bool) {
    use simplelog::{LevelFilter, WriteLogger};

    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Warn };

    let log_path = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("trackdb")
        .join("trackdb.log");

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = match File::create(&log_path).or_else(|_| File::create("/tmp/trackdb.log")) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("trackdb: logging disabled: {}", e);
            return;
        }
    };

    if WriteLogger::init(log_level, simplelog::Config::default(), log_file).is_err() {
        eprintln!("trackdb: logger already initialised");
        return;
    }

    log::info!("trackdb starting (log level: {:?})", log_level);
}

enum CliError {
    Usage(String),
    Library(LibraryError),
}

impl From<LibraryError> for CliError {
    fn from(e: LibraryError) -> Self {
        CliError::Library(e)
    }
}

type CliResult<T = ()> = Result<T, CliError>;

/// Background work the main loop should wait for before exiting.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Await {
    Nothing,
    PlayerLoad,
    CoverPurge,
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let verbose = args.iter().any(|a| a == "--verbose" || a == "-v");
    init_logging(verbose);

    let db_arg = args
        .iter()
        .position(|a| a == "--db")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from);
    let command: Vec<&str> = {
        let mut rest = Vec::new();
        let mut skip_next = false;
        for arg in &args {
            if skip_next {
                skip_next = false;
            } else if arg == "--db" {
                skip_next = true;
            } else if arg != "--verbose" && arg != "-v" {
                rest.push(arg.as_str());
            }
        }
        rest
    };
    if command.is_empty() || command[0] == "--help" || command[0] == "-h" {
        println!("{}", USAGE);
        return ExitCode::SUCCESS;
    }

    let config = Config::load();
    let db_path = db_arg
        .or_else(|| config.database_path())
        .unwrap_or_else(|| PathBuf::from(config.database_name()));
    let dispatch = config.dispatch();

    let mailbox = Arc::new(MainThreadMailbox::from_config(&dispatch));
    let mut library = match Library::open(&db_path, dispatch, &mailbox) {
        Ok(library) => library,
        Err(e) => {
            eprintln!("trackdb: could not open {}: {}", db_path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let loaded = Arc::new(AtomicBool::new(false));
    {
        let loaded = Arc::clone(&loaded);
        library.set_player(move |track, group| {
            println!("loading {} (track {}) into {}", track.location, track.id, group);
            loaded.store(true, Ordering::SeqCst);
        });
    }

    let outcome = run(&library, &command).map(|waiting| {
        pump_events(&library, &mailbox, waiting, &loaded);
    });

    for event in library.drain_feedback() {
        report(&event);
    }
    let summary = library.shutdown();
    log::info!(
        "library closed: {} tasks executed, {} discarded",
        summary.executed,
        summary.discarded
    );

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Usage(msg)) => {
            eprintln!("trackdb: {}\n\n{}", msg, USAGE);
            ExitCode::from(2)
        }
        Err(CliError::Library(e)) => {
            eprintln!("trackdb: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(library: &Library, command: &[&str]) -> CliResult<Await> {
    match command {
        ["dirs"] => {
            for dir in library.directories()? {
                println!("{}", dir);
            }
        }
        ["add-dir", dir] => {
            if library.add_directory(dir)? {
                println!("added {}", dir);
            }
        }
        ["remove-dir", dir] => {
            let affected = library.remove_directory(dir, RemovalType::default())?;
            println!("removed {} ({} tracks hidden)", dir, affected);
        }
        ["remove-dir", dir, removal] => {
            let removal = removal.parse::<RemovalType>().map_err(CliError::Usage)?;
            let affected = library.remove_directory(dir, removal)?;
            println!("removed {} ({} tracks affected)", dir, affected);
        }
        ["relocate", old_dir, new_dir] => {
            let moved = library.relocate_directory(old_dir, new_dir)?;
            println!("relocated {} -> {} ({} tracks moved)", old_dir, new_dir, moved.len());
        }
        ["add-track", location] => {
            let id = library.add_track(location)?;
            println!("{}\t{}", id, location);
        }
        ["crates"] => {
            for c in library.crates()? {
                let lock = if c.locked { " [locked]" } else { "" };
                println!("{}\t{}\t{} tracks{}", c.id, c.name, c.track_count, lock);
            }
        }
        ["create-crate", name] => {
            let id = library.create_crate(name)?;
            println!("created crate {} '{}'", id, name.trim());
        }
        ["rename-crate", id, name] => library.rename_crate(parse_crate(id)?, name)?,
        ["delete-crate", id] => library.delete_crate(parse_crate(id)?)?,
        ["lock-crate", id] => library.set_crate_locked(parse_crate(id)?, true)?,
        ["unlock-crate", id] => library.set_crate_locked(parse_crate(id)?, false)?,
        ["crate-add", id, tracks @ ..] if !tracks.is_empty() => {
            let tracks = tracks
                .iter()
                .map(|t| parse_id(t).map(TrackId))
                .collect::<CliResult<Vec<_>>>()?;
            let added = library.add_tracks_to_crate(parse_crate(id)?, &tracks)?;
            println!("added {} tracks", added);
        }
        ["cover", location, md5] => match library.save_cover_art(location, md5)? {
            Some(id) => println!("cover art {}", id),
            None => println!("cover art without a hash is not stored"),
        },
        ["purge-covers"] => {
            library.delete_unused_cover_art()?;
            return Ok(Await::CoverPurge);
        }
        ["load", location, group] => {
            library.load_location_to_player(location, group)?;
            return Ok(Await::PlayerLoad);
        }
        _ => return Err(CliError::Usage(format!("unrecognised command: {}", command.join(" ")))),
    }
    Ok(Await::Nothing)
}

/// Main loop: run mailbox callbacks and print feedback until `waiting` is
/// satisfied or the timeout passes.
fn pump_events(library: &Library, mailbox: &MainThreadMailbox, waiting: Await, loaded: &AtomicBool) {
    if waiting == Await::Nothing {
        return;
    }
    let wake = mailbox.wake_receiver();
    let feedback = library.feedback_receiver();
    let deadline = Instant::now() + EVENT_TIMEOUT;

    loop {
        let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
            log::warn!("timed out waiting for the library worker");
            eprintln!("trackdb: timed out waiting for the library");
            return;
        };
        select! {
            recv(wake) -> _ => {
                mailbox.run_pending();
                if waiting == Await::PlayerLoad && loaded.load(Ordering::SeqCst) {
                    return;
                }
            }
            recv(feedback) -> event => {
                let Ok(event) = event else { return };
                report(&event);
                match (&event, waiting) {
                    (LibraryFeedback::CoverArtPurged(_), Await::CoverPurge) => return,
                    (LibraryFeedback::LoadTrack { .. }, Await::PlayerLoad) => return,
                    _ => {}
                }
            }
            default(remaining) => {}
        }
    }
}

fn report(event: &LibraryFeedback) {
    match event {
        LibraryFeedback::Notice { title, message } => println!("{}: {}", title, message),
        LibraryFeedback::TracksMoved(ids) => log::info!("{} tracks moved", ids.len()),
        LibraryFeedback::CoverArtPurged(count) => println!("deleted {} unused cover art entries", count),
        LibraryFeedback::LoadTrack { track, group } => {
            println!("no player attached for {} ({})", group, track.location)
        }
        LibraryFeedback::DirectoriesChanged | LibraryFeedback::CratesChanged => {
            log::debug!("library changed: {:?}", event)
        }
    }
}

fn parse_id(s: &str) -> CliResult<i64> {
    s.parse::<i64>()
        .map_err(|_| CliError::Usage(format!("not a numeric id: {}", s)))
}

fn parse_crate(s: &str) -> CliResult<CrateId> {
    parse_id(s).map(CrateId)
}
