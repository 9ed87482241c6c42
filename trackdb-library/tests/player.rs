mod common;

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use common::{memory_library, wait_for_feedback, TIMEOUT};
use trackdb_library::LibraryFeedback;

#[test]
fn loaded_track_reaches_the_player_on_the_main_thread() {
    let (mut library, mailbox) = memory_library();
    let loads = Arc::new(Mutex::new(Vec::new()));
    {
        let loads = Arc::clone(&loads);
        library.set_player(move |track, group| {
            loads
                .lock()
                .unwrap()
                .push((track.location.clone(), group.to_string(), thread::current().id()));
        });
    }

    library
        .load_location_to_player("/music/a.flac", "[Channel1]")
        .unwrap();

    let main = thread::current().id();
    let deadline = std::time::Instant::now() + TIMEOUT;
    while loads.lock().unwrap().is_empty() && std::time::Instant::now() < deadline {
        mailbox.pump_for(Duration::from_millis(10));
    }

    let loads = loads.lock().unwrap();
    assert_eq!(
        *loads,
        vec![("/music/a.flac".to_string(), "[Channel1]".to_string(), main)]
    );
}

#[test]
fn without_a_player_the_load_becomes_feedback() {
    let (library, _mailbox) = memory_library();
    library
        .load_location_to_player("/music/b.flac", "[Channel2]")
        .unwrap();

    match wait_for_feedback(&library, |f| matches!(f, LibraryFeedback::LoadTrack { .. })) {
        Some(LibraryFeedback::LoadTrack { track, group }) => {
            assert_eq!(track.location, "/music/b.flac");
            assert_eq!(track.filename, "b.flac");
            assert_eq!(group, "[Channel2]");
        }
        other => panic!("expected LoadTrack, got {:?}", other),
    }
}
