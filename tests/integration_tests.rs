//! End-to-end tests for the dispatcher surface: scan a real temp
//! directory into a real on-disk store, then drive playback through the
//! same `Outcome`-returning operations a tool transport would call.
//!
//! The audio device is replaced by the silent output; its handle lets a
//! test pretend a track drained naturally.

use std::fs;
use std::path::PathBuf;

use serde_json::Value;
use tempfile::TempDir;

use jockey::dispatch::{Dispatcher, Outcome, Request, VolumeChange};
use jockey::player::{NullOutput, NullOutputHandle};
use jockey::selector::{Criteria, Selector};
use jockey::store::Store;

struct Harness {
    dispatcher: Dispatcher,
    output: NullOutputHandle,
    music_dir: PathBuf,
    _tmp: TempDir,
}

/// Dispatcher over a scratch music directory and an on-disk database,
/// with a deterministic selector.
fn harness(seed: u64, files: &[&str]) -> Harness {
    let tmp = TempDir::new().unwrap();
    let music_dir = tmp.path().join("music");
    fs::create_dir_all(&music_dir).unwrap();
    for name in files {
        fs::write(music_dir.join(name), b"not really audio").unwrap();
    }

    let store = Store::open(&tmp.path().join("library.db")).unwrap();
    let output = NullOutput::new();
    let handle = output.handle();
    let dispatcher = Dispatcher::new(
        store,
        Selector::seeded(seed),
        Box::new(output),
        0.7,
        music_dir.clone(),
    );

    Harness {
        dispatcher,
        output: handle,
        music_dir,
        _tmp: tmp,
    }
}

fn scanned_harness(seed: u64, files: &[&str]) -> Harness {
    let h = harness(seed, files);
    let outcome = h.dispatcher.scan_library(None);
    assert!(outcome.ok, "scan failed: {}", outcome.message);
    h
}

fn status_field(outcome: &Outcome, pointer: &str) -> Value {
    outcome
        .data
        .as_ref()
        .and_then(|data| data.pointer(pointer))
        .unwrap_or_else(|| panic!("missing {pointer} in {outcome:?}"))
        .clone()
}

fn current_title(dispatcher: &Dispatcher) -> Option<String> {
    let status = dispatcher.status();
    status
        .data
        .as_ref()
        .and_then(|data| data.pointer("/current/title"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

mod playback_scenarios {
    use super::*;

    #[test]
    fn empty_catalog_play_reports_no_match_and_stays_stopped() {
        let h = harness(1, &[]);
        let outcome = h
            .dispatcher
            .resolve_and_play(&Criteria::Artist { name: "X".into() });

        assert!(!outcome.ok);
        assert!(outcome.message.contains("no tracks match"));

        let status = h.dispatcher.status();
        assert_eq!(status_field(&status, "/state"), "stopped");
    }

    #[test]
    fn artist_play_queues_every_matching_track() {
        let h = scanned_harness(
            1,
            &[
                "Abba - One.mp3",
                "Abba - Two.mp3",
                "Abba - Three.mp3",
                "Abba - Four.mp3",
                "Abba - Five.mp3",
                "Bowie - Heroes.mp3",
            ],
        );
        let outcome = h
            .dispatcher
            .resolve_and_play(&Criteria::Artist { name: "Abba".into() });

        assert!(outcome.ok, "{}", outcome.message);
        assert_eq!(status_field(&outcome, "/queued"), 5);
        assert_eq!(status_field(&outcome, "/status/state"), "playing");
        // Without album tags, artist queues order by title; "Five" leads.
        assert_eq!(status_field(&outcome, "/status/current/title"), "Five");
        assert_eq!(status_field(&outcome, "/status/position"), 0);
    }

    #[test]
    fn pause_resume_round_trip_keeps_the_current_track() {
        let h = scanned_harness(1, &["Abba - One.mp3", "Abba - Two.mp3"]);
        h.dispatcher
            .resolve_and_play(&Criteria::Artist { name: "Abba".into() });
        let before = current_title(&h.dispatcher);

        assert!(h.dispatcher.pause().ok);
        let paused = h.dispatcher.status();
        assert_eq!(status_field(&paused, "/state"), "paused");

        assert!(h.dispatcher.resume().ok);
        let resumed = h.dispatcher.status();
        assert_eq!(status_field(&resumed, "/state"), "playing");
        assert_eq!(current_title(&h.dispatcher), before);
    }

    #[test]
    fn pause_without_playback_is_a_structured_failure() {
        let h = scanned_harness(1, &["a.mp3"]);
        let outcome = h.dispatcher.pause();
        assert!(!outcome.ok);
        assert_eq!(outcome.message, "nothing is playing");

        let resume = h.dispatcher.resume();
        assert!(!resume.ok);
        assert_eq!(resume.message, "nothing is paused");
    }

    #[test]
    fn next_walks_the_queue_and_stops_at_the_end() {
        let h = scanned_harness(1, &["A - 1.mp3", "A - 2.mp3", "A - 3.mp3"]);
        h.dispatcher
            .resolve_and_play(&Criteria::Artist { name: "A".into() });

        assert!(h.dispatcher.next().ok);
        assert!(h.dispatcher.next().ok);

        let terminal = h.dispatcher.next();
        assert!(terminal.ok);
        assert!(terminal.message.contains("end of queue"));

        let status = h.dispatcher.status();
        assert_eq!(status_field(&status, "/state"), "stopped");
        // The cursor did not wrap back to the start.
        assert_eq!(status_field(&status, "/position"), 2);
    }

    #[test]
    fn previous_at_the_first_track_is_a_noop() {
        let h = scanned_harness(1, &["A - 1.mp3", "A - 2.mp3"]);
        h.dispatcher
            .resolve_and_play(&Criteria::Artist { name: "A".into() });

        let outcome = h.dispatcher.previous();
        assert!(outcome.ok);
        assert!(outcome.message.contains("first track"));
        assert_eq!(status_field(&h.dispatcher.status(), "/position"), 0);
    }

    #[test]
    fn new_play_interrupts_current_playback() {
        let h = scanned_harness(1, &["A - 1.mp3", "B - 2.mp3"]);
        h.dispatcher
            .resolve_and_play(&Criteria::Artist { name: "A".into() });
        assert_eq!(current_title(&h.dispatcher).as_deref(), Some("1"));

        let outcome = h
            .dispatcher
            .resolve_and_play(&Criteria::Artist { name: "B".into() });
        assert!(outcome.ok);
        assert_eq!(current_title(&h.dispatcher).as_deref(), Some("2"));
        assert_eq!(status_field(&outcome, "/queued"), 1);
    }

    #[test]
    fn unplayable_file_fails_and_falls_back_to_stopped() {
        let h = scanned_harness(1, &["A - gone.mp3"]);
        fs::remove_file(h.music_dir.join("A - gone.mp3")).unwrap();

        // Still indexed (no rescan), but the output will reject it.
        let outcome = h
            .dispatcher
            .resolve_and_play(&Criteria::Artist { name: "A".into() });
        assert!(!outcome.ok);
        assert!(outcome.message.contains("playback failed"));
        assert_eq!(status_field(&h.dispatcher.status(), "/state"), "stopped");
    }

    #[test]
    fn natural_completion_advances_at_the_next_command() {
        let h = scanned_harness(1, &["A - 1.mp3", "A - 2.mp3"]);
        h.dispatcher
            .resolve_and_play(&Criteria::Artist { name: "A".into() });

        h.output.finish_current();
        let status = h.dispatcher.status();
        assert_eq!(status_field(&status, "/state"), "playing");
        assert_eq!(status_field(&status, "/position"), 1);
    }
}

mod volume_and_seek {
    use super::*;

    #[test]
    fn set_volume_clamps_both_ways() {
        let h = harness(1, &[]);
        let outcome = h.dispatcher.set_volume(VolumeChange::Set(1.5));
        assert!(outcome.ok);
        assert_eq!(status_field(&outcome, "/volume"), 1.0);
        assert_eq!(h.output.volume(), 1.0);

        let outcome = h.dispatcher.set_volume(VolumeChange::Set(-0.2));
        assert_eq!(status_field(&outcome, "/volume"), 0.0);
        assert_eq!(h.output.volume(), 0.0);
    }

    #[test]
    fn volume_steps_move_by_a_tenth() {
        let h = harness(1, &[]);
        h.dispatcher.set_volume(VolumeChange::Set(0.5));
        let up = h.dispatcher.set_volume(VolumeChange::Up);
        assert!((status_field(&up, "/volume").as_f64().unwrap() - 0.6).abs() < 1e-6);

        let down = h.dispatcher.set_volume(VolumeChange::Down);
        assert!((status_field(&down, "/volume").as_f64().unwrap() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn seek_requires_active_playback() {
        let h = scanned_harness(1, &["a.mp3"]);
        let outcome = h.dispatcher.seek(30.0);
        assert!(!outcome.ok);
        assert_eq!(outcome.message, "nothing is playing");
    }
}

mod library_and_selection {
    use super::*;

    #[test]
    fn scan_then_rescan_is_idempotent() {
        let h = harness(1, &["A - 1.mp3", "B - 2.flac"]);
        let first = h.dispatcher.scan_library(None);
        assert!(first.ok);
        assert_eq!(status_field(&first, "/added"), 2);

        let second = h.dispatcher.scan_library(None);
        assert!(second.ok);
        assert_eq!(status_field(&second, "/added"), 0);
        assert_eq!(status_field(&second, "/updated"), 0);
        assert_eq!(status_field(&second, "/removed"), 0);
    }

    #[test]
    fn deleted_file_disappears_from_selection_after_rescan() {
        let h = scanned_harness(1, &["A - stays.mp3", "B - goes.mp3"]);
        fs::remove_file(h.music_dir.join("B - goes.mp3")).unwrap();

        let rescan = h.dispatcher.scan_library(None);
        assert_eq!(status_field(&rescan, "/removed"), 1);

        let outcome = h
            .dispatcher
            .resolve_and_play(&Criteria::Artist { name: "B".into() });
        assert!(!outcome.ok);

        // Random selection can only ever land on the surviving track.
        for _ in 0..10 {
            let outcome = h.dispatcher.resolve_and_play(&Criteria::Random);
            assert_eq!(status_field(&outcome, "/status/current/title"), "stays");
        }
    }

    #[test]
    fn listings_and_search_reflect_the_catalog() {
        let h = scanned_harness(
            1,
            &["Miles Davis - So What.mp3", "Prince - Kiss.mp3", "Prince - 1999.mp3"],
        );

        let artists = h.dispatcher.list_artists(20);
        assert!(artists.ok);
        assert_eq!(
            artists.data.unwrap(),
            serde_json::json!(["Miles Davis", "Prince"])
        );

        let search = h.dispatcher.search("prince");
        assert!(search.ok);
        assert_eq!(search.data.unwrap().as_array().unwrap().len(), 2);

        let none = h.dispatcher.search("coltrane");
        assert!(none.ok);
        assert_eq!(none.message, "0 match(es)");
    }

    #[test]
    fn recommendation_avoids_the_freshly_completed_track() {
        let h = scanned_harness(5, &["A - first.mp3", "B - second.mp3", "C - third.mp3"]);
        h.dispatcher
            .resolve_and_play(&Criteria::Title { title: "first".into() });

        // Let the single-track queue drain; the next command observes it.
        h.output.finish_current();
        let status = h.dispatcher.status();
        assert_eq!(status_field(&status, "/state"), "stopped");

        let outcome = h.dispatcher.resolve_and_play(&Criteria::Recommend);
        assert!(outcome.ok, "{}", outcome.message);
        assert_eq!(status_field(&outcome, "/queued"), 2);
        assert_ne!(status_field(&outcome, "/status/current/title"), "first");
    }

    #[test]
    fn preferences_summarize_listening_history() {
        let h = scanned_harness(1, &["Abba - One.mp3", "Abba - Two.mp3", "Zappa - Z.mp3"]);
        h.dispatcher
            .resolve_and_play(&Criteria::Artist { name: "Abba".into() });
        h.dispatcher.next();

        let outcome = h.dispatcher.preferences();
        assert!(outcome.ok);
        assert_eq!(status_field(&outcome, "/top_artists/0"), "Abba");
    }
}

mod serve_wire_format {
    use super::*;

    #[test]
    fn requests_drive_the_dispatcher_end_to_end() {
        let h = scanned_harness(1, &["A - 1.mp3"]);

        let play: Request = serde_json::from_str(
            r#"{"op":"play","criteria":{"kind":"artist","name":"A"}}"#,
        )
        .unwrap();
        assert!(h.dispatcher.handle(&play).ok);

        let status: Request = serde_json::from_str(r#"{"op":"status"}"#).unwrap();
        let outcome = h.dispatcher.handle(&status);
        assert_eq!(status_field(&outcome, "/state"), "playing");

        let stop: Request = serde_json::from_str(r#"{"op":"stop"}"#).unwrap();
        assert!(h.dispatcher.handle(&stop).ok);
    }

    #[test]
    fn outcomes_serialize_to_the_documented_envelope() {
        let h = harness(1, &[]);
        let outcome = h.dispatcher.stop();
        let wire = serde_json::to_value(&outcome).unwrap();
        assert_eq!(wire.get("ok"), Some(&Value::Bool(true)));
        assert!(wire.get("message").is_some());
    }
}
