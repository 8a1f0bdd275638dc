//! Command dispatcher.
//!
//! One method per user-facing command family. Every method returns a
//! structured [`Outcome`]; failures become `ok: false` with a readable
//! message, never an error escaping the boundary. Transport commands
//! serialize on the session mutex, so two overlapping calls execute one
//! after the other in lock-acquisition order. Scans touch only the
//! store and can run while music keeps playing.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{error, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::player::AudioOutput;
use crate::scanner;
use crate::selector::{preference_summary, Criteria, SelectError, Selector};
use crate::session::{PlaybackSession, SessionError};
use crate::store::Store;
use crate::track::{Filter, Track};

/// Step size used by relative volume changes.
const VOLUME_STEP: f32 = 0.1;

/// Cap on search results, matching what a conversational caller can use.
const SEARCH_LIMIT: usize = 20;

/// Structured result of one dispatched command.
#[derive(Debug, Serialize)]
pub struct Outcome {
    pub ok: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Outcome {
    pub fn success(message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            ok: true,
            message: message.into(),
            data,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            data: None,
        }
    }
}

/// Volume request: an absolute value or a relative step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeChange {
    Up,
    Down,
    Set(f32),
}

/// Wire shape of one request, as the stdio front-end receives it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Play { criteria: Criteria },
    Pause,
    Resume,
    Stop,
    Next,
    Previous,
    SetVolume { volume: VolumeChange },
    Seek { position: f64 },
    Status,
    ListArtists { limit: Option<usize> },
    ListGenres { limit: Option<usize> },
    Search { query: String },
    Preferences,
    Scan { path: Option<PathBuf> },
}

struct Inner {
    selector: Selector,
    session: PlaybackSession,
}

/// The dispatcher: owns the store, the selector and the one playback
/// session of this process.
pub struct Dispatcher {
    store: Store,
    inner: Mutex<Inner>,
    music_dir: PathBuf,
}

impl Dispatcher {
    pub fn new(
        store: Store,
        selector: Selector,
        output: Box<dyn AudioOutput>,
        default_volume: f32,
        music_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            inner: Mutex::new(Inner {
                selector,
                session: PlaybackSession::new(output, default_volume),
            }),
            music_dir,
        }
    }

    /// Route one deserialized request.
    pub fn handle(&self, request: &Request) -> Outcome {
        match request {
            Request::Play { criteria } => self.resolve_and_play(criteria),
            Request::Pause => self.pause(),
            Request::Resume => self.resume(),
            Request::Stop => self.stop(),
            Request::Next => self.next(),
            Request::Previous => self.previous(),
            Request::SetVolume { volume } => self.set_volume(*volume),
            Request::Seek { position } => self.seek(*position),
            Request::Status => self.status(),
            Request::ListArtists { limit } => self.list_artists(limit.unwrap_or(20)),
            Request::ListGenres { limit } => self.list_genres(limit.unwrap_or(20)),
            Request::Search { query } => self.search(query),
            Request::Preferences => self.preferences(),
            Request::Scan { path } => self.scan_library(path.as_deref()),
        }
    }

    /// Resolve criteria into a queue and start playing it.
    pub fn resolve_and_play(&self, criteria: &Criteria) -> Outcome {
        let mut inner = self.lock();
        self.observe_completion(&mut inner);

        let Inner { selector, session } = &mut *inner;
        let tracks = match selector.resolve(criteria, &self.store, session.history()) {
            Ok(tracks) => tracks,
            Err(SelectError::NoMatch) => {
                return Outcome::failure("no tracks match the requested criteria");
            }
            Err(SelectError::Store(err)) => {
                error!("selection failed: {err:#}");
                return Outcome::failure(format!("library lookup failed: {err}"));
            }
        };

        let queued = tracks.len();
        match session.load_and_play(tracks) {
            Ok(first) => Outcome::success(
                format!("now playing {} ({queued} queued)", first.display_line()),
                Some(json!({
                    "queued": queued,
                    "status": session.status(),
                })),
            ),
            Err(err) => playback_failure(err),
        }
    }

    pub fn pause(&self) -> Outcome {
        let mut inner = self.lock();
        self.observe_completion(&mut inner);
        match inner.session.pause() {
            Ok(()) => Outcome::success("paused", None),
            Err(err) => playback_failure(err),
        }
    }

    pub fn resume(&self) -> Outcome {
        let mut inner = self.lock();
        self.observe_completion(&mut inner);
        match inner.session.resume() {
            Ok(()) => Outcome::success("resumed", None),
            Err(err) => playback_failure(err),
        }
    }

    pub fn stop(&self) -> Outcome {
        let mut inner = self.lock();
        self.observe_completion(&mut inner);
        inner.session.stop();
        Outcome::success("stopped", None)
    }

    pub fn next(&self) -> Outcome {
        let mut inner = self.lock();
        self.observe_completion(&mut inner);
        match inner.session.next() {
            Ok(Some(track)) => now_playing(track, &inner.session),
            Ok(None) => Outcome::success("end of queue, stopped", None),
            Err(err) => playback_failure(err),
        }
    }

    pub fn previous(&self) -> Outcome {
        let mut inner = self.lock();
        self.observe_completion(&mut inner);
        match inner.session.previous() {
            Ok(Some(track)) => now_playing(track, &inner.session),
            Ok(None) => Outcome::success("already at the first track", None),
            Err(err) => playback_failure(err),
        }
    }

    pub fn set_volume(&self, change: VolumeChange) -> Outcome {
        let mut inner = self.lock();
        self.observe_completion(&mut inner);
        let current = inner.session.volume();
        let target = match change {
            VolumeChange::Up => current + VOLUME_STEP,
            VolumeChange::Down => current - VOLUME_STEP,
            VolumeChange::Set(volume) => volume,
        };
        let applied = inner.session.set_volume(target);
        Outcome::success(
            format!("volume {}%", (applied * 100.0).round() as u32),
            Some(json!({ "volume": applied })),
        )
    }

    pub fn seek(&self, position_secs: f64) -> Outcome {
        let mut inner = self.lock();
        self.observe_completion(&mut inner);
        match inner.session.seek(position_secs) {
            Ok(position) => Outcome::success(
                format!("seeked to {}", format_timestamp(position)),
                Some(json!({ "position": position })),
            ),
            Err(err) => playback_failure(err),
        }
    }

    /// Snapshot of the playback state. Always succeeds.
    pub fn status(&self) -> Outcome {
        let mut inner = self.lock();
        self.observe_completion(&mut inner);
        let status = inner.session.status();
        let message = match &status.current {
            Some(current) => format!("{}: {}", state_label(status.state), current.title),
            None => "nothing is playing".to_string(),
        };
        Outcome::success(message, Some(json!(status)))
    }

    pub fn list_artists(&self, limit: usize) -> Outcome {
        match self.store.artists() {
            Ok(mut artists) => {
                artists.truncate(limit);
                Outcome::success(
                    format!("{} artist(s)", artists.len()),
                    Some(json!(artists)),
                )
            }
            Err(err) => store_failure("listing artists", err),
        }
    }

    pub fn list_genres(&self, limit: usize) -> Outcome {
        match self.store.genres() {
            Ok(mut genres) => {
                genres.truncate(limit);
                Outcome::success(format!("{} genre(s)", genres.len()), Some(json!(genres)))
            }
            Err(err) => store_failure("listing genres", err),
        }
    }

    /// Free-text search across titles and artists, deduplicated.
    pub fn search(&self, query: &str) -> Outcome {
        let by_title = match self.store.find(&Filter::by_title(query)) {
            Ok(tracks) => tracks,
            Err(err) => return store_failure("searching", err),
        };
        let by_artist = match self.store.find(&Filter::by_artist(query)) {
            Ok(tracks) => tracks,
            Err(err) => return store_failure("searching", err),
        };

        let mut results: Vec<Track> = Vec::new();
        for track in by_title.into_iter().chain(by_artist) {
            if results.len() == SEARCH_LIMIT {
                break;
            }
            if results.iter().all(|seen| seen.id != track.id) {
                results.push(track);
            }
        }
        Outcome::success(format!("{} match(es)", results.len()), Some(json!(results)))
    }

    /// Listening-taste summary derived from the history ring.
    pub fn preferences(&self) -> Outcome {
        let inner = self.lock();
        match preference_summary(inner.session.history(), &self.store) {
            Ok(summary) => {
                let message = match summary.top_artists.first() {
                    Some(artist) => format!("mostly listening to {artist}"),
                    None => "no listening history yet".to_string(),
                };
                Outcome::success(message, Some(json!(summary)))
            }
            Err(err) => store_failure("summarizing preferences", err),
        }
    }

    /// Scan the music directory (or an explicit path) into the store.
    /// Does not touch the session; playback keeps running.
    pub fn scan_library(&self, path: Option<&Path>) -> Outcome {
        let root = path.unwrap_or(&self.music_dir);
        match scanner::scan(root, &self.store) {
            Ok(report) => Outcome::success(
                format!("scan complete: {}", report.summary()),
                Some(json!(report)),
            ),
            Err(err) => store_failure("scanning", err),
        }
    }

    /// Observe natural end-of-track outside any command. The serve loop
    /// polls this from a ticker thread so a drained track advances even
    /// while the caller is quiet.
    pub fn poll_completion(&self) {
        let mut inner = self.lock();
        self.observe_completion(&mut inner);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Natural end-of-track is observed at command boundaries. A failure
    /// to advance (the next file became unplayable) leaves the session
    /// stopped; that is already the documented fallback, so it is logged
    /// rather than surfaced through an unrelated command.
    fn observe_completion(&self, inner: &mut Inner) {
        if let Err(err) = inner.session.advance_if_finished() {
            warn!("auto-advance failed: {err}");
        }
    }
}

fn now_playing(track: Track, session: &PlaybackSession) -> Outcome {
    Outcome::success(
        format!("now playing {}", track.display_line()),
        Some(json!({ "status": session.status() })),
    )
}

fn playback_failure(err: SessionError) -> Outcome {
    match &err {
        SessionError::InvalidTransition(_) | SessionError::EmptyQueue => {
            Outcome::failure(err.to_string())
        }
        SessionError::Playback(cause) => Outcome::failure(format!("playback failed: {cause}")),
    }
}

fn store_failure(action: &str, err: anyhow::Error) -> Outcome {
    error!("{action} failed: {err:#}");
    Outcome::failure(format!("{action} failed: {err}"))
}

fn state_label(state: crate::session::Transport) -> &'static str {
    match state {
        crate::session::Transport::Stopped => "stopped",
        crate::session::Transport::Playing => "playing",
        crate::session::Transport::Paused => "paused",
    }
}

fn format_timestamp(seconds: f64) -> String {
    let total = seconds.round() as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}
