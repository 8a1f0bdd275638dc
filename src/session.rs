//! Playback session state machine.
//!
//! Owns the queue, the cursor, the transport state, the volume and the
//! play history, and is the only component that touches the audio output.
//! Exactly one session exists per process; the dispatcher wraps it in a
//! mutex so transitions serialize instead of interleaving.
//!
//! Transitions: Stopped -> Playing -> Paused -> Playing -> Stopped, with
//! stop valid from anywhere and a new `load_and_play` interrupting
//! whatever is current. `next` at the end of the queue stops; it never
//! wraps. `previous` at the first track is a no-op.

use std::time::Duration;

use log::{debug, info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::history::PlayHistory;
use crate::player::{AudioOutput, OutputError};
use crate::track::{Track, TrackId};

/// Transport state. The session struct around it is the single source of
/// truth for "what is happening now".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    Stopped,
    Playing,
    Paused,
}

#[derive(Debug, Error)]
pub enum SessionError {
    /// The requested transition is not valid in the current state. Soft:
    /// the state is left untouched and the message explains why.
    #[error("{0}")]
    InvalidTransition(&'static str),
    /// `load_and_play` was handed an empty queue.
    #[error("refusing to start playback of an empty queue")]
    EmptyQueue,
    /// The audio primitive rejected the file. The session has already
    /// fallen back to `Stopped`.
    #[error(transparent)]
    Playback(#[from] OutputError),
}

/// Serializable snapshot of the playback state.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub state: Transport,
    pub current: Option<CurrentTrack>,
    pub volume: f32,
    pub queue_len: usize,
    /// Zero-based position of the current track in the queue.
    pub position: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CurrentTrack {
    pub id: TrackId,
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
}

pub struct PlaybackSession {
    output: Box<dyn AudioOutput>,
    state: Transport,
    queue: Vec<Track>,
    /// Valid index into `queue`, or `None` while the queue is empty.
    /// Preserved across `stop` so `next` can pick up where playback left
    /// off.
    cursor: Option<usize>,
    volume: f32,
    history: PlayHistory,
}

impl PlaybackSession {
    pub fn new(mut output: Box<dyn AudioOutput>, default_volume: f32) -> Self {
        let volume = default_volume.clamp(0.0, 1.0);
        output.set_volume(volume);
        Self {
            output,
            state: Transport::Stopped,
            queue: Vec::new(),
            cursor: None,
            volume,
            history: PlayHistory::new(),
        }
    }

    /// Replace the queue and start playing its first track. Interrupts
    /// any current playback.
    pub fn load_and_play(&mut self, tracks: Vec<Track>) -> Result<Track, SessionError> {
        if tracks.is_empty() {
            return Err(SessionError::EmptyQueue);
        }
        self.output.stop();
        self.queue = tracks;
        self.cursor = Some(0);
        self.load_current()?;
        Ok(self.queue[0].clone())
    }

    /// Valid only while Playing.
    pub fn pause(&mut self) -> Result<(), SessionError> {
        match self.state {
            Transport::Playing => {
                self.output.pause();
                self.state = Transport::Paused;
                debug!("paused");
                Ok(())
            }
            Transport::Paused => Err(SessionError::InvalidTransition("already paused")),
            Transport::Stopped => Err(SessionError::InvalidTransition("nothing is playing")),
        }
    }

    /// Valid only while Paused.
    pub fn resume(&mut self) -> Result<(), SessionError> {
        match self.state {
            Transport::Paused => {
                self.output.resume();
                self.state = Transport::Playing;
                debug!("resumed");
                Ok(())
            }
            Transport::Playing => Err(SessionError::InvalidTransition("already playing")),
            Transport::Stopped => Err(SessionError::InvalidTransition("nothing is paused")),
        }
    }

    /// Valid from any state. Releases the output and clears the current
    /// track; the queue and cursor survive.
    pub fn stop(&mut self) {
        self.output.stop();
        self.state = Transport::Stopped;
        debug!("stopped");
    }

    /// Advance to the next queued track. At the end of the queue the
    /// session stops; there is no wrap-around.
    pub fn next(&mut self) -> Result<Option<Track>, SessionError> {
        let Some(cursor) = self.cursor else {
            return Err(SessionError::InvalidTransition("the queue is empty"));
        };
        if cursor + 1 >= self.queue.len() {
            info!("end of queue reached");
            self.stop();
            return Ok(None);
        }
        self.cursor = Some(cursor + 1);
        self.load_current()?;
        Ok(Some(self.queue[cursor + 1].clone()))
    }

    /// Step back one queued track. At the first track this is a no-op.
    pub fn previous(&mut self) -> Result<Option<Track>, SessionError> {
        let Some(cursor) = self.cursor else {
            return Err(SessionError::InvalidTransition("the queue is empty"));
        };
        if cursor == 0 {
            return Ok(None);
        }
        self.cursor = Some(cursor - 1);
        self.load_current()?;
        Ok(Some(self.queue[cursor - 1].clone()))
    }

    /// Seek within the current track. Clamped to the track duration when
    /// known; returns the effective position in seconds.
    pub fn seek(&mut self, position_secs: f64) -> Result<f64, SessionError> {
        if self.state == Transport::Stopped {
            return Err(SessionError::InvalidTransition("nothing is playing"));
        }
        let mut position = position_secs.max(0.0);
        if let Some(limit) = self.current_track().and_then(|track| track.duration_secs) {
            position = position.min(f64::from(limit));
        }
        self.output.seek(Duration::from_secs_f64(position));
        Ok(position)
    }

    /// Clamp and apply the volume. Valid in any state and persisted as
    /// the default for subsequent loads.
    pub fn set_volume(&mut self, volume: f32) -> f32 {
        self.volume = volume.clamp(0.0, 1.0);
        self.output.set_volume(self.volume);
        self.volume
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn history(&self) -> &PlayHistory {
        &self.history
    }

    /// The track loaded right now. `None` while stopped even if the
    /// cursor still points somewhere.
    pub fn current_track(&self) -> Option<&Track> {
        if self.state == Transport::Stopped {
            return None;
        }
        self.cursor.and_then(|cursor| self.queue.get(cursor))
    }

    /// Snapshot of the playback state. Never blocks on the output and
    /// never fails.
    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            state: self.state,
            current: self.current_track().map(|track| CurrentTrack {
                id: track.id,
                title: track.title.clone(),
                artist: track.artist.clone(),
                album: track.album.clone(),
            }),
            volume: self.volume,
            queue_len: self.queue.len(),
            position: self.cursor,
        }
    }

    /// Observe natural end-of-track. When the playing track has drained,
    /// its history entry is marked completed and playback moves on to the
    /// next queued track, or stops at the end of the queue. Invoked at
    /// every command boundary; does nothing in any other state.
    pub fn advance_if_finished(&mut self) -> Result<(), SessionError> {
        if self.state != Transport::Playing || !self.output.finished() {
            return Ok(());
        }
        self.history.mark_last_completed();
        let cursor = self.cursor.unwrap_or(0);
        if cursor + 1 < self.queue.len() {
            debug!("track finished naturally, advancing");
            self.cursor = Some(cursor + 1);
            self.load_current()?;
        } else {
            info!("queue finished");
            self.stop();
        }
        Ok(())
    }

    /// Load the track under the cursor and start it. On output failure
    /// the session falls back to Stopped and the error propagates; no
    /// history entry is recorded for a track that never started.
    fn load_current(&mut self) -> Result<(), SessionError> {
        let track = self.cursor.and_then(|cursor| self.queue.get(cursor)).ok_or(
            SessionError::InvalidTransition("the queue cursor points nowhere"),
        )?;
        let (id, path, line) = (track.id, track.path.clone(), track.display_line());

        if let Err(err) = self.output.load(&path) {
            warn!("failed to load {}: {err}", path.display());
            self.output.stop();
            self.state = Transport::Stopped;
            return Err(err.into());
        }
        self.output.play();
        self.state = Transport::Playing;
        self.history.record_start(id);
        info!("now playing {line}");
        Ok(())
    }
}
