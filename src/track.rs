//! Track model and query filters.
//!
//! A [`Track`] is one indexed audio file. Rows are created and updated by
//! the scanner, queried by the selector and the dispatcher, and never
//! mutated by the playback session.

use std::path::PathBuf;

use serde::Serialize;

/// Database identity of a track. Stable across rescans: the store keys
/// upserts on the unique file path, so an id survives metadata updates.
pub type TrackId = i64;

/// One indexed audio file with its embedded metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    pub id: TrackId,
    pub path: PathBuf,
    /// Never empty. Falls back to a filename-derived title when tags are
    /// absent or unreadable.
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub track_no: Option<u32>,
    pub duration_secs: Option<u32>,
    /// Lowercase file extension (mp3, flac, ...).
    pub format: Option<String>,
    /// File modification time in whole seconds, used for rescan
    /// change detection.
    #[serde(skip)]
    pub mtime_secs: Option<i64>,
    /// False once the backing file has gone missing. Invalid rows stay in
    /// the store so play history keeps resolving, but they are excluded
    /// from selection.
    pub valid: bool,
}

impl Track {
    /// "Artist - Title" line for human-facing messages.
    pub fn display_line(&self) -> String {
        match self.artist.as_deref() {
            Some(artist) if !artist.is_empty() => format!("{} - {}", artist, self.title),
            _ => self.title.clone(),
        }
    }
}

/// Metadata for a file about to be inserted or refreshed by the scanner.
#[derive(Debug, Clone)]
pub struct NewTrack {
    pub path: PathBuf,
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub track_no: Option<u32>,
    pub duration_secs: Option<u32>,
    pub format: Option<String>,
    pub mtime_secs: Option<i64>,
}

/// Result ordering for [`Filter`] queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Order {
    /// Album, then track number (unknown numbers last), then title.
    Album,
    /// Title, then id as a stable tie-break.
    #[default]
    Title,
}

/// Conjunctive query description for `Store::find`.
///
/// Every populated field narrows the result further. All text matches are
/// case-insensitive; `*_like` fields match substrings.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub artist_like: Option<String>,
    /// Exact artist match (case-insensitive). Conjoins with the rest.
    pub artist_exact: Option<String>,
    pub title_like: Option<String>,
    /// Exact title match (case-insensitive).
    pub title_exact: Option<String>,
    pub album_like: Option<String>,
    /// Exact genre match (case-insensitive).
    pub genre: Option<String>,
    /// Inclusive year range.
    pub years: Option<(i32, i32)>,
    /// Include soft-deleted rows. Off by default.
    pub include_invalid: bool,
    pub order: Order,
}

impl Filter {
    pub fn by_artist(name: &str) -> Self {
        Self {
            artist_like: Some(name.to_string()),
            order: Order::Album,
            ..Self::default()
        }
    }

    pub fn by_title(title: &str) -> Self {
        Self {
            title_like: Some(title.to_string()),
            ..Self::default()
        }
    }

    pub fn by_album(album: &str) -> Self {
        Self {
            album_like: Some(album.to_string()),
            order: Order::Album,
            ..Self::default()
        }
    }

    pub fn by_genre(genre: &str) -> Self {
        Self {
            genre: Some(genre.to_string()),
            ..Self::default()
        }
    }

    /// Decade phrase already resolved to a year range, e.g. 1980..=1989.
    pub fn by_years(from: i32, to: i32) -> Self {
        Self {
            years: Some((from, to)),
            ..Self::default()
        }
    }
}
