//! Library scanner.
//!
//! Walks a music directory, extracts embedded tags and reconciles the
//! result against the track store. Unreadable tags fall back to a
//! deterministic filename parse so repeated scans stay idempotent; files
//! that cannot be opened at all are reported, never fatal. Tag extraction
//! fans out across a rayon pool, store writes stay serial and atomic per
//! record, so an interrupted scan leaves every committed row whole.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::Accessor;
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::Serialize;
use walkdir::WalkDir;

use crate::store::Store;
use crate::track::NewTrack;

/// Audio file extensions the scanner indexes.
pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["mp3", "flac", "wav", "m4a", "ogg"];

/// Delimiter for the filename fallback: "Artist - Title.mp3".
const STEM_DELIMITER: &str = " - ";

/// Summary of one reconciling scan.
#[derive(Debug, Default, Serialize)]
pub struct ScanReport {
    /// Files indexed for the first time.
    pub added: usize,
    /// Known files re-read because their mtime changed (or because they
    /// had been marked invalid and reappeared).
    pub updated: usize,
    /// Indexed files no longer on disk, now soft-deleted.
    pub removed: usize,
    /// Files that could not be opened during this scan. The scan
    /// continues past them.
    pub invalid: Vec<PathBuf>,
}

impl ScanReport {
    /// True when the scan changed nothing in the store.
    pub fn is_noop(&self) -> bool {
        self.added == 0 && self.updated == 0 && self.removed == 0
    }

    pub fn summary(&self) -> String {
        format!(
            "{} added, {} updated, {} removed, {} unreadable",
            self.added,
            self.updated,
            self.removed,
            self.invalid.len()
        )
    }
}

/// Scan `root` and reconcile the store with what is on disk.
pub fn scan(root: &Path, store: &Store) -> Result<ScanReport> {
    info!("scanning music directory {}", root.display());
    let mut report = ScanReport::default();

    let known: HashMap<PathBuf, (i64, Option<i64>, bool)> = store
        .index_snapshot()
        .context("failed to load the track index for reconciliation")?
        .into_iter()
        .map(|(id, path, mtime, valid)| (path, (id, mtime, valid)))
        .collect();

    // Phase 1: walk the tree and stat every candidate file.
    let mut on_disk: Vec<(PathBuf, i64)> = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()))
        .filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("skipping unreadable directory entry: {err}");
                None
            }
        })
    {
        let path = entry.path();
        if !entry.file_type().is_file() || !is_audio_file(path) {
            continue;
        }
        match mtime_secs(path) {
            Ok(mtime) => on_disk.push((path.to_path_buf(), mtime)),
            Err(err) => {
                warn!("cannot stat {}: {err}", path.display());
                report.invalid.push(path.to_path_buf());
            }
        }
    }

    let seen: HashSet<PathBuf> = on_disk.iter().map(|(path, _)| path.clone()).collect();

    // Phase 2: decide which files actually need a (re-)read. Unchanged
    // valid files are skipped entirely, which makes rescans of an
    // untouched tree a no-op against the store.
    let mut fresh = 0usize;
    let to_read: Vec<(PathBuf, i64)> = on_disk
        .into_iter()
        .filter(|(path, mtime)| match known.get(path) {
            None => {
                fresh += 1;
                true
            }
            Some((_, stored_mtime, valid)) => !valid || *stored_mtime != Some(*mtime),
        })
        .collect();
    debug!(
        "{} candidate files, {} new, {} to re-read",
        seen.len(),
        fresh,
        to_read.len()
    );

    // Phase 3: extract metadata in parallel. Extraction itself cannot
    // fail; unreadable tags degrade to the filename fallback.
    let extracted: Vec<NewTrack> = to_read
        .par_iter()
        .map(|(path, mtime)| extract(path, *mtime))
        .collect();

    // Phase 4: serial reconciliation, one atomic store write per file.
    for track in &extracted {
        let existed = known.contains_key(&track.path);
        store.upsert(track)?;
        if existed {
            report.updated += 1;
        } else {
            report.added += 1;
        }
    }

    // Phase 5: soft-delete indexed files that vanished from disk.
    for (path, (id, _, valid)) in &known {
        if *valid && !seen.contains(path) {
            debug!("marking missing file invalid: {}", path.display());
            store.mark_invalid(*id)?;
            report.removed += 1;
        }
    }

    info!("scan of {} finished: {}", root.display(), report.summary());
    Ok(report)
}

fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.iter().any(|known| *known == ext)
        })
        .unwrap_or(false)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

fn mtime_secs(path: &Path) -> Result<i64> {
    let modified = std::fs::metadata(path)?.modified()?;
    let secs = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    Ok(secs)
}

/// Read embedded tags, falling back to the filename when they are absent
/// or the file cannot be parsed as audio.
fn extract(path: &Path, mtime: i64) -> NewTrack {
    let (fallback_artist, fallback_title) = split_stem(path);
    let format = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    let mut track = NewTrack {
        path: path.to_path_buf(),
        title: fallback_title,
        artist: fallback_artist,
        album: None,
        genre: None,
        year: None,
        track_no: None,
        duration_secs: None,
        format,
        mtime_secs: Some(mtime),
    };

    let tagged = match Probe::open(path).and_then(|probe| probe.read()) {
        Ok(tagged) => tagged,
        Err(err) => {
            debug!("no readable tags in {}: {err}", path.display());
            return track;
        }
    };

    track.duration_secs = Some(tagged.properties().duration().as_secs() as u32);

    if let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) {
        if let Some(title) = non_empty(tag.title().as_deref()) {
            track.title = title;
        }
        if let Some(artist) = non_empty(tag.artist().as_deref()) {
            track.artist = Some(artist);
        }
        track.album = non_empty(tag.album().as_deref());
        track.genre = non_empty(tag.genre().as_deref());
        track.year = tag.year().map(|year| year as i32);
        track.track_no = tag.track();
    }

    track
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Deterministic filename fallback: strip the extension, split once on
/// " - ". "Miles Davis - So What.flac" becomes artist + title, anything
/// without the delimiter becomes a bare title.
fn split_stem(path: &Path) -> (Option<String>, String) {
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("unknown");
    match stem.split_once(STEM_DELIMITER) {
        Some((artist, title)) if !artist.trim().is_empty() && !title.trim().is_empty() => {
            (Some(artist.trim().to_string()), title.trim().to_string())
        }
        _ => (None, stem.trim().to_string()),
    }
}
