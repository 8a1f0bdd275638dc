//! Selection and recommendation engine.
//!
//! Turns an already-structured [`Criteria`] value into an ordered list of
//! tracks. All randomness (shuffles, random picks, weighted
//! recommendation draws) flows through one injectable RNG so behavior is
//! reproducible under test with a seeded generator.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::history::PlayHistory;
use crate::store::Store;
use crate::track::{Filter, Track};

/// How many of the newest history entries shield their completed tracks
/// from being recommended again.
pub const REPEAT_AVOID_WINDOW: usize = 20;

/// Queue length produced by random-sample criteria (`Recommend`).
pub const RECOMMEND_LIMIT: usize = 10;

/// Structured description of what to play. Produced by the transport
/// layer; no natural-language heuristics live on this side of the
/// boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Criteria {
    /// Tracks by an artist (case-insensitive substring match).
    Artist { name: String },
    /// Tracks whose title contains the given text, best match first.
    Title { title: String },
    /// Tracks from an album (case-insensitive substring match).
    Album { album: String },
    /// Tracks of a genre, shuffled.
    Genre { genre: String },
    /// Tracks released in a decade, e.g. `1980` covers 1980..=1989.
    Era { decade: i32 },
    /// A single track drawn uniformly from the valid catalog.
    Random,
    /// History-weighted sample of the catalog, avoiding recent repeats.
    Recommend,
}

#[derive(Debug, Error)]
pub enum SelectError {
    /// Zero tracks satisfy the criteria (including an empty catalog).
    #[error("no tracks match the requested criteria")]
    NoMatch,
    /// The store failed underneath the query.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Criteria resolver with an owned random source.
pub struct Selector<R: Rng = StdRng> {
    rng: R,
}

impl Selector<StdRng> {
    /// Entropy-seeded selector for production use.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic selector for tests.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for Selector<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> Selector<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    /// Resolve `criteria` into a concrete ordered queue.
    pub fn resolve(
        &mut self,
        criteria: &Criteria,
        store: &Store,
        history: &PlayHistory,
    ) -> Result<Vec<Track>, SelectError> {
        let tracks = match criteria {
            Criteria::Artist { name } => store.find(&Filter::by_artist(name))?,
            Criteria::Album { album } => store.find(&Filter::by_album(album))?,
            Criteria::Title { title } => {
                let mut hits = store.find(&Filter::by_title(title))?;
                rank_title_matches(&mut hits, title);
                hits
            }
            Criteria::Genre { genre } => {
                let mut hits = store.find(&Filter::by_genre(genre))?;
                hits.shuffle(&mut self.rng);
                hits
            }
            Criteria::Era { decade } => {
                let mut hits = store.find(&Filter::by_years(*decade, *decade + 9))?;
                hits.shuffle(&mut self.rng);
                hits
            }
            Criteria::Random => {
                let catalog = store.find(&Filter::default())?;
                catalog.choose(&mut self.rng).cloned().into_iter().collect()
            }
            Criteria::Recommend => self.recommend(store, history)?,
        };

        if tracks.is_empty() {
            return Err(SelectError::NoMatch);
        }
        Ok(tracks)
    }

    /// Weighted sample of the catalog. The pool excludes tracks completed
    /// within the recent history window; each remaining track is weighted
    /// by how often its artist and genre appear in history, plus one so
    /// unheard corners of the catalog stay reachable. Empty history
    /// degrades to a uniform sample.
    fn recommend(
        &mut self,
        store: &Store,
        history: &PlayHistory,
    ) -> Result<Vec<Track>, SelectError> {
        let catalog = store.find(&Filter::default())?;
        if catalog.is_empty() {
            return Ok(Vec::new());
        }

        if history.is_empty() {
            let mut sample = catalog;
            sample.shuffle(&mut self.rng);
            sample.truncate(RECOMMEND_LIMIT);
            return Ok(sample);
        }

        let avoid = history.recently_completed_ids(REPEAT_AVOID_WINDOW);
        let mut pool: Vec<Track> = catalog
            .iter()
            .filter(|track| !avoid.contains(&track.id))
            .cloned()
            .collect();
        if pool.is_empty() {
            // Everything was played recently; better to repeat old
            // favourites than to return nothing. The freshest completion
            // stays excluded as long as an alternative exists.
            let freshest = history.last_completed_id();
            pool = catalog
                .iter()
                .filter(|track| Some(track.id) != freshest)
                .cloned()
                .collect();
            if pool.is_empty() {
                pool = catalog;
            }
        }

        let (artist_counts, genre_counts) = history_frequencies(history, store)?;
        let mut weighted: Vec<(Track, u32)> = pool
            .into_iter()
            .map(|track| {
                let artist_weight = track
                    .artist
                    .as_deref()
                    .and_then(|artist| artist_counts.get(&artist.to_lowercase()))
                    .copied()
                    .unwrap_or(0);
                let genre_weight = track
                    .genre
                    .as_deref()
                    .and_then(|genre| genre_counts.get(&genre.to_lowercase()))
                    .copied()
                    .unwrap_or(0);
                (track, artist_weight + genre_weight + 1)
            })
            .collect();

        let mut picked = Vec::new();
        while picked.len() < RECOMMEND_LIMIT && !weighted.is_empty() {
            let total: u32 = weighted.iter().map(|(_, weight)| weight).sum();
            let mut roll = self.rng.gen_range(0..total);
            let index = weighted
                .iter()
                .position(|(_, weight)| {
                    if roll < *weight {
                        true
                    } else {
                        roll -= weight;
                        false
                    }
                })
                .expect("weighted roll always lands inside the pool");
            picked.push(weighted.swap_remove(index).0);
        }
        Ok(picked)
    }
}

/// Best-match-first title ranking: exact (case-insensitive) equality
/// beats a prefix match beats plain containment. Ties fall back to title
/// then id, so the order is deterministic without any edit distance.
fn rank_title_matches(tracks: &mut [Track], needle: &str) {
    let needle = needle.to_lowercase();
    tracks.sort_by(|a, b| {
        title_rank(a, &needle)
            .cmp(&title_rank(b, &needle))
            .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
            .then_with(|| a.id.cmp(&b.id))
    });
}

fn title_rank(track: &Track, needle: &str) -> u8 {
    let title = track.title.to_lowercase();
    if title == *needle {
        0
    } else if title.starts_with(needle) {
        1
    } else {
        2
    }
}

/// History-derived frequency tables keyed by lowercased artist and genre.
/// Entries whose track vanished from the store are tolerated and skipped.
fn history_frequencies(
    history: &PlayHistory,
    store: &Store,
) -> Result<(HashMap<String, u32>, HashMap<String, u32>), SelectError> {
    let mut artists: HashMap<String, u32> = HashMap::new();
    let mut genres: HashMap<String, u32> = HashMap::new();
    for entry in history.iter() {
        let Some(track) = store.get(entry.track_id)? else {
            continue;
        };
        if let Some(artist) = track.artist.as_deref() {
            *artists.entry(artist.to_lowercase()).or_default() += 1;
        }
        if let Some(genre) = track.genre.as_deref() {
            *genres.entry(genre.to_lowercase()).or_default() += 1;
        }
    }
    Ok((artists, genres))
}

/// Listening taste summary derived from the history ring, in the shape
/// the dispatcher reports: most-played artists, genres and decades.
#[derive(Debug, Default, Serialize)]
pub struct PreferenceSummary {
    pub top_artists: Vec<String>,
    pub top_genres: Vec<String>,
    pub top_decades: Vec<i32>,
}

/// Aggregate history into a [`PreferenceSummary`] (top 5 artists, top 3
/// genres, top 3 decades). Deterministic: count descending, then name.
pub fn preference_summary(
    history: &PlayHistory,
    store: &Store,
) -> anyhow::Result<PreferenceSummary> {
    let mut artists: HashMap<String, u32> = HashMap::new();
    let mut genres: HashMap<String, u32> = HashMap::new();
    let mut decades: HashMap<i32, u32> = HashMap::new();

    for entry in history.iter() {
        let Some(track) = store.get(entry.track_id)? else {
            continue;
        };
        if let Some(artist) = track.artist {
            *artists.entry(artist).or_default() += 1;
        }
        if let Some(genre) = track.genre {
            *genres.entry(genre).or_default() += 1;
        }
        if let Some(year) = track.year {
            *decades.entry((year / 10) * 10).or_default() += 1;
        }
    }

    Ok(PreferenceSummary {
        top_artists: top_keys(artists, 5),
        top_genres: top_keys(genres, 3),
        top_decades: top_keys(decades, 3),
    })
}

fn top_keys<K: Ord + Clone>(counts: HashMap<K, u32>, limit: usize) -> Vec<K> {
    let mut pairs: Vec<(K, u32)> = counts.into_iter().collect();
    pairs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    pairs.into_iter().take(limit).map(|(key, _)| key).collect()
}
