//! Bounded play history.
//!
//! The playback session appends an entry every time the current track
//! changes and flips `completed` when a track drains naturally. The ring
//! is capped; transport logic never reads it, only the recommendation
//! engine does.

use std::collections::{HashSet, VecDeque};
use std::time::SystemTime;

use serde::Serialize;

use crate::track::TrackId;

/// Maximum number of retained entries. Oldest entries are evicted first.
pub const HISTORY_CAP: usize = 200;

/// Record of a track having started, and whether it finished naturally.
#[derive(Debug, Clone, Serialize)]
pub struct PlayHistoryEntry {
    pub track_id: TrackId,
    pub started_at: SystemTime,
    /// True only when natural end-of-track was observed. Manual skip and
    /// stop leave this false.
    pub completed: bool,
}

/// Append-only ring of [`PlayHistoryEntry`] values, newest last.
#[derive(Debug, Default)]
pub struct PlayHistory {
    entries: VecDeque<PlayHistoryEntry>,
}

impl PlayHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry for a track that just started playing.
    pub fn record_start(&mut self, track_id: TrackId) {
        if self.entries.len() == HISTORY_CAP {
            self.entries.pop_front();
        }
        self.entries.push_back(PlayHistoryEntry {
            track_id,
            started_at: SystemTime::now(),
            completed: false,
        });
    }

    /// Mark the newest entry as naturally completed.
    pub fn mark_last_completed(&mut self) {
        if let Some(last) = self.entries.back_mut() {
            last.completed = true;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&PlayHistoryEntry> {
        self.entries.back()
    }

    /// All entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &PlayHistoryEntry> {
        self.entries.iter()
    }

    /// The `window` newest entries, newest first.
    pub fn recent(&self, window: usize) -> impl Iterator<Item = &PlayHistoryEntry> {
        self.entries.iter().rev().take(window)
    }

    /// Track ids that finished naturally within the `window` newest
    /// entries. This is the repeat-avoidance set: skipped tracks are
    /// deliberately not part of it.
    pub fn recently_completed_ids(&self, window: usize) -> HashSet<TrackId> {
        self.recent(window)
            .filter(|entry| entry.completed)
            .map(|entry| entry.track_id)
            .collect()
    }

    /// Id of the newest entry that finished naturally, if any.
    pub fn last_completed_id(&self) -> Option<TrackId> {
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.completed)
            .map(|entry| entry.track_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_start_appends_uncompleted() {
        let mut history = PlayHistory::new();
        history.record_start(7);
        assert_eq!(history.len(), 1);
        let last = history.last().unwrap();
        assert_eq!(last.track_id, 7);
        assert!(!last.completed);
    }

    #[test]
    fn mark_last_completed_touches_only_the_newest_entry() {
        let mut history = PlayHistory::new();
        history.record_start(1);
        history.record_start(2);
        history.mark_last_completed();

        let entries: Vec<_> = history.iter().collect();
        assert!(!entries[0].completed);
        assert!(entries[1].completed);
    }

    #[test]
    fn ring_evicts_oldest_beyond_cap() {
        let mut history = PlayHistory::new();
        for id in 0..(HISTORY_CAP as i64 + 10) {
            history.record_start(id);
        }
        assert_eq!(history.len(), HISTORY_CAP);
        // Entry 0..10 fell off the front.
        assert_eq!(history.iter().next().unwrap().track_id, 10);
        assert_eq!(history.last().unwrap().track_id, HISTORY_CAP as i64 + 9);
    }

    #[test]
    fn recently_completed_ids_ignores_skips_and_old_entries() {
        let mut history = PlayHistory::new();
        history.record_start(1);
        history.mark_last_completed();
        history.record_start(2); // skipped
        history.record_start(3);
        history.mark_last_completed();

        let recent = history.recently_completed_ids(10);
        assert!(recent.contains(&1));
        assert!(!recent.contains(&2));
        assert!(recent.contains(&3));

        // A window of one only sees the newest entry.
        let tight = history.recently_completed_ids(1);
        assert_eq!(tight.len(), 1);
        assert!(tight.contains(&3));
    }
}
