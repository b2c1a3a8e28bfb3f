use anyhow::{Result, bail};
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

use crate::storage::{
    KeyValueStore, RECENTLY_WATCHED_KEY, episode_progress_key, get_json, legacy_progress_key,
    set_json,
};
use crate::types::{EpisodeRef, LegacyProgress, WatchProgress};

pub const RECENTLY_WATCHED_CAPACITY: usize = 10;

/// Most-recent-first list of saves, one entry per (anime, episode).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecentlyWatched {
    pub entries: Vec<WatchProgress>,
}

impl RecentlyWatched {
    pub fn upsert(&mut self, entry: WatchProgress) {
        if let Some(pos) = self.entries.iter().position(|e| e.same_key(&entry)) {
            self.entries.remove(pos);
        }
        self.entries.insert(0, entry);
        self.entries.truncate(RECENTLY_WATCHED_CAPACITY);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct ProgressTracker<S> {
    store: Arc<S>,
}

impl<S: KeyValueStore> ProgressTracker<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn record_progress(
        &self,
        anime_id: &str,
        episode: u32,
        time: f64,
        title: Option<&str>,
        image: Option<&str>,
    ) -> Result<WatchProgress> {
        if !time.is_finite() {
            bail!("cannot save non-finite playback time {time} for {anime_id} episode {episode}");
        }

        let progress = WatchProgress {
            anime_id: anime_id.to_string(),
            episode,
            time,
            title: title.map(str::to_string),
            image: image.map(str::to_string),
            watched_at: Utc::now(),
        };

        set_json(
            self.store.as_ref(),
            &episode_progress_key(anime_id, episode),
            &progress,
        )?;

        let mut recent = self.load_recent()?;
        recent.upsert(progress.clone());
        set_json(self.store.as_ref(), RECENTLY_WATCHED_KEY, &recent.entries)?;

        set_json(
            self.store.as_ref(),
            &legacy_progress_key(anime_id),
            &LegacyProgress { episode, time },
        )?;

        debug!(anime_id, episode, time, "saved watch progress");
        Ok(progress)
    }

    pub fn get_progress(&self, anime_id: &str, episode: u32) -> Result<Option<WatchProgress>> {
        get_json(self.store.as_ref(), &episode_progress_key(anime_id, episode))
    }

    /// Last episode saved for a series under the single-record key.
    pub fn last_progress(&self, anime_id: &str) -> Result<Option<LegacyProgress>> {
        get_json(self.store.as_ref(), &legacy_progress_key(anime_id))
    }

    pub fn recently_watched(&self) -> Result<Vec<WatchProgress>> {
        Ok(self.load_recent()?.entries)
    }

    fn load_recent(&self) -> Result<RecentlyWatched> {
        let entries: Vec<WatchProgress> =
            get_json(self.store.as_ref(), RECENTLY_WATCHED_KEY)?.unwrap_or_default();
        Ok(RecentlyWatched { entries })
    }
}

/// Whether `episodes` holds the episode numbered right after `current`.
/// Numbering is taken as-is; a gap after `current` means no next episode.
pub fn has_next_episode(_anime_id: &str, current: u32, episodes: &[EpisodeRef]) -> bool {
    let Some(next) = current.checked_add(1) else {
        return false;
    };
    episodes.iter().any(|ep| ep.number == next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn tracker() -> ProgressTracker<MemoryStore> {
        ProgressTracker::new(Arc::new(MemoryStore::new()))
    }

    fn episodes(numbers: &[u32]) -> Vec<EpisodeRef> {
        numbers
            .iter()
            .map(|n| EpisodeRef {
                number: *n,
                url: format!("https://host.example/x-episode-{n}"),
            })
            .collect()
    }

    #[test]
    fn get_returns_exact_saved_time() {
        let tracker = tracker();
        tracker
            .record_progress("frieren", 4, 612.437, Some("Frieren"), None)
            .unwrap();

        let saved = tracker.get_progress("frieren", 4).unwrap().unwrap();
        assert_eq!(saved.time, 612.437);
        assert_eq!(saved.title.as_deref(), Some("Frieren"));
        assert!(tracker.get_progress("frieren", 5).unwrap().is_none());
    }

    #[test]
    fn save_overwrites_previous_record_for_same_episode() {
        let tracker = tracker();
        tracker.record_progress("frieren", 1, 10.0, None, None).unwrap();
        tracker.record_progress("frieren", 1, 99.5, None, None).unwrap();
        assert_eq!(tracker.get_progress("frieren", 1).unwrap().unwrap().time, 99.5);
    }

    #[test]
    fn recently_watched_evicts_oldest_past_capacity() {
        let tracker = tracker();
        for ep in 1..=11 {
            tracker.record_progress("bleach", ep, 1.0, None, None).unwrap();
        }
        let recent = tracker.recently_watched().unwrap();
        assert_eq!(recent.len(), RECENTLY_WATCHED_CAPACITY);
        assert_eq!(recent[0].episode, 11);
        assert!(recent.iter().all(|p| p.episode != 1));
    }

    #[test]
    fn duplicate_save_moves_entry_to_front() {
        let tracker = tracker();
        tracker.record_progress("a", 1, 1.0, None, None).unwrap();
        tracker.record_progress("b", 1, 1.0, None, None).unwrap();
        tracker.record_progress("c", 1, 1.0, None, None).unwrap();
        tracker.record_progress("a", 1, 42.0, None, None).unwrap();

        let recent = tracker.recently_watched().unwrap();
        let ids: Vec<&str> = recent.iter().map(|p| p.anime_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
        assert_eq!(recent[0].time, 42.0);
    }

    #[test]
    fn legacy_record_tracks_latest_save() {
        let tracker = tracker();
        tracker.record_progress("a", 2, 30.0, None, None).unwrap();
        tracker.record_progress("a", 3, 5.0, None, None).unwrap();
        assert_eq!(
            tracker.last_progress("a").unwrap(),
            Some(LegacyProgress { episode: 3, time: 5.0 })
        );
    }

    #[test]
    fn time_is_not_clamped_but_must_be_finite() {
        let tracker = tracker();
        tracker.record_progress("a", 1, 1.0e7, None, None).unwrap();
        assert_eq!(tracker.get_progress("a", 1).unwrap().unwrap().time, 1.0e7);
        assert!(tracker.record_progress("a", 1, f64::NAN, None, None).is_err());
        assert_eq!(tracker.get_progress("a", 1).unwrap().unwrap().time, 1.0e7);
    }

    #[test]
    fn next_episode_requires_the_following_number() {
        assert!(has_next_episode("x", 3, &episodes(&[1, 2, 3, 4])));
        assert!(!has_next_episode("x", 3, &episodes(&[1, 2, 3])));
        assert!(!has_next_episode("x", 3, &episodes(&[1, 2, 3, 5])));
        assert!(!has_next_episode("x", u32::MAX, &episodes(&[1])));
    }

    #[test]
    fn recently_watched_upsert_in_isolation() {
        let mut recent = RecentlyWatched::default();
        let entry = |id: &str| WatchProgress {
            anime_id: id.to_string(),
            episode: 1,
            time: 0.0,
            title: None,
            image: None,
            watched_at: Utc::now(),
        };
        recent.upsert(entry("a"));
        recent.upsert(entry("a"));
        assert_eq!(recent.len(), 1);
    }
}
