//! Stream selection and the per-episode playback session.
//!
//! A [`PlaybackSession`] is owned by whichever view is playing an episode. It
//! tracks the `Idle -> Loading -> Ready <-> Paused -> Ended` lifecycle and
//! hands out a [`LoadTicket`] per load so a response for an episode the user
//! already navigated away from is dropped instead of applied.

use anyhow::Result;
use regex::Regex;
use std::{fmt, sync::LazyLock};
use tracing::{debug, info};

use crate::error::{CatalogError, SessionError};
use crate::progress::{ProgressTracker, has_next_episode};
use crate::storage::KeyValueStore;
use crate::types::{CatalogItem, EpisodeRef, StreamSet, StreamSource, WatchProgress};

static QUALITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)").expect("static quality pattern"));

/// Leading integer of a quality label, e.g. `720` for `"720p"`.
pub fn parse_quality(label: &str) -> Option<u32> {
    QUALITY_RE
        .captures(label)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Highest numeric quality; the first of equally ranked sources wins and
/// labels without a number rank below all numbered ones.
pub fn select_default_source(sources: &[StreamSource]) -> Option<&StreamSource> {
    sources.iter().fold(None, |best, source| match best {
        None => Some(source),
        Some(current) if parse_quality(&source.quality) > parse_quality(&current.quality) => {
            Some(source)
        }
        keep => keep,
    })
}

pub fn select_source<'a>(sources: &'a [StreamSource], quality: &str) -> Option<&'a StreamSource> {
    sources.iter().find(|source| source.quality == quality)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Loading,
    Ready,
    Paused,
    Ended,
    Error,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Loading => "loading",
            PlaybackState::Ready => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Ended => "ended",
            PlaybackState::Error => "in error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket(u64);

#[derive(Debug)]
pub enum LoadOutcome {
    Ready,
    Stale,
    Failed(CatalogError),
}

#[derive(Debug)]
pub struct PlaybackSession {
    anime_id: String,
    title: Option<String>,
    image: Option<String>,
    episodes: Vec<EpisodeRef>,
    current: Option<u32>,
    streams: Option<StreamSet>,
    selected: Option<StreamSource>,
    state: PlaybackState,
    generation: u64,
    last_error: Option<String>,
}

impl PlaybackSession {
    pub fn new(anime_id: impl Into<String>, episodes: Vec<EpisodeRef>) -> Self {
        Self {
            anime_id: anime_id.into(),
            title: None,
            image: None,
            episodes,
            current: None,
            streams: None,
            selected: None,
            state: PlaybackState::Idle,
            generation: 0,
            last_error: None,
        }
    }

    pub fn for_item(item: &CatalogItem) -> Self {
        let mut session = Self::new(item.id.clone(), item.episodes.clone());
        session.title = Some(item.title.clone());
        session.image = Some(item.image.clone()).filter(|img| !img.is_empty());
        session
    }

    pub fn anime_id(&self) -> &str {
        &self.anime_id
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn episodes(&self) -> &[EpisodeRef] {
        &self.episodes
    }

    pub fn current_episode(&self) -> Option<&EpisodeRef> {
        let number = self.current?;
        self.episodes.iter().find(|ep| ep.number == number)
    }

    pub fn streams(&self) -> Option<&StreamSet> {
        self.streams.as_ref()
    }

    pub fn selected_source(&self) -> Option<&StreamSource> {
        self.selected.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Starts loading `episode`. Any load still in flight becomes stale.
    pub fn begin_loading(&mut self, episode: u32) -> Result<LoadTicket, SessionError> {
        if !self.episodes.iter().any(|ep| ep.number == episode) {
            return Err(SessionError::UnknownEpisode { episode });
        }
        self.generation += 1;
        self.current = Some(episode);
        self.streams = None;
        self.selected = None;
        self.last_error = None;
        self.state = PlaybackState::Loading;
        debug!(anime_id = %self.anime_id, episode, generation = self.generation, "loading episode");
        Ok(LoadTicket(self.generation))
    }

    pub fn finish_loading(
        &mut self,
        ticket: LoadTicket,
        result: Result<StreamSet, CatalogError>,
        preferred_quality: Option<&str>,
    ) -> LoadOutcome {
        if ticket.0 != self.generation || self.state != PlaybackState::Loading {
            debug!(
                ticket = ticket.0,
                generation = self.generation,
                "discarding stale stream response"
            );
            return LoadOutcome::Stale;
        }

        let streams = match result {
            Ok(streams) if streams.sources.is_empty() => {
                let route = self
                    .current_episode()
                    .map(|ep| format!("watch/{}", ep.identifier()))
                    .unwrap_or_else(|| String::from("watch"));
                return self.fail(CatalogError::empty(&route, "stream sources"));
            }
            Ok(streams) => streams,
            Err(err) => return self.fail(err),
        };

        let selected = preferred_quality
            .and_then(|quality| select_source(&streams.sources, quality))
            .or_else(|| select_default_source(&streams.sources))
            .cloned();
        if let Some(source) = &selected {
            info!(quality = %source.quality, "selected stream source");
        }
        self.selected = selected;
        self.streams = Some(streams);
        self.state = PlaybackState::Ready;
        LoadOutcome::Ready
    }

    fn fail(&mut self, err: CatalogError) -> LoadOutcome {
        self.last_error = Some(err.to_string());
        self.state = PlaybackState::Error;
        LoadOutcome::Failed(err)
    }

    pub fn switch_quality(&mut self, quality: &str) -> Result<&StreamSource, SessionError> {
        if !matches!(self.state, PlaybackState::Ready | PlaybackState::Paused) {
            return Err(SessionError::InvalidTransition {
                state: self.state,
                action: "switch quality",
            });
        }
        let source = self
            .streams
            .as_ref()
            .and_then(|streams| select_source(&streams.sources, quality))
            .cloned()
            .ok_or_else(|| SessionError::UnknownQuality {
                quality: quality.to_string(),
            })?;
        let selected: &StreamSource = self.selected.insert(source);
        Ok(selected)
    }

    /// Moves to `Paused` and saves `time` for the current episode.
    pub fn pause<S: KeyValueStore>(
        &mut self,
        time: f64,
        tracker: &ProgressTracker<S>,
    ) -> Result<WatchProgress> {
        if self.state != PlaybackState::Ready {
            return Err(SessionError::InvalidTransition {
                state: self.state,
                action: "pause",
            }
            .into());
        }
        let episode = self.current.ok_or(SessionError::InvalidTransition {
            state: self.state,
            action: "pause",
        })?;
        let progress = tracker.record_progress(
            &self.anime_id,
            episode,
            time,
            self.title.as_deref(),
            self.image.as_deref(),
        )?;
        self.state = PlaybackState::Paused;
        Ok(progress)
    }

    pub fn resume(&mut self) -> Result<(), SessionError> {
        if self.state != PlaybackState::Paused {
            return Err(SessionError::InvalidTransition {
                state: self.state,
                action: "resume",
            });
        }
        self.state = PlaybackState::Ready;
        Ok(())
    }

    /// Marks the episode finished and returns the next episode, if any.
    pub fn end(&mut self) -> Result<Option<EpisodeRef>, SessionError> {
        if !matches!(self.state, PlaybackState::Ready | PlaybackState::Paused) {
            return Err(SessionError::InvalidTransition {
                state: self.state,
                action: "end playback",
            });
        }
        self.state = PlaybackState::Ended;
        Ok(self.next_episode().cloned())
    }

    pub fn next_episode(&self) -> Option<&EpisodeRef> {
        let current = self.current?;
        if !has_next_episode(&self.anime_id, current, &self.episodes) {
            return None;
        }
        self.episodes.iter().find(|ep| ep.number == current + 1)
    }
}
