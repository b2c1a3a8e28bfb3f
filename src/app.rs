//! Services wired together for the command line views.
//!
//! Every view method catches catalog failures and renders them inline, the
//! same way a page section shows an error in place of its content. Only
//! local storage failures are returned as errors.

use anyhow::Result;
use std::{collections::HashSet, sync::Arc};
use tracing::warn;

use crate::bookmarks::{BookmarkRegistry, Toggle};
use crate::catalog::{CatalogApi, ListRoute, resolve_genre};
use crate::error::{CatalogError, SessionError};
use crate::playback::{LoadOutcome, PlaybackSession};
use crate::progress::ProgressTracker;
use crate::render;
use crate::storage::KeyValueStore;

pub struct App<C, S> {
    pub catalog: C,
    pub progress: ProgressTracker<S>,
    pub bookmarks: BookmarkRegistry<S>,
    pub server: String,
    pub page_limit: u32,
}

impl<C: CatalogApi, S: KeyValueStore> App<C, S> {
    pub fn new(catalog: C, store: Arc<S>, server: impl Into<String>, page_limit: u32) -> Self {
        Self {
            catalog,
            progress: ProgressTracker::new(store.clone()),
            bookmarks: BookmarkRegistry::new(store),
            server: server.into(),
            page_limit,
        }
    }

    fn bookmark_set(&self) -> HashSet<String> {
        match self.bookmarks.list() {
            Ok(ids) => ids.into_iter().collect(),
            Err(err) => {
                warn!(error = %err, "could not read bookmarks");
                HashSet::new()
            }
        }
    }

    pub async fn list_section(&self, heading: &str, route: &ListRoute) -> String {
        let mut out = format!("{heading}\n");
        match self.catalog.fetch_list(route, &[], self.page_limit).await {
            Ok(items) => {
                let marks = self.bookmark_set();
                out.push_str(&render::item_list(&items, |id| marks.contains(id)));
            }
            Err(err) => out.push_str(&render::inline_error(&heading.to_lowercase(), &err)),
        }
        out
    }

    /// Latest episodes, top airing and movies; each section fails on its own.
    pub async fn home(&self) -> String {
        let sections = [
            ("Latest Episodes", ListRoute::RecentEpisodes),
            ("Top Airing Anime", ListRoute::TopAiring),
            ("Popular Movies", ListRoute::Movies),
        ];
        let mut out = String::new();
        for (heading, route) in &sections {
            out.push_str(&self.list_section(heading, route).await);
            out.push('\n');
        }
        out
    }

    pub async fn genres(&self) -> String {
        match self.catalog.fetch_genres().await {
            Ok(genres) if genres.is_empty() => String::from("No genres available\n"),
            Ok(genres) => render::genre_list(&genres),
            Err(err) => render::inline_error("genres", &err),
        }
    }

    pub async fn genre_section(&self, name_or_id: &str) -> String {
        let genres = match self.catalog.fetch_genres().await {
            Ok(genres) => genres,
            Err(err) => return render::inline_error("genres", &err),
        };
        match resolve_genre(&genres, name_or_id) {
            Some(genre) => {
                self.list_section(&format!("{} Anime", genre.title), &ListRoute::Genre(genre.id.clone()))
                    .await
            }
            None => format!("Unknown genre \"{name_or_id}\". Run `anicat genres` to list them.\n"),
        }
    }

    pub async fn search(&self, query: &str) -> String {
        let query = query.trim();
        if query.is_empty() {
            return self.home().await;
        }
        self.list_section(
            &format!("Search Results for: {query}"),
            &ListRoute::Search(query.to_string()),
        )
        .await
    }

    pub async fn info(&self, anime_id: &str) -> Result<String> {
        Ok(match self.catalog.fetch_catalog_item(anime_id).await {
            Ok(item) => {
                let bookmarked = self.bookmarks.is_bookmarked(&item.id)?;
                let mut out = render::item_detail(&item, bookmarked);
                if let Some(last) = self.progress.last_progress(&item.id)? {
                    out.push_str(&format!(
                        "Last watched: episode {} at {}\n",
                        last.episode,
                        render::format_timestamp(last.time)
                    ));
                }
                out
            }
            Err(err) => render::inline_error("anime info", &err),
        })
    }

    /// Bookmarked items, each fetched on its own so one failure does not hide the rest.
    pub async fn bookmarked_items(&self) -> Result<String> {
        let ids = self.bookmarks.list()?;
        if ids.is_empty() {
            return Ok(String::from("No bookmarked anime.\n"));
        }
        let mut out = String::new();
        for id in ids {
            match self.catalog.fetch_catalog_item(&id).await {
                Ok(item) => {
                    out.push_str(&render::item_line(&item, true));
                    out.push('\n');
                }
                Err(err) => out.push_str(&render::inline_error("bookmarked anime", &err)),
            }
        }
        Ok(out)
    }

    pub fn toggle_bookmark(&self, anime_id: &str) -> Result<String> {
        let Toggle { added } = self.bookmarks.toggle(anime_id)?;
        Ok(if added {
            format!("{anime_id} has been added!")
        } else {
            format!("{anime_id} has been removed!")
        })
    }

    pub fn history(&self) -> Result<String> {
        let recent = self.progress.recently_watched()?;
        if recent.is_empty() {
            return Ok(String::from("History is empty.\n"));
        }
        Ok(recent
            .iter()
            .map(|p| format!("{}\n", render::progress_line(p)))
            .collect())
    }

    /// Fetches the item and starts a playback session for it.
    pub async fn open_session(&self, anime_id: &str) -> Result<PlaybackSession, CatalogError> {
        let item = self.catalog.fetch_catalog_item(anime_id).await?;
        if item.episodes.is_empty() {
            return Err(CatalogError::empty(&format!("info/{anime_id}"), "episodes"));
        }
        Ok(PlaybackSession::for_item(&item))
    }

    pub async fn load_episode(
        &self,
        session: &mut PlaybackSession,
        episode: u32,
        quality: Option<&str>,
    ) -> Result<LoadOutcome, SessionError> {
        let ticket = session.begin_loading(episode)?;
        let episode_id = session
            .current_episode()
            .map(|ep| ep.identifier())
            .unwrap_or_default();
        let result = self.catalog.fetch_stream_sources(&episode_id, &self.server).await;
        Ok(session.finish_loading(ticket, result, quality))
    }

    /// Requested episode if given, else the last one saved for the series,
    /// else the first listed.
    pub fn starting_episode(&self, session: &PlaybackSession, requested: Option<u32>) -> Result<u32> {
        let listed = |n: u32| session.episodes().iter().any(|ep| ep.number == n);
        if let Some(n) = requested.filter(|n| listed(*n)) {
            return Ok(n);
        }
        if let Some(last) = self.progress.last_progress(session.anime_id())? {
            if listed(last.episode) {
                return Ok(last.episode);
            }
        }
        Ok(session
            .episodes()
            .iter()
            .map(|ep| ep.number)
            .min()
            .unwrap_or(1))
    }

    pub fn resume_point(&self, anime_id: &str, episode: u32) -> Result<Option<f64>> {
        Ok(self.progress.get_progress(anime_id, episode)?.map(|p| p.time))
    }
}
