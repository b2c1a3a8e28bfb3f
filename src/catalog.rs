use reqwest::Client;
use serde::{Deserialize, de::DeserializeOwned};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::error::CatalogError;
use crate::types::{CaptionTrack, CatalogItem, Genre, StreamSet, StreamSource};

pub const DEFAULT_API_BASE_URL: &str = "https://animetize-api-wgiz.onrender.com";
pub const DEFAULT_SERVER: &str = "gogocdn";
pub const DEFAULT_PAGE_LIMIT: u32 = 3;
const USER_AGENT: &str = concat!("anicat/", env!("CARGO_PKG_VERSION"));
const ERROR_BODY_PREVIEW: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListRoute {
    RecentEpisodes,
    TopAiring,
    Movies,
    Genre(String),
    Search(String),
}

impl ListRoute {
    pub fn segments(&self) -> Vec<&str> {
        match self {
            ListRoute::RecentEpisodes => vec!["recent-episodes"],
            ListRoute::TopAiring => vec!["top-airing"],
            ListRoute::Movies => vec!["movies"],
            ListRoute::Genre(id) => vec!["genre", id.as_str()],
            ListRoute::Search(query) => vec![query.as_str()],
        }
    }

    pub fn path(&self) -> String {
        self.segments().join("/")
    }

    /// Query parameters the route is always requested with.
    pub fn default_params(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            ListRoute::RecentEpisodes => &[("type", "1")],
            _ => &[],
        }
    }
}

// Futures are not required to be `Send`; callers drive them on the current task.
#[allow(async_fn_in_trait)]
pub trait CatalogApi {
    async fn fetch_catalog_item(&self, id: &str) -> Result<CatalogItem, CatalogError>;

    /// Requests pages `1..=page_limit` and concatenates their results in request order.
    async fn fetch_list(
        &self,
        route: &ListRoute,
        params: &[(&str, &str)],
        page_limit: u32,
    ) -> Result<Vec<CatalogItem>, CatalogError>;

    async fn fetch_stream_sources(
        &self,
        episode_id: &str,
        server: &str,
    ) -> Result<StreamSet, CatalogError>;

    async fn fetch_genres(&self) -> Result<Vec<Genre>, CatalogError>;
}

pub struct AnimetizeClient {
    client: Client,
    base_url: Url,
}

impl AnimetizeClient {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|err| anyhow::anyhow!("invalid catalog API URL `{base_url}`: {err}"))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("catalog API URL `{base_url}` cannot carry a path");
        }
        let mut builder = Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<T, CatalogError> {
        let route = segments.join("/");
        let url = self.endpoint(segments);
        debug!(%url, ?query, "catalog request");

        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await
            .map_err(|err| CatalogError::fetch(&route, err.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| CatalogError::fetch(&route, err.to_string()))?;
        if !status.is_success() {
            warn!(%route, %status, "catalog API returned an error status");
            let preview: String = text.chars().take(ERROR_BODY_PREVIEW).collect();
            let message = if preview.trim().is_empty() {
                format!("HTTP {status}")
            } else {
                format!("HTTP {status}: {}", preview.trim())
            };
            return Err(CatalogError::fetch(&route, message));
        }
        serde_json::from_str(&text).map_err(|err| CatalogError::malformed(&route, err.to_string()))
    }
}

impl CatalogApi for AnimetizeClient {
    async fn fetch_catalog_item(&self, id: &str) -> Result<CatalogItem, CatalogError> {
        self.get_json(&["info", id], &[]).await
    }

    async fn fetch_list(
        &self,
        route: &ListRoute,
        params: &[(&str, &str)],
        page_limit: u32,
    ) -> Result<Vec<CatalogItem>, CatalogError> {
        let segments = route.segments();
        let mut results = Vec::new();
        for page in 1..=page_limit {
            let mut query: Vec<(&str, String)> = Vec::new();
            for (key, value) in route.default_params() {
                query.push((*key, value.to_string()));
            }
            for (key, value) in params.iter().filter(|(key, _)| *key != "page") {
                query.push((*key, value.to_string()));
            }
            query.push(("page", page.to_string()));

            let list: ListPage = self.get_json(&segments, &query).await?;
            debug!(route = %route.path(), page, count = list.results.len(), "fetched list page");
            results.extend(list.results);
            if list.has_next_page == Some(false) {
                break;
            }
        }
        Ok(results)
    }

    async fn fetch_stream_sources(
        &self,
        episode_id: &str,
        server: &str,
    ) -> Result<StreamSet, CatalogError> {
        let query = [("server", server.to_string())];
        let watch: WatchResponse = self.get_json(&["watch", episode_id], &query).await?;
        if watch.sources.is_empty() {
            return Err(CatalogError::empty(
                &format!("watch/{episode_id}"),
                "stream sources",
            ));
        }
        Ok(StreamSet {
            sources: watch.sources,
            captions: watch.subtitles,
            referer: watch.headers.and_then(|h| h.referer),
        })
    }

    async fn fetch_genres(&self) -> Result<Vec<Genre>, CatalogError> {
        self.get_json(&["genre", "list"], &[]).await
    }
}

/// Finds a genre by id or case-insensitive title.
pub fn resolve_genre<'a>(genres: &'a [Genre], name_or_id: &str) -> Option<&'a Genre> {
    let wanted = name_or_id.trim();
    genres
        .iter()
        .find(|g| g.id == wanted)
        .or_else(|| genres.iter().find(|g| g.title.eq_ignore_ascii_case(wanted)))
        .or_else(|| {
            let slug = wanted.to_ascii_lowercase().replace(' ', "-");
            genres.iter().find(|g| g.id.eq_ignore_ascii_case(&slug))
        })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListPage {
    results: Vec<CatalogItem>,
    #[serde(default)]
    has_next_page: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct WatchResponse {
    #[serde(default)]
    headers: Option<WatchHeaders>,
    #[serde(default)]
    sources: Vec<StreamSource>,
    #[serde(default, alias = "captions")]
    subtitles: Vec<CaptionTrack>,
}

#[derive(Debug, Deserialize)]
struct WatchHeaders {
    #[serde(default, rename = "Referer", alias = "referer")]
    referer: Option<String>,
}
