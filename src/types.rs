use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub other_name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub episodes: Vec<EpisodeRef>,
}

impl CatalogItem {
    pub fn episode(&self, number: u32) -> Option<&EpisodeRef> {
        self.episodes.iter().find(|ep| ep.number == number)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EpisodeRef {
    pub number: u32,
    pub url: String,
}

impl EpisodeRef {
    pub fn identifier(&self) -> String {
        episode_identifier(&self.url)
    }
}

/// Final path segment of an episode URL; the catalog API keys stream lookups on it.
pub fn episode_identifier(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url) {
        if let Some(last) = parsed
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        {
            return last.to_string();
        }
    }
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(url)
        .to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StreamSource {
    pub quality: String,
    pub url: String,
    #[serde(default, rename = "isM3U8")]
    pub is_m3u8: bool,
}

impl StreamSource {
    pub fn label(&self) -> String {
        let kind = if self.is_m3u8 { "HLS" } else { "MP4" };
        format!("{} ({})", self.quality, kind)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaptionTrack {
    pub url: String,
    #[serde(default)]
    pub lang: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamSet {
    pub sources: Vec<StreamSource>,
    pub captions: Vec<CaptionTrack>,
    pub referer: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Genre {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WatchProgress {
    pub anime_id: String,
    pub episode: u32,
    pub time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub watched_at: DateTime<Utc>,
}

impl WatchProgress {
    pub fn same_key(&self, other: &WatchProgress) -> bool {
        self.anime_id == other.anime_id && self.episode == other.episode
    }
}

/// Per-series record under the older `anime_{id}_progress` key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LegacyProgress {
    pub episode: u32,
    pub time: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_is_last_path_segment() {
        assert_eq!(
            episode_identifier("https://gogoanime.example/one-piece-episode-1"),
            "one-piece-episode-1"
        );
        assert_eq!(
            episode_identifier("https://host.example/watch/naruto-episode-3/"),
            "naruto-episode-3"
        );
        assert_eq!(episode_identifier("/watch/bleach-episode-12"), "bleach-episode-12");
        assert_eq!(episode_identifier("plain-id"), "plain-id");
    }

    #[test]
    fn partial_list_item_decodes_with_defaults() {
        let item: CatalogItem = serde_json::from_value(serde_json::json!({
            "id": "spy-x-family",
            "title": "Spy x Family",
            "image": "https://img.example/spy.png",
            "releaseDate": "2022"
        }))
        .unwrap();
        assert_eq!(item.release_date.as_deref(), Some("2022"));
        assert!(item.status.is_empty());
        assert!(item.episodes.is_empty());
        assert!(item.genres.is_empty());
    }

    #[test]
    fn episode_lookup_by_number() {
        let item = CatalogItem {
            id: "x".into(),
            title: "X".into(),
            image: String::new(),
            url: None,
            description: None,
            genres: vec![],
            release_date: None,
            status: "Completed".into(),
            other_name: None,
            kind: None,
            episodes: vec![
                EpisodeRef { number: 1, url: "/x-episode-1".into() },
                EpisodeRef { number: 2, url: "/x-episode-2".into() },
            ],
        };
        assert_eq!(item.episode(2).map(EpisodeRef::identifier).as_deref(), Some("x-episode-2"));
        assert!(item.episode(3).is_none());
    }
}
