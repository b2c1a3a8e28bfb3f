//! End-to-end view tests: mock catalog API plus an in-memory store.

use std::sync::Arc;

use anicat::app::App;
use anicat::catalog::AnimetizeClient;
use anicat::error::CatalogError;
use anicat::playback::{LoadOutcome, PlaybackState};
use anicat::storage::{BOOKMARKS_KEY, KeyValueStore, MemoryStore, RECENTLY_WATCHED_KEY};
use httpmock::prelude::*;
use serde_json::json;

fn app(server: &MockServer) -> (Arc<MemoryStore>, App<AnimetizeClient, MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let catalog = AnimetizeClient::new(&server.base_url(), None).expect("client");
    (store.clone(), App::new(catalog, store, "gogocdn", 1))
}

fn show_json(id: &str, episodes: u32) -> serde_json::Value {
    let episodes: Vec<serde_json::Value> = (1..=episodes)
        .map(|n| {
            json!({
                "id": format!("{id}-episode-{n}"),
                "number": n,
                "url": format!("https://gogoanime.example/{id}-episode-{n}")
            })
        })
        .collect();
    json!({
        "id": id,
        "title": "Frieren",
        "image": "https://img.example/frieren.png",
        "genres": ["Adventure"],
        "status": "Completed",
        "episodes": episodes
    })
}

#[tokio::test]
async fn test_unknown_id_shows_error_and_leaves_store_untouched() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/info/unknown-id");
            then.status(404).body("Not Found");
        })
        .await;
    let (store, app) = app(&server);

    let shown = app.info("unknown-id").await.unwrap();
    assert!(shown.contains("Error fetching anime info"), "shown: {shown}");
    assert!(shown.contains("404"));

    let session = app.open_session("unknown-id").await;
    assert!(matches!(session, Err(CatalogError::FetchFailure { .. })));

    assert!(store.is_empty());
    assert!(store.get_raw(BOOKMARKS_KEY).unwrap().is_none());
    assert!(store.get_raw(RECENTLY_WATCHED_KEY).unwrap().is_none());
}

#[tokio::test]
async fn test_home_sections_fail_independently() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/recent-episodes");
            then.status(200).json_body(json!({
                "results": [{ "id": "dandadan", "title": "Dandadan", "image": "" }]
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/top-airing");
            then.status(503);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/movies");
            then.status(200).json_body(json!({
                "results": [{ "id": "your-name", "title": "Your Name", "image": "", "releaseDate": "2016" }]
            }));
        })
        .await;
    let (_, app) = app(&server);
    app.bookmarks.toggle("your-name").unwrap();

    let home = app.home().await;
    assert!(home.contains("Dandadan [dandadan]"));
    assert!(home.contains("Error fetching top airing anime"));
    assert!(home.contains("\u{2605} Your Name [your-name] \u{00b7} 2016"));
}

#[tokio::test]
async fn test_bookmarked_items_render_each_entry() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/info/frieren");
            then.status(200).json_body(show_json("frieren", 2));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/info/gone");
            then.status(500);
        })
        .await;
    let (_, app) = app(&server);

    assert_eq!(app.bookmarked_items().await.unwrap(), "No bookmarked anime.\n");

    assert_eq!(app.toggle_bookmark("frieren").unwrap(), "frieren has been added!");
    app.toggle_bookmark("gone").unwrap();

    let shown = app.bookmarked_items().await.unwrap();
    assert!(shown.contains("Frieren [frieren]"));
    assert!(shown.contains("Error fetching bookmarked anime"));

    assert_eq!(app.toggle_bookmark("gone").unwrap(), "gone has been removed!");
    assert_eq!(app.bookmarks.list().unwrap(), vec!["frieren".to_string()]);
}

#[tokio::test]
async fn test_episode_load_pause_and_resume_point() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/info/frieren");
            then.status(200).json_body(show_json("frieren", 3));
        })
        .await;
    let watch = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/watch/frieren-episode-2")
                .query_param("server", "gogocdn");
            then.status(200).json_body(json!({
                "sources": [
                    { "url": "https://cdn.example/480.m3u8", "quality": "480p", "isM3U8": true },
                    { "url": "https://cdn.example/1080.m3u8", "quality": "1080p", "isM3U8": true },
                    { "url": "https://cdn.example/720.m3u8", "quality": "720p", "isM3U8": true }
                ]
            }));
        })
        .await;
    let (_, app) = app(&server);

    let mut session = app.open_session("frieren").await.unwrap();
    assert_eq!(app.starting_episode(&session, None).unwrap(), 1);
    assert_eq!(app.starting_episode(&session, Some(2)).unwrap(), 2);
    assert_eq!(app.starting_episode(&session, Some(42)).unwrap(), 1);

    let outcome = app.load_episode(&mut session, 2, None).await.unwrap();
    watch.assert_async().await;
    assert!(matches!(outcome, LoadOutcome::Ready));
    assert_eq!(session.selected_source().unwrap().quality, "1080p");

    session.pause(321.5, &app.progress).unwrap();
    assert_eq!(session.state(), PlaybackState::Paused);
    assert_eq!(app.resume_point("frieren", 2).unwrap(), Some(321.5));
    assert_eq!(app.starting_episode(&session, None).unwrap(), 2);

    let history = app.history().unwrap();
    assert!(history.starts_with("Frieren \u{00b7} episode 2 at 5:21"));
    assert_eq!(session.next_episode().map(|ep| ep.number), Some(3));
}

#[tokio::test]
async fn test_episode_load_failure_is_reported_on_session() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/info/frieren");
            then.status(200).json_body(show_json("frieren", 1));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/watch/frieren-episode-1");
            then.status(200).json_body(json!({ "sources": [] }));
        })
        .await;
    let (store, app) = app(&server);

    let mut session = app.open_session("frieren").await.unwrap();
    let outcome = app.load_episode(&mut session, 1, None).await.unwrap();
    assert!(matches!(outcome, LoadOutcome::Failed(CatalogError::EmptyResult { .. })));
    assert_eq!(session.state(), PlaybackState::Error);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_item_without_episodes_cannot_open_session() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/info/teaser");
            then.status(200).json_body(show_json("teaser", 0));
        })
        .await;
    let (_, app) = app(&server);

    let err = app.open_session("teaser").await.unwrap_err();
    assert!(matches!(err, CatalogError::EmptyResult { .. }));
    assert!(app.info("teaser").await.unwrap().contains("No episodes available"));
}

#[tokio::test]
async fn test_genre_section_resolves_by_title() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/genre/list");
            then.status(200).json_body(json!([
                { "id": "slice-of-life", "title": "Slice of Life" }
            ]));
        })
        .await;
    let genre = server
        .mock_async(|when, then| {
            when.method(GET).path("/genre/slice-of-life").query_param("page", "1");
            then.status(200).json_body(json!({
                "results": [{ "id": "yuru-camp", "title": "Yuru Camp", "image": "" }]
            }));
        })
        .await;
    let (_, app) = app(&server);

    let shown = app.genre_section("slice of life").await;
    genre.assert_async().await;
    assert!(shown.starts_with("Slice of Life Anime\n"));
    assert!(shown.contains("Yuru Camp"));
    assert!(app.genre_section("mecha").await.starts_with("Unknown genre"));
}
