//! Terminal anime catalog: browse a catalog API, play episodes in mpv and
//! keep watch progress and bookmarks in a local JSON store.

pub mod app;
pub mod bookmarks;
pub mod catalog;
pub mod config;
pub mod error;
pub mod logging;
pub mod playback;
pub mod player;
pub mod progress;
pub mod render;
pub mod storage;
pub mod types;
