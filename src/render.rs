//! Plain-text rendering of catalog records for the terminal.

use std::fmt::Write as _;

use crate::error::CatalogError;
use crate::types::{CatalogItem, Genre, WatchProgress};

const BOOKMARK_MARK: &str = "\u{2605}";

pub fn item_line(item: &CatalogItem, bookmarked: bool) -> String {
    let mut line = String::new();
    line.push_str(if bookmarked { BOOKMARK_MARK } else { " " });
    let _ = write!(line, " {} [{}]", item.title, item.id);
    if let Some(date) = item.release_date.as_deref().filter(|d| !d.is_empty()) {
        let _ = write!(line, " \u{00b7} {date}");
    }
    if !item.genres.is_empty() {
        let _ = write!(line, " \u{00b7} {}", item.genres.join(", "));
    }
    line
}

pub fn item_list(items: &[CatalogItem], is_bookmarked: impl Fn(&str) -> bool) -> String {
    if items.is_empty() {
        return String::from("  (nothing here)\n");
    }
    items
        .iter()
        .map(|item| format!("{}\n", item_line(item, is_bookmarked(&item.id))))
        .collect()
}

pub fn item_detail(item: &CatalogItem, bookmarked: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}{}", item.title, if bookmarked { " \u{2605}" } else { "" });
    if let Some(other) = item.other_name.as_deref().filter(|s| !s.is_empty()) {
        let _ = writeln!(out, "Also known as: {other}");
    }
    if let Some(kind) = &item.kind {
        let _ = writeln!(out, "Type: {kind}");
    }
    if !item.status.is_empty() {
        let _ = writeln!(out, "Status: {}", item.status);
    }
    if let Some(date) = &item.release_date {
        let _ = writeln!(out, "Released: {date}");
    }
    if !item.genres.is_empty() {
        let _ = writeln!(out, "Genres: {}", item.genres.join(", "));
    }
    if let Some(description) = item.description.as_deref().filter(|s| !s.is_empty()) {
        let _ = writeln!(out, "\n{}", description.trim());
    }
    if item.episodes.is_empty() {
        let _ = writeln!(out, "\nNo episodes available");
    } else {
        let numbers: Vec<String> = item.episodes.iter().map(|ep| ep.number.to_string()).collect();
        let _ = writeln!(out, "\nEpisodes ({}): {}", item.episodes.len(), numbers.join(" "));
    }
    out
}

pub fn progress_line(progress: &WatchProgress) -> String {
    let title = progress.title.as_deref().unwrap_or(&progress.anime_id);
    format!(
        "{} \u{00b7} episode {} at {} \u{00b7} watched {}",
        title,
        progress.episode,
        format_timestamp(progress.time),
        progress.watched_at.format("%Y-%m-%d %H:%M")
    )
}

pub fn genre_list(genres: &[Genre]) -> String {
    genres
        .iter()
        .map(|g| format!("{} [{}]\n", g.title, g.id))
        .collect()
}

/// Inline message shown in place of content that failed to load.
pub fn inline_error(context: &str, err: &CatalogError) -> String {
    format!("  Error fetching {context}: {err}\n")
}

pub fn playback_error(episode: u32, err: &anyhow::Error) -> String {
    format!("  Error playing episode {episode}: {err:#}\n")
}

pub fn format_timestamp(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return String::from("0:00");
    }
    let total = seconds.floor() as u64;
    let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}
