use anyhow::Result;
use std::sync::Arc;
use tracing::debug;

use crate::storage::{BOOKMARKS_KEY, KeyValueStore, get_json, set_json};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Toggle {
    pub added: bool,
}

pub struct BookmarkRegistry<S> {
    store: Arc<S>,
}

impl<S: KeyValueStore> BookmarkRegistry<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn toggle(&self, anime_id: &str) -> Result<Toggle> {
        let mut ids = self.list()?;
        let added = match ids.iter().position(|id| id == anime_id) {
            Some(pos) => {
                ids.remove(pos);
                false
            }
            None => {
                ids.push(anime_id.to_string());
                true
            }
        };
        set_json(self.store.as_ref(), BOOKMARKS_KEY, &ids)?;
        debug!(anime_id, added, "toggled bookmark");
        Ok(Toggle { added })
    }

    /// Bookmarked ids in the order they were added.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> =
            get_json(self.store.as_ref(), BOOKMARKS_KEY)?.unwrap_or_default();
        let mut seen = std::collections::HashSet::new();
        ids.retain(|id| seen.insert(id.clone()));
        Ok(ids)
    }

    pub fn is_bookmarked(&self, anime_id: &str) -> Result<bool> {
        Ok(self.list()?.iter().any(|id| id == anime_id))
    }
}
