//! Key-value persistence for progress and bookmarks.
//!
//! Values are stored as JSON-encoded strings under flat string keys, one
//! record per key. [`JsonFileStore`] keeps every key in a single JSON object
//! on disk; [`MemoryStore`] is the in-process equivalent.

use anyhow::{Context, Result, anyhow};
use dirs_next::data_dir;
use serde::{Serialize, de::DeserializeOwned};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};
use tracing::debug;

pub const RECENTLY_WATCHED_KEY: &str = "recentlyWatched";
pub const BOOKMARKS_KEY: &str = "bookmarks";

pub fn episode_progress_key(anime_id: &str, episode: u32) -> String {
    format!("anime_{anime_id}_episode_{episode}_progress")
}

pub fn legacy_progress_key(anime_id: &str) -> String {
    format!("anime_{anime_id}_progress")
}

pub trait KeyValueStore {
    fn get_raw(&self, key: &str) -> Result<Option<String>>;
    fn set_raw(&self, key: &str, value: String) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

pub fn get_json<T: DeserializeOwned>(store: &impl KeyValueStore, key: &str) -> Result<Option<T>> {
    let Some(raw) = store.get_raw(key)? else {
        return Ok(None);
    };
    let value = serde_json::from_str(&raw)
        .with_context(|| format!("failed to decode stored value for `{key}`"))?;
    Ok(Some(value))
}

pub fn set_json<T: Serialize>(store: &impl KeyValueStore, key: &str, value: &T) -> Result<()> {
    let raw = serde_json::to_string(value)
        .with_context(|| format!("failed to encode value for `{key}`"))?;
    store.set_raw(key, raw)
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set_raw(&self, key: &str, value: String) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        entries.remove(key);
        Ok(())
    }
}

/// File-backed store. Every write re-reads the file, applies the single key
/// change and replaces the file through a rename. Writes through one handle
/// are serialized; across processes there is no file lock and the last
/// writer wins. An unreadable file fails the write and is left in place.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create storage directory {}", parent.display())
            })?;
        }
        debug!(path = %path.display(), "opened storage file");
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let data = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read storage file {}", self.path.display()))?;
        if data.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&data)
            .with_context(|| format!("failed to parse storage file {}", self.path.display()))
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let data = serde_json::to_string_pretty(entries)?;
        let tmp = self
            .path
            .with_extension(format!("json.{}.tmp", std::process::id()));
        fs::write(&tmp, data)
            .with_context(|| format!("failed to write storage file {}", tmp.display()))?;
        fs::rename(&tmp, &self.path).with_context(|| {
            format!("failed to replace storage file {}", self.path.display())
        })?;
        Ok(())
    }

    fn update(&self, apply: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow!("storage write lock poisoned"))?;
        let mut entries = self.load()?;
        apply(&mut entries);
        self.save(&entries)
    }
}

impl KeyValueStore for JsonFileStore {
    fn get_raw(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load()?.get(key).cloned())
    }

    fn set_raw(&self, key: &str, value: String) -> Result<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value);
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|entries| {
            entries.remove(key);
        })
    }
}

pub fn default_storage_path(data_dir_override: Option<&Path>) -> Result<PathBuf> {
    let base = match data_dir_override {
        Some(path) => path.to_path_buf(),
        None => data_dir()
            .ok_or_else(|| anyhow!("Could not determine data directory"))?
            .join("anicat"),
    };
    Ok(base.join("storage.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn scratch_dir(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("anicat-{name}-{}-{nanos}", std::process::id()))
    }

    #[test]
    fn keys_follow_the_persisted_layout() {
        assert_eq!(episode_progress_key("naruto", 3), "anime_naruto_episode_3_progress");
        assert_eq!(legacy_progress_key("naruto"), "anime_naruto_progress");
    }

    #[test]
    fn memory_store_json_helpers() {
        let store = MemoryStore::new();
        assert_eq!(get_json::<Vec<String>>(&store, BOOKMARKS_KEY).unwrap(), None);

        set_json(&store, BOOKMARKS_KEY, &vec!["a".to_string()]).unwrap();
        assert_eq!(store.get_raw(BOOKMARKS_KEY).unwrap().as_deref(), Some(r#"["a"]"#));

        store.remove(BOOKMARKS_KEY).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = scratch_dir("persist");
        let path = dir.join("storage.json");

        let store = JsonFileStore::open(&path).unwrap();
        set_json(&store, BOOKMARKS_KEY, &vec!["one-piece".to_string()]).unwrap();
        store.set_raw("other", "1".into()).unwrap();

        let reopened = JsonFileStore::open(&path).unwrap();
        let bookmarks: Vec<String> = get_json(&reopened, BOOKMARKS_KEY).unwrap().unwrap();
        assert_eq!(bookmarks, vec!["one-piece".to_string()]);
        assert_eq!(reopened.get_raw("other").unwrap().as_deref(), Some("1"));

        reopened.remove("other").unwrap();
        assert_eq!(store.get_raw("other").unwrap(), None);

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn file_store_keeps_writes_from_another_handle() {
        let dir = scratch_dir("interleave");
        let path = dir.join("storage.json");
        let first = JsonFileStore::open(&path).unwrap();
        let second = JsonFileStore::open(&path).unwrap();

        first.set_raw("a", "1".into()).unwrap();
        second.set_raw("b", "2".into()).unwrap();

        assert_eq!(first.get_raw("a").unwrap().as_deref(), Some("1"));
        assert_eq!(first.get_raw("b").unwrap().as_deref(), Some("2"));

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn unparseable_file_fails_writes_and_keeps_its_bytes() {
        let dir = scratch_dir("corrupt");
        let path = dir.join("storage.json");
        fs::create_dir_all(&dir).unwrap();
        let original = r#"{"bookmarks":"[\"frieren\",\"bleach\"]","anime_frieren_progress":"{}",}"#;
        fs::write(&path, original).unwrap();

        let store = JsonFileStore::open(&path).unwrap();
        assert!(store.get_raw(BOOKMARKS_KEY).is_err());
        assert!(store.set_raw("anime_naruto_progress", "{}".into()).is_err());
        assert!(store.remove(BOOKMARKS_KEY).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), original);

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn file_store_leaves_no_temp_file_behind() {
        let dir = scratch_dir("tempfile");
        let path = dir.join("storage.json");
        let store = JsonFileStore::open(&path).unwrap();
        store.set_raw("a", "1".into()).unwrap();

        let names: Vec<String> = fs::read_dir(&dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["storage.json".to_string()]);
        assert_eq!(store.path(), path.as_path());

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn undecodable_value_is_an_error() {
        let store = MemoryStore::new();
        store.set_raw(BOOKMARKS_KEY, "{not json".into()).unwrap();
        assert!(get_json::<Vec<String>>(&store, BOOKMARKS_KEY).is_err());
    }
}
