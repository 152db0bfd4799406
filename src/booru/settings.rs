//! Per-user settings persistence.
//!
//! Settings live behind the [`SettingsStore`] trait. The JSON backend keeps
//! every user in memory and rewrites the whole file on each change.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::booru::filter::ContentFilter;

/// Error types for settings persistence
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for settings operations
pub type SettingsResult<T> = Result<T, SettingsError>;

/// Preferences of one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    pub user_id: u64,
    pub default_filter: ContentFilter,
    pub favorite_tags: Vec<String>,
    pub custom_aliases: HashMap<String, String>,
}

impl UserSettings {
    pub fn new(user_id: u64) -> Self {
        Self {
            user_id,
            ..Self::default()
        }
    }
}

/// Storage for [`UserSettings`], keyed by user id.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Settings for `user_id`, or defaults for a user never seen before.
    async fn get(&self, user_id: u64) -> SettingsResult<UserSettings>;

    /// Insert or replace the settings of `settings.user_id`.
    async fn put(&self, settings: UserSettings) -> SettingsResult<()>;
}

/// Settings kept in a single pretty-printed JSON array file.
pub struct JsonSettingsStore {
    path: PathBuf,
    cache: RwLock<HashMap<u64, UserSettings>>,
    // Serializes file rewrites
    write_lock: Mutex<()>,
}

impl JsonSettingsStore {
    /// Open the store, loading whatever the file holds.
    ///
    /// A missing or unreadable file starts the store empty.
    pub async fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();

        let cache = match Self::load(&path).await {
            Ok(entries) => {
                info!(path = %path.display(), users = entries.len(), "Loaded user settings");
                entries
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load user settings, starting empty");
                HashMap::new()
            }
        };

        Self {
            path,
            cache: RwLock::new(cache),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(path: &Path) -> SettingsResult<HashMap<u64, UserSettings>> {
        if !tokio::fs::try_exists(path).await? {
            debug!(path = %path.display(), "Settings file does not exist yet");
            return Ok(HashMap::new());
        }

        let content = tokio::fs::read_to_string(path).await?;
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }

        let entries: Vec<UserSettings> = serde_json::from_str(&content)?;
        Ok(entries.into_iter().map(|s| (s.user_id, s)).collect())
    }

    fn serialize(entries: &HashMap<u64, UserSettings>) -> SettingsResult<String> {
        let mut entries: Vec<&UserSettings> = entries.values().collect();
        entries.sort_by_key(|s| s.user_id);
        Ok(serde_json::to_string_pretty(&entries)?)
    }
}

#[async_trait]
impl SettingsStore for JsonSettingsStore {
    async fn get(&self, user_id: u64) -> SettingsResult<UserSettings> {
        Ok(self
            .cache
            .read()
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| UserSettings::new(user_id)))
    }

    async fn put(&self, settings: UserSettings) -> SettingsResult<()> {
        let _guard = self.write_lock.lock().await;

        let user_id = settings.user_id;
        let mut updated = self.cache.read().clone();
        updated.insert(user_id, settings);

        // The cache only changes once the file holds the new state
        let json = Self::serialize(&updated)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, json).await?;
        *self.cache.write() = updated;

        debug!(user_id = user_id, path = %self.path.display(), "Saved user settings");
        Ok(())
    }
}

/// Set the filter used when a request does not ask for one.
pub async fn set_default_filter(
    store: &dyn SettingsStore,
    user_id: u64,
    filter: ContentFilter,
) -> SettingsResult<UserSettings> {
    let mut settings = store.get(user_id).await?;
    settings.default_filter = filter;
    store.put(settings.clone()).await?;
    Ok(settings)
}

/// Add a favorite tag. Returns `false` when it was already a favorite.
pub async fn add_favorite_tag(store: &dyn SettingsStore, user_id: u64, tag: &str) -> SettingsResult<bool> {
    let tag = tag.trim();
    let mut settings = store.get(user_id).await?;
    if tag.is_empty() || settings.favorite_tags.iter().any(|t| t == tag) {
        return Ok(false);
    }

    settings.favorite_tags.push(tag.to_string());
    store.put(settings).await?;
    Ok(true)
}

/// Remove a favorite tag. Returns `false` when it was not a favorite.
pub async fn remove_favorite_tag(store: &dyn SettingsStore, user_id: u64, tag: &str) -> SettingsResult<bool> {
    let tag = tag.trim();
    let mut settings = store.get(user_id).await?;
    let before = settings.favorite_tags.len();
    settings.favorite_tags.retain(|t| t != tag);
    if settings.favorite_tags.len() == before {
        return Ok(false);
    }

    store.put(settings).await?;
    Ok(true)
}

/// Add or replace a custom alias. The alias key is stored lowercase.
pub async fn add_custom_alias(
    store: &dyn SettingsStore,
    user_id: u64,
    alias: &str,
    tag: &str,
) -> SettingsResult<()> {
    let mut settings = store.get(user_id).await?;
    settings
        .custom_aliases
        .insert(alias.trim().to_lowercase(), tag.trim().to_string());
    store.put(settings).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_unknown_user_gets_defaults() {
        let dir = tempdir().unwrap();
        let store = JsonSettingsStore::open(dir.path().join("user_settings.json")).await;

        let settings = store.get(42).await.unwrap();
        assert_eq!(settings, UserSettings::new(42));
        assert_eq!(settings.default_filter, ContentFilter::All);
    }

    #[tokio::test]
    async fn test_put_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("user_settings.json");

        let store = JsonSettingsStore::open(&path).await;
        set_default_filter(&store, 7, ContentFilter::SfwOnly).await.unwrap();
        add_custom_alias(&store, 7, "  Cat ", "cat_ears").await.unwrap();

        let reopened = JsonSettingsStore::open(&path).await;
        let settings = reopened.get(7).await.unwrap();
        assert_eq!(settings.default_filter, ContentFilter::SfwOnly);
        assert_eq!(settings.custom_aliases.get("cat").map(String::as_str), Some("cat_ears"));
    }

    #[tokio::test]
    async fn test_file_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("user_settings.json");

        let store = JsonSettingsStore::open(&path).await;
        add_favorite_tag(&store, 2, "landscape").await.unwrap();
        add_favorite_tag(&store, 1, "cat").await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        let users = value.as_array().unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0]["user_id"], 1);
        assert_eq!(users[0]["default_filter"], "all");
        assert_eq!(users[1]["favorite_tags"][0], "landscape");
        assert!(users[1]["custom_aliases"].is_object());
        assert!(content.contains('\n'));
    }

    #[tokio::test]
    async fn test_favorites_have_no_duplicates() {
        let dir = tempdir().unwrap();
        let store = JsonSettingsStore::open(dir.path().join("s.json")).await;

        assert!(add_favorite_tag(&store, 1, "cat").await.unwrap());
        assert!(!add_favorite_tag(&store, 1, "cat").await.unwrap());
        assert!(!add_favorite_tag(&store, 1, "   ").await.unwrap());
        assert!(add_favorite_tag(&store, 1, "dog").await.unwrap());

        assert!(remove_favorite_tag(&store, 1, "cat").await.unwrap());
        assert!(!remove_favorite_tag(&store, 1, "cat").await.unwrap());

        assert_eq!(store.get(1).await.unwrap().favorite_tags, vec!["dog".to_string()]);
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("user_settings.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonSettingsStore::open(&path).await;
        assert_eq!(store.get(1).await.unwrap(), UserSettings::new(1));

        // The next save replaces the broken file
        add_favorite_tag(&store, 1, "cat").await.unwrap();
        let reopened = JsonSettingsStore::open(&path).await;
        assert_eq!(reopened.get(1).await.unwrap().favorite_tags, vec!["cat".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_fields_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("user_settings.json");
        std::fs::write(&path, r#"[{"user_id": 9, "default_filter": "nsfw_only"}]"#).unwrap();

        let store = JsonSettingsStore::open(&path).await;
        let settings = store.get(9).await.unwrap();
        assert_eq!(settings.default_filter, ContentFilter::NsfwOnly);
        assert!(settings.favorite_tags.is_empty());
        assert!(settings.custom_aliases.is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_cache_unchanged() {
        let dir = tempdir().unwrap();
        // A directory in place of the file makes every write fail
        let path = dir.path().join("user_settings.json");
        std::fs::create_dir(&path).unwrap();

        let store = JsonSettingsStore::open(&path).await;
        let mut settings = UserSettings::new(3);
        settings.favorite_tags.push("cat".to_string());

        assert!(matches!(store.put(settings).await, Err(SettingsError::Io(_))));
        assert_eq!(store.get(3).await.unwrap(), UserSettings::new(3));
        assert!(add_favorite_tag(&store, 3, "dog").await.is_err());
        assert!(store.get(3).await.unwrap().favorite_tags.is_empty());
    }
}
