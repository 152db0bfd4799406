//! The image search entry points.
//!
//! Validates the request, resolves the user's settings and turns raw tag text
//! into the final query before handing it to the orchestrator.

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::booru::aliases::{expand_aliases, AliasTable};
use crate::booru::config_loader::AppConfig;
use crate::booru::filter::ContentFilter;
use crate::booru::image_fetcher::ImageResult;
use crate::booru::orchestrator::SearchOrchestrator;
use crate::booru::settings::{SettingsStore, UserSettings};
use crate::booru::tags::normalize_tags;

/// Rejected request parameters
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Image count must be between 1 and {max}, got {count}")]
    CountOutOfRange { count: i64, max: u32 },

    #[error("No tags given")]
    EmptyTags,
}

/// Result type for request validation
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Searches for images on behalf of a (possibly anonymous) user.
pub struct ImageSearchService {
    orchestrator: SearchOrchestrator,
    settings: Arc<dyn SettingsStore>,
    aliases: &'static AliasTable,
    max_attempts: u32,
    max_images_per_request: u32,
}

impl ImageSearchService {
    pub fn new(
        orchestrator: SearchOrchestrator,
        settings: Arc<dyn SettingsStore>,
        aliases: &'static AliasTable,
        config: &AppConfig,
    ) -> Self {
        Self {
            orchestrator,
            settings,
            aliases,
            max_attempts: config.search.max_attempts,
            max_images_per_request: config.search.max_images_per_request,
        }
    }

    pub fn max_images_per_request(&self) -> u32 {
        self.max_images_per_request
    }

    pub fn settings_store(&self) -> &dyn SettingsStore {
        self.settings.as_ref()
    }

    pub fn alias_table(&self) -> &'static AliasTable {
        self.aliases
    }

    /// Images matching `tag_text`. Invalid requests yield no images.
    pub async fn images_by_tag(
        &self,
        tag_text: &str,
        desired_count: i64,
        filter: ContentFilter,
        user: Option<u64>,
        cancel: &CancellationToken,
    ) -> Vec<ImageResult> {
        match self.check_images_by_tag(tag_text, desired_count, filter, user, cancel).await {
            Ok(images) => images,
            Err(e) => {
                warn!(error = %e, "Rejected tag search");
                Vec::new()
            }
        }
    }

    /// Images from the whole board. Invalid requests yield no images.
    pub async fn random_images(
        &self,
        desired_count: i64,
        filter: ContentFilter,
        user: Option<u64>,
        cancel: &CancellationToken,
    ) -> Vec<ImageResult> {
        match self.check_random_images(desired_count, filter, user, cancel).await {
            Ok(images) => images,
            Err(e) => {
                warn!(error = %e, "Rejected random search");
                Vec::new()
            }
        }
    }

    /// Like [`images_by_tag`](Self::images_by_tag) but reports why a request
    /// was rejected.
    pub async fn check_images_by_tag(
        &self,
        tag_text: &str,
        desired_count: i64,
        filter: ContentFilter,
        user: Option<u64>,
        cancel: &CancellationToken,
    ) -> ValidationResult<Vec<ImageResult>> {
        let count = self.validate_count(desired_count)?;

        let normalized = normalize_tags(tag_text);
        if normalized.is_empty() {
            return Err(ValidationError::EmptyTags);
        }

        let settings = self.user_settings(user).await;
        let user_aliases = settings.as_ref().map(|s| &s.custom_aliases);

        let expansion = expand_aliases(&normalized, user_aliases, self.aliases);
        for rewrite in &expansion.rewrites {
            info!(
                from = %rewrite.from,
                to = %rewrite.to,
                user_alias = rewrite.from_user_alias,
                "Expanded alias"
            );
        }

        let query = self.apply_filter(&expansion.tags, filter, settings.as_ref());
        Ok(self.run(&query, count, cancel).await)
    }

    /// Like [`random_images`](Self::random_images) but reports why a request
    /// was rejected.
    pub async fn check_random_images(
        &self,
        desired_count: i64,
        filter: ContentFilter,
        user: Option<u64>,
        cancel: &CancellationToken,
    ) -> ValidationResult<Vec<ImageResult>> {
        let count = self.validate_count(desired_count)?;

        let settings = self.user_settings(user).await;
        let query = self.apply_filter("", filter, settings.as_ref());
        Ok(self.run(&query, count, cancel).await)
    }

    fn validate_count(&self, desired_count: i64) -> ValidationResult<usize> {
        if desired_count < 1 || desired_count > i64::from(self.max_images_per_request) {
            return Err(ValidationError::CountOutOfRange {
                count: desired_count,
                max: self.max_images_per_request,
            });
        }
        Ok(desired_count as usize)
    }

    /// Settings of a known user. Anonymous requests have none; a failing
    /// store falls back to defaults.
    async fn user_settings(&self, user: Option<u64>) -> Option<UserSettings> {
        let user_id = user?;
        match self.settings.get(user_id).await {
            Ok(settings) => Some(settings),
            Err(e) => {
                warn!(user_id = user_id, error = %e, "Failed to read user settings, using defaults");
                Some(UserSettings::new(user_id))
            }
        }
    }

    fn apply_filter(&self, tags: &str, filter: ContentFilter, settings: Option<&UserSettings>) -> String {
        let user_default = settings.map(|s| s.default_filter).unwrap_or_default();
        let effective = filter.or_default(user_default);
        let query = effective.apply(tags);
        debug!(filter = %effective, query = %query, "Built search query");
        query
    }

    async fn run(&self, query: &str, count: usize, cancel: &CancellationToken) -> Vec<ImageResult> {
        self.orchestrator.search(query, count, self.max_attempts, cancel).await
    }
}
