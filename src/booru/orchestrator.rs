//! Search orchestration.
//!
//! One search is a short sequence of attempts. Each attempt picks a random
//! page in the estimated page space, samples posts from it and fetches their
//! images concurrently. The first attempt that produces any image wins.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::booru::client::{Post, PostSource};
use crate::booru::config_loader::AppConfig;
use crate::booru::image_fetcher::{FetchError, ImageFetcher, ImageResult};
use crate::booru::random::RandomSource;

/// Knobs the orchestrator reads from the config.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchSettings {
    pub default_page_limit: u32,
    pub images_per_page: u32,
    pub max_concurrent_fetches: usize,
    pub fetch_timeout: Duration,
    pub attempt_timeout: Duration,
}

impl From<&AppConfig> for SearchSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            default_page_limit: config.search.default_page_limit,
            images_per_page: config.search.images_per_page,
            max_concurrent_fetches: config.images.max_concurrent_fetches,
            fetch_timeout: config.fetch_timeout(),
            attempt_timeout: config.attempt_timeout(),
        }
    }
}

/// State of a single attempt, kept for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchAttempt {
    pub attempt_number: u32,
    pub page_chosen: u32,
    pub max_page_estimate: u32,
}

/// Upper bound of the page range sampled for a page estimate.
pub fn page_upper_bound(max_page: u32) -> u32 {
    (max_page / 2).max(2)
}

/// Drives page selection, sampling and fetching across attempts.
pub struct SearchOrchestrator {
    source: Arc<dyn PostSource>,
    fetcher: Arc<dyn ImageFetcher>,
    random: Arc<dyn RandomSource>,
    settings: SearchSettings,
}

impl SearchOrchestrator {
    pub fn new(
        source: Arc<dyn PostSource>,
        fetcher: Arc<dyn ImageFetcher>,
        random: Arc<dyn RandomSource>,
        settings: SearchSettings,
    ) -> Self {
        Self {
            source,
            fetcher,
            random,
            settings,
        }
    }

    /// Run up to `max_attempts` attempts for `query` and return the images of
    /// the first attempt that produced any. Never fails. A cancelled search
    /// keeps only the images that finished before the cancel.
    pub async fn search(
        &self,
        query: &str,
        desired_count: usize,
        max_attempts: u32,
        cancel: &CancellationToken,
    ) -> Vec<ImageResult> {
        let search_id = Uuid::new_v4();
        let span = info_span!("search", search_id = %search_id, query = query);

        async move {
            if desired_count == 0 {
                return Vec::new();
            }

            for attempt_number in 0..max_attempts {
                if cancel.is_cancelled() {
                    info!("Search cancelled");
                    return Vec::new();
                }

                let max_page_estimate = if attempt_number == 0 {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            info!("Search cancelled during page probe");
                            return Vec::new();
                        }
                        estimate = self.source.estimate_max_page(query) => estimate,
                    }
                } else {
                    self.settings.default_page_limit
                };

                let attempt = SearchAttempt {
                    attempt_number,
                    page_chosen: self.random.page_in(page_upper_bound(max_page_estimate)),
                    max_page_estimate,
                };
                info!(
                    attempt = attempt.attempt_number + 1,
                    page = attempt.page_chosen,
                    max_page = attempt.max_page_estimate,
                    "Starting search attempt"
                );

                let fetched = tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Search cancelled during post query");
                        return Vec::new();
                    }
                    result = self.source.fetch_posts(query, attempt.page_chosen, self.settings.images_per_page) => result,
                };

                let mut posts = match fetched {
                    Ok(posts) if posts.is_empty() => {
                        debug!(page = attempt.page_chosen, "No posts on page");
                        continue;
                    }
                    Ok(posts) => posts,
                    Err(e) => {
                        warn!(page = attempt.page_chosen, error = %e, "Post query failed");
                        continue;
                    }
                };

                self.random.shuffle(&mut posts);
                posts.truncate(desired_count);

                let images = self.fetch_all(posts, cancel).await;
                if !images.is_empty() {
                    info!(attempt = attempt.attempt_number + 1, count = images.len(), "Search succeeded");
                    return images;
                }

                if cancel.is_cancelled() {
                    info!("Search cancelled during image fetch");
                    return Vec::new();
                }
                debug!(attempt = attempt.attempt_number + 1, "No images produced");
            }

            info!(attempts = max_attempts, "Search found no images");
            Vec::new()
        }
        .instrument(span)
        .await
    }

    /// Fetch every selected post concurrently and keep the successes in
    /// selection order.
    async fn fetch_all(&self, posts: Vec<Post>, cancel: &CancellationToken) -> Vec<ImageResult> {
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent_fetches.max(1)));
        let mut tasks = JoinSet::new();
        let mut slots: Vec<Option<ImageResult>> = vec![None; posts.len()];

        for (index, post) in posts.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let fetcher = self.fetcher.clone();
            let fetch_timeout = self.settings.fetch_timeout;

            tasks.spawn(
                async move {
                    let result = match semaphore.acquire_owned().await {
                        Ok(_permit) => match tokio::time::timeout(fetch_timeout, fetcher.fetch(&post.file_url)).await {
                            Ok(result) => result,
                            Err(_) => Err(FetchError::TimedOut),
                        },
                        Err(e) => Err(FetchError::Task(e.to_string())),
                    };
                    (index, post.id, result)
                }
                .in_current_span(),
            );
        }

        let deadline = tokio::time::sleep(self.settings.attempt_timeout);
        tokio::pin!(deadline);

        loop {
            let joined = tokio::select! {
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    break;
                }
                _ = &mut deadline => {
                    warn!(pending = tasks.len(), "Attempt deadline reached, abandoning remaining fetches");
                    tasks.abort_all();
                    break;
                }
                joined = tasks.join_next() => joined,
            };

            match joined {
                None => break,
                Some(Ok((index, _, Ok(image)))) => slots[index] = Some(image),
                Some(Ok((_, post_id, Err(e)))) => {
                    warn!(post_id = post_id, error = %e, "Image fetch failed");
                }
                Some(Err(e)) => warn!(error = %e, "Image fetch task failed"),
            }
        }

        slots.into_iter().flatten().collect()
    }
}
