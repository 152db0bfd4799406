//! Imageboard API client.
//!
//! Talks to the Moebooru style `post.json` endpoint:
//! 1. Paginated post queries with URL-encoded `tags`, `page` and `limit`
//! 2. A one-result probe used to size the page space of a query
//!
//! The endpoint is treated as best-effort. Transport failures, non-2xx
//! statuses and malformed bodies come back as typed [`ClientError`]s and
//! the caller decides how to recover.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::booru::config_loader::AppConfig;

/// Path of the post search endpoint relative to the base URL.
const POST_SEARCH_PATH: &str = "/post.json";

/// Error types for imageboard requests
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Request error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Status(StatusCode),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),
}

/// Result type for imageboard requests
pub type ClientResult<T> = Result<T, ClientError>;

/// A post as returned by the search endpoint.
///
/// Fields the API leaves out or sends as `null` fall back to empty/zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Post {
    #[serde(deserialize_with = "null_as_default")]
    pub id: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub file_url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub tags: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parse a `post.json` response body. An empty body or a JSON `null` means no posts.
pub fn parse_posts(body: &str) -> ClientResult<Vec<Post>> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    let posts: Option<Vec<Post>> = serde_json::from_str(body)?;
    Ok(posts.unwrap_or_default())
}

/// Source of posts for a tag query.
#[async_trait]
pub trait PostSource: Send + Sync {
    /// Fetch one page of posts matching `query`.
    async fn fetch_posts(&self, query: &str, page: u32, limit: u32) -> ClientResult<Vec<Post>>;

    /// Estimate how many pages are worth sampling for `query`.
    ///
    /// Never fails: an unreachable API degrades to a smaller fallback.
    async fn estimate_max_page(&self, query: &str) -> u32;
}

/// Build the HTTP client shared by the API client and the image fetcher.
pub fn build_http_client(config: &AppConfig) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(&config.api.user_agent)
        .timeout(config.request_timeout())
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .build()
}

/// HTTP client for the imageboard's post search endpoint.
#[derive(Debug, Clone)]
pub struct ImageboardClient {
    client: Client,
    base_url: String,
    page_limit: u32,
    probe_failure_page_limit: u32,
}

impl ImageboardClient {
    pub fn new(client: Client, config: &AppConfig) -> Self {
        Self {
            client,
            base_url: config.api.base_url.trim_end_matches('/').to_string(),
            page_limit: config.search.default_page_limit,
            probe_failure_page_limit: config.search.probe_failure_page_limit,
        }
    }

    fn search_url(&self) -> String {
        format!("{}{}", self.base_url, POST_SEARCH_PATH)
    }
}

#[async_trait]
impl PostSource for ImageboardClient {
    async fn fetch_posts(&self, query: &str, page: u32, limit: u32) -> ClientResult<Vec<Post>> {
        debug!(query = query, page = page, limit = limit, "Fetching posts");

        let response = self
            .client
            .get(self.search_url())
            .query(&[
                ("tags", query.to_string()),
                ("page", page.to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(query = query, page = page, status = %status, "Post search returned an error status");
            return Err(ClientError::Status(status));
        }

        let body = response.text().await?;
        let posts = parse_posts(&body)?;

        debug!(query = query, page = page, count = posts.len(), "Fetched posts");
        Ok(posts)
    }

    async fn estimate_max_page(&self, query: &str) -> u32 {
        match self.fetch_posts(query, 1, 1).await {
            Ok(posts) if posts.is_empty() => {
                info!(query = query, "No posts found for query");
                1
            }
            Ok(_) => {
                debug!(query = query, page_limit = self.page_limit, "Using configured page limit");
                self.page_limit
            }
            Err(e) => {
                warn!(
                    query = query,
                    error = %e,
                    fallback = self.probe_failure_page_limit,
                    "Page probe failed, using fallback page limit"
                );
                self.probe_failure_page_limit
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> ImageboardClient {
        let mut config = AppConfig::default();
        config.api.base_url = base_url.to_string();
        let http = build_http_client(&config).unwrap();
        ImageboardClient::new(http, &config)
    }

    #[test]
    fn test_parse_posts_defaults_missing_fields() {
        let body = r#"[
            {"id": 7, "file_url": "https://files.example/7.png", "tags": "cat solo", "score": 12},
            {"id": 8, "file_url": null},
            {}
        ]"#;

        let posts = parse_posts(body).unwrap();
        assert_eq!(posts.len(), 3);
        assert_eq!(posts[0].tags, "cat solo");
        assert_eq!(posts[1].file_url, "");
        assert_eq!(posts[1].tags, "");
        assert_eq!(posts[2], Post::default());
    }

    #[test]
    fn test_parse_posts_empty_bodies() {
        assert!(parse_posts("").unwrap().is_empty());
        assert!(parse_posts("  \n").unwrap().is_empty());
        assert!(parse_posts("null").unwrap().is_empty());
        assert!(parse_posts("[]").unwrap().is_empty());
    }

    #[test]
    fn test_parse_posts_malformed() {
        assert!(matches!(parse_posts("<html>"), Err(ClientError::Deserialization(_))));
        assert!(matches!(parse_posts("{\"id\": 1}"), Err(ClientError::Deserialization(_))));
    }

    #[tokio::test]
    async fn test_fetch_posts_sends_encoded_query() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/post.json"))
            .and(query_param("tags", "cat -dog rating:safe"))
            .and(query_param("page", "3"))
            .and(query_param("limit", "20"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": 1, "file_url": "https://files.example/1.jpg", "tags": "cat"},
                {"id": 2, "file_url": "https://files.example/2.jpg", "tags": "cat solo"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let posts = client.fetch_posts("cat -dog rating:safe", 3, 20).await.unwrap();

        assert_eq!(posts.len(), 2);
        assert_eq!(posts[1].id, 2);
    }

    #[tokio::test]
    async fn test_fetch_posts_error_status() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/post.json"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let result = client.fetch_posts("cat", 1, 20).await;

        assert!(matches!(result, Err(ClientError::Status(status)) if status == StatusCode::SERVICE_UNAVAILABLE));
    }

    #[tokio::test]
    async fn test_fetch_posts_malformed_body() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/post.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let result = client.fetch_posts("cat", 1, 20).await;

        assert!(matches!(result, Err(ClientError::Deserialization(_))));
    }

    #[tokio::test]
    async fn test_estimate_max_page_with_posts() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/post.json"))
            .and(query_param("page", "1"))
            .and(query_param("limit", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": 1, "file_url": "https://files.example/1.jpg", "tags": "cat"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        assert_eq!(client.estimate_max_page("cat").await, 50);
    }

    #[tokio::test]
    async fn test_estimate_max_page_without_posts() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/post.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        assert_eq!(client.estimate_max_page("nothing_matches").await, 1);
    }

    #[tokio::test]
    async fn test_estimate_max_page_probe_failure() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/post.json"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        assert_eq!(client.estimate_max_page("cat").await, 10);
    }
}
