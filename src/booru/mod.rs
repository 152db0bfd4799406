//! Imageboard search: tag handling, the API client, image fetching and the
//! search pipeline built on top of them.

pub mod aliases;
pub mod client;
pub mod config_loader;
pub mod filter;
pub mod image_fetcher;
pub mod logger;
pub mod orchestrator;
pub mod random;
pub mod service;
pub mod settings;
pub mod tags;

pub use aliases::{expand_aliases, AliasTable, Expansion, Rewrite};
pub use client::{build_http_client, ClientError, ClientResult, ImageboardClient, Post, PostSource};
pub use config_loader::{AppConfig, ConfigError, ConfigManager, ConfigResult};
pub use filter::ContentFilter;
pub use image_fetcher::{FetchError, FetchResult, HttpImageFetcher, ImageFetcher, ImageResult};
pub use logger::{init_logging, LoggerError, LoggerResult};
pub use orchestrator::{SearchOrchestrator, SearchSettings};
pub use random::{RandomSource, SeededRandom, ThreadRandom};
pub use service::{ImageSearchService, ValidationError, ValidationResult};
pub use settings::{JsonSettingsStore, SettingsError, SettingsResult, SettingsStore, UserSettings};
pub use tags::{normalize_tags, TagQuery};
