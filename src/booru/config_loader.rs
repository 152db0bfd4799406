use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

/// Name of the configuration file inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

// Define error types for config loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(String),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

// Result type alias for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Api {
    pub base_url: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
}

impl Default for Api {
    fn default() -> Self {
        Self {
            base_url: "https://yande.re".to_string(),
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Search {
    pub max_attempts: u32,
    pub default_page_limit: u32,
    pub probe_failure_page_limit: u32,
    pub images_per_page: u32,
    pub max_images_per_request: u32,
    pub default_random_count: u32,
    /// Fixed seed for page choice and sampling; random when unset.
    pub random_seed: Option<u64>,
}

impl Default for Search {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            default_page_limit: 50,
            probe_failure_page_limit: 10,
            images_per_page: 20,
            max_images_per_request: 10,
            default_random_count: 3,
            random_seed: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Images {
    pub max_image_size: u32,
    pub jpeg_quality: u8,
    pub max_concurrent_fetches: usize,
    pub fetch_timeout_secs: u64,
    pub attempt_timeout_secs: u64,
}

impl Default for Images {
    fn default() -> Self {
        Self {
            max_image_size: 1280,
            jpeg_quality: 75,
            max_concurrent_fetches: 4,
            fetch_timeout_secs: 30,
            attempt_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Paths {
    pub settings_file: String,
    pub output_directory: String,
    pub log_directory: String,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            settings_file: "user_settings.json".to_string(),
            output_directory: "./images".to_string(),
            log_directory: "./logs".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Logging {
    pub log_level: String,
    pub log_format: String,
    pub log_to_file: bool,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            log_to_file: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Profile {
    /// Id under which the local user's settings are stored.
    pub user_id: u64,
}

impl Default for Profile {
    fn default() -> Self {
        Self { user_id: 1 }
    }
}

/// Everything in `config.toml`.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub api: Api,
    pub search: Search,
    pub images: Images,
    pub paths: Paths,
    pub logging: Logging,
    pub profile: Profile,
}

impl AppConfig {
    /// Reject values the search pipeline cannot work with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("api.base_url must not be empty".to_string()));
        }
        if self.api.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("api.request_timeout_secs must be at least 1".to_string()));
        }
        if self.search.max_attempts == 0 {
            return Err(ConfigError::Invalid("search.max_attempts must be at least 1".to_string()));
        }
        if self.search.images_per_page == 0 {
            return Err(ConfigError::Invalid("search.images_per_page must be at least 1".to_string()));
        }
        if self.search.max_images_per_request == 0 {
            return Err(ConfigError::Invalid(
                "search.max_images_per_request must be at least 1".to_string(),
            ));
        }
        if self.images.max_image_size == 0 {
            return Err(ConfigError::Invalid("images.max_image_size must be at least 1".to_string()));
        }
        if !(1..=100).contains(&self.images.jpeg_quality) {
            return Err(ConfigError::Invalid(format!(
                "images.jpeg_quality must be between 1 and 100, got {}",
                self.images.jpeg_quality
            )));
        }
        if self.images.max_concurrent_fetches == 0 {
            return Err(ConfigError::Invalid(
                "images.max_concurrent_fetches must be at least 1".to_string(),
            ));
        }
        if self.images.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid("images.fetch_timeout_secs must be at least 1".to_string()));
        }
        if self.images.attempt_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "images.attempt_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.images.fetch_timeout_secs)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.images.attempt_timeout_secs)
    }
}

/// Loads `config.toml` from a config directory, creating it when missing.
pub struct ConfigManager {
    app_config: AppConfig,
    config_dir: PathBuf,
}

impl ConfigManager {
    // Create a new ConfigManager instance
    pub fn new(config_dir: impl AsRef<Path>) -> ConfigResult<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        // Create the directory if it doesn't exist
        if !config_dir.exists() {
            info!("Creating config directory: {}", config_dir.display());
            fs::create_dir_all(&config_dir)?;
        }

        let app_config = Self::load_app_config(&config_dir)?;
        app_config.validate()?;

        let manager = Self {
            app_config,
            config_dir,
        };

        manager.create_default_config()?;

        Ok(manager)
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE_NAME)
    }

    // Load app config from config.toml
    fn load_app_config(config_dir: &Path) -> ConfigResult<AppConfig> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            warn!("Config file not found: {}", config_path.display());
            return Ok(AppConfig::default());
        }

        let content = fs::read_to_string(&config_path)?;
        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                error!("Failed to parse {}: {}", CONFIG_FILE_NAME, e);
                info!("Backing up old config and creating new one with default values");

                // Backup the old config file
                if let Err(backup_err) = fs::rename(&config_path, config_path.with_extension("toml.backup")) {
                    warn!("Failed to backup old config: {}", backup_err);
                }

                let default_config = AppConfig::default();
                let toml_string = toml::to_string_pretty(&default_config)
                    .map_err(|e| ConfigError::TomlSer(e.to_string()))?;
                if let Err(write_err) = fs::write(&config_path, toml_string) {
                    error!("Failed to write new config file: {}", write_err);
                } else {
                    info!("Created new {} with default values", CONFIG_FILE_NAME);
                }

                Ok(default_config)
            }
        }
    }

    // Get app config
    pub fn app_config(&self) -> &AppConfig {
        &self.app_config
    }

    // Write config.toml with the values in use if it doesn't exist
    fn create_default_config(&self) -> ConfigResult<()> {
        let config_path = self.config_path();
        if !config_path.exists() {
            let toml_string = toml::to_string_pretty(&self.app_config)
                .map_err(|e| ConfigError::TomlSer(e.to_string()))?;
            fs::write(&config_path, toml_string)?;
            info!("Wrote default config to {}", config_path.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_config_is_created_with_defaults() {
        let dir = tempdir().unwrap();
        let manager = ConfigManager::new(dir.path()).unwrap();

        assert_eq!(manager.app_config(), &AppConfig::default());
        assert!(dir.path().join(CONFIG_FILE_NAME).exists());

        let written = fs::read_to_string(dir.path().join(CONFIG_FILE_NAME)).unwrap();
        let parsed: AppConfig = toml::from_str(&written).unwrap();
        assert_eq!(parsed, AppConfig::default());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[search]\nmax_attempts = 5\n\n[images]\nmax_image_size = 640\n",
        )
        .unwrap();

        let manager = ConfigManager::new(dir.path()).unwrap();
        let config = manager.app_config();
        assert_eq!(config.search.max_attempts, 5);
        assert_eq!(config.search.default_page_limit, 50);
        assert_eq!(config.images.max_image_size, 640);
        assert_eq!(config.api.base_url, "https://yande.re");
    }

    #[test]
    fn test_corrupted_config_is_backed_up() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "this is = = not toml [").unwrap();

        let manager = ConfigManager::new(dir.path()).unwrap();
        assert_eq!(manager.app_config(), &AppConfig::default());
        assert!(path.with_extension("toml.backup").exists());
        assert!(path.exists());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), "[search]\nmax_attempts = 0\n").unwrap();

        match ConfigManager::new(dir.path()) {
            Err(ConfigError::Invalid(message)) => assert!(message.contains("max_attempts")),
            other => panic!("expected invalid config error, got {:?}", other.map(|_| ())),
        }

        for (section, key) in [
            ("api", "request_timeout_secs"),
            ("images", "fetch_timeout_secs"),
            ("images", "attempt_timeout_secs"),
        ] {
            let dir = tempdir().unwrap();
            fs::write(dir.path().join(CONFIG_FILE_NAME), format!("[{section}]\n{key} = 0\n")).unwrap();

            match ConfigManager::new(dir.path()) {
                Err(ConfigError::Invalid(message)) => assert!(message.contains(key)),
                other => panic!("expected invalid config error for {key}, got {:?}", other.map(|_| ())),
            }
        }
    }

    #[test]
    fn test_jpeg_quality_bounds() {
        let mut config = AppConfig::default();
        config.images.jpeg_quality = 0;
        assert!(config.validate().is_err());
        config.images.jpeg_quality = 100;
        assert!(config.validate().is_ok());
    }
}
