use std::env::consts::{ARCH, FAMILY, OS};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Error};
use tracing::{info, trace};

use image_search::booru::{
    build_http_client, init_logging, AliasTable, ConfigManager, HttpImageFetcher, ImageSearchService,
    ImageboardClient, JsonSettingsStore, RandomSource, SearchOrchestrator, SearchSettings, SeededRandom,
    ThreadRandom,
};
use crate::program::Program;

mod program;

/// Directory holding `config.toml`.
const CONFIG_DIR: &str = "./config";

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config_manager = ConfigManager::new(CONFIG_DIR).context("Failed to load configuration")?;
    let config = config_manager.app_config().clone();

    // Flushes the log file on drop
    let _log_guard = init_logging(&config.logging, Path::new(&config.paths.log_directory))
        .context("Failed to initialize logging")?;
    log_system_information();
    info!(config = %config_manager.config_path().display(), "Configuration loaded");

    let http = build_http_client(&config).context("Failed to build HTTP client")?;
    let source = Arc::new(ImageboardClient::new(http.clone(), &config));
    let fetcher = Arc::new(HttpImageFetcher::new(http, &config));

    let random: Arc<dyn RandomSource> = match config.search.random_seed {
        Some(seed) => {
            info!(seed = seed, "Using seeded random source");
            Arc::new(SeededRandom::new(seed))
        }
        None => Arc::new(ThreadRandom),
    };

    let orchestrator = SearchOrchestrator::new(source, fetcher, random, SearchSettings::from(&config));
    let settings = Arc::new(JsonSettingsStore::open(&config.paths.settings_file).await);
    let service = ImageSearchService::new(orchestrator, settings, AliasTable::global(), &config);

    let program = Program::new(service, config);
    program.run().await
}

/// Logs important information about the system being used.
fn log_system_information() {
    trace!("Printing system information out into log for debug purposes...");
    trace!("ARCH:           \"{}\"", ARCH);
    trace!("FAMILY:         \"{}\"", FAMILY);
    trace!("OS:             \"{}\"", OS);
}
