use std::future::Future;
use std::io::IsTerminal;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Error};
use chrono::Local;
use console::{style, Term};
use dialoguer::{theme::ColorfulTheme, Confirm, Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace, warn};

use image_search::booru::image_fetcher::OUTPUT_EXTENSION;
use image_search::booru::settings::{add_custom_alias, add_favorite_tag, remove_favorite_tag, set_default_filter};
use image_search::booru::{AppConfig, ContentFilter, ImageResult, ImageSearchService, ValidationError};

/// The name of the cargo package.
const NAME: &str = env!("CARGO_PKG_NAME");

/// The version of the cargo package.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The authors who created the package.
const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");

/// Longest tag label used in saved file names.
const MAX_FILE_LABEL_LEN: usize = 60;

/// A parsed `[count] <tags> [sfw|nsfw]` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ImageRequest {
    pub(crate) count: i64,
    pub(crate) tags: String,
    pub(crate) filter: ContentFilter,
}

/// A parsed `[count] [sfw|nsfw]` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RandomRequest {
    pub(crate) count: i64,
    pub(crate) filter: ContentFilter,
}

/// Filter keywords recognized inside a request.
fn filter_keyword(token: &str) -> Option<ContentFilter> {
    match token.to_lowercase().as_str() {
        "sfw" | "swf" | "nsfw" => token.parse().ok(),
        _ => None,
    }
}

/// Parse a tag request. The first integer is the image count (default 1,
/// capped at `max_count`), filter keywords pick the filter and every other
/// token is a tag.
pub(crate) fn parse_image_request(input: &str, max_count: u32) -> ImageRequest {
    let mut count = None;
    let mut filter = ContentFilter::All;
    let mut tags = Vec::new();

    for token in input.split_whitespace() {
        if let (None, Ok(number)) = (count, token.parse::<i64>()) {
            count = Some(number.min(i64::from(max_count)));
        } else if let Some(keyword) = filter_keyword(token) {
            filter = keyword;
        } else {
            tags.push(token);
        }
    }

    ImageRequest {
        count: count.unwrap_or(1),
        tags: tags.join(" "),
        filter,
    }
}

/// Parse a random request. Anything that is neither the count nor a filter
/// keyword is ignored.
pub(crate) fn parse_random_request(input: &str, default_count: u32, max_count: u32) -> RandomRequest {
    let mut count = None;
    let mut filter = ContentFilter::All;

    for token in input.split_whitespace() {
        if let (None, Ok(number)) = (count, token.parse::<i64>()) {
            count = Some(number.min(i64::from(max_count)));
        } else if let Some(keyword) = filter_keyword(token) {
            filter = keyword;
        }
    }

    RandomRequest {
        count: count.unwrap_or(i64::from(default_count)),
        filter,
    }
}

/// File-name safe form of a tag query.
fn file_label(tags: &str) -> String {
    let label: String = tags
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(MAX_FILE_LABEL_LEN)
        .collect();
    let label = label.trim_matches('_');

    if label.is_empty() {
        "random".to_string()
    } else {
        label.to_string()
    }
}

fn filter_suffix(filter: ContentFilter) -> String {
    match filter {
        ContentFilter::All => String::new(),
        other => format!(" ({})", other.label()),
    }
}

/// Drive `search` to completion, cancelling it on Ctrl+C.
async fn until_interrupted<F: Future>(search: F, cancel: &CancellationToken) -> F::Output {
    tokio::pin!(search);

    tokio::select! {
        output = &mut search => output,
        Ok(()) = tokio::signal::ctrl_c() => {
            warn!("Interrupted, cancelling search");
            cancel.cancel();
            search.await
        }
    }
}

fn search_spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg} {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Main menu options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MainMenuOption {
    SearchTags,
    RandomImages,
    DefaultFilter,
    Favorites,
    Aliases,
    AliasTable,
    Exit,
}

impl MainMenuOption {
    fn variants() -> &'static [MainMenuOption] {
        &[
            MainMenuOption::SearchTags,
            MainMenuOption::RandomImages,
            MainMenuOption::DefaultFilter,
            MainMenuOption::Favorites,
            MainMenuOption::Aliases,
            MainMenuOption::AliasTable,
            MainMenuOption::Exit,
        ]
    }

    fn display_name(self) -> &'static str {
        match self {
            MainMenuOption::SearchTags => "Search by tags",
            MainMenuOption::RandomImages => "Random images",
            MainMenuOption::DefaultFilter => "Default filter",
            MainMenuOption::Favorites => "Favorites",
            MainMenuOption::Aliases => "Aliases",
            MainMenuOption::AliasTable => "Alias table",
            MainMenuOption::Exit => "Exit",
        }
    }
}

/// A program class that handles the flow of the search user experience.
pub(crate) struct Program {
    service: ImageSearchService,
    config: AppConfig,
    theme: ColorfulTheme,
}

impl Program {
    /// Creates a new instance of the program.
    pub(crate) fn new(service: ImageSearchService, config: AppConfig) -> Self {
        Self {
            service,
            config,
            theme: ColorfulTheme::default(),
        }
    }

    fn user_id(&self) -> u64 {
        self.config.profile.user_id
    }

    fn output_dir(&self) -> &Path {
        Path::new(&self.config.paths.output_directory)
    }

    /// Runs the search program.
    pub(crate) async fn run(&self) -> Result<(), Error> {
        Term::stdout().set_title("image search");
        trace!("Starting image search...");
        trace!("Program Name: {}", NAME);
        trace!("Program Version: {}", VERSION);
        trace!("Program Authors: {}", AUTHORS);

        if !(std::io::stdin().is_terminal() && std::io::stdout().is_terminal()) {
            println!("Warning: Not running in an interactive terminal.");
            println!("Please run this program from a proper terminal/command prompt.");
            return Ok(());
        }

        tokio::fs::create_dir_all(self.output_dir())
            .await
            .with_context(|| format!("Failed to create output directory {}", self.output_dir().display()))?;

        loop {
            match self.show_main_menu()? {
                MainMenuOption::SearchTags => self.search_tags().await?,
                MainMenuOption::RandomImages => self.random_images().await?,
                MainMenuOption::DefaultFilter => self.default_filter().await?,
                MainMenuOption::Favorites => self.favorites().await?,
                MainMenuOption::Aliases => self.aliases().await?,
                MainMenuOption::AliasTable => self.alias_table(),
                MainMenuOption::Exit => {
                    println!("{}", style("Exiting...").cyan());
                    break;
                }
            }
        }

        Ok(())
    }

    fn show_main_menu(&self) -> Result<MainMenuOption, Error> {
        let options = MainMenuOption::variants();
        let option_names: Vec<&str> = options.iter().map(|o| o.display_name()).collect();

        println!("\n{}", style(format!("{} - Main Menu", NAME)).cyan().bold());

        let selection = Select::with_theme(&self.theme)
            .items(&option_names)
            .default(0)
            .interact()?;

        Ok(options[selection])
    }

    async fn search_tags(&self) -> Result<(), Error> {
        println!("\n{}", style("Search by tags").cyan().bold());
        println!("Format: [count] <tags> [sfw|nsfw]    e.g. \"3 zzz -nsfw\", \"miku sfw\"");

        let input: String = Input::with_theme(&self.theme)
            .with_prompt("Request")
            .allow_empty(true)
            .interact_text()?;

        let request = parse_image_request(&input, self.service.max_images_per_request());
        self.run_tag_search(&request).await
    }

    async fn run_tag_search(&self, request: &ImageRequest) -> Result<(), Error> {
        let cancel = CancellationToken::new();
        let spinner = search_spinner(format!(
            "Searching {} image(s) for '{}'{}... (Ctrl+C to cancel)",
            request.count,
            request.tags,
            filter_suffix(request.filter)
        ));

        let result = until_interrupted(
            self.service.check_images_by_tag(
                &request.tags,
                request.count,
                request.filter,
                Some(self.user_id()),
                &cancel,
            ),
            &cancel,
        )
        .await;
        spinner.finish_and_clear();

        match result {
            Err(ValidationError::EmptyTags) => {
                println!("{}", style("Please enter at least one tag.").yellow());
            }
            Err(e) => println!("{}: {}", style("Invalid request").red().bold(), e),
            Ok(_) if cancel.is_cancelled() => println!("{}", style("Search cancelled.").yellow()),
            Ok(images) if images.is_empty() => {
                println!(
                    "{}",
                    style(format!(
                        "No images found for '{}'{}.",
                        request.tags,
                        filter_suffix(request.filter)
                    ))
                    .yellow()
                );
            }
            Ok(images) => self.save_images(images, &request.tags).await?,
        }

        Ok(())
    }

    async fn random_images(&self) -> Result<(), Error> {
        println!("\n{}", style("Random images").cyan().bold());
        println!("Format: [count] [sfw|nsfw]    e.g. \"5\", \"2 nsfw\"");

        let input: String = Input::with_theme(&self.theme)
            .with_prompt("Request")
            .allow_empty(true)
            .interact_text()?;

        let request = parse_random_request(
            &input,
            self.config.search.default_random_count,
            self.service.max_images_per_request(),
        );

        let cancel = CancellationToken::new();
        let spinner = search_spinner(format!(
            "Searching {} random image(s){}... (Ctrl+C to cancel)",
            request.count,
            filter_suffix(request.filter)
        ));

        let result = until_interrupted(
            self.service
                .check_random_images(request.count, request.filter, Some(self.user_id()), &cancel),
            &cancel,
        )
        .await;
        spinner.finish_and_clear();

        match result {
            Err(e) => println!("{}: {}", style("Invalid request").red().bold(), e),
            Ok(_) if cancel.is_cancelled() => println!("{}", style("Search cancelled.").yellow()),
            Ok(images) if images.is_empty() => {
                println!(
                    "{}",
                    style(format!("No random images found{}.", filter_suffix(request.filter))).yellow()
                );
            }
            Ok(images) => self.save_images(images, "").await?,
        }

        Ok(())
    }

    async fn save_images(&self, images: Vec<ImageResult>, tags: &str) -> Result<(), Error> {
        let label = file_label(tags);
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let total = images.len();

        for (index, image) in images.into_iter().enumerate() {
            let path = self
                .output_dir()
                .join(format!("{}_{}_{}.{}", label, timestamp, index + 1, OUTPUT_EXTENSION));
            let (width, height) = (image.width, image.height);

            match write_image(image, &path).await {
                Ok(()) => {
                    info!(path = %path.display(), width = width, height = height, "Saved image");
                    println!(
                        "{} ({}/{}) {}x{} {}",
                        style("Saved").green(),
                        index + 1,
                        total,
                        width,
                        height,
                        path.display()
                    );
                }
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Failed to save image");
                    println!("{}: {}", style("Error saving image").red().bold(), e);
                }
            }
        }

        Ok(())
    }

    async fn default_filter(&self) -> Result<(), Error> {
        println!("\n{}", style("Default filter").cyan().bold());

        let store = self.service.settings_store();
        let current = match store.get(self.user_id()).await {
            Ok(settings) => settings.default_filter,
            Err(e) => {
                warn!(error = %e, "Failed to read user settings");
                ContentFilter::default()
            }
        };
        println!("Current default: {}", style(current.label()).cyan());

        let filters = [ContentFilter::All, ContentFilter::SfwOnly, ContentFilter::NsfwOnly];
        let names: Vec<&str> = filters.iter().map(|f| f.label()).collect();
        let selection = Select::with_theme(&self.theme)
            .with_prompt("Filter used when a request names none")
            .items(&names)
            .default(filters.iter().position(|f| *f == current).unwrap_or(0))
            .interact()?;

        match set_default_filter(store, self.user_id(), filters[selection]).await {
            Ok(settings) => println!(
                "{} {}",
                style("Default filter set to").green(),
                style(settings.default_filter.label()).green().bold()
            ),
            Err(e) => println!("{}: {}", style("Error saving settings").red().bold(), e),
        }

        Ok(())
    }

    async fn favorites(&self) -> Result<(), Error> {
        println!("\n{}", style("Favorites").cyan().bold());

        let actions = ["Search a favorite", "Add", "Remove", "List", "Back"];
        let selection = Select::with_theme(&self.theme)
            .items(&actions)
            .default(0)
            .interact()?;

        let store = self.service.settings_store();
        let favorites = match store.get(self.user_id()).await {
            Ok(settings) => settings.favorite_tags,
            Err(e) => {
                println!("{}: {}", style("Error reading settings").red().bold(), e);
                return Ok(());
            }
        };

        match selection {
            0 => {
                if favorites.is_empty() {
                    println!("{}", style("No favorites yet. Add some first.").yellow());
                    return Ok(());
                }

                let choice = Select::with_theme(&self.theme)
                    .with_prompt("Favorite")
                    .items(&favorites)
                    .default(0)
                    .interact()?;
                let count: i64 = Input::with_theme(&self.theme)
                    .with_prompt("How many images")
                    .default(1)
                    .interact_text()?;

                let request = ImageRequest {
                    count,
                    tags: favorites[choice].clone(),
                    filter: ContentFilter::All,
                };
                self.run_tag_search(&request).await?;
            }
            1 => {
                let tag: String = Input::with_theme(&self.theme)
                    .with_prompt("Tag to add")
                    .interact_text()?;
                match add_favorite_tag(store, self.user_id(), &tag).await {
                    Ok(true) => println!("{}", style("Favorite added!").green()),
                    Ok(false) => println!("{}", style("Already a favorite.").yellow()),
                    Err(e) => println!("{}: {}", style("Error saving settings").red().bold(), e),
                }
            }
            2 => {
                if favorites.is_empty() {
                    println!("{}", style("No favorites to remove.").yellow());
                    return Ok(());
                }

                let choice = Select::with_theme(&self.theme)
                    .with_prompt("Favorite to remove")
                    .items(&favorites)
                    .default(0)
                    .interact()?;
                if Confirm::with_theme(&self.theme)
                    .with_prompt(format!("Remove '{}'?", favorites[choice]))
                    .default(true)
                    .interact()?
                {
                    match remove_favorite_tag(store, self.user_id(), &favorites[choice]).await {
                        Ok(_) => println!("{}", style("Favorite removed.").green()),
                        Err(e) => println!("{}: {}", style("Error saving settings").red().bold(), e),
                    }
                }
            }
            3 => {
                if favorites.is_empty() {
                    println!("{}", style("No favorites yet.").yellow());
                }
                for (index, tag) in favorites.iter().enumerate() {
                    println!("{:>3}. {}", index + 1, tag);
                }
            }
            _ => {}
        }

        Ok(())
    }

    async fn aliases(&self) -> Result<(), Error> {
        println!("\n{}", style("Aliases").cyan().bold());

        let actions = ["Add", "List", "Back"];
        let selection = Select::with_theme(&self.theme)
            .items(&actions)
            .default(0)
            .interact()?;

        let store = self.service.settings_store();
        match selection {
            0 => {
                let alias: String = Input::with_theme(&self.theme)
                    .with_prompt("Alias")
                    .interact_text()?;
                let tag: String = Input::with_theme(&self.theme)
                    .with_prompt("Expands to")
                    .interact_text()?;

                if alias.split_whitespace().count() != 1 || tag.trim().is_empty() {
                    println!("{}", style("An alias must be a single word with a non-empty tag.").yellow());
                    return Ok(());
                }

                match add_custom_alias(store, self.user_id(), &alias, &tag).await {
                    Ok(()) => println!(
                        "{} {} -> {}",
                        style("Alias saved:").green(),
                        alias.trim().to_lowercase(),
                        tag.trim()
                    ),
                    Err(e) => println!("{}: {}", style("Error saving settings").red().bold(), e),
                }
            }
            1 => match store.get(self.user_id()).await {
                Ok(settings) if settings.custom_aliases.is_empty() => {
                    println!("{}", style("No custom aliases yet.").yellow());
                }
                Ok(settings) => {
                    let mut entries: Vec<(&String, &String)> = settings.custom_aliases.iter().collect();
                    entries.sort();
                    for (alias, tag) in entries {
                        println!("{:>16} -> {}", alias, tag);
                    }
                }
                Err(e) => println!("{}: {}", style("Error reading settings").red().bold(), e),
            },
            _ => {}
        }

        Ok(())
    }

    fn alias_table(&self) {
        let table = self.service.alias_table();
        println!(
            "\n{} ({} entries)",
            style("Built-in aliases").cyan().bold(),
            table.len()
        );
        for (alias, tag) in table.sorted_entries() {
            println!("{:>16} -> {}", alias, tag);
        }
    }
}

/// Write an encoded image to `path`.
async fn write_image(image: ImageResult, path: &Path) -> Result<(), Error> {
    let mut reader = image.into_reader();
    let mut file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("Failed to create {}", path.display()))?;
    tokio::io::copy(&mut reader, &mut file).await?;
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_request_defaults() {
        let request = parse_image_request("cat dog", 10);
        assert_eq!(
            request,
            ImageRequest {
                count: 1,
                tags: "cat dog".to_string(),
                filter: ContentFilter::All,
            }
        );
    }

    #[test]
    fn test_image_request_count_and_filter() {
        let request = parse_image_request("3 zzz -nsfw SFW", 10);
        assert_eq!(request.count, 3);
        assert_eq!(request.tags, "zzz -nsfw");
        assert_eq!(request.filter, ContentFilter::SfwOnly);

        let request = parse_image_request("miku 2 swf", 10);
        assert_eq!(request.count, 2);
        assert_eq!(request.tags, "miku");
        assert_eq!(request.filter, ContentFilter::SfwOnly);

        assert_eq!(parse_image_request("cat Nsfw", 10).filter, ContentFilter::NsfwOnly);
    }

    #[test]
    fn test_image_request_count_is_capped() {
        assert_eq!(parse_image_request("50 cat", 10).count, 10);
        assert_eq!(parse_image_request("0 cat", 10).count, 0);
        assert_eq!(parse_image_request("-2 cat", 10).count, -2);
    }

    #[test]
    fn test_only_first_number_is_count() {
        let request = parse_image_request("2 cat 1999", 10);
        assert_eq!(request.count, 2);
        assert_eq!(request.tags, "cat 1999");
    }

    #[test]
    fn test_filter_words_are_not_tags() {
        let request = parse_image_request("nsfw", 10);
        assert_eq!(request.tags, "");
        assert_eq!(request.filter, ContentFilter::NsfwOnly);

        // Only the short forms are keywords
        let request = parse_image_request("safe explicit", 10);
        assert_eq!(request.tags, "safe explicit");
        assert_eq!(request.filter, ContentFilter::All);
    }

    #[test]
    fn test_random_request() {
        assert_eq!(
            parse_random_request("", 3, 10),
            RandomRequest {
                count: 3,
                filter: ContentFilter::All,
            }
        );
        assert_eq!(
            parse_random_request("2 nsfw", 3, 10),
            RandomRequest {
                count: 2,
                filter: ContentFilter::NsfwOnly,
            }
        );
        assert_eq!(parse_random_request("sfw 99", 3, 10).count, 10);
        assert_eq!(parse_random_request("cat 4 5", 3, 10).count, 4);
    }

    #[test]
    fn test_file_label() {
        assert_eq!(file_label("zenless_zone_zero -nsfw"), "zenless_zone_zero_-nsfw");
        assert_eq!(file_label("fate/grand_order"), "fate_grand_order");
        assert_eq!(file_label(""), "random");
        assert_eq!(file_label("???"), "random");
        assert_eq!(file_label(&"a".repeat(200)).len(), MAX_FILE_LABEL_LEN);
    }

    #[tokio::test]
    async fn test_write_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jpg");
        let image = ImageResult::new(1, 1, bytes::Bytes::from_static(b"\xFF\xD8jpeg"));

        write_image(image, &path).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"\xFF\xD8jpeg");
    }
}
