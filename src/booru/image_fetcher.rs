//! Image download and resize.
//!
//! Fetches one post's file, decodes it, shrinks it so neither side exceeds
//! the configured maximum and re-encodes it as JPEG. Decoding and encoding
//! run on the blocking pool.

use std::io::Cursor;

use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use reqwest::{Client, StatusCode, Url};
use thiserror::Error;
use tracing::debug;

use crate::booru::config_loader::AppConfig;

/// MIME type of every produced image.
pub const OUTPUT_CONTENT_TYPE: &str = "image/jpeg";

/// File extension matching [`OUTPUT_CONTENT_TYPE`].
pub const OUTPUT_EXTENSION: &str = "jpg";

/// Error types for a single image fetch
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Invalid image URL: {0:?}")]
    InvalidUrl(String),

    #[error("Request error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Image request returned {0}")]
    Status(StatusCode),

    #[error("Decode error: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Encode error: {0}")]
    Encode(#[source] image::ImageError),

    #[error("Image fetch timed out")]
    TimedOut,

    #[error("Image task failed: {0}")]
    Task(String),
}

/// Result type for image fetches
pub type FetchResult<T> = Result<T, FetchError>;

/// An encoded, size-bounded image ready to hand to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageResult {
    pub width: u32,
    pub height: u32,
    data: Bytes,
}

impl ImageResult {
    pub fn new(width: u32, height: u32, data: Bytes) -> Self {
        Self { width, height, data }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn content_type(&self) -> &'static str {
        OUTPUT_CONTENT_TYPE
    }

    /// Give up the bytes as a readable stream positioned at the start.
    pub fn into_reader(self) -> Cursor<Bytes> {
        Cursor::new(self.data)
    }
}

/// Downloads and prepares a single image.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> FetchResult<ImageResult>;
}

/// Accept only absolute `http`/`https` URLs with a host.
pub fn validate_image_url(url: &str) -> FetchResult<Url> {
    let parsed = Url::parse(url.trim()).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;

    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(parsed),
        _ => Err(FetchError::InvalidUrl(url.to_string())),
    }
}

/// Dimensions after fitting `(width, height)` inside a `max x max` box.
///
/// Images that already fit are left alone; otherwise the longer side becomes
/// `max` and the shorter side is scaled by the same factor and rounded.
pub fn bounded_dimensions(width: u32, height: u32, max: u32) -> (u32, u32) {
    if width <= max && height <= max {
        return (width, height);
    }

    let scale = max as f64 / width.max(height) as f64;
    let scaled = |side: u32| ((side as f64 * scale).round() as u32).clamp(1, max);

    if width >= height {
        (max, scaled(height))
    } else {
        (scaled(width), max)
    }
}

/// Decode `bytes`, bound the dimensions and re-encode as JPEG.
pub fn process_image(bytes: &[u8], max_dimension: u32, jpeg_quality: u8) -> FetchResult<ImageResult> {
    let decoded = image::load_from_memory(bytes).map_err(FetchError::Decode)?;
    let (width, height) = decoded.dimensions();
    let (target_width, target_height) = bounded_dimensions(width, height, max_dimension);

    let resized = if (target_width, target_height) == (width, height) {
        decoded
    } else {
        decoded.resize_exact(target_width, target_height, FilterType::Lanczos3)
    };

    // JPEG has no alpha channel
    let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());

    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, jpeg_quality);
    rgb.write_with_encoder(encoder).map_err(FetchError::Encode)?;

    Ok(ImageResult::new(target_width, target_height, Bytes::from(buffer)))
}

/// Fetches images over HTTP with the shared client.
#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    client: Client,
    max_dimension: u32,
    jpeg_quality: u8,
}

impl HttpImageFetcher {
    pub fn new(client: Client, config: &AppConfig) -> Self {
        Self {
            client,
            max_dimension: config.images.max_image_size,
            jpeg_quality: config.images.jpeg_quality,
        }
    }

    async fn download(&self, url: Url) -> FetchResult<Bytes> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        Ok(response.bytes().await?)
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> FetchResult<ImageResult> {
        let parsed = validate_image_url(url)?;

        let bytes = self.download(parsed).await?;
        debug!(url = url, size = bytes.len(), "Downloaded image");

        let max_dimension = self.max_dimension;
        let jpeg_quality = self.jpeg_quality;
        let image = tokio::task::spawn_blocking(move || process_image(&bytes, max_dimension, jpeg_quality))
            .await
            .map_err(|e| FetchError::Task(e.to_string()))??;

        debug!(url = url, width = image.width, height = image.height, size = image.len(), "Processed image");
        Ok(image)
    }
}
