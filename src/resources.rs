// ABOUTME: Image resource handling for the course-deck renderers
// ABOUTME: Fetches image bytes from paths, URLs or data URIs with retry, caching and validation

use crate::config::RetryPolicy;
use crate::errors::{DeckError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{GenericImageView, ImageFormat, ImageOutputFormat};
use log::{debug, info, warn};
use parking_lot::Mutex;
use reqwest::blocking::Client;
use std::collections::HashMap;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Resolves an image reference to its raw bytes.
pub trait ImageFetcher {
    fn fetch(&self, reference: &str) -> Result<Vec<u8>>;
}

impl<F: ImageFetcher + ?Sized> ImageFetcher for &F {
    fn fetch(&self, reference: &str) -> Result<Vec<u8>> {
        (**self).fetch(reference)
    }
}

/// Where an image reference points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageLocation {
    Remote(Url),
    Local(PathBuf),
    Inline(String),
}

impl ImageLocation {
    pub fn parse(reference: &str, base_dir: Option<&Path>) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(DeckError::InvalidResourcePath(
                "empty image reference".to_string(),
            ));
        }
        if reference.starts_with("data:") {
            return Ok(ImageLocation::Inline(reference.to_string()));
        }
        match Url::parse(reference) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {
                Ok(ImageLocation::Remote(url))
            }
            Ok(url) if url.scheme() == "file" => url
                .to_file_path()
                .map(ImageLocation::Local)
                .map_err(|_| DeckError::InvalidResourcePath(reference.to_string())),
            // Windows drive letters parse as a one-letter scheme.
            Ok(url) if url.scheme().len() > 1 => Err(DeckError::InvalidResourcePath(format!(
                "Unsupported scheme '{}' in {}",
                url.scheme(),
                reference
            ))),
            _ => {
                let path = PathBuf::from(reference);
                let path = match base_dir {
                    Some(base) if path.is_relative() => base.join(path),
                    _ => path,
                };
                Ok(ImageLocation::Local(path))
            }
        }
    }
}

/// Fetches images from the filesystem, HTTP(S) or `data:` URIs.
pub struct ResourceFetcher {
    base_dir: Option<PathBuf>,
    retry: RetryPolicy,
    client: Option<Client>,
}

impl ResourceFetcher {
    pub fn new(base_dir: Option<PathBuf>, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(retry.timeout_ms))
            .build()
            .map_err(DeckError::FetchError)?;
        Ok(Self {
            base_dir,
            retry,
            client: Some(client),
        })
    }

    /// A fetcher that never touches the network.
    pub fn offline(base_dir: Option<PathBuf>) -> Self {
        Self {
            base_dir,
            retry: RetryPolicy::default(),
            client: None,
        }
    }

    /// Fetch content from a remote URL with retry capability
    fn fetch_remote(&self, url: &Url) -> Result<Vec<u8>> {
        let client = self.client.as_ref().ok_or_else(|| {
            DeckError::InvalidResourcePath(format!("Remote images are disabled: {}", url))
        })?;
        info!("Fetching remote image: {}", url);

        let mut retry_delay = self.retry.initial_delay_ms;
        let mut last_error = None;

        for attempt in 1..=self.retry.attempts.max(1) {
            match client.get(url.as_str()).send() {
                Ok(response) => {
                    if response.status().is_success() {
                        return response
                            .bytes()
                            .map(|bytes| bytes.to_vec())
                            .map_err(DeckError::FetchError);
                    }
                    let status = response.status();
                    last_error = Some(DeckError::ValidationError(format!("HTTP error: {}", status)));
                    // Client errors will not improve on retry.
                    if status.is_client_error() {
                        break;
                    }
                }
                Err(e) => {
                    last_error = Some(DeckError::FetchError(e));
                }
            }

            if attempt < self.retry.attempts {
                info!(
                    "Fetch attempt {} for {} failed, retrying in {} ms",
                    attempt, url, retry_delay
                );
                std::thread::sleep(Duration::from_millis(retry_delay));
                retry_delay *= 2;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            DeckError::ValidationError(format!("Unknown error fetching {}", url))
        }))
    }

    fn read_local(&self, path: &Path) -> Result<Vec<u8>> {
        debug!("Reading local image: {:?}", path);
        if !path.exists() {
            return Err(DeckError::PathNotFoundError(path.to_path_buf()));
        }
        fs::read(path).map_err(DeckError::FileReadError)
    }
}

impl ImageFetcher for ResourceFetcher {
    fn fetch(&self, reference: &str) -> Result<Vec<u8>> {
        match ImageLocation::parse(reference, self.base_dir.as_deref())? {
            ImageLocation::Remote(url) => self.fetch_remote(&url),
            ImageLocation::Local(path) => self.read_local(&path),
            ImageLocation::Inline(uri) => decode_data_uri(&uri).map(|(_, bytes)| bytes),
        }
    }
}

/// Memoizes another fetcher so the markup and deck passes share downloads.
pub struct CachedFetcher<F> {
    inner: F,
    cache: Mutex<HashMap<String, Arc<Vec<u8>>>>,
}

impl<F: ImageFetcher> CachedFetcher<F> {
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn cached_count(&self) -> usize {
        self.cache.lock().len()
    }
}

impl<F: ImageFetcher> ImageFetcher for CachedFetcher<F> {
    fn fetch(&self, reference: &str) -> Result<Vec<u8>> {
        if let Some(bytes) = self.cache.lock().get(reference) {
            return Ok(bytes.as_ref().clone());
        }
        // Failures are not cached so a later pass may succeed.
        let bytes = self.inner.fetch(reference)?;
        self.cache
            .lock()
            .insert(reference.to_string(), Arc::new(bytes.clone()));
        Ok(bytes)
    }
}

/// Validated image bytes in a format both renderers can embed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedImage {
    pub bytes: Vec<u8>,
    pub extension: &'static str,
    pub mime: &'static str,
    pub width: u32,
    pub height: u32,
}

impl LoadedImage {
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
    }
}

/// Decode bytes to check they are an image; formats other than PNG, JPEG and GIF are re-encoded as PNG.
pub fn load_image(bytes: Vec<u8>) -> Result<LoadedImage> {
    let format = image::guess_format(&bytes)?;
    let decoded = image::load_from_memory_with_format(&bytes, format)?;
    let (width, height) = decoded.dimensions();
    if width == 0 || height == 0 {
        return Err(DeckError::ImageError("image has zero size".to_string()));
    }

    let (bytes, extension, mime) = match format {
        ImageFormat::Png => (bytes, "png", "image/png"),
        ImageFormat::Jpeg => (bytes, "jpeg", "image/jpeg"),
        ImageFormat::Gif => (bytes, "gif", "image/gif"),
        other => {
            warn!("Re-encoding {:?} image as PNG", other);
            let mut png = Vec::new();
            decoded.write_to(&mut Cursor::new(&mut png), ImageOutputFormat::Png)?;
            (png, "png", "image/png")
        }
    };

    Ok(LoadedImage {
        bytes,
        extension,
        mime,
        width,
        height,
    })
}

/// Fetch and validate in one step.
pub fn fetch_image<F: ImageFetcher + ?Sized>(fetcher: &F, reference: &str) -> Result<LoadedImage> {
    load_image(fetcher.fetch(reference)?)
}

/// Split a base64 `data:` URI into its mime type and bytes.
pub fn decode_data_uri(uri: &str) -> Result<(String, Vec<u8>)> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| DeckError::InvalidResourcePath("not a data URI".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| DeckError::InvalidResourcePath("data URI has no payload".to_string()))?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| DeckError::InvalidResourcePath("only base64 data URIs are supported".to_string()))?;
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| DeckError::ImageError(format!("invalid base64 payload: {}", e)))?;
    Ok((mime.to_string(), bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageBuffer, Rgb};
    use std::cell::Cell;
    use tempfile::TempDir;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |_, _| Rgb([30u8, 60u8, 90u8]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
            .expect("Failed to encode PNG");
        bytes
    }

    struct CountingFetcher {
        calls: Cell<usize>,
    }

    impl ImageFetcher for CountingFetcher {
        fn fetch(&self, _reference: &str) -> Result<Vec<u8>> {
            self.calls.set(self.calls.get() + 1);
            Ok(png_bytes(2, 2))
        }
    }

    #[test]
    fn test_location_parsing() {
        let base = Path::new("/course/assets");
        assert!(matches!(
            ImageLocation::parse("https://cdn.example.com/a.png", Some(base)).unwrap(),
            ImageLocation::Remote(_)
        ));
        assert_eq!(
            ImageLocation::parse("img/a.png", Some(base)).unwrap(),
            ImageLocation::Local(PathBuf::from("/course/assets/img/a.png"))
        );
        assert!(matches!(
            ImageLocation::parse("data:image/png;base64,AAAA", None).unwrap(),
            ImageLocation::Inline(_)
        ));
        assert!(ImageLocation::parse("ftp://host/a.png", None).is_err());
        assert!(ImageLocation::parse("  ", None).is_err());
    }

    #[test]
    fn test_local_fetch_and_load() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        fs::write(dir.path().join("chart.png"), png_bytes(40, 20)).expect("Failed to write PNG");

        let fetcher = ResourceFetcher::offline(Some(dir.path().to_path_buf()));
        let image = fetch_image(&fetcher, "chart.png").unwrap();
        assert_eq!((image.width, image.height), (40, 20));
        assert_eq!(image.extension, "png");

        assert!(matches!(
            fetcher.fetch("missing.png"),
            Err(DeckError::PathNotFoundError(_))
        ));
    }

    #[test]
    fn test_offline_fetcher_refuses_remote() {
        let fetcher = ResourceFetcher::offline(None);
        assert!(fetcher.fetch("https://example.com/a.png").is_err());
    }

    #[test]
    fn test_data_uri_round_trip() {
        let image = load_image(png_bytes(3, 5)).unwrap();
        let uri = image.to_data_uri();
        assert!(uri.starts_with("data:image/png;base64,"));
        let (mime, bytes) = decode_data_uri(&uri).unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(bytes, image.bytes);
        assert!(decode_data_uri("data:image/png,raw").is_err());
    }

    #[test]
    fn test_garbage_bytes_fail_to_load() {
        assert!(load_image(b"definitely not an image".to_vec()).is_err());
    }

    #[test]
    fn test_cached_fetcher_fetches_once() {
        let cached = CachedFetcher::new(CountingFetcher { calls: Cell::new(0) });
        cached.fetch("a.png").unwrap();
        cached.fetch("a.png").unwrap();
        cached.fetch("b.png").unwrap();
        assert_eq!(cached.inner.calls.get(), 2);
        assert_eq!(cached.cached_count(), 2);
    }
}
