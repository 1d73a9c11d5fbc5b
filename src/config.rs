// ABOUTME: Configuration module for the course-deck layout engine
// ABOUTME: Holds the tuned layout constants, theme, fetch policy and environment overrides

use crate::errors::{DeckError, Result};
use crate::model::Canvas;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Empirically tuned pixel constants used by the height estimator and splitter.
///
/// Every field has a default so a deployment can override a subset from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutMetrics {
    /// Horizontal padding of the content region on each side.
    pub padding_x: f32,
    /// Space reserved for the slide title.
    pub title_reservation: f32,
    /// Slide budget when a subtitle is present.
    pub max_with_subtitle: f32,
    /// Slide budget without a subtitle.
    pub max_no_subtitle: f32,
    /// Pixels a slide may exceed its budget before it counts as overflowing.
    pub overflow_tolerance: f32,
    pub block_spacing: f32,
    pub heading_height: f32,
    pub heading_margin_top: f32,
    pub bullets_heading_height: f32,
    pub bullet_indent: f32,
    pub primary_line_height: f32,
    pub secondary_line_height: f32,
    pub secondary_indent: f32,
    pub avg_char_width: f32,
    pub image_height: f32,
    pub caption_height: f32,
    pub callout_base_height: f32,
    pub callout_line_height: f32,
    pub callout_padding_x: f32,
    /// Part A of a split holds `ceil(n / split_divisor)` blocks.
    pub split_divisor: usize,
    pub max_split_depth: usize,
    /// Smallest image edge the overlap resolver may shrink to, in pixels.
    pub min_visible_px: f64,
}

impl Default for LayoutMetrics {
    fn default() -> Self {
        Self {
            padding_x: 64.0,
            title_reservation: 96.0,
            max_with_subtitle: 560.0,
            max_no_subtitle: 610.0,
            overflow_tolerance: 0.0,
            block_spacing: 16.0,
            heading_height: 44.0,
            heading_margin_top: 12.0,
            bullets_heading_height: 36.0,
            bullet_indent: 36.0,
            primary_line_height: 34.0,
            secondary_line_height: 30.0,
            secondary_indent: 32.0,
            avg_char_width: 11.5,
            image_height: 300.0,
            caption_height: 30.0,
            callout_base_height: 64.0,
            callout_line_height: 28.0,
            callout_padding_x: 48.0,
            split_divisor: 3,
            max_split_depth: 10,
            min_visible_px: 48.0,
        }
    }
}

impl LayoutMetrics {
    /// Load metrics from a JSON file; missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DeckError::PathNotFoundError(path.to_path_buf()));
        }
        let content = fs::read_to_string(path).map_err(DeckError::FileReadError)?;
        let metrics: LayoutMetrics = serde_json::from_str(&content)?;
        metrics.validate()?;
        Ok(metrics)
    }

    pub fn validate(&self) -> Result<()> {
        if self.avg_char_width <= 0.0 {
            return Err(DeckError::ConfigError(
                "avg_char_width must be positive".to_string(),
            ));
        }
        if self.split_divisor < 2 {
            return Err(DeckError::ConfigError(format!(
                "split_divisor must be at least 2, got {}",
                self.split_divisor
            )));
        }
        if self.max_no_subtitle <= self.title_reservation
            || self.max_with_subtitle <= self.title_reservation
        {
            return Err(DeckError::ConfigError(
                "slide budgets must exceed the title reservation".to_string(),
            ));
        }
        Ok(())
    }
}

/// Canvas plus the metrics tuned for it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub canvas: Canvas,
    #[serde(default)]
    pub metrics: LayoutMetrics,
}

impl LayoutConfig {
    pub fn validate(&self) -> Result<()> {
        self.canvas.validate()?;
        self.metrics.validate()
    }
}

/// Fonts and colours shared by the markup and the deck.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Theme {
    pub font_family: String,
    pub heading_font_family: String,
    /// Hex colours without the leading `#`.
    pub primary_color: String,
    pub accent_color: String,
    pub background_color: String,
    pub text_color: String,
    pub muted_color: String,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            font_family: "Calibri".to_string(),
            heading_font_family: "Calibri Light".to_string(),
            primary_color: "1E3A5F".to_string(),
            accent_color: "F59E0B".to_string(),
            background_color: "FFFFFF".to_string(),
            text_color: "1F2937".to_string(),
            muted_color: "6B7280".to_string(),
        }
    }
}

/// Retry policy for remote image fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_delay_ms: u64,
    pub timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay_ms: 1000,
            timeout_ms: 10000,
        }
    }
}

/// Global configuration for the application
pub struct Config {
    pub layout: LayoutConfig,
    pub theme: Theme,
    pub retry: RetryPolicy,
    pub embed_images: bool,
    pub browser_path: Option<String>,
    pub image_base_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            layout: LayoutConfig::default(),
            theme: Theme::default(),
            retry: RetryPolicy::default(),
            embed_images: true,
            browser_path: None,
            image_base_dir: None,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(width) = parse_env::<u32>("CANVAS_WIDTH")? {
            config.layout.canvas.width = width;
        }
        if let Some(height) = parse_env::<u32>("CANVAS_HEIGHT")? {
            config.layout.canvas.height = height;
        }
        if let Ok(path) = env::var("LAYOUT_METRICS_PATH") {
            config.layout.metrics = LayoutMetrics::from_json_file(Path::new(&path))?;
        }
        config.embed_images = env::var("EMBED_IMAGES")
            .ok()
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(true);
        if let Some(attempts) = parse_env::<u32>("FETCH_ATTEMPTS")? {
            config.retry.attempts = attempts.max(1);
        }
        if let Some(delay) = parse_env::<u64>("FETCH_RETRY_DELAY_MS")? {
            config.retry.initial_delay_ms = delay;
        }
        if let Some(timeout) = parse_env::<u64>("FETCH_TIMEOUT_MS")? {
            config.retry.timeout_ms = timeout;
        }
        config.browser_path = env::var("BROWSER_PATH").ok().filter(|s| !s.is_empty());
        config.image_base_dir = env::var("IMAGE_BASE_DIR").ok().map(PathBuf::from);

        config.layout.validate()?;
        Ok(config)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| DeckError::ConfigError(format!("{} has an invalid value: {}", name, raw))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_metrics_are_valid() {
        assert!(LayoutMetrics::default().validate().is_ok());
        assert!(LayoutConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_metrics_file_keeps_defaults() {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(br#"{"image_height": 260.0, "split_divisor": 2}"#)
            .expect("Failed to write metrics");

        let metrics = LayoutMetrics::from_json_file(file.path()).unwrap();
        assert_eq!(metrics.image_height, 260.0);
        assert_eq!(metrics.split_divisor, 2);
        assert_eq!(metrics.heading_height, LayoutMetrics::default().heading_height);
    }

    #[test]
    fn test_invalid_split_divisor_rejected() {
        let metrics = LayoutMetrics {
            split_divisor: 1,
            ..LayoutMetrics::default()
        };
        assert!(matches!(metrics.validate(), Err(DeckError::ConfigError(_))));
    }

    #[test]
    fn test_zero_canvas_rejected() {
        let config = LayoutConfig {
            canvas: Canvas::new(1280, 0),
            metrics: LayoutMetrics::default(),
        };
        assert!(config.validate().is_err());
    }
}
