// ABOUTME: Browser verification module for the course-deck layout engine
// ABOUTME: Loads rendered markup in a headless browser and collects the measured layout report

use crate::errors::{DeckError, Result};
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptionsBuilder, Tab};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Configuration for browser verification
pub struct VerifyOptions {
    pub width: u32,
    pub height: u32,
    pub timeout_ms: u64,
    pub browser_path: Option<String>,
    /// Write one PNG per slide section here when set.
    pub screenshot_dir: Option<PathBuf>,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            timeout_ms: 30000,
            browser_path: None,
            screenshot_dir: None,
        }
    }
}

/// One entry of the in-page self-check report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasuredSlide {
    pub slide: u32,
    pub estimated: f64,
    pub measured: f64,
    pub budget: f64,
    pub overflow: bool,
}

impl MeasuredSlide {
    /// Measured minus estimated height in pixels.
    pub fn drift(&self) -> f64 {
        self.measured - self.estimated
    }
}

fn browser_error(message: String) -> DeckError {
    DeckError::BrowserError {
        message,
        source: None,
    }
}

/// Open a rendered HTML file and return the layout report its script produced.
pub fn verify_markup(html_path: &Path, options: &VerifyOptions) -> Result<Vec<MeasuredSlide>> {
    info!("Verifying slide layout in browser: {:?}", html_path);

    if !html_path.exists() {
        return Err(DeckError::PathNotFoundError(html_path.to_path_buf()));
    }

    let mut launch_options_builder = LaunchOptionsBuilder::default();
    launch_options_builder.window_size(Some((options.width, options.height)));
    launch_options_builder.headless(true);

    if let Some(browser_path) = &options.browser_path {
        launch_options_builder.path(Some(browser_path.into()));
    } else if let Ok(path) = env::var("BROWSER_PATH") {
        if !path.is_empty() {
            launch_options_builder.path(Some(path.into()));
        }
    }

    let launch_options = launch_options_builder
        .build()
        .map_err(|e| browser_error(format!("Failed to build browser options: {:?}", e)))?;

    info!("Launching headless browser");
    let browser = Browser::new(launch_options).map_err(|e| {
        let message = format!("Failed to launch browser: {}", e);
        warn!("{}", message);
        browser_error(message)
    })?;

    let html_path_abs = fs::canonicalize(html_path).map_err(DeckError::FileReadError)?;
    let url = format!("file://{}", html_path_abs.to_string_lossy());
    info!("Opening page at URL: {}", url);

    let tab = browser
        .new_tab()
        .map_err(|e| browser_error(format!("Failed to create new tab: {}", e)))?;
    tab.navigate_to(&url)
        .map_err(|e| browser_error(format!("Failed to navigate to HTML: {}", e)))?;
    tab.wait_until_navigated()
        .map_err(|e| browser_error(format!("Navigation failed: {}", e)))?;

    let report = wait_for_report(&tab, Duration::from_millis(options.timeout_ms))?;

    for entry in report.iter().filter(|e| e.overflow) {
        warn!(
            "Slide {} overflows in the browser: measured {:.0}px, estimated {:.0}px",
            entry.slide, entry.measured, entry.estimated
        );
    }

    if let Some(dir) = &options.screenshot_dir {
        capture_sections(&tab, dir)?;
    }

    info!("Verified {} slides", report.len());
    Ok(report)
}

/// Write `html` to a scratch file and verify it.
pub fn verify_html(html: &str, options: &VerifyOptions) -> Result<Vec<MeasuredSlide>> {
    let path = env::temp_dir().join(format!("course-deck-{}.html", Uuid::new_v4()));
    fs::write(&path, html).map_err(DeckError::FileReadError)?;
    let result = verify_markup(&path, options);
    if let Err(e) = fs::remove_file(&path) {
        warn!("Failed to remove scratch file {:?}: {}", path, e);
    }
    result
}

fn wait_for_report(tab: &Tab, timeout: Duration) -> Result<Vec<MeasuredSlide>> {
    let start = Instant::now();
    loop {
        let result = tab
            .evaluate(
                "Array.isArray(window.__slideLayoutReport) ? JSON.stringify(window.__slideLayoutReport) : ''",
                false,
            )
            .map_err(|e| browser_error(format!("Failed to read layout report: {}", e)))?;

        let json = result
            .value
            .as_ref()
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        if !json.is_empty() {
            return Ok(serde_json::from_str(&json)?);
        }

        if start.elapsed() >= timeout {
            return Err(browser_error(format!(
                "Layout report did not appear within {} ms",
                timeout.as_millis()
            )));
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}

fn capture_sections(tab: &Tab, output_dir: &Path) -> Result<Vec<PathBuf>> {
    if !output_dir.exists() {
        fs::create_dir_all(output_dir).map_err(DeckError::FileReadError)?;
    }

    let sections = tab
        .find_elements("section.slide")
        .map_err(|e| browser_error(format!("Failed to find slide sections: {}", e)))?;

    let mut output_files = Vec::with_capacity(sections.len());
    for (i, section) in sections.iter().enumerate() {
        let output_file = output_dir.join(format!("slide_{:04}.png", i + 1));
        match section.capture_screenshot(CaptureScreenshotFormatOption::Png) {
            Ok(data) => {
                fs::write(&output_file, &data).map_err(DeckError::FileReadError)?;
                output_files.push(output_file);
            }
            Err(e) => warn!("Failed to capture screenshot for slide {}: {}", i + 1, e),
        }
    }

    info!("Captured {} slide screenshots", output_files.len());
    Ok(output_files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_entries_deserialize() {
        let json = r#"[{"slide": 1, "estimated": 420, "measured": 455.5, "budget": 610, "overflow": false}]"#;
        let report: Vec<MeasuredSlide> = serde_json::from_str(json).unwrap();
        assert_eq!(report[0].slide, 1);
        assert!((report[0].drift() - 35.5).abs() < 1e-9);
    }

    #[test]
    fn test_missing_file_is_reported() {
        let result = verify_markup(Path::new("/nonexistent/deck.html"), &VerifyOptions::default());
        assert!(matches!(result, Err(DeckError::PathNotFoundError(_))));
    }

    #[test]
    #[ignore]
    fn test_self_check_report_in_browser() {
        use crate::config::{LayoutConfig, Theme};
        use crate::estimate::HeightEstimator;
        use crate::html::MarkupRenderer;
        use crate::model::{ContentBlock, Slide};
        use crate::resources::ResourceFetcher;

        let config = LayoutConfig::default();
        let mut slide = Slide::new("Measured").with_block(ContentBlock::callout("Hello"));
        slide.number = 1;
        let markup = MarkupRenderer::new(HeightEstimator::new(&config), config.canvas).render(
            &[slide],
            &Theme::default(),
            &ResourceFetcher::offline(None),
        );

        let report = verify_html(&markup.html, &VerifyOptions::default()).unwrap();
        assert_eq!(report.len(), 1);
        assert!(!report[0].overflow);
    }
}
