// ABOUTME: Utility functions for the course-deck layout engine
// ABOUTME: Path validation and slide input loading shared by the CLI and the library

use crate::errors::{DeckError, Result};
use crate::model::Slide;
use crate::outline::parse_outline;
use log::info;
use std::fs;
use std::path::Path;

/// Validate that a file exists
pub fn validate_file_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(DeckError::PathNotFoundError(path.to_path_buf()));
    }
    if !path.is_file() {
        return Err(DeckError::ValidationError(format!(
            "Path is not a file: {:?}",
            path
        )));
    }
    Ok(())
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_directory_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(DeckError::FileReadError)?;
    } else if !path.is_dir() {
        return Err(DeckError::ValidationError(format!(
            "Path exists but is not a directory: {:?}",
            path
        )));
    }
    Ok(())
}

/// Ensure a file's parent directory exists
pub fn ensure_parent_directory_exists(file_path: &Path) -> Result<()> {
    if let Some(parent) = file_path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_directory_exists(parent)?;
        }
    }
    Ok(())
}

/// Load slides from a JSON slide list or a Markdown outline, chosen by extension.
pub fn read_slides(path: &Path) -> Result<Vec<Slide>> {
    validate_file_exists(path)?;
    let content = fs::read_to_string(path).map_err(DeckError::FileReadError)?;

    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let slides = match extension.as_str() {
        "json" => serde_json::from_str::<Vec<Slide>>(&content)?,
        "md" | "markdown" => parse_outline(&content)?,
        other => {
            return Err(DeckError::ValidationError(format!(
                "Unsupported input type '{}', expected .json or .md",
                other
            )))
        }
    };

    info!("Loaded {} slides from {:?}", slides.len(), path);
    Ok(slides)
}
