// ABOUTME: Library module for the course-deck layout engine.
// ABOUTME: Estimates, splits and places slide content, then renders matching HTML and PPTX outputs.

// Reexport modules
pub mod config;
pub mod errors;
pub mod estimate;
pub mod extract;
pub mod geometry;
pub mod html;
pub mod model;
pub mod outline;
pub mod package;
pub mod pipeline;
pub mod pptx;
pub mod resources;
pub mod split;
pub mod utils;
pub mod verify;

// Reexport common types and functions
pub use config::{Config, LayoutConfig, LayoutMetrics, RetryPolicy, Theme};
pub use errors::{DeckError, Result};
pub use estimate::{EstimateContext, HeightEstimator};
pub use geometry::{OverlapResolver, Rect};
pub use html::{write_html_to_file, MarkupRenderer, RenderedMarkup};
pub use model::{
    validate_slides, BulletItem, BulletLevel, Canvas, ContentBlock, Degradation, LayoutHint,
    Slide, SlideDiagnostics,
};
pub use outline::parse_outline;
pub use pipeline::{DeckPipeline, RenderedOutputs};
pub use pptx::{write_pptx_to_file, Deck, DeckSynchronizer};
pub use resources::{CachedFetcher, ImageFetcher, ResourceFetcher};
pub use split::{OverflowSplitter, SlideCounter};
pub use utils::read_slides;
pub use verify::{verify_html, verify_markup, MeasuredSlide, VerifyOptions};

#[cfg(test)]
mod tests;
