// ABOUTME: Slide data model shared by the estimator, splitter and both renderers
// ABOUTME: Content blocks are a closed enum so every render target matches them exhaustively

use crate::errors::{DeckError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed rendering surface in device-independent pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Default for Canvas {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A canvas with a zero dimension cannot hold any content.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(DeckError::ConfigError(format!(
                "Canvas dimensions must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

/// Outline level of a bullet item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum BulletLevel {
    Primary,
    Secondary,
}

impl TryFrom<u8> for BulletLevel {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(BulletLevel::Primary),
            2 => Ok(BulletLevel::Secondary),
            other => Err(format!("bullet level must be 1 or 2, got {}", other)),
        }
    }
}

impl From<BulletLevel> for u8 {
    fn from(level: BulletLevel) -> Self {
        match level {
            BulletLevel::Primary => 1,
            BulletLevel::Secondary => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BulletItem {
    pub text: String,
    #[serde(default = "default_level")]
    pub level: BulletLevel,
}

fn default_level() -> BulletLevel {
    BulletLevel::Primary
}

impl BulletItem {
    pub fn primary(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            level: BulletLevel::Primary,
        }
    }

    pub fn secondary(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            level: BulletLevel::Secondary,
        }
    }
}

/// One unit of slide content, in reading order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Heading {
        text: String,
    },
    Bullets {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        heading: Option<String>,
        items: Vec<BulletItem>,
    },
    Image {
        reference: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    Callout {
        text: String,
    },
}

impl ContentBlock {
    pub fn heading(text: impl Into<String>) -> Self {
        ContentBlock::Heading { text: text.into() }
    }

    pub fn bullets(heading: Option<&str>, items: Vec<BulletItem>) -> Self {
        ContentBlock::Bullets {
            heading: heading.map(str::to_string),
            items,
        }
    }

    pub fn image(reference: impl Into<String>, caption: Option<&str>) -> Self {
        ContentBlock::Image {
            reference: reference.into(),
            caption: caption.map(str::to_string),
        }
    }

    pub fn callout(text: impl Into<String>) -> Self {
        ContentBlock::Callout { text: text.into() }
    }

    /// Text leaves of the block in reading order.
    pub fn leaf_texts(&self) -> Vec<&str> {
        match self {
            ContentBlock::Heading { text } | ContentBlock::Callout { text } => vec![text.as_str()],
            ContentBlock::Bullets { heading, items } => heading
                .iter()
                .map(String::as_str)
                .chain(items.iter().map(|item| item.text.as_str()))
                .collect(),
            ContentBlock::Image { reference, .. } => vec![reference.as_str()],
        }
    }
}

/// Layout family a slide is rendered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutHint {
    #[default]
    Content,
    TwoColumn,
    ImageWithText,
    Agenda,
    CourseTitle,
    ModuleTitle,
    LessonTitle,
}

impl LayoutHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayoutHint::Content => "content",
            LayoutHint::TwoColumn => "two_column",
            LayoutHint::ImageWithText => "image_with_text",
            LayoutHint::Agenda => "agenda",
            LayoutHint::CourseTitle => "course_title",
            LayoutHint::ModuleTitle => "module_title",
            LayoutHint::LessonTitle => "lesson_title",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let hint = match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "content" => LayoutHint::Content,
            "two_column" => LayoutHint::TwoColumn,
            "image_with_text" => LayoutHint::ImageWithText,
            "agenda" => LayoutHint::Agenda,
            "course_title" => LayoutHint::CourseTitle,
            "module_title" => LayoutHint::ModuleTitle,
            "lesson_title" => LayoutHint::LessonTitle,
            _ => return None,
        };
        Some(hint)
    }

    /// Course, module and lesson openers.
    pub fn is_title_variant(&self) -> bool {
        matches!(
            self,
            LayoutHint::CourseTitle | LayoutHint::ModuleTitle | LayoutHint::LessonTitle
        )
    }

    /// Layouts that place blocks into two columns.
    pub fn is_paired(&self) -> bool {
        matches!(self, LayoutHint::TwoColumn | LayoutHint::ImageWithText)
    }

    /// Layouts rendered as-is even when they overflow.
    pub fn opts_out_of_splitting(&self) -> bool {
        matches!(self, LayoutHint::Agenda) || self.is_title_variant()
    }
}

impl fmt::Display for LayoutHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A caller-visible degradation recorded against a slide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Degradation {
    OverflowSplit,
    UnsplittableOverflow,
    OverflowAccepted,
    ImageShrunk,
    ImagePlaceholder,
    ImageOmitted,
    /// An image caption had no room in the deck.
    CaptionDropped,
}

impl Degradation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Degradation::OverflowSplit => "overflow-split",
            Degradation::UnsplittableOverflow => "unsplittable-overflow",
            Degradation::OverflowAccepted => "overflow-accepted",
            Degradation::ImageShrunk => "image-shrunk",
            Degradation::ImagePlaceholder => "image-placeholder",
            Degradation::ImageOmitted => "image-omitted",
            Degradation::CaptionDropped => "caption-dropped",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let degradation = match value {
            "overflow-split" => Degradation::OverflowSplit,
            "unsplittable-overflow" => Degradation::UnsplittableOverflow,
            "overflow-accepted" => Degradation::OverflowAccepted,
            "image-shrunk" => Degradation::ImageShrunk,
            "image-placeholder" => Degradation::ImagePlaceholder,
            "image-omitted" => Degradation::ImageOmitted,
            "caption-dropped" => Degradation::CaptionDropped,
            _ => return None,
        };
        Some(degradation)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slide {
    #[serde(default)]
    pub number: u32,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, alias = "layout_hint")]
    pub layout: LayoutHint,
    #[serde(default)]
    pub blocks: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,
    /// Index of each block in the slide it was split from. Empty means identity.
    #[serde(skip)]
    pub block_origins: Vec<usize>,
    #[serde(skip_deserializing, skip_serializing_if = "Vec::is_empty")]
    pub degradations: Vec<Degradation>,
}

impl Slide {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            number: 0,
            title: title.into(),
            subtitle: None,
            layout: LayoutHint::Content,
            blocks: Vec::new(),
            source_ref: None,
            block_origins: Vec::new(),
            degradations: Vec::new(),
        }
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    pub fn with_layout(mut self, layout: LayoutHint) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_block(mut self, block: ContentBlock) -> Self {
        self.blocks.push(block);
        self
    }

    pub fn has_subtitle(&self) -> bool {
        self.subtitle.as_deref().is_some_and(|s| !s.trim().is_empty())
    }

    /// Original index of the block at `index`, stable across splits.
    pub fn origin_of(&self, index: usize) -> usize {
        self.block_origins.get(index).copied().unwrap_or(index)
    }

    /// Column a block occupies in a paired layout.
    pub fn column_of(&self, index: usize) -> usize {
        self.origin_of(index) % 2
    }

    pub fn degrade(&mut self, degradation: Degradation) {
        if !self.degradations.contains(&degradation) {
            self.degradations.push(degradation);
        }
    }
}

/// Reject input that cannot produce a meaningful deck.
pub fn validate_slides(slides: &[Slide]) -> Result<()> {
    if slides.is_empty() {
        return Err(DeckError::ValidationError("Slide list is empty".to_string()));
    }
    for (index, slide) in slides.iter().enumerate() {
        if slide.title.trim().is_empty() && slide.blocks.is_empty() {
            return Err(DeckError::ValidationError(format!(
                "Slide {} has neither a title nor content",
                index + 1
            )));
        }
        for block in &slide.blocks {
            if let ContentBlock::Image { reference, .. } = block {
                if reference.trim().is_empty() {
                    return Err(DeckError::ValidationError(format!(
                        "Slide {} has an image with an empty reference",
                        index + 1
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Per-slide degradations reported alongside a rendered output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideDiagnostics {
    pub number: u32,
    pub title: String,
    pub degradations: Vec<Degradation>,
}

impl SlideDiagnostics {
    pub fn is_clean(&self) -> bool {
        self.degradations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_block_json_shape() {
        let json = r#"[
            {"type": "heading", "text": "Why Rust"},
            {"type": "bullets", "heading": "Reasons", "items": [
                {"text": "Speed", "level": 1},
                {"text": "No GC", "level": 2}
            ]},
            {"type": "image", "reference": "img/ferris.png"},
            {"type": "callout", "text": "Try it"}
        ]"#;
        let blocks: Vec<ContentBlock> = serde_json::from_str(json).unwrap();
        assert_eq!(blocks.len(), 4);
        assert_eq!(
            blocks[1],
            ContentBlock::bullets(
                Some("Reasons"),
                vec![BulletItem::primary("Speed"), BulletItem::secondary("No GC")]
            )
        );
        assert!(matches!(blocks[2], ContentBlock::Image { .. }));
    }

    #[test]
    fn test_bullet_level_rejects_level_three() {
        let result: std::result::Result<BulletItem, _> =
            serde_json::from_str(r#"{"text": "deep", "level": 3}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_slide_defaults_from_minimal_json() {
        let slide: Slide = serde_json::from_str(r#"{"title": "Intro"}"#).unwrap();
        assert_eq!(slide.layout, LayoutHint::Content);
        assert!(slide.blocks.is_empty());
        assert!(slide.degradations.is_empty());
    }

    #[test]
    fn test_layout_hint_categories() {
        assert!(LayoutHint::Agenda.opts_out_of_splitting());
        assert!(LayoutHint::CourseTitle.opts_out_of_splitting());
        assert!(!LayoutHint::TwoColumn.opts_out_of_splitting());
        assert!(LayoutHint::ImageWithText.is_paired());
        assert_eq!(LayoutHint::parse("Two-Column"), Some(LayoutHint::TwoColumn));
    }

    #[test]
    fn test_validate_slides() {
        assert!(validate_slides(&[]).is_err());
        assert!(validate_slides(&[Slide::new("  ")]).is_err());
        let bad_image = Slide::new("Pics").with_block(ContentBlock::image("", None));
        assert!(validate_slides(&[bad_image]).is_err());
        assert!(validate_slides(&[Slide::new("Fine")]).is_ok());
    }

    #[test]
    fn test_canvas_validation() {
        assert!(Canvas::default().validate().is_ok());
        assert!(Canvas::new(0, 720).validate().is_err());
    }
}
