// ABOUTME: Reads rendered slide markup back into a structured form
// ABOUTME: The deck is derived from this parse so it can never drift from the HTML

use crate::config::Theme;
use crate::errors::{DeckError, Result};
use crate::model::{BulletItem, Canvas, Degradation, LayoutHint};
use log::debug;
use scraper::{ElementRef, Html, Selector};

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedImage {
    pub reference: String,
    /// `None` when the markup carries a placeholder instead of an image.
    pub src: Option<String>,
    pub alt: String,
    pub caption: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedContent {
    Heading(String),
    Bullets {
        heading: Option<String>,
        items: Vec<BulletItem>,
    },
    Callout(String),
    Image(ParsedImage),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBlock {
    /// Column in a paired layout.
    pub column: Option<usize>,
    pub content: ParsedContent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSlide {
    pub number: u32,
    pub layout: LayoutHint,
    pub title: String,
    pub subtitle: Option<String>,
    pub blocks: Vec<ParsedBlock>,
    pub flags: Vec<Degradation>,
    pub source_ref: Option<String>,
}

impl ParsedSlide {
    pub fn images(&self) -> impl Iterator<Item = &ParsedImage> {
        self.blocks.iter().filter_map(|b| match &b.content {
            ParsedContent::Image(image) => Some(image),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDeck {
    pub canvas: Canvas,
    pub theme: Theme,
    pub slides: Vec<ParsedSlide>,
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| DeckError::MarkupError(format!("Invalid selector '{}': {:?}", css, e)))
}

fn text_of(element: ElementRef) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn has_class(element: ElementRef, class: &str) -> bool {
    element
        .value()
        .attr("class")
        .is_some_and(|c| c.split_whitespace().any(|name| name == class))
}

fn child_elements<'a>(element: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    element.children().filter_map(ElementRef::wrap)
}

/// Parse markup produced by [`crate::html::MarkupRenderer`].
pub fn parse_markup(html: &str) -> Result<ParsedDeck> {
    let document = Html::parse_document(html);

    let body_sel = selector("body")?;
    let body = document
        .select(&body_sel)
        .next()
        .ok_or_else(|| DeckError::MarkupError("Markup has no <body>".to_string()))?;
    let body_attr = |name: &str| body.value().attr(name).map(str::to_string);

    let default_canvas = Canvas::default();
    let canvas = Canvas::new(
        body_attr("data-canvas-width")
            .and_then(|v| v.parse().ok())
            .unwrap_or(default_canvas.width),
        body_attr("data-canvas-height")
            .and_then(|v| v.parse().ok())
            .unwrap_or(default_canvas.height),
    );

    let defaults = Theme::default();
    let theme = Theme {
        font_family: body_attr("data-theme-font").unwrap_or(defaults.font_family),
        heading_font_family: body_attr("data-theme-heading-font")
            .unwrap_or(defaults.heading_font_family),
        primary_color: body_attr("data-theme-primary").unwrap_or(defaults.primary_color),
        accent_color: body_attr("data-theme-accent").unwrap_or(defaults.accent_color),
        background_color: body_attr("data-theme-background").unwrap_or(defaults.background_color),
        text_color: body_attr("data-theme-text").unwrap_or(defaults.text_color),
        muted_color: body_attr("data-theme-muted").unwrap_or(defaults.muted_color),
    };

    let section_sel = selector("section.slide")?;
    let title_sel = selector(".slide-title")?;
    let subtitle_sel = selector(".slide-subtitle")?;
    let body_region_sel = selector(".slide-body")?;

    let mut slides = Vec::new();
    for (index, section) in document.select(&section_sel).enumerate() {
        let attr = |name: &str| section.value().attr(name);

        let number = attr("data-slide")
            .and_then(|v| v.parse().ok())
            .unwrap_or(index as u32 + 1);
        let layout = attr("data-layout")
            .and_then(LayoutHint::parse)
            .unwrap_or_default();
        let flags = attr("data-flags")
            .unwrap_or_default()
            .split_whitespace()
            .filter_map(Degradation::parse)
            .collect();

        let title = section
            .select(&title_sel)
            .next()
            .map(text_of)
            .unwrap_or_default();
        let subtitle = section
            .select(&subtitle_sel)
            .next()
            .map(text_of)
            .filter(|s| !s.is_empty());

        let blocks = match section.select(&body_region_sel).next() {
            Some(region) => parse_blocks(region),
            None => Vec::new(),
        };

        debug!(
            "Parsed slide {} ({}) with {} blocks",
            number,
            layout,
            blocks.len()
        );

        slides.push(ParsedSlide {
            number,
            layout,
            title,
            subtitle,
            blocks,
            flags,
            source_ref: attr("data-source").map(str::to_string),
        });
    }

    if slides.is_empty() {
        return Err(DeckError::MarkupError(
            "Markup contains no slide sections".to_string(),
        ));
    }

    Ok(ParsedDeck {
        canvas,
        theme,
        slides,
    })
}

fn parse_blocks(region: ElementRef) -> Vec<ParsedBlock> {
    let mut blocks = Vec::new();
    for element in child_elements(region) {
        let column = element
            .value()
            .attr("data-col")
            .and_then(|v| v.parse::<usize>().ok());

        let content = match element.value().name() {
            "h2" => ParsedContent::Heading(text_of(element)),
            "aside" => ParsedContent::Callout(text_of(element)),
            "div" if has_class(element, "block-bullets") => parse_bullets(element),
            "figure" => ParsedContent::Image(parse_figure(element)),
            other => {
                debug!("Skipping unexpected <{}> in slide body", other);
                continue;
            }
        };
        blocks.push(ParsedBlock { column, content });
    }
    blocks
}

fn parse_bullets(element: ElementRef) -> ParsedContent {
    let mut heading = None;
    let mut items = Vec::new();
    for child in child_elements(element) {
        match child.value().name() {
            "h3" => heading = Some(text_of(child)).filter(|h| !h.is_empty()),
            "ul" => {
                for li in child_elements(child).filter(|e| e.value().name() == "li") {
                    let text = text_of(li);
                    if has_class(li, "level-2") {
                        items.push(BulletItem::secondary(text));
                    } else {
                        items.push(BulletItem::primary(text));
                    }
                }
            }
            _ => {}
        }
    }
    ParsedContent::Bullets { heading, items }
}

fn parse_figure(element: ElementRef) -> ParsedImage {
    let mut image = ParsedImage {
        reference: String::new(),
        src: None,
        alt: String::new(),
        caption: None,
        width: None,
        height: None,
    };
    for child in child_elements(element) {
        let value = child.value();
        match value.name() {
            "img" => {
                image.src = value.attr("src").map(str::to_string);
                image.alt = value.attr("alt").unwrap_or_default().to_string();
                image.reference = value.attr("data-ref").unwrap_or_default().to_string();
                image.width = value.attr("data-width").and_then(|v| v.parse().ok());
                image.height = value.attr("data-height").and_then(|v| v.parse().ok());
            }
            "div" if has_class(child, "image-placeholder") => {
                image.alt = value
                    .attr("aria-label")
                    .map(str::to_string)
                    .unwrap_or_else(|| text_of(child));
                image.reference = value.attr("data-ref").unwrap_or_default().to_string();
            }
            "figcaption" => image.caption = Some(text_of(child)).filter(|c| !c.is_empty()),
            _ => {}
        }
    }
    image
}
