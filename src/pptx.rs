// ABOUTME: PPTX generation module for the course-deck layout engine
// ABOUTME: Derives an editable deck from the rendered markup so both outputs stay in step

use crate::config::Theme;
use crate::errors::{DeckError, Result};
use crate::extract::{parse_markup, ParsedContent, ParsedImage, ParsedSlide};
use crate::geometry::{OverlapResolver, Rect};
use crate::model::{Canvas, Degradation, LayoutHint, SlideDiagnostics};
use crate::package::{to_emu, MediaPart, PackageWriter, SlidePart, EMU_PER_INCH, SLIDE_WIDTH_EMU};
use crate::resources::{decode_data_uri, load_image, ImageFetcher, LoadedImage};
use crate::utils::ensure_parent_directory_exists;
use log::{debug, info, warn};
use quick_xml::escape::escape;
use std::fs;
use std::path::Path;

const TITLE_PT: f64 = 30.0;
const SUBTITLE_PT: f64 = 18.0;
const HEADING_PT: f64 = 22.0;
const BULLETS_HEADING_PT: f64 = 18.0;
const BULLET_PT: f64 = 16.0;
const SUB_BULLET_PT: f64 = 14.0;
const CALLOUT_PT: f64 = 15.0;
const CAPTION_PT: f64 = 12.0;
const PLACEHOLDER_PT: f64 = 14.0;

/// Line height as a multiple of the font size.
const LINE_SPACING: f64 = 1.2;
/// Average glyph width as a fraction of the font size.
const GLYPH_WIDTH: f64 = 0.5;
const PARAGRAPH_GAP_PT: f64 = 6.0;

const BULLET_INDENT_IN: f64 = 0.375;
const SUB_BULLET_INDENT_IN: f64 = 0.75;

/// Smallest image edge the deck may shrink to.
const MIN_VISIBLE_IN: f64 = 0.5;
const IMAGE_GAP_IN: f64 = 0.15;
const CAPTION_GAP_IN: f64 = 0.05;
const SAFE_INSET_IN: f64 = 0.2;

/// Text region width share when images sit beside the text.
const IMAGE_WITH_TEXT_SHARE: f64 = 0.58;

const PLACEHOLDER_FILL: &str = "E5E7EB";

/// Finished deck bytes plus what degraded while building it.
#[derive(Debug, Clone)]
pub struct Deck {
    pub bytes: Vec<u8>,
    pub diagnostics: Vec<SlideDiagnostics>,
}

/// Write deck bytes to a file, creating parent directories as needed.
pub fn write_pptx_to_file(bytes: &[u8], output_file: &Path) -> Result<()> {
    info!("Writing PPTX to {:?}", output_file);
    ensure_parent_directory_exists(output_file)?;
    fs::write(output_file, bytes).map_err(DeckError::FileReadError)?;
    Ok(())
}

/// Slide surface in inches, scaled from the markup canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlideFrame {
    pub width: f64,
    pub height: f64,
    /// Inches per canvas pixel.
    scale: f64,
}

impl SlideFrame {
    pub fn for_canvas(canvas: &Canvas) -> Self {
        let width = SLIDE_WIDTH_EMU as f64 / EMU_PER_INCH;
        let scale = width / canvas.width.max(1) as f64;
        Self {
            width,
            height: canvas.height as f64 * scale,
            scale,
        }
    }

    /// Converts canvas pixels to inches.
    pub fn px(&self, value: f64) -> f64 {
        value * self.scale
    }

    fn safe_area(&self) -> Rect {
        Rect::new(
            SAFE_INSET_IN,
            SAFE_INSET_IN,
            self.width - 2.0 * SAFE_INSET_IN,
            self.height - 2.0 * SAFE_INSET_IN,
        )
    }

    fn margin_x(&self) -> f64 {
        self.px(64.0)
    }

    fn content_width(&self) -> f64 {
        self.width - 2.0 * self.margin_x()
    }

    fn body_bottom(&self) -> f64 {
        self.height - self.px(36.0)
    }

    /// Rect given in a 13.333 x 7.5 inch reference frame.
    fn reference(&self, left: f64, top: f64, width: f64, height: f64) -> Rect {
        let sx = self.width / 13.333;
        let sy = self.height / 7.5;
        Rect::new(left * sx, top * sy, width * sx, height * sy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderRole {
    Title,
    Subtitle,
    Body,
}

/// A region of a layout template, with the prompt it shows until filled.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplatePlaceholder {
    pub role: PlaceholderRole,
    pub rect: Rect,
    pub font_pt: f64,
    pub prompt: &'static str,
}

/// Placeholders a slide of the given layout starts from.
pub fn layout_template(layout: LayoutHint, frame: &SlideFrame) -> Vec<TemplatePlaceholder> {
    let title_variant = |title_top: f64, title_height: f64, title_pt: f64, subtitle_pt: f64| {
        vec![
            TemplatePlaceholder {
                role: PlaceholderRole::Title,
                rect: frame.reference(0.8, title_top, 11.73, title_height),
                font_pt: title_pt,
                prompt: "Click to add title",
            },
            TemplatePlaceholder {
                role: PlaceholderRole::Subtitle,
                rect: frame.reference(0.8, 4.1, 11.73, 0.9),
                font_pt: subtitle_pt,
                prompt: "Click to add subtitle",
            },
            TemplatePlaceholder {
                role: PlaceholderRole::Body,
                rect: frame.reference(0.8, 5.1, 11.73, 1.9),
                font_pt: BULLET_PT,
                prompt: "Click to add text",
            },
        ]
    };

    match layout {
        LayoutHint::CourseTitle => title_variant(2.4, 1.6, 44.0, 24.0),
        LayoutHint::ModuleTitle => title_variant(2.6, 1.4, 40.0, 22.0),
        LayoutHint::LessonTitle => title_variant(2.8, 1.2, 36.0, 20.0),
        LayoutHint::Content
        | LayoutHint::TwoColumn
        | LayoutHint::ImageWithText
        | LayoutHint::Agenda => {
            let left = frame.margin_x();
            let width = frame.content_width();
            let body_top = frame.px(132.0);
            vec![
                TemplatePlaceholder {
                    role: PlaceholderRole::Title,
                    rect: Rect::new(left, frame.px(36.0), width, frame.px(48.0)),
                    font_pt: TITLE_PT,
                    prompt: "Click to add title",
                },
                TemplatePlaceholder {
                    role: PlaceholderRole::Subtitle,
                    rect: Rect::new(left, frame.px(90.0), width, frame.px(32.0)),
                    font_pt: SUBTITLE_PT,
                    prompt: "Click to add subtitle",
                },
                TemplatePlaceholder {
                    role: PlaceholderRole::Body,
                    rect: Rect::new(left, body_top, width, frame.body_bottom() - body_top),
                    font_pt: BULLET_PT,
                    prompt: "Click to add text",
                },
            ]
        }
    }
}

/// Lines `text` wraps to in a box `width` inches wide.
pub fn wrapped_lines(text: &str, width: f64, font_pt: f64) -> usize {
    let chars_per_line = ((width * 72.0) / (font_pt * GLYPH_WIDTH)).floor().max(1.0);
    let chars = text.trim().chars().count() as f64;
    (chars / chars_per_line).ceil().max(1.0) as usize
}

fn line_height(font_pt: f64) -> f64 {
    font_pt * LINE_SPACING / 72.0
}

fn text_height(text: &str, width: f64, font_pt: f64) -> f64 {
    wrapped_lines(text, width, font_pt) as f64 * line_height(font_pt)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bullet {
    None,
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Center,
}

struct Run<'a> {
    text: &'a str,
    size_pt: f64,
    bold: bool,
    italic: bool,
    color: &'a str,
    font: &'a str,
}

fn paragraph_xml(run: &Run, bullet: Bullet, align: Align, space_before_pt: f64) -> String {
    let algn = match align {
        Align::Left => "l",
        Align::Center => "ctr",
    };
    let spacing = if space_before_pt > 0.0 {
        format!(
            r#"<a:spcBef><a:spcPts val="{}"/></a:spcBef>"#,
            (space_before_pt * 100.0).round() as i64
        )
    } else {
        String::new()
    };
    let p_pr = match bullet {
        Bullet::None => format!(
            r#"<a:pPr marL="0" indent="0" algn="{}">{}<a:buNone/></a:pPr>"#,
            algn, spacing
        ),
        Bullet::Primary => format!(
            r#"<a:pPr marL="{}" indent="-228600" algn="{}">{}<a:buFont typeface="Arial"/><a:buChar char="•"/></a:pPr>"#,
            to_emu(BULLET_INDENT_IN),
            algn,
            spacing
        ),
        Bullet::Secondary => format!(
            r#"<a:pPr marL="{}" lvl="1" indent="-228600" algn="{}">{}<a:buFont typeface="Arial"/><a:buChar char="–"/></a:pPr>"#,
            to_emu(SUB_BULLET_INDENT_IN),
            algn,
            spacing
        ),
    };
    format!(
        r#"<a:p>{p_pr}<a:r><a:rPr lang="en-US" sz="{sz}" b="{b}" i="{i}" dirty="0"><a:solidFill><a:srgbClr val="{color}"/></a:solidFill><a:latin typeface="{font}"/></a:rPr><a:t>{text}</a:t></a:r></a:p>"#,
        p_pr = p_pr,
        sz = (run.size_pt * 100.0).round() as i64,
        b = u8::from(run.bold),
        i = u8::from(run.italic),
        color = escape(run.color),
        font = escape(run.font),
        text = escape(run.text),
    )
}

/// Paragraph XML for the text region plus the height it occupies.
struct TextFlow {
    paragraphs: String,
    height: f64,
}

fn flow_text<'a, I>(contents: I, width: f64, theme: &Theme) -> Option<TextFlow>
where
    I: IntoIterator<Item = &'a ParsedContent>,
{
    let mut paragraphs = String::new();
    let mut height = 0.0;
    let mut first = true;

    let mut push = |text: &str, size_pt: f64, bullet: Bullet, bold: bool, italic: bool, color: &str, font: &str| {
        let space_before = if first { 0.0 } else { PARAGRAPH_GAP_PT };
        let indent = match bullet {
            Bullet::None => 0.0,
            Bullet::Primary => BULLET_INDENT_IN,
            Bullet::Secondary => SUB_BULLET_INDENT_IN,
        };
        height += space_before / 72.0 + text_height(text, width - indent, size_pt);
        paragraphs.push_str(&paragraph_xml(
            &Run {
                text,
                size_pt,
                bold,
                italic,
                color,
                font,
            },
            bullet,
            Align::Left,
            space_before,
        ));
        first = false;
    };

    for content in contents {
        match content {
            ParsedContent::Heading(text) => push(
                text,
                HEADING_PT,
                Bullet::None,
                true,
                false,
                &theme.primary_color,
                &theme.heading_font_family,
            ),
            ParsedContent::Bullets { heading, items } => {
                if let Some(heading) = heading {
                    push(
                        heading,
                        BULLETS_HEADING_PT,
                        Bullet::None,
                        true,
                        false,
                        &theme.primary_color,
                        &theme.font_family,
                    );
                }
                for item in items {
                    let (size, bullet) = match item.level {
                        crate::model::BulletLevel::Primary => (BULLET_PT, Bullet::Primary),
                        crate::model::BulletLevel::Secondary => (SUB_BULLET_PT, Bullet::Secondary),
                    };
                    push(
                        &item.text,
                        size,
                        bullet,
                        false,
                        false,
                        &theme.text_color,
                        &theme.font_family,
                    );
                }
            }
            ParsedContent::Callout(text) => push(
                text,
                CALLOUT_PT,
                Bullet::None,
                false,
                true,
                &theme.text_color,
                &theme.font_family,
            ),
            ParsedContent::Image(_) => {}
        }
    }

    if paragraphs.is_empty() {
        None
    } else {
        Some(TextFlow { paragraphs, height })
    }
}

fn xfrm(rect: &Rect) -> String {
    format!(
        r#"<a:xfrm><a:off x="{}" y="{}"/><a:ext cx="{}" cy="{}"/></a:xfrm>"#,
        to_emu(rect.left),
        to_emu(rect.top),
        to_emu(rect.width),
        to_emu(rect.height)
    )
}

/// Accumulates shapes for one slide's tree.
struct ShapeTree {
    next_id: u32,
    xml: String,
}

impl ShapeTree {
    fn new() -> Self {
        Self {
            next_id: 2,
            xml: String::new(),
        }
    }

    fn take_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn text_box(&mut self, name: &str, rect: &Rect, paragraphs: &str, anchor: &str, fill: Option<&str>) {
        let id = self.take_id();
        let fill_xml = match fill {
            Some(color) => format!(
                r#"<a:solidFill><a:srgbClr val="{}"/></a:solidFill>"#,
                escape(color)
            ),
            None => "<a:noFill/>".to_string(),
        };
        self.xml.push_str(&format!(
            r#"<p:sp><p:nvSpPr><p:cNvPr id="{id}" name="{name} {id}"/><p:cNvSpPr txBox="1"/><p:nvPr/></p:nvSpPr><p:spPr>{xfrm}<a:prstGeom prst="rect"><a:avLst/></a:prstGeom>{fill}</p:spPr><p:txBody><a:bodyPr wrap="square" lIns="0" tIns="0" rIns="0" bIns="0" anchor="{anchor}"><a:noAutofit/></a:bodyPr><a:lstStyle/>{paragraphs}</p:txBody></p:sp>"#,
            id = id,
            name = name,
            xfrm = xfrm(rect),
            fill = fill_xml,
            anchor = anchor,
            paragraphs = paragraphs,
        ));
    }

    fn corner(&mut self, frame: &SlideFrame, color: &str) {
        let id = self.take_id();
        let size = frame.px(160.0) * 0.22;
        let rect = Rect::new(frame.width - size, 0.0, size, size);
        self.xml.push_str(&format!(
            r#"<p:sp><p:nvSpPr><p:cNvPr id="{id}" name="Corner {id}"/><p:cNvSpPr/><p:nvPr/></p:nvSpPr><p:spPr><a:xfrm flipH="1" flipV="1"><a:off x="{x}" y="{y}"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rtTriangle"><a:avLst/></a:prstGeom><a:solidFill><a:srgbClr val="{color}"/></a:solidFill><a:ln><a:noFill/></a:ln></p:spPr></p:sp>"#,
            id = id,
            x = to_emu(rect.left),
            y = to_emu(rect.top),
            cx = to_emu(rect.width),
            cy = to_emu(rect.height),
            color = escape(color),
        ));
    }

    fn picture(&mut self, rect: &Rect, rel_id: usize, alt: &str) {
        let id = self.take_id();
        self.xml.push_str(&format!(
            r#"<p:pic><p:nvPicPr><p:cNvPr id="{id}" name="Picture {id}" descr="{alt}"/><p:cNvPicPr><a:picLocks noChangeAspect="1"/></p:cNvPicPr><p:nvPr/></p:nvPicPr><p:blipFill><a:blip r:embed="rId{rel}"/><a:stretch><a:fillRect/></a:stretch></p:blipFill><p:spPr>{xfrm}<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></p:spPr></p:pic>"#,
            id = id,
            alt = escape(alt),
            rel = rel_id,
            xfrm = xfrm(rect),
        ));
    }
}

/// An image waiting for placement.
struct PendingImage<'a> {
    parsed: &'a ParsedImage,
    loaded: Option<LoadedImage>,
    column: Option<usize>,
}

/// Rebuilds the deck from rendered markup.
pub struct DeckSynchronizer {
    resolver: OverlapResolver,
}

impl Default for DeckSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

impl DeckSynchronizer {
    pub fn new() -> Self {
        Self {
            resolver: OverlapResolver::new(MIN_VISIBLE_IN).with_gap(IMAGE_GAP_IN),
        }
    }

    /// Parse `html` and build a PPTX with one slide per markup section.
    ///
    /// Linked images are loaded through `fetcher`; embedded ones are decoded
    /// from their data URIs.
    pub fn synchronize<F: ImageFetcher + ?Sized>(&self, html: &str, fetcher: &F) -> Result<Deck> {
        let parsed = parse_markup(html)?;
        info!("Synchronizing deck from {} markup slides", parsed.slides.len());

        let frame = SlideFrame::for_canvas(&parsed.canvas);
        let mut parts = Vec::with_capacity(parsed.slides.len());
        let mut diagnostics = Vec::with_capacity(parsed.slides.len());

        for (i, slide) in parsed.slides.iter().enumerate() {
            let mut degradations = slide.flags.clone();
            let part = self.build_slide(i + 1, slide, &parsed.theme, &frame, fetcher, &mut degradations);
            parts.push(part);
            diagnostics.push(SlideDiagnostics {
                number: slide.number,
                title: slide.title.clone(),
                degradations,
            });
        }

        let title = parsed
            .slides
            .first()
            .map(|s| s.title.as_str())
            .unwrap_or("Presentation");
        let bytes = PackageWriter {
            title,
            theme: &parsed.theme,
            width_emu: to_emu(frame.width),
            height_emu: to_emu(frame.height),
        }
        .write(&parts)?;

        Ok(Deck { bytes, diagnostics })
    }

    fn build_slide<F: ImageFetcher + ?Sized>(
        &self,
        slide_num: usize,
        slide: &ParsedSlide,
        theme: &Theme,
        frame: &SlideFrame,
        fetcher: &F,
        degradations: &mut Vec<Degradation>,
    ) -> SlidePart {
        debug!("Building deck slide {} ({})", slide_num, slide.layout);

        let title_variant = slide.layout.is_title_variant();
        let mut shapes = ShapeTree::new();
        if !title_variant {
            shapes.corner(frame, &theme.accent_color);
        }

        let (title_color, subtitle_color) = if title_variant {
            (theme.background_color.as_str(), theme.background_color.as_str())
        } else {
            (theme.primary_color.as_str(), theme.muted_color.as_str())
        };

        let images: Vec<PendingImage> = slide
            .blocks
            .iter()
            .filter_map(|block| match &block.content {
                ParsedContent::Image(image) => Some(PendingImage {
                    parsed: image,
                    loaded: None,
                    column: block.column,
                }),
                _ => None,
            })
            .collect();

        let mut header: Option<Rect> = None;
        let mut body: Option<Rect> = None;

        for placeholder in layout_template(slide.layout, frame) {
            let rect = placeholder.rect;
            match placeholder.role {
                PlaceholderRole::Title | PlaceholderRole::Subtitle => {
                    let (text, color, font) = match placeholder.role {
                        PlaceholderRole::Title => (
                            Some(slide.title.as_str()).filter(|t| !t.trim().is_empty()),
                            title_color,
                            &theme.heading_font_family,
                        ),
                        _ => (slide.subtitle.as_deref(), subtitle_color, &theme.font_family),
                    };
                    let Some(text) = text else {
                        debug!(
                            "Clearing unfilled {:?} placeholder \"{}\"",
                            placeholder.role, placeholder.prompt
                        );
                        continue;
                    };

                    let top = match (title_variant, header) {
                        (false, Some(above)) => above.bottom() + 0.05,
                        _ => rect.top,
                    };
                    let height = if title_variant {
                        rect.height.max(text_height(text, rect.width, placeholder.font_pt))
                    } else {
                        text_height(text, rect.width, placeholder.font_pt)
                    };
                    let sized = Rect::new(rect.left, top, rect.width, height);
                    let align = if title_variant { Align::Center } else { Align::Left };
                    let anchor = if title_variant { "ctr" } else { "t" };
                    let run = Run {
                        text,
                        size_pt: placeholder.font_pt,
                        bold: placeholder.role == PlaceholderRole::Title,
                        italic: false,
                        color,
                        font,
                    };
                    let name = match placeholder.role {
                        PlaceholderRole::Title => "Title",
                        _ => "Subtitle",
                    };
                    shapes.text_box(name, &sized, &paragraph_xml(&run, Bullet::None, align, 0.0), anchor, None);
                    header = Some(header.map_or(sized, |h| h.union(&sized)));
                }
                PlaceholderRole::Body => {
                    let width = if slide.layout == LayoutHint::ImageWithText && !images.is_empty() {
                        rect.width * IMAGE_WITH_TEXT_SHARE
                    } else {
                        rect.width
                    };
                    let Some(flow) = flow_text(slide.blocks.iter().map(|b| &b.content), width, theme)
                    else {
                        debug!(
                            "Clearing unfilled {:?} placeholder \"{}\"",
                            placeholder.role, placeholder.prompt
                        );
                        continue;
                    };
                    let top = match (title_variant, header) {
                        (false, Some(h)) => rect.top.max(h.bottom() + IMAGE_GAP_IN),
                        _ => rect.top,
                    };
                    let available = (frame.body_bottom() - top).max(line_height(BULLET_PT));
                    let region = Rect::new(rect.left, top, width, flow.height.min(available));
                    if flow.height > available + f64::EPSILON {
                        debug!(
                            "Slide {} text flows {:.2}in past its region",
                            slide_num,
                            flow.height - available
                        );
                    }
                    shapes.text_box("Body", &region, &flow.paragraphs, "t", None);
                    body = Some(region);
                }
            }
        }

        let mut media = Vec::new();
        // Content slides keep images below the header; openers treat the header as an obstacle.
        let safe = frame.safe_area();
        let (mut obstacles, image_area) = if title_variant {
            (header.into_iter().chain(body).collect::<Vec<Rect>>(), safe)
        } else {
            let top = header
                .map_or(safe.top, |h| h.bottom() + IMAGE_GAP_IN)
                .max(safe.top);
            let area = Rect::new(safe.left, top, safe.width, (safe.bottom() - top).max(0.0));
            (body.into_iter().collect(), area)
        };
        let flow_top = body
            .or(header)
            .map(|r| r.bottom() + IMAGE_GAP_IN)
            .unwrap_or_else(|| frame.px(132.0));

        for mut pending in images {
            pending.loaded = match self.load(pending.parsed, fetcher) {
                Ok(image) => Some(image),
                Err(e) => {
                    if pending.parsed.src.is_some() {
                        warn!(
                            "Slide {}: image '{}' could not be loaded for the deck: {}",
                            slide.number, pending.parsed.reference, e
                        );
                    }
                    None
                }
            };

            let desired = desired_size(&pending, slide.layout, frame);
            let caption_room = pending
                .parsed
                .caption
                .as_deref()
                .map_or(0.0, |c| CAPTION_GAP_IN + text_height(c, desired.width, CAPTION_PT));
            let footprint = Rect::new(0.0, 0.0, desired.width, desired.height + caption_room);
            let candidate =
                initial_position(footprint, &pending, slide.layout, frame, flow_top, &image_area);

            let Some(spot) = self.place_clear(&candidate, &obstacles, &image_area) else {
                warn!(
                    "Slide {}: no room for image '{}', omitting it from the deck",
                    slide.number, pending.parsed.reference
                );
                add_degradation(degradations, Degradation::ImageOmitted);
                continue;
            };
            if spot.width < footprint.width - 1e-6 {
                debug!("Slide {}: image shrunk to {:?}", slide.number, spot);
                add_degradation(degradations, Degradation::ImageShrunk);
            }
            // The caption keeps its full height; the image takes what is left of the spot.
            let image_height = spot.height - caption_room;
            let rect = if caption_room > 0.0 && image_height >= MIN_VISIBLE_IN.min(desired.height) {
                let width = desired.width * image_height / desired.height;
                Rect::new(spot.left + (spot.width - width) / 2.0, spot.top, width, image_height)
            } else {
                let scale = spot.width / footprint.width;
                Rect::new(spot.left, spot.top, spot.width, desired.height * scale)
            };

            match pending.loaded {
                Some(image) => {
                    let name = format!("image{}_{}.{}", slide_num, media.len() + 1, image.extension);
                    media.push(MediaPart {
                        name,
                        bytes: image.bytes,
                    });
                    shapes.picture(&rect, media.len() + 1, &pending.parsed.alt);
                }
                None => {
                    add_degradation(degradations, Degradation::ImagePlaceholder);
                    let run = Run {
                        text: &pending.parsed.alt,
                        size_pt: PLACEHOLDER_PT,
                        bold: false,
                        italic: false,
                        color: &theme.muted_color,
                        font: &theme.font_family,
                    };
                    shapes.text_box(
                        "Image Placeholder",
                        &rect,
                        &paragraph_xml(&run, Bullet::None, Align::Center, 0.0),
                        "ctr",
                        Some(PLACEHOLDER_FILL),
                    );
                }
            }

            let mut taken = rect;
            if let Some(caption) = &pending.parsed.caption {
                let caption_rect = Rect::new(
                    rect.left,
                    rect.bottom() + CAPTION_GAP_IN,
                    rect.width,
                    text_height(caption, rect.width, CAPTION_PT),
                );
                let within_spot = caption_rect.bottom() <= spot.bottom() + 1e-6;
                let clear = image_area.contains(&caption_rect)
                    && !obstacles.iter().any(|o| o.intersects(&caption_rect));
                if within_spot || clear {
                    let run = Run {
                        text: caption,
                        size_pt: CAPTION_PT,
                        bold: false,
                        italic: false,
                        color: &theme.muted_color,
                        font: &theme.font_family,
                    };
                    shapes.text_box(
                        "Caption",
                        &caption_rect,
                        &paragraph_xml(&run, Bullet::None, Align::Center, 0.0),
                        "t",
                        None,
                    );
                    taken = taken.union(&caption_rect);
                } else {
                    warn!(
                        "Slide {}: no room for caption '{}' of image '{}'",
                        slide.number, caption, pending.parsed.reference
                    );
                    add_degradation(degradations, Degradation::CaptionDropped);
                }
            }
            obstacles.push(taken);
        }

        let background = if title_variant {
            &theme.primary_color
        } else {
            &theme.background_color
        };

        SlidePart {
            xml: slide_xml(&shapes.xml, background),
            media,
        }
    }

    /// Resolve `candidate` against whichever obstacle it hits until it clears them all.
    fn place_clear(&self, candidate: &Rect, obstacles: &[Rect], area: &Rect) -> Option<Rect> {
        let mut rect = *candidate;
        for _ in 0..=obstacles.len() {
            match obstacles.iter().find(|o| o.intersects(&rect)) {
                None => return Some(rect),
                Some(hit) => rect = self.resolver.resolve(hit, &rect, area)?,
            }
        }
        None
    }

    fn load<F: ImageFetcher + ?Sized>(&self, image: &ParsedImage, fetcher: &F) -> Result<LoadedImage> {
        let src = image.src.as_deref().ok_or_else(|| {
            DeckError::ImageError(format!("markup carries a placeholder for '{}'", image.reference))
        })?;
        let bytes = if src.starts_with("data:") {
            decode_data_uri(src)?.1
        } else {
            fetcher.fetch(src)?
        };
        load_image(bytes)
    }
}

fn add_degradation(degradations: &mut Vec<Degradation>, degradation: Degradation) {
    if !degradations.contains(&degradation) {
        degradations.push(degradation);
    }
}

/// Natural image size in inches, capped the way the markup caps it.
fn desired_size(image: &PendingImage, layout: LayoutHint, frame: &SlideFrame) -> Rect {
    let (px_width, px_height) = match &image.loaded {
        Some(loaded) => (loaded.width as f64, loaded.height as f64),
        None => (400.0, 300.0),
    };
    let max_width = match layout {
        LayoutHint::ImageWithText => frame.content_width() * (1.0 - IMAGE_WITH_TEXT_SHARE) - IMAGE_GAP_IN,
        LayoutHint::TwoColumn => frame.content_width() / 2.0 - IMAGE_GAP_IN,
        _ => frame.content_width(),
    };
    let max_height = frame.px(300.0);
    let width = frame.px(px_width.max(1.0));
    let height = frame.px(px_height.max(1.0));
    let scale = (max_width / width).min(max_height / height).min(1.0);
    Rect::new(0.0, 0.0, width * scale, height * scale)
}

/// Where the image would sit in the markup flow, kept on the slide.
fn initial_position(
    size: Rect,
    image: &PendingImage,
    layout: LayoutHint,
    frame: &SlideFrame,
    flow_top: f64,
    bounds: &Rect,
) -> Rect {
    let content_left = frame.margin_x();
    let content_width = frame.content_width();
    let (left, top) = match layout {
        LayoutHint::ImageWithText => (
            content_left + content_width * IMAGE_WITH_TEXT_SHARE + IMAGE_GAP_IN,
            frame.px(132.0),
        ),
        LayoutHint::TwoColumn => {
            let column = image.column.unwrap_or(0) as f64;
            let column_width = content_width / 2.0;
            (
                content_left + column * column_width + (column_width - size.width) / 2.0,
                flow_top,
            )
        }
        _ => (content_left + (content_width - size.width) / 2.0, flow_top),
    };
    let left = left.clamp(bounds.left, (bounds.right() - size.width).max(bounds.left));
    let top = top.clamp(bounds.top, (bounds.bottom() - size.height).max(bounds.top));
    Rect::new(left, top, size.width, size.height)
}

fn slide_xml(shapes: &str, background: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main">
    <p:cSld>
        <p:bg><p:bgPr><a:solidFill><a:srgbClr val="{background}"/></a:solidFill><a:effectLst/></p:bgPr></p:bg>
        <p:spTree>
            <p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr>
            <p:grpSpPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/><a:chOff x="0" y="0"/><a:chExt cx="0" cy="0"/></a:xfrm></p:grpSpPr>
            {shapes}
        </p:spTree>
    </p:cSld>
    <p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr>
</p:sld>"#,
        background = escape(background),
        shapes = shapes
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayoutConfig;
    use crate::estimate::HeightEstimator;
    use crate::html::MarkupRenderer;
    use crate::model::{BulletItem, ContentBlock, Slide};
    use image::{ImageBuffer, ImageOutputFormat, Rgb};
    use std::io::{Cursor, Read};
    use zip::ZipArchive;

    struct NoImages;

    impl ImageFetcher for NoImages {
        fn fetch(&self, reference: &str) -> Result<Vec<u8>> {
            Err(DeckError::PathNotFoundError(reference.into()))
        }
    }

    struct OnePng(Vec<u8>);

    impl ImageFetcher for OnePng {
        fn fetch(&self, _reference: &str) -> Result<Vec<u8>> {
            Ok(self.0.clone())
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_pixel(width, height, Rgb([30u8, 58, 95]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
            .unwrap();
        bytes
    }

    fn markup<F: ImageFetcher>(slides: Vec<Slide>, fetcher: &F) -> String {
        let config = LayoutConfig::default();
        let mut slides = slides;
        for (i, slide) in slides.iter_mut().enumerate() {
            slide.number = i as u32 + 1;
        }
        MarkupRenderer::new(HeightEstimator::new(&config), config.canvas)
            .render(&slides, &Theme::default(), fetcher)
            .html
    }

    fn slide_xml_of(bytes: &[u8], n: usize) -> String {
        let mut archive = ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
        let mut xml = String::new();
        archive
            .by_name(&format!("ppt/slides/slide{}.xml", n))
            .unwrap()
            .read_to_string(&mut xml)
            .unwrap();
        xml
    }

    #[test]
    fn test_wrapped_lines() {
        // 2in at 16pt: 144 / 8 = 18 characters per line
        assert_eq!(wrapped_lines("", 2.0, 16.0), 1);
        assert_eq!(wrapped_lines(&"a".repeat(18), 2.0, 16.0), 1);
        assert_eq!(wrapped_lines(&"a".repeat(19), 2.0, 16.0), 2);
    }

    #[test]
    fn test_frame_follows_canvas_aspect() {
        let frame = SlideFrame::for_canvas(&Canvas::default());
        assert!((frame.height - 7.5).abs() < 1e-3);
        assert!((frame.px(1280.0) - frame.width).abs() < 1e-9);
    }

    #[test]
    fn test_bullets_use_level_characters_and_no_prompts() {
        let slide = Slide::new("Ownership").with_block(ContentBlock::bullets(
            None,
            vec![BulletItem::primary("Moves"), BulletItem::secondary("Copies")],
        ));
        let html = markup(vec![slide], &NoImages);
        let deck = DeckSynchronizer::new().synchronize(&html, &NoImages).unwrap();

        let xml = slide_xml_of(&deck.bytes, 1);
        assert!(xml.contains(r#"<a:buChar char="•"/>"#));
        assert!(xml.contains(r#"<a:buChar char="–"/>"#));
        assert!(xml.contains("<a:t>Ownership</a:t>"));
        assert!(!xml.contains("Click to add"));
        assert!(!xml.contains("Subtitle"));
        assert!(deck.diagnostics[0].is_clean());
    }

    #[test]
    fn test_embedded_image_lands_in_media() {
        let slide = Slide::new("Diagram").with_block(ContentBlock::image("ferris.png", Some("Ferris")));
        let html = markup(vec![slide], &OnePng(png(40, 30)));
        let deck = DeckSynchronizer::new().synchronize(&html, &NoImages).unwrap();

        let mut archive = ZipArchive::new(Cursor::new(deck.bytes.clone())).unwrap();
        assert!(archive.by_name("ppt/media/image1_1.png").is_ok());
        let xml = slide_xml_of(&deck.bytes, 1);
        assert!(xml.contains(r#"<a:blip r:embed="rId2"/>"#));
        assert!(xml.contains("descr=\"Ferris\""));
    }

    #[test]
    fn test_missing_image_becomes_placeholder_rect() {
        let slide = Slide::new("Diagram").with_block(ContentBlock::image("gone.png", Some("Lost diagram")));
        let html = markup(vec![slide], &NoImages);
        let deck = DeckSynchronizer::new().synchronize(&html, &NoImages).unwrap();

        let xml = slide_xml_of(&deck.bytes, 1);
        assert!(xml.contains(PLACEHOLDER_FILL));
        assert!(xml.contains("<a:t>Lost diagram</a:t>"));
        assert!(deck.diagnostics[0]
            .degradations
            .contains(&Degradation::ImagePlaceholder));
    }

    #[test]
    fn test_title_variant_has_background_and_no_corner() {
        let slide = Slide::new("Rust Fundamentals")
            .with_subtitle("A three day course")
            .with_layout(LayoutHint::CourseTitle);
        let html = markup(vec![slide], &NoImages);
        let deck = DeckSynchronizer::new().synchronize(&html, &NoImages).unwrap();

        let xml = slide_xml_of(&deck.bytes, 1);
        assert!(xml.contains(&format!(r#"<a:srgbClr val="{}"/></a:solidFill><a:effectLst/>"#, Theme::default().primary_color)));
        assert!(!xml.contains("rtTriangle"));
        assert!(xml.contains(r#"sz="4400""#));
    }

    #[test]
    fn test_placed_images_avoid_text_region() {
        let slide = Slide::new("Side by side")
            .with_layout(LayoutHint::ImageWithText)
            .with_block(ContentBlock::bullets(
                None,
                (0..6).map(|i| BulletItem::primary(format!("Point number {}", i))).collect(),
            ))
            .with_block(ContentBlock::image("chart.png", None));
        let html = markup(vec![slide], &OnePng(png(800, 600)));
        let deck = DeckSynchronizer::new().synchronize(&html, &NoImages).unwrap();
        assert!(!deck.diagnostics[0]
            .degradations
            .contains(&Degradation::ImageOmitted));
    }

    fn picture_offsets(xml: &str) -> Vec<(i64, i64)> {
        xml.split("<p:pic>")
            .skip(1)
            .map(|pic| {
                let attr = |name: &str| -> i64 {
                    let start = pic.find(&format!("{}=\"", name)).unwrap() + name.len() + 2;
                    let end = start + pic[start..].find('"').unwrap();
                    pic[start..end].parse().unwrap()
                };
                (attr("<a:off x"), attr(" y"))
            })
            .collect()
    }

    #[test]
    fn test_two_column_images_sit_side_by_side() {
        let slide = Slide::new("Compare")
            .with_layout(LayoutHint::TwoColumn)
            .with_block(ContentBlock::callout("Left notes"))
            .with_block(ContentBlock::callout("Right notes"))
            .with_block(ContentBlock::image("left.png", Some("Left caption")))
            .with_block(ContentBlock::image("right.png", Some("Right caption")));
        let html = markup(vec![slide], &OnePng(png(400, 300)));
        let deck = DeckSynchronizer::new().synchronize(&html, &NoImages).unwrap();

        assert!(deck.diagnostics[0].is_clean(), "{:?}", deck.diagnostics[0]);
        let xml = slide_xml_of(&deck.bytes, 1);
        assert!(xml.contains("<a:t>Left caption</a:t>"));
        assert!(xml.contains("<a:t>Right caption</a:t>"));

        let offsets = picture_offsets(&xml);
        assert_eq!(offsets.len(), 2);
        assert_eq!(offsets[0].1, offsets[1].1);
        assert!(offsets[1].0 > offsets[0].0 + to_emu(4.0));
    }

    #[test]
    fn test_caption_room_is_reserved_below_text() {
        let slide = Slide::new("Stack")
            .with_block(ContentBlock::bullets(
                None,
                (0..8).map(|i| BulletItem::primary(format!("Point {}", i))).collect(),
            ))
            .with_block(ContentBlock::image("stack.png", Some("Diagram of the stack")));
        let html = markup(vec![slide], &OnePng(png(400, 300)));
        let deck = DeckSynchronizer::new().synchronize(&html, &NoImages).unwrap();

        let flags = &deck.diagnostics[0].degradations;
        assert!(!flags.contains(&Degradation::CaptionDropped));
        assert!(!flags.contains(&Degradation::ImageOmitted));
        assert!(slide_xml_of(&deck.bytes, 1).contains("<a:t>Diagram of the stack</a:t>"));
    }

    #[test]
    fn test_layout_templates_cover_every_role() {
        let frame = SlideFrame::for_canvas(&Canvas::default());
        for layout in [LayoutHint::Content, LayoutHint::Agenda, LayoutHint::LessonTitle] {
            let roles: Vec<_> = layout_template(layout, &frame).iter().map(|p| p.role).collect();
            assert_eq!(
                roles,
                vec![PlaceholderRole::Title, PlaceholderRole::Subtitle, PlaceholderRole::Body]
            );
        }
    }
}
