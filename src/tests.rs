use super::*;
use crate::extract::{parse_markup, ParsedContent};
use image::{ImageBuffer, ImageOutputFormat, Rgb};
use std::cell::Cell;
use std::io::{Cursor, Read};
use zip::ZipArchive;

struct CountingFetcher {
    bytes: Vec<u8>,
    calls: Cell<usize>,
}

impl CountingFetcher {
    fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            calls: Cell::new(0),
        }
    }
}

impl ImageFetcher for CountingFetcher {
    fn fetch(&self, reference: &str) -> Result<Vec<u8>> {
        self.calls.set(self.calls.get() + 1);
        if reference.contains("missing") {
            return Err(DeckError::PathNotFoundError(reference.into()));
        }
        Ok(self.bytes.clone())
    }
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = ImageBuffer::from_fn(width, height, |x, _| Rgb([(x % 255) as u8, 80u8, 160u8]));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
        .expect("Failed to encode PNG");
    bytes
}

fn long_bullets(count: usize) -> Vec<BulletItem> {
    (0..count)
        .map(|i| BulletItem::primary(format!("Point {} {}", i, "explained at length ".repeat(8))))
        .collect()
}

fn deck_slide_count(bytes: &[u8]) -> usize {
    let archive = ZipArchive::new(Cursor::new(bytes.to_vec())).expect("Failed to open deck");
    archive
        .file_names()
        .filter(|name| name.starts_with("ppt/slides/slide") && name.ends_with(".xml"))
        .count()
}

fn deck_slide_xml(bytes: &[u8], n: usize) -> String {
    let mut archive = ZipArchive::new(Cursor::new(bytes.to_vec())).expect("Failed to open deck");
    let mut xml = String::new();
    archive
        .by_name(&format!("ppt/slides/slide{}.xml", n))
        .expect("Missing slide part")
        .read_to_string(&mut xml)
        .expect("Failed to read slide part");
    xml
}

#[test]
fn test_markup_and_deck_agree_on_slides() {
    let fetcher = CountingFetcher::new(png_bytes(64, 48));
    let pipeline = DeckPipeline::new(&LayoutConfig::default(), Theme::default(), true, fetcher)
        .expect("Failed to build pipeline");

    let slides = vec![
        Slide::new("Rust Fundamentals").with_layout(LayoutHint::CourseTitle),
        Slide::new("Ownership")
            .with_subtitle("Who frees memory")
            .with_block(ContentBlock::heading("Rules"))
            .with_block(ContentBlock::bullets(Some("Remember"), long_bullets(10))),
        Slide::new("Picture").with_block(ContentBlock::image("ferris.png", Some("Ferris"))),
    ];

    let outputs = pipeline
        .render(slides, &mut SlideCounter::default())
        .expect("Pipeline failed");

    let parsed = parse_markup(&outputs.html).expect("Markup did not parse");
    assert_eq!(parsed.slides.len(), outputs.slides.len());
    assert_eq!(deck_slide_count(&outputs.deck), outputs.slides.len());

    for (i, slide) in parsed.slides.iter().enumerate() {
        let xml = deck_slide_xml(&outputs.deck, i + 1);
        let escaped = quick_xml::escape::escape(slide.title.as_str()).into_owned();
        assert!(
            xml.contains(&format!("<a:t>{}</a:t>", escaped)),
            "slide {} title missing from deck",
            i + 1
        );
    }

    let continuation = parsed
        .slides
        .iter()
        .filter(|s| s.title.starts_with("Ownership (cont."))
        .count();
    assert!(continuation >= 1);
}

#[test]
fn test_continuation_slides_drop_subtitle() {
    let pipeline = DeckPipeline::new(
        &LayoutConfig::default(),
        Theme::default(),
        true,
        CountingFetcher::new(Vec::new()),
    )
    .expect("Failed to build pipeline");
    let slide = Slide::new("Lifetimes")
        .with_subtitle("Part one")
        .with_block(ContentBlock::bullets(None, long_bullets(12)));

    let outputs = pipeline
        .render(vec![slide], &mut SlideCounter::default())
        .expect("Pipeline failed");
    let parsed = parse_markup(&outputs.html).expect("Markup did not parse");

    assert_eq!(parsed.slides[0].subtitle.as_deref(), Some("Part one"));
    assert!(parsed.slides[1..].iter().all(|s| s.subtitle.is_none()));
}

#[test]
fn test_linked_images_are_fetched_once() {
    let fetcher = CachedFetcher::new(CountingFetcher::new(png_bytes(32, 32)));
    let config = LayoutConfig::default();
    let renderer = MarkupRenderer::new(HeightEstimator::new(&config), config.canvas).embed_images(false);

    let mut slide = Slide::new("Linked").with_block(ContentBlock::image("https://example.com/a.png", None));
    slide.number = 1;
    let markup = renderer.render(&[slide], &Theme::default(), &fetcher);
    assert!(markup.html.contains("src=\"https://example.com/a.png\""));

    let deck = DeckSynchronizer::new()
        .synchronize(&markup.html, &fetcher)
        .expect("Deck failed");
    assert!(deck.diagnostics[0].is_clean());
    assert_eq!(fetcher.cached_count(), 1);
}

#[test]
fn test_placeholder_is_reported_by_both_outputs() {
    let pipeline = DeckPipeline::new(
        &LayoutConfig::default(),
        Theme::default(),
        true,
        CountingFetcher::new(png_bytes(16, 16)),
    )
    .expect("Failed to build pipeline");
    let slide = Slide::new("Broken")
        .with_block(ContentBlock::image("missing.png", Some("Architecture diagram")));

    let outputs = pipeline
        .render(vec![slide], &mut SlideCounter::default())
        .expect("Pipeline failed");

    assert!(outputs.markup_diagnostics[0]
        .degradations
        .contains(&Degradation::ImagePlaceholder));
    assert!(outputs.deck_diagnostics[0]
        .degradations
        .contains(&Degradation::ImagePlaceholder));
    assert!(deck_slide_xml(&outputs.deck, 1).contains("Architecture diagram"));
}

#[test]
fn test_paired_columns_survive_split() {
    let config = LayoutConfig::default();
    let splitter = OverflowSplitter::new(HeightEstimator::new(&config));
    let mut slide = Slide::new("Compare").with_layout(LayoutHint::TwoColumn);
    for i in 0..8 {
        slide = slide.with_block(ContentBlock::callout(format!("{} {}", i, "side ".repeat(60))));
    }

    let pieces = splitter.split(slide, &mut SlideCounter::default());
    assert!(pieces.len() > 1);

    let renderer = MarkupRenderer::new(HeightEstimator::new(&config), config.canvas);
    let markup = renderer.render(&pieces, &Theme::default(), &CountingFetcher::new(Vec::new()));
    let parsed = parse_markup(&markup.html).expect("Markup did not parse");

    for slide in &parsed.slides {
        for block in &slide.blocks {
            let ParsedContent::Callout(text) = &block.content else {
                panic!("unexpected block {:?}", block.content);
            };
            let origin: usize = text
                .split_whitespace()
                .next()
                .and_then(|n| n.parse().ok())
                .expect("callout starts with its index");
            assert_eq!(block.column, Some(origin % 2));
        }
    }
}
