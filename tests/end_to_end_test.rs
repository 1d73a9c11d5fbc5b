use course_deck::extract::parse_markup;
use course_deck::{
    parse_outline, verify_html, write_html_to_file, Config, DeckPipeline, Degradation,
    ResourceFetcher, SlideCounter, VerifyOptions,
};
use image::{ImageBuffer, ImageOutputFormat, Rgb};
use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;
use tempfile::TempDir;

const OUTLINE: &str = r#"% Systems Programming in Rust
% Course Team
% 2026-10-01

# Memory Layout

How values sit in memory

<!-- layout: image_with_text -->

![Stack and heap](stack-heap.png)

- Stack frames hold fixed-size locals
- Heap allocations live behind pointers
  - Box owns exactly one allocation

# Missing Diagram

![Architecture](does-not-exist.png)

# Summary

- Ownership decides when memory is freed
- Borrowing gives temporary access
"#;

fn write_png(path: &Path, width: u32, height: u32) {
    let img = ImageBuffer::from_fn(width, height, |x, y| Rgb([(x % 255) as u8, (y % 255) as u8, 90u8]));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
        .expect("Failed to encode PNG");
    fs::write(path, bytes).expect("Failed to write PNG");
}

fn build_pipeline(image_dir: &Path) -> DeckPipeline<ResourceFetcher> {
    let config = Config::default();
    DeckPipeline::new(
        &config.layout,
        config.theme.clone(),
        true,
        ResourceFetcher::offline(Some(image_dir.to_path_buf())),
    )
    .expect("Failed to build pipeline")
}

fn init_logger() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

#[test]
fn test_outline_to_html_and_pptx() {
    init_logger();
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    write_png(&temp_dir.path().join("stack-heap.png"), 320, 200);

    let slides = parse_outline(OUTLINE).expect("Outline did not parse");
    let pipeline = build_pipeline(temp_dir.path());
    let outputs = pipeline
        .render(slides, &mut SlideCounter::default())
        .expect("Pipeline failed");

    // Title slide from the frontmatter plus three outline slides.
    assert_eq!(outputs.slides.len(), 4);

    let html_path = temp_dir.path().join("build/deck.html");
    write_html_to_file(&outputs.html, &html_path).expect("Failed to write HTML");
    let html = fs::read_to_string(&html_path).expect("Failed to read HTML");
    assert!(html.contains("data:image/png;base64,"));

    let parsed = parse_markup(&html).expect("Markup did not parse");
    assert_eq!(parsed.slides[0].title, "Systems Programming in Rust");
    assert_eq!(parsed.slides[1].subtitle.as_deref(), Some("How values sit in memory"));

    let mut archive =
        zip::ZipArchive::new(Cursor::new(outputs.deck.clone())).expect("Deck is not a zip");
    let media: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("ppt/media/"))
        .map(String::from)
        .collect();
    assert_eq!(media.len(), 1, "Only the resolvable image is embedded: {:?}", media);

    let mut xml = String::new();
    archive
        .by_name("ppt/slides/slide3.xml")
        .expect("Missing slide part")
        .read_to_string(&mut xml)
        .expect("Failed to read slide part");
    assert!(xml.contains("Architecture"));

    assert!(outputs.degraded_slides().contains(&3));
    assert!(!outputs.deck_diagnostics[1]
        .degradations
        .iter()
        .any(|d| matches!(d, Degradation::ImagePlaceholder | Degradation::ImageOmitted)));
    assert!(outputs.deck_diagnostics[2]
        .degradations
        .contains(&Degradation::ImagePlaceholder));
}

#[test]
fn test_numbering_continues_across_decks() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let pipeline = build_pipeline(temp_dir.path());
    let mut counter = SlideCounter::starting_at(10);

    let first = pipeline
        .render(parse_outline("# One\n\n- a\n").unwrap(), &mut counter)
        .expect("Pipeline failed");
    let second = pipeline
        .render(parse_outline("# Two\n\n- b\n").unwrap(), &mut counter)
        .expect("Pipeline failed");

    assert_eq!(first.slides[0].number, 10);
    assert_eq!(second.slides[0].number, 11);
}

#[test]
#[ignore = "requires a local Chrome or Chromium"]
fn test_browser_measurement_matches_estimate() {
    init_logger();
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let slides = parse_outline("# Short\n\n- one point\n- another point\n").unwrap();
    let outputs = build_pipeline(temp_dir.path())
        .render(slides, &mut SlideCounter::default())
        .expect("Pipeline failed");

    let report = verify_html(&outputs.html, &VerifyOptions::default()).expect("Verify failed");
    assert_eq!(report.len(), 1);
    assert!(!report[0].overflow);
    assert!(report[0].measured > 0.0);
}
