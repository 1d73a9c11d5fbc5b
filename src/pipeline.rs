// ABOUTME: End-to-end rendering pipeline for the course-deck layout engine
// ABOUTME: Validates, splits, renders markup and derives the deck from it in one pass

use crate::config::{Config, LayoutConfig, Theme};
use crate::errors::Result;
use crate::estimate::HeightEstimator;
use crate::html::MarkupRenderer;
use crate::model::{validate_slides, Slide, SlideDiagnostics};
use crate::pptx::DeckSynchronizer;
use crate::resources::{CachedFetcher, ImageFetcher, ResourceFetcher};
use crate::split::{OverflowSplitter, SlideCounter};
use log::{info, warn};

/// Both outputs of one pipeline run, in identical slide order.
#[derive(Debug, Clone)]
pub struct RenderedOutputs {
    /// The expanded slide list the outputs were rendered from.
    pub slides: Vec<Slide>,
    pub html: String,
    pub deck: Vec<u8>,
    pub markup_diagnostics: Vec<SlideDiagnostics>,
    pub deck_diagnostics: Vec<SlideDiagnostics>,
}

impl RenderedOutputs {
    /// Slides that degraded in either output.
    pub fn degraded_slides(&self) -> Vec<u32> {
        self.deck_diagnostics
            .iter()
            .filter(|d| !d.is_clean())
            .map(|d| d.number)
            .collect()
    }
}

pub struct DeckPipeline<F: ImageFetcher> {
    splitter: OverflowSplitter,
    renderer: MarkupRenderer,
    synchronizer: DeckSynchronizer,
    theme: Theme,
    fetcher: CachedFetcher<F>,
}

impl DeckPipeline<ResourceFetcher> {
    pub fn from_config(config: &Config) -> Result<Self> {
        let fetcher = ResourceFetcher::new(config.image_base_dir.clone(), config.retry)?;
        Self::new(&config.layout, config.theme.clone(), config.embed_images, fetcher)
    }
}

impl<F: ImageFetcher> DeckPipeline<F> {
    pub fn new(layout: &LayoutConfig, theme: Theme, embed_images: bool, fetcher: F) -> Result<Self> {
        layout.validate()?;
        let estimator = HeightEstimator::new(layout);
        Ok(Self {
            splitter: OverflowSplitter::new(estimator.clone()),
            renderer: MarkupRenderer::new(estimator, layout.canvas).embed_images(embed_images),
            synchronizer: DeckSynchronizer::new(),
            theme,
            fetcher: CachedFetcher::new(fetcher),
        })
    }

    /// Validate and split, numbering output slides from `counter`.
    pub fn expand(&self, slides: Vec<Slide>, counter: &mut SlideCounter) -> Result<Vec<Slide>> {
        validate_slides(&slides)?;
        let input = slides.len();
        let expanded = self.splitter.split_all(slides, counter);
        info!("Expanded {} input slides into {}", input, expanded.len());
        Ok(expanded)
    }

    pub fn render(&self, slides: Vec<Slide>, counter: &mut SlideCounter) -> Result<RenderedOutputs> {
        let slides = self.expand(slides, counter)?;

        let markup = self.renderer.render(&slides, &self.theme, &self.fetcher);
        let deck = self.synchronizer.synchronize(&markup.html, &self.fetcher)?;

        let outputs = RenderedOutputs {
            slides,
            html: markup.html,
            deck: deck.bytes,
            markup_diagnostics: markup.diagnostics,
            deck_diagnostics: deck.diagnostics,
        };

        let degraded = outputs.degraded_slides();
        if !degraded.is_empty() {
            warn!("Slides with degradations: {:?}", degraded);
        }
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DeckError;
    use crate::model::{BulletItem, ContentBlock, Degradation};

    struct NoImages;

    impl ImageFetcher for NoImages {
        fn fetch(&self, reference: &str) -> Result<Vec<u8>> {
            Err(DeckError::PathNotFoundError(reference.into()))
        }
    }

    fn pipeline() -> DeckPipeline<NoImages> {
        DeckPipeline::new(&LayoutConfig::default(), Theme::default(), true, NoImages).unwrap()
    }

    #[test]
    fn test_outputs_share_slide_order() {
        let long_items = (0..10)
            .map(|i| BulletItem::primary(format!("{} {}", i, "word ".repeat(40))))
            .collect();
        let slides = vec![
            Slide::new("Intro").with_block(ContentBlock::callout("Welcome")),
            Slide::new("Details").with_block(ContentBlock::bullets(Some("Points"), long_items)),
        ];

        let outputs = pipeline().render(slides, &mut SlideCounter::default()).unwrap();
        assert!(outputs.slides.len() > 2);
        let markup_numbers: Vec<u32> = outputs.markup_diagnostics.iter().map(|d| d.number).collect();
        let deck_numbers: Vec<u32> = outputs.deck_diagnostics.iter().map(|d| d.number).collect();
        let expected: Vec<u32> = (1..=outputs.slides.len() as u32).collect();
        assert_eq!(markup_numbers, expected);
        assert_eq!(deck_numbers, expected);
        assert!(outputs.deck_diagnostics[1]
            .degradations
            .contains(&Degradation::OverflowSplit));
    }

    #[test]
    fn test_invalid_input_fails_before_output() {
        let result = pipeline().render(Vec::new(), &mut SlideCounter::default());
        assert!(matches!(result, Err(DeckError::ValidationError(_))));
    }

    #[test]
    fn test_counter_continues_across_runs() {
        let pipeline = pipeline();
        let mut counter = SlideCounter::default();
        pipeline
            .render(vec![Slide::new("First")], &mut counter)
            .unwrap();
        let second = pipeline
            .render(vec![Slide::new("Second")], &mut counter)
            .unwrap();
        assert_eq!(second.slides[0].number, 2);
    }
}
