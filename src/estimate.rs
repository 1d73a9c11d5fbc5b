// ABOUTME: Height estimation for slide content blocks
// ABOUTME: Pure pixel-height formulas that decide whether a slide overflows its canvas

use crate::config::{LayoutConfig, LayoutMetrics};
use crate::model::{BulletLevel, ContentBlock, Slide};

/// What the estimator needs to know about the slide a block sits on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimateContext {
    pub canvas_width: f32,
    pub has_subtitle: bool,
}

/// Estimates rendered heights from the configured metrics.
#[derive(Debug, Clone)]
pub struct HeightEstimator {
    canvas_width: f32,
    metrics: LayoutMetrics,
}

impl HeightEstimator {
    pub fn new(config: &LayoutConfig) -> Self {
        Self {
            canvas_width: config.canvas.width as f32,
            metrics: config.metrics.clone(),
        }
    }

    pub fn metrics(&self) -> &LayoutMetrics {
        &self.metrics
    }

    pub fn context(&self, has_subtitle: bool) -> EstimateContext {
        EstimateContext {
            canvas_width: self.canvas_width,
            has_subtitle,
        }
    }

    pub fn context_for(&self, slide: &Slide) -> EstimateContext {
        self.context(slide.has_subtitle())
    }

    /// Estimated pixel height of a single block.
    pub fn estimate(&self, block: &ContentBlock, ctx: &EstimateContext) -> f32 {
        let m = &self.metrics;
        match block {
            ContentBlock::Heading { .. } => m.heading_height + m.heading_margin_top,
            ContentBlock::Bullets { heading, items } => {
                let heading_height = if heading.as_deref().is_some_and(|h| !h.trim().is_empty()) {
                    m.bullets_heading_height
                } else {
                    0.0
                };
                let text_width = self.content_width(ctx) - m.bullet_indent;
                let items_height: f32 = items
                    .iter()
                    .map(|item| match item.level {
                        BulletLevel::Primary => {
                            m.primary_line_height * self.line_count(&item.text, text_width)
                        }
                        BulletLevel::Secondary => {
                            m.secondary_line_height
                                * self.line_count(&item.text, text_width - m.secondary_indent)
                        }
                    })
                    .sum();
                heading_height + items_height
            }
            ContentBlock::Image { caption, .. } => {
                let caption_height = if caption.as_deref().is_some_and(|c| !c.trim().is_empty()) {
                    m.caption_height
                } else {
                    0.0
                };
                m.image_height + caption_height
            }
            ContentBlock::Callout { text } => {
                let lines = self.line_count(text, self.content_width(ctx) - m.callout_padding_x);
                m.callout_base_height + m.callout_line_height * (lines - 1.0)
            }
        }
    }

    /// Estimated height of a block sequence plus spacing and the title reservation.
    pub fn total_height<'a, I>(&self, blocks: I, ctx: &EstimateContext) -> f32
    where
        I: IntoIterator<Item = &'a ContentBlock>,
    {
        let mut count = 0usize;
        let mut sum = 0.0f32;
        for block in blocks {
            sum += self.estimate(block, ctx);
            count += 1;
        }
        let spacing = count.saturating_sub(1) as f32 * self.metrics.block_spacing;
        sum + spacing + self.metrics.title_reservation
    }

    pub fn slide_height(&self, slide: &Slide) -> f32 {
        self.total_height(&slide.blocks, &self.context_for(slide))
    }

    pub fn budget(&self, ctx: &EstimateContext) -> f32 {
        if ctx.has_subtitle {
            self.metrics.max_with_subtitle
        } else {
            self.metrics.max_no_subtitle
        }
    }

    /// Budget left for blocks once the title is reserved.
    pub fn block_budget(&self, ctx: &EstimateContext) -> f32 {
        self.budget(ctx) - self.metrics.title_reservation
    }

    pub fn fits<'a, I>(&self, blocks: I, ctx: &EstimateContext) -> bool
    where
        I: IntoIterator<Item = &'a ContentBlock>,
    {
        self.total_height(blocks, ctx) <= self.budget(ctx) + self.metrics.overflow_tolerance
    }

    pub fn is_overflowing(&self, slide: &Slide) -> bool {
        !self.fits(&slide.blocks, &self.context_for(slide))
    }

    fn content_width(&self, ctx: &EstimateContext) -> f32 {
        ctx.canvas_width - 2.0 * self.metrics.padding_x
    }

    fn line_count(&self, text: &str, width: f32) -> f32 {
        let chars_per_line = (width / self.metrics.avg_char_width).floor().max(1.0);
        let chars = text.trim().chars().count() as f32;
        (chars / chars_per_line).ceil().max(1.0)
    }
}
