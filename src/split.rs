// ABOUTME: Overflow splitting of slides into continuation slides
// ABOUTME: Recursively partitions blocks while preserving order, content and column pairing

use crate::estimate::{EstimateContext, HeightEstimator};
use crate::model::{ContentBlock, Degradation, Slide};
use log::{info, warn};
use std::ops::Range;

const CONTINUATION_PREFIX: &str = " (cont. ";

/// Explicit slide-number counter threaded through splitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlideCounter {
    next: u32,
}

impl Default for SlideCounter {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl SlideCounter {
    /// Start numbering at `first`; parallel batches reserve disjoint ranges this way.
    pub fn starting_at(first: u32) -> Self {
        Self { next: first }
    }

    pub fn peek(&self) -> u32 {
        self.next
    }

    pub fn next_number(&mut self) -> u32 {
        let number = self.next;
        self.next = self.next.saturating_add(1);
        number
    }
}

/// Remove a trailing `(cont. N)` marker, if any.
pub fn strip_continuation_suffix(title: &str) -> &str {
    match continuation_parts(title) {
        Some((base, _)) => base,
        None => title.trim_end(),
    }
}

/// The `N` of a trailing `(cont. N)` marker.
pub fn continuation_index(title: &str) -> Option<u32> {
    continuation_parts(title).map(|(_, index)| index)
}

pub fn continuation_title(title: &str, index: u32) -> String {
    format!("{}{}{})", strip_continuation_suffix(title), CONTINUATION_PREFIX, index)
}

fn continuation_parts(title: &str) -> Option<(&str, u32)> {
    let trimmed = title.trim_end();
    let without_paren = trimmed.strip_suffix(')')?;
    let start = without_paren.rfind(CONTINUATION_PREFIX)?;
    let index = without_paren[start + CONTINUATION_PREFIX.len()..]
        .trim()
        .parse::<u32>()
        .ok()?;
    Some((trimmed[..start].trim_end(), index))
}

/// Splits overflowing slides into continuation slides.
#[derive(Debug, Clone)]
pub struct OverflowSplitter {
    estimator: HeightEstimator,
}

impl OverflowSplitter {
    pub fn new(estimator: HeightEstimator) -> Self {
        Self { estimator }
    }

    pub fn estimator(&self) -> &HeightEstimator {
        &self.estimator
    }

    /// Split every slide in order, numbering the output from `counter`.
    pub fn split_all(&self, slides: Vec<Slide>, counter: &mut SlideCounter) -> Vec<Slide> {
        let input_count = slides.len();
        let output: Vec<Slide> = slides
            .into_iter()
            .flat_map(|slide| self.split(slide, counter))
            .collect();
        info!(
            "Split {} slides into {} (next slide number {})",
            input_count,
            output.len(),
            counter.peek()
        );
        output
    }

    /// Split one slide. Content is never dropped or reordered.
    pub fn split(&self, mut slide: Slide, counter: &mut SlideCounter) -> Vec<Slide> {
        let overflowing = self.estimator.is_overflowing(&slide);

        if !overflowing {
            slide.number = counter.next_number();
            return vec![slide];
        }

        if slide.layout.opts_out_of_splitting() {
            warn!(
                "Slide '{}' overflows but its {} layout is rendered as-is",
                slide.title, slide.layout
            );
            slide.degrade(Degradation::OverflowAccepted);
            slide.number = counter.next_number();
            return vec![slide];
        }

        let first_ctx = self.estimator.context_for(&slide);
        let rest_ctx = self.estimator.context(false);
        // The first slide has the tighter budget, so chunks sized for it fit every slide.
        let (blocks, origins) = self.divide_long_lists(&slide, &first_ctx);

        let mut ranges = Vec::new();
        self.partition(&blocks, 0, &first_ctx, &rest_ctx, 0, &mut ranges);

        let base_title = strip_continuation_suffix(&slide.title).to_string();
        let first_index = continuation_index(&slide.title).unwrap_or(0);
        let multi_part = ranges.len() > 1;

        let mut output = Vec::with_capacity(ranges.len());
        for (part, range) in ranges.into_iter().enumerate() {
            let mut piece = Slide {
                number: counter.next_number(),
                title: if part == 0 {
                    slide.title.clone()
                } else {
                    continuation_title(&base_title, first_index.saturating_add(part as u32))
                },
                subtitle: if part == 0 { slide.subtitle.clone() } else { None },
                layout: slide.layout,
                blocks: blocks[range.clone()].to_vec(),
                source_ref: slide.source_ref.clone(),
                block_origins: origins[range].to_vec(),
                degradations: slide.degradations.clone(),
            };
            if multi_part {
                piece.degrade(Degradation::OverflowSplit);
            }
            if self.estimator.is_overflowing(&piece) {
                warn!(
                    "Slide '{}' still overflows after splitting ({} block(s) cannot be divided further)",
                    piece.title,
                    piece.blocks.len()
                );
                piece.degrade(Degradation::UnsplittableOverflow);
            }
            output.push(piece);
        }

        if multi_part {
            info!("Split overflowing slide '{}' into {} slides", base_title, output.len());
        }
        output
    }

    /// Cut the block list into consecutive ranges; recursion only ever continues on the tail.
    fn partition(
        &self,
        blocks: &[ContentBlock],
        start: usize,
        first_ctx: &EstimateContext,
        rest_ctx: &EstimateContext,
        depth: usize,
        ranges: &mut Vec<Range<usize>>,
    ) {
        let ctx = if start == 0 { first_ctx } else { rest_ctx };
        let remaining = &blocks[start..];
        let metrics = self.estimator.metrics();

        if remaining.len() <= 1 || self.estimator.fits(remaining, ctx) {
            ranges.push(start..blocks.len());
            return;
        }
        if depth >= metrics.max_split_depth {
            warn!(
                "Split depth limit {} reached with {} blocks left",
                metrics.max_split_depth,
                remaining.len()
            );
            ranges.push(start..blocks.len());
            return;
        }

        let divisor = metrics.split_divisor.max(2);
        let mut take = (remaining.len() + divisor - 1) / divisor;
        while take > 1 && !self.estimator.fits(&remaining[..take], ctx) {
            take -= 1;
        }

        ranges.push(start..start + take);
        self.partition(blocks, start + take, first_ctx, rest_ctx, depth + 1, ranges);
    }

    /// Break bullet lists that cannot fit a slide with the given budget into item-level chunks.
    fn divide_long_lists(&self, slide: &Slide, ctx: &EstimateContext) -> (Vec<ContentBlock>, Vec<usize>) {
        let mut blocks = Vec::with_capacity(slide.blocks.len());
        let mut origins = Vec::with_capacity(slide.blocks.len());

        for (index, block) in slide.blocks.iter().enumerate() {
            let origin = slide.origin_of(index);
            match block {
                ContentBlock::Bullets { heading, items }
                    if items.len() > 1 && !self.estimator.fits([block], ctx) =>
                {
                    let budget = self.estimator.block_budget(ctx);
                    let mut chunk_heading = heading.clone();
                    let mut chunk = Vec::new();
                    for item in items {
                        chunk.push(item.clone());
                        let candidate = ContentBlock::Bullets {
                            heading: chunk_heading.clone(),
                            items: chunk.clone(),
                        };
                        if chunk.len() > 1 && self.estimator.estimate(&candidate, ctx) > budget {
                            let overflow_item = chunk.pop();
                            blocks.push(ContentBlock::Bullets {
                                heading: chunk_heading.take(),
                                items: std::mem::take(&mut chunk),
                            });
                            origins.push(origin);
                            chunk.extend(overflow_item);
                        }
                    }
                    if !chunk.is_empty() {
                        blocks.push(ContentBlock::Bullets {
                            heading: chunk_heading.take(),
                            items: chunk,
                        });
                        origins.push(origin);
                    }
                }
                _ => {
                    blocks.push(block.clone());
                    origins.push(origin);
                }
            }
        }

        (blocks, origins)
    }
}
