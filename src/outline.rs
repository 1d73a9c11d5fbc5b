// ABOUTME: Markdown outline input for the course-deck layout engine
// ABOUTME: Turns a lesson outline into slides with comrak's AST, one slide per top-level heading

use crate::errors::{DeckError, Result};
use crate::model::{BulletItem, ContentBlock, LayoutHint, Slide};
use comrak::nodes::{AstNode, NodeValue};
use comrak::{parse_document, Arena, ComrakOptions};
use log::{debug, info, warn};

/// `%` lines at the top of an outline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frontmatter {
    pub title: String,
    pub author: String,
    pub date: String,
}

impl Frontmatter {
    /// Course opener built from the frontmatter.
    pub fn title_slide(&self) -> Slide {
        let byline = [self.author.as_str(), self.date.as_str()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" · ");
        let slide = Slide::new(self.title.clone()).with_layout(LayoutHint::CourseTitle);
        if byline.is_empty() {
            slide
        } else {
            slide.with_subtitle(byline)
        }
    }
}

/// Split `% title`, `% author`, `% date` lines from the body.
pub fn parse_frontmatter(content: &str) -> (Option<Frontmatter>, String) {
    let lines: Vec<&str> = content.lines().collect();

    let header: Vec<String> = lines
        .iter()
        .take(3)
        .take_while(|line| line.starts_with("% "))
        .map(|line| line.trim_start_matches("% ").trim().to_string())
        .collect();

    if header.is_empty() {
        return (None, content.to_string());
    }

    let mut start_idx = header.len();
    while start_idx < lines.len() && lines[start_idx].trim().is_empty() {
        start_idx += 1;
    }

    let mut fields = header.into_iter();
    let frontmatter = Frontmatter {
        title: fields.next().unwrap_or_default(),
        author: fields.next().unwrap_or_default(),
        date: fields.next().unwrap_or_default(),
    };
    (Some(frontmatter), lines[start_idx..].join("\n"))
}

/// Parse a Markdown outline into slides.
///
/// `#` starts a slide and the plain paragraph right after it becomes the
/// subtitle. `##` is a heading block; `###` directly above a list titles that
/// list. Nested list items are secondary bullets, `![alt](src)` is an image
/// captioned with its alt text, and block quotes, code and any other
/// paragraphs become callouts. `<!-- layout: two_column -->` and
/// `<!-- source: ref -->` comments annotate the current slide.
pub fn parse_outline(markdown: &str) -> Result<Vec<Slide>> {
    let (frontmatter, body) = parse_frontmatter(markdown);

    let arena = Arena::new();
    let options = ComrakOptions::default();
    let root = parse_document(&arena, &body, &options);

    let mut slides: Vec<Slide> = Vec::new();
    if let Some(frontmatter) = &frontmatter {
        if !frontmatter.title.is_empty() {
            slides.push(frontmatter.title_slide());
        }
    }

    let nodes: Vec<&AstNode> = root.children().collect();
    let mut awaiting_subtitle = false;
    let mut i = 0;

    while i < nodes.len() {
        let node = nodes[i];
        i += 1;

        let value = node.data.borrow().value.clone();

        if let NodeValue::Heading(heading) = &value {
            if heading.level == 1 {
                slides.push(Slide::new(inline_text(node)));
                awaiting_subtitle = true;
                continue;
            }
        }

        // Annotations may sit between the heading and its subtitle.
        if let NodeValue::HtmlBlock(html) = &value {
            match slides.last_mut() {
                Some(slide) => apply_annotation(slide, &html.literal),
                None => debug!("Ignoring HTML block before the first slide"),
            }
            continue;
        }
        if matches!(value, NodeValue::ThematicBreak) {
            continue;
        }

        let Some(slide) = slides.last_mut() else {
            warn!("Skipping outline content before the first '#' heading");
            continue;
        };

        match &value {
            NodeValue::Heading(heading) => {
                let text = inline_text(node);
                let before_list = nodes
                    .get(i)
                    .is_some_and(|next| matches!(next.data.borrow().value, NodeValue::List(_)));
                if heading.level == 3 && before_list {
                    slide.blocks.push(ContentBlock::bullets(Some(text.as_str()), list_items(nodes[i])));
                    i += 1;
                } else {
                    slide.blocks.push(ContentBlock::heading(text));
                }
            }
            NodeValue::Paragraph => {
                let images = images_in(node);
                let text = inline_text(node);
                if awaiting_subtitle && images.is_empty() && !slide.has_subtitle() {
                    slide.subtitle = Some(text);
                } else {
                    slide.blocks.extend(images);
                    if !text.is_empty() {
                        slide.blocks.push(ContentBlock::callout(text));
                    }
                }
            }
            NodeValue::List(_) => {
                slide.blocks.push(ContentBlock::bullets(None, list_items(node)));
            }
            NodeValue::BlockQuote => {
                let text = block_text(node);
                if !text.is_empty() {
                    slide.blocks.push(ContentBlock::callout(text));
                }
            }
            NodeValue::CodeBlock(code) => {
                slide
                    .blocks
                    .push(ContentBlock::callout(code.literal.trim_end().to_string()));
            }
            other => debug!("Skipping unsupported outline node {:?}", other),
        }
        awaiting_subtitle = false;
    }

    if slides.is_empty() {
        return Err(DeckError::OutlineError(
            "Outline contains no '#' slide headings".to_string(),
        ));
    }

    info!("Parsed {} slides from outline", slides.len());
    Ok(slides)
}

fn apply_annotation(slide: &mut Slide, literal: &str) {
    let Some(inner) = literal
        .trim()
        .strip_prefix("<!--")
        .and_then(|rest| rest.strip_suffix("-->"))
    else {
        return;
    };
    let Some((key, value)) = inner.split_once(':') else {
        return;
    };
    let value = value.trim();
    match key.trim().to_ascii_lowercase().as_str() {
        "layout" => match LayoutHint::parse(value) {
            Some(layout) => slide.layout = layout,
            None => warn!("Unknown layout '{}' on slide '{}'", value, slide.title),
        },
        "source" => slide.source_ref = Some(value.to_string()),
        other => debug!("Ignoring outline annotation '{}'", other),
    }
}

/// Inline text of a node, leaving out image alt text.
fn inline_text<'a>(node: &'a AstNode<'a>) -> String {
    let mut text = String::new();
    collect_inline(node, &mut text);
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collect_inline<'a>(node: &'a AstNode<'a>, out: &mut String) {
    for child in node.children() {
        match &child.data.borrow().value {
            NodeValue::Text(text) => out.push_str(text),
            NodeValue::Code(code) => out.push_str(&code.literal),
            NodeValue::SoftBreak | NodeValue::LineBreak => out.push(' '),
            NodeValue::Image(_) => {}
            _ => collect_inline(child, out),
        }
    }
}

/// Text of every paragraph inside a container, joined with spaces.
fn block_text<'a>(node: &'a AstNode<'a>) -> String {
    node.descendants()
        .filter(|n| matches!(n.data.borrow().value, NodeValue::Paragraph))
        .map(inline_text)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn images_in<'a>(node: &'a AstNode<'a>) -> Vec<ContentBlock> {
    node.descendants()
        .filter_map(|n| match &n.data.borrow().value {
            NodeValue::Image(link) => {
                let alt = inline_text(n);
                Some(ContentBlock::image(
                    link.url.clone(),
                    Some(alt.as_str()).filter(|a| !a.is_empty()),
                ))
            }
            _ => None,
        })
        .collect()
}

fn list_items<'a>(list: &'a AstNode<'a>) -> Vec<BulletItem> {
    let mut items = Vec::new();
    collect_items(list, 1, &mut items);
    items
}

fn collect_items<'a>(list: &'a AstNode<'a>, depth: usize, items: &mut Vec<BulletItem>) {
    for item in list.children() {
        for child in item.children() {
            let value = child.data.borrow().value.clone();
            match value {
                NodeValue::Paragraph => {
                    let text = inline_text(child);
                    if depth == 1 {
                        items.push(BulletItem::primary(text));
                    } else {
                        items.push(BulletItem::secondary(text));
                    }
                }
                NodeValue::List(_) => collect_items(child, depth + 1, items),
                _ => {}
            }
        }
    }
}
