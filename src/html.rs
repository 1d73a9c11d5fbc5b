// ABOUTME: HTML generation module for the course-deck layout engine
// ABOUTME: Renders split slides into fixed-size canvas sections, the source of truth for appearance

use crate::config::Theme;
use crate::errors::{DeckError, Result};
use crate::estimate::HeightEstimator;
use crate::model::{BulletLevel, Canvas, ContentBlock, Degradation, Slide, SlideDiagnostics};
use crate::resources::{fetch_image, ImageFetcher};
use crate::utils::ensure_parent_directory_exists;
use log::{info, warn};
use quick_xml::escape::escape;
use std::fs;
use std::path::Path;

/// Rendered markup plus what degraded while producing it.
#[derive(Debug, Clone)]
pub struct RenderedMarkup {
    pub html: String,
    pub diagnostics: Vec<SlideDiagnostics>,
}

/// Converts slides into the primary HTML document.
pub struct MarkupRenderer {
    estimator: HeightEstimator,
    canvas: Canvas,
    embed_images: bool,
}

impl MarkupRenderer {
    pub fn new(estimator: HeightEstimator, canvas: Canvas) -> Self {
        Self {
            estimator,
            canvas,
            embed_images: true,
        }
    }

    /// Embed images as data URIs (default) or link to their references.
    pub fn embed_images(mut self, embed: bool) -> Self {
        self.embed_images = embed;
        self
    }

    pub fn render<F: ImageFetcher + ?Sized>(
        &self,
        slides: &[Slide],
        theme: &Theme,
        fetcher: &F,
    ) -> RenderedMarkup {
        info!("Rendering {} slides to HTML", slides.len());

        let document_title = slides
            .first()
            .map(|s| s.title.as_str())
            .unwrap_or("Course deck");

        let mut html_doc = String::from("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
        html_doc.push_str("<meta charset=\"UTF-8\">\n");
        html_doc.push_str(&format!(
            "<meta name=\"viewport\" content=\"width={}, initial-scale=1.0\">\n",
            self.canvas.width
        ));
        html_doc.push_str(&format!("<title>{}</title>\n", escape(document_title)));
        html_doc.push_str("<style>\n");
        html_doc.push_str(&stylesheet(&self.canvas, theme));
        html_doc.push_str("</style>\n</head>\n");

        html_doc.push_str(&format!(
            "<body data-canvas-width=\"{}\" data-canvas-height=\"{}\" data-theme-font=\"{}\" data-theme-heading-font=\"{}\" data-theme-primary=\"{}\" data-theme-accent=\"{}\" data-theme-background=\"{}\" data-theme-text=\"{}\" data-theme-muted=\"{}\">\n",
            self.canvas.width,
            self.canvas.height,
            escape(&theme.font_family),
            escape(&theme.heading_font_family),
            escape(&theme.primary_color),
            escape(&theme.accent_color),
            escape(&theme.background_color),
            escape(&theme.text_color),
            escape(&theme.muted_color),
        ));

        let mut diagnostics = Vec::with_capacity(slides.len());
        for slide in slides {
            let mut degradations = slide.degradations.clone();
            let section = self.render_slide(slide, fetcher, &mut degradations);
            html_doc.push_str(&section);
            diagnostics.push(SlideDiagnostics {
                number: slide.number,
                title: slide.title.clone(),
                degradations,
            });
        }

        html_doc.push_str("<script>\n");
        html_doc.push_str(SELF_CHECK_SCRIPT);
        html_doc.push_str("</script>\n</body>\n</html>\n");

        RenderedMarkup {
            html: html_doc,
            diagnostics,
        }
    }

    fn render_slide<F: ImageFetcher + ?Sized>(
        &self,
        slide: &Slide,
        fetcher: &F,
        degradations: &mut Vec<Degradation>,
    ) -> String {
        let ctx = self.estimator.context_for(slide);
        let estimate = self.estimator.slide_height(slide);
        let budget = self.estimator.budget(&ctx);

        let body = self.render_body(slide, fetcher, degradations);

        let variant_class = if slide.layout.is_title_variant() {
            format!("slide--title slide--{}", slide.layout.as_str().replace('_', "-"))
        } else {
            "slide--content".to_string()
        };
        let flags = degradations
            .iter()
            .map(Degradation::as_str)
            .collect::<Vec<_>>()
            .join(" ");

        let mut section = format!(
            "<section class=\"slide {}\" data-slide=\"{}\" data-layout=\"{}\" data-estimate=\"{:.0}\" data-budget=\"{:.0}\" data-flags=\"{}\"",
            variant_class,
            slide.number,
            slide.layout.as_str(),
            estimate,
            budget,
            flags
        );
        if let Some(source) = &slide.source_ref {
            section.push_str(&format!(" data-source=\"{}\"", escape(source)));
        }
        section.push_str(">\n");

        let header = self.render_header(slide);
        if slide.layout.is_title_variant() {
            // Full-bleed opener without the corner decoration.
            section.push_str("<div class=\"title-bleed\">\n");
            section.push_str(&header);
            section.push_str(&body);
            section.push_str("</div>\n");
        } else {
            section.push_str("<div class=\"slide-corner\" aria-hidden=\"true\"></div>\n");
            section.push_str("<header class=\"slide-header\">\n");
            section.push_str(&header);
            section.push_str("</header>\n");
            section.push_str(&body);
        }
        section.push_str("</section>\n");
        section
    }

    fn render_header(&self, slide: &Slide) -> String {
        let mut header = format!("<h1 class=\"slide-title\">{}</h1>\n", escape(&slide.title));
        if let Some(subtitle) = slide.subtitle.as_deref().filter(|s| !s.trim().is_empty()) {
            header.push_str(&format!(
                "<p class=\"slide-subtitle\">{}</p>\n",
                escape(subtitle)
            ));
        }
        header
    }

    fn render_body<F: ImageFetcher + ?Sized>(
        &self,
        slide: &Slide,
        fetcher: &F,
        degradations: &mut Vec<Degradation>,
    ) -> String {
        if slide.blocks.is_empty() {
            return String::new();
        }

        let paired = slide.layout.is_paired();
        let mut body = String::from(if paired {
            "<div class=\"slide-body slide-body--paired\">\n"
        } else {
            "<div class=\"slide-body\">\n"
        });

        for (index, block) in slide.blocks.iter().enumerate() {
            let col = if paired {
                format!(" data-col=\"{}\"", slide.column_of(index))
            } else {
                String::new()
            };
            match block {
                ContentBlock::Heading { text } => {
                    body.push_str(&format!(
                        "<h2 class=\"block block-heading\"{}>{}</h2>\n",
                        col,
                        escape(text)
                    ));
                }
                ContentBlock::Bullets { heading, items } => {
                    body.push_str(&format!("<div class=\"block block-bullets\"{}>\n", col));
                    if let Some(heading) = heading.as_deref().filter(|h| !h.trim().is_empty()) {
                        body.push_str(&format!(
                            "<h3 class=\"bullets-heading\">{}</h3>\n",
                            escape(heading)
                        ));
                    }
                    body.push_str("<ul>\n");
                    for item in items {
                        let level = match item.level {
                            BulletLevel::Primary => "level-1",
                            BulletLevel::Secondary => "level-2",
                        };
                        body.push_str(&format!(
                            "<li class=\"bullet {}\">{}</li>\n",
                            level,
                            escape(&item.text)
                        ));
                    }
                    body.push_str("</ul>\n</div>\n");
                }
                ContentBlock::Image { reference, caption } => {
                    body.push_str(&format!("<figure class=\"block block-image\"{}>\n", col));
                    let alt = image_alt_text(reference, caption.as_deref());
                    match fetch_image(fetcher, reference) {
                        Ok(image) => {
                            let src = if self.embed_images {
                                image.to_data_uri()
                            } else {
                                reference.clone()
                            };
                            body.push_str(&format!(
                                "<img src=\"{}\" alt=\"{}\" data-ref=\"{}\" data-width=\"{}\" data-height=\"{}\">\n",
                                escape(&src),
                                escape(&alt),
                                escape(reference),
                                image.width,
                                image.height
                            ));
                        }
                        Err(e) => {
                            warn!(
                                "Slide {}: image '{}' unavailable, using placeholder: {}",
                                slide.number, reference, e
                            );
                            if !degradations.contains(&Degradation::ImagePlaceholder) {
                                degradations.push(Degradation::ImagePlaceholder);
                            }
                            body.push_str(&format!(
                                "<div class=\"image-placeholder\" role=\"img\" aria-label=\"{}\" data-ref=\"{}\">{}</div>\n",
                                escape(&alt),
                                escape(reference),
                                escape(&alt)
                            ));
                        }
                    }
                    if let Some(caption) = caption.as_deref().filter(|c| !c.trim().is_empty()) {
                        body.push_str(&format!("<figcaption>{}</figcaption>\n", escape(caption)));
                    }
                    body.push_str("</figure>\n");
                }
                ContentBlock::Callout { text } => {
                    body.push_str(&format!(
                        "<aside class=\"block block-callout\"{}>{}</aside>\n",
                        col,
                        escape(text)
                    ));
                }
            }
        }

        body.push_str("</div>\n");
        body
    }
}

/// Caption if present, otherwise the file name of the reference.
pub fn image_alt_text(reference: &str, caption: Option<&str>) -> String {
    match caption.map(str::trim).filter(|c| !c.is_empty()) {
        Some(caption) => caption.to_string(),
        None => reference
            .rsplit(['/', '\\'])
            .next()
            .filter(|name| !name.is_empty() && !reference.starts_with("data:"))
            .unwrap_or("image")
            .to_string(),
    }
}

fn stylesheet(canvas: &Canvas, theme: &Theme) -> String {
    format!(
        r#"* {{ box-sizing: border-box; margin: 0; padding: 0; }}
body {{ background: #d1d5db; font-family: '{font}', sans-serif; color: #{text}; }}
.slide {{ position: relative; width: {width}px; height: {height}px; margin: 24px auto; overflow: hidden; background: #{background}; }}
.slide-corner {{ position: absolute; top: 0; right: 0; width: 160px; height: 160px; background: linear-gradient(225deg, #{accent} 0 22%, transparent 22%); }}
.slide-header {{ padding: 36px 64px 0 64px; }}
.slide-title {{ font-family: '{heading_font}', sans-serif; font-size: 40px; line-height: 1.2; color: #{primary}; }}
.slide-subtitle {{ font-size: 24px; line-height: 1.3; color: #{muted}; margin-top: 6px; }}
.slide-body {{ position: absolute; left: 64px; right: 64px; top: 132px; bottom: 36px; display: flex; flex-direction: column; gap: 16px; overflow: hidden; }}
.slide-body--paired {{ display: grid; grid-template-columns: 1fr 1fr; column-gap: 32px; row-gap: 16px; align-content: start; grid-auto-flow: row dense; }}
.slide-body--paired [data-col="0"] {{ grid-column: 1; }}
.slide-body--paired [data-col="1"] {{ grid-column: 2; }}
.block-heading {{ font-size: 30px; line-height: 44px; margin-top: 12px; color: #{primary}; }}
.bullets-heading {{ font-size: 24px; line-height: 36px; color: #{primary}; }}
.block-bullets ul {{ list-style: none; }}
.bullet {{ position: relative; font-size: 22px; line-height: 34px; padding-left: 36px; }}
.bullet.level-1::before {{ content: '\2022'; position: absolute; left: 12px; color: #{accent}; }}
.bullet.level-2 {{ font-size: 19px; line-height: 30px; padding-left: 68px; }}
.bullet.level-2::before {{ content: '\2013'; position: absolute; left: 44px; color: #{muted}; }}
.block-image {{ display: flex; flex-direction: column; align-items: center; }}
.block-image img {{ max-height: 300px; max-width: 100%; object-fit: contain; }}
.image-placeholder {{ display: flex; align-items: center; justify-content: center; width: 400px; height: 300px; max-width: 100%; border: 2px dashed #{muted}; color: #{muted}; background: #f3f4f6; font-size: 18px; text-align: center; padding: 16px; }}
figcaption {{ font-size: 16px; line-height: 30px; color: #{muted}; }}
.block-callout {{ font-size: 20px; line-height: 28px; padding: 18px 24px; border-left: 6px solid #{accent}; background: #fef3c7; }}
.slide--title {{ background: #{primary}; color: #{background}; }}
.slide--title .title-bleed {{ position: absolute; inset: 0; display: flex; flex-direction: column; justify-content: center; padding: 0 96px; }}
.slide--title .slide-title {{ color: #{background}; font-size: 56px; }}
.slide--title .slide-subtitle {{ color: #{background}; opacity: 0.85; font-size: 28px; }}
.slide--module-title .slide-title {{ font-size: 50px; }}
.slide--lesson-title .slide-title {{ font-size: 44px; }}
.slide--title .slide-body {{ position: static; margin-top: 32px; }}
.slide[data-measured-overflow="true"] {{ outline: 4px solid #dc2626; }}
@media print {{ body {{ background: none; }} .slide {{ margin: 0; page-break-after: always; }} }}
"#,
        width = canvas.width,
        height = canvas.height,
        font = theme.font_family,
        heading_font = theme.heading_font_family,
        primary = theme.primary_color,
        accent = theme.accent_color,
        background = theme.background_color,
        text = theme.text_color,
        muted = theme.muted_color,
    )
}

/// Measures real rendered heights and reports drift from the estimator. Never moves anything.
const SELF_CHECK_SCRIPT: &str = r#"window.addEventListener('load', function () {
  var report = [];
  document.querySelectorAll('section.slide').forEach(function (slide) {
    var body = slide.querySelector('.slide-body');
    var header = slide.querySelector('.slide-header');
    var estimated = parseFloat(slide.dataset.estimate || '0');
    var budget = parseFloat(slide.dataset.budget || '0');
    var measured = (header ? header.offsetHeight : 0) + (body ? body.scrollHeight : 0);
    var overflow = body ? body.scrollHeight > body.clientHeight + 1 : false;
    var entry = {
      slide: parseInt(slide.dataset.slide, 10),
      estimated: estimated,
      measured: measured,
      budget: budget,
      overflow: overflow
    };
    if (overflow) {
      slide.setAttribute('data-measured-overflow', 'true');
      console.warn('Slide ' + entry.slide + ' overflows: measured ' + measured + 'px, estimated ' + estimated + 'px');
    } else if (estimated > 0 && Math.abs(measured - estimated) > estimated * 0.25) {
      console.warn('Slide ' + entry.slide + ' estimate drift: measured ' + measured + 'px, estimated ' + estimated + 'px');
    }
    report.push(entry);
  });
  window.__slideLayoutReport = report;
});
"#;

/// Utility function to write HTML content to a file
pub fn write_html_to_file(html_content: &str, output_path: &Path) -> Result<()> {
    info!("Writing HTML to file: {:?}", output_path);

    ensure_parent_directory_exists(output_path)?;
    fs::write(output_path, html_content).map_err(DeckError::FileReadError)?;

    Ok(())
}
