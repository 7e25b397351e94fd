use printpdf::{
    BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference,
};

use super::{format_amount, RenderContext, RenderError};

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 18.0;
const PT_TO_MM: f32 = 0.3528;
/// Average Helvetica glyph width as a fraction of the font size.
const AVG_GLYPH_WIDTH: f32 = 0.5;

const TITLE_SIZE: f32 = 20.0;
const HEADING_SIZE: f32 = 13.0;
const BODY_SIZE: f32 = 9.5;

/// A4 report using the PDF built-in Helvetica faces.
#[derive(Debug, Clone, Default)]
pub struct PdfRenderer;

impl PdfRenderer {
    pub fn new() -> Self {
        Self
    }

    #[tracing::instrument(skip_all, fields(report_type = %ctx.report_type))]
    pub fn render(&self, ctx: &RenderContext) -> Result<Vec<u8>, RenderError> {
        let mut writer = PageWriter::new(&ctx.title)?;
        let currency = sanitize(&ctx.summary.currency);

        writer.line(&ctx.title, TITLE_SIZE, true);
        writer.line(
            &format!("{} | {}", ctx.report_type.label(), ctx.client_name),
            HEADING_SIZE,
            false,
        );
        writer.line(
            &format!("Generated {}", ctx.generated_at.format("%Y-%m-%d %H:%M UTC")),
            BODY_SIZE,
            false,
        );
        writer.gap(6.0);

        writer.line("Summary", HEADING_SIZE, true);
        writer.line(
            &format!("Recommendations: {}", ctx.summary.total_recommendations),
            BODY_SIZE,
            false,
        );
        writer.line(
            &format!(
                "Potential annual savings: {} {}",
                currency,
                format_amount(ctx.summary.total_potential_savings)
            ),
            BODY_SIZE,
            false,
        );
        writer.line(
            &format!(
                "Subscriptions: {}   Resource groups: {}   Resources: {}",
                ctx.summary.subscription_count,
                ctx.summary.resource_group_count,
                ctx.summary.resource_count
            ),
            BODY_SIZE,
            false,
        );
        writer.gap(4.0);

        writer.line("By category", HEADING_SIZE, true);
        for row in &ctx.summary.by_category {
            writer.line(
                &format!(
                    "{}: {} ({} high impact), {} {}",
                    row.category.label(),
                    row.count,
                    row.high_impact,
                    currency,
                    format_amount(row.potential_savings)
                ),
                BODY_SIZE,
                false,
            );
        }
        let impacts: Vec<String> = ctx
            .summary
            .by_impact
            .iter()
            .map(|i| format!("{} {}", i.business_impact.label(), i.count))
            .collect();
        writer.line(&format!("By impact: {}", impacts.join(", ")), BODY_SIZE, false);
        writer.gap(6.0);

        let sections = ctx.sections();
        if sections.is_empty() {
            writer.line("No recommendations for this report type.", BODY_SIZE, false);
        }
        for section in sections {
            writer.ensure_space(HEADING_SIZE * 3.0 * PT_TO_MM);
            writer.line(&section.heading, HEADING_SIZE, true);
            for (idx, rec) in section.items.iter().enumerate() {
                let mut header = format!("{}. [{}] ", idx + 1, rec.business_impact.label());
                if !rec.potential_savings.is_zero() {
                    header.push_str(&format!(
                        "{} {} ",
                        currency,
                        format_amount(rec.potential_savings)
                    ));
                }
                if let Some(name) = &rec.resource_name {
                    header.push_str(name);
                }
                writer.wrapped(&header, BODY_SIZE, true, 0.0);
                writer.wrapped(&rec.recommendation, BODY_SIZE, false, 5.0);
                if let Some(group) = &rec.resource_group {
                    writer.wrapped(&format!("Resource group: {}", group), BODY_SIZE - 1.0, false, 5.0);
                }
                writer.gap(1.5);
            }
            writer.gap(4.0);
        }

        writer.finish()
    }
}

struct PageWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    cursor: f32,
    pages: usize,
}

impl PageWriter {
    fn new(title: &str) -> Result<Self, RenderError> {
        let (doc, page, layer) = PdfDocument::new(
            sanitize(title),
            Mm(PAGE_WIDTH),
            Mm(PAGE_HEIGHT),
            "Page 1",
        );
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| RenderError::Pdf(e.to_string()))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| RenderError::Pdf(e.to_string()))?;
        let layer = doc.get_page(page).get_layer(layer);
        Ok(Self {
            doc,
            layer,
            regular,
            bold,
            cursor: PAGE_HEIGHT - MARGIN,
            pages: 1,
        })
    }

    fn line_height(size: f32) -> f32 {
        size * 1.35 * PT_TO_MM
    }

    fn ensure_space(&mut self, height: f32) {
        if self.cursor - height >= MARGIN {
            return;
        }
        self.pages += 1;
        let (page, layer) = self.doc.add_page(
            Mm(PAGE_WIDTH),
            Mm(PAGE_HEIGHT),
            format!("Page {}", self.pages),
        );
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.cursor = PAGE_HEIGHT - MARGIN;
    }

    fn gap(&mut self, mm: f32) {
        self.cursor -= mm;
    }

    fn line(&mut self, text: &str, size: f32, bold: bool) {
        self.write_at(text, size, bold, 0.0);
    }

    fn write_at(&mut self, text: &str, size: f32, bold: bool, indent: f32) {
        let height = Self::line_height(size);
        self.ensure_space(height);
        self.cursor -= height;
        let font = if bold { &self.bold } else { &self.regular };
        self.layer.use_text(
            sanitize(text),
            size,
            Mm(MARGIN + indent),
            Mm(self.cursor),
            font,
        );
    }

    fn wrapped(&mut self, text: &str, size: f32, bold: bool, indent: f32) {
        let width = PAGE_WIDTH - 2.0 * MARGIN - indent;
        let max_chars = (width / (size * AVG_GLYPH_WIDTH * PT_TO_MM)).floor() as usize;
        for line in wrap(text, max_chars.max(10)) {
            self.write_at(&line, size, bold, indent);
        }
    }

    fn finish(self) -> Result<Vec<u8>, RenderError> {
        tracing::debug!(pages = self.pages, "PDF rendered");
        self.doc
            .save_to_bytes()
            .map_err(|e| RenderError::Pdf(e.to_string()))
    }
}

/// Greedy word wrap. Words longer than a line are split.
fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let rest = word.split_off(max_chars);
            lines.push(word.into_iter().collect());
            word = rest;
        }
        let word: String = word.into_iter().collect();
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// The built-in fonts only cover Latin-1.
fn sanitize(text: &str) -> String {
    text.chars()
        .flat_map(|c| {
            let replacement: Vec<char> = match c {
                '€' => "EUR".chars().collect(),
                '\u{2018}' | '\u{2019}' => vec!['\''],
                '\u{201C}' | '\u{201D}' => vec!['"'],
                '\u{2013}' | '\u{2014}' => vec!['-'],
                c if c.is_control() => vec![' '],
                c if (c as u32) < 0x100 => vec![c],
                _ => vec!['?'],
            };
            replacement
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{context, recommendation};
    use super::*;
    use advisor_core::models::{BusinessImpact, Category, ReportType};

    #[test]
    fn renders_a_pdf_document() {
        let bytes = PdfRenderer::new()
            .render(&context(ReportType::Detailed))
            .unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn long_reports_break_pages() {
        let mut ctx = context(ReportType::Detailed);
        ctx.recommendations = (0..200)
            .map(|i| {
                recommendation(
                    Category::Cost,
                    BusinessImpact::Medium,
                    i,
                    "Consider moving infrequently accessed blobs to the cool access tier to reduce storage costs across the subscription",
                )
            })
            .collect();
        let long = PdfRenderer::new().render(&ctx).unwrap();
        let short = PdfRenderer::new()
            .render(&context(ReportType::Detailed))
            .unwrap();
        assert!(long.starts_with(b"%PDF"));
        assert!(long.len() > short.len());
    }

    #[test]
    fn wrap_respects_width() {
        let lines = wrap("the quick brown fox jumps over the lazy dog", 10);
        assert!(lines.iter().all(|l| l.chars().count() <= 10));
        assert_eq!(lines.join(" "), "the quick brown fox jumps over the lazy dog");

        let lines = wrap("abcdefghijklmnopqrstuvwxyz", 10);
        assert_eq!(lines, vec!["abcdefghij", "klmnopqrst", "uvwxyz"]);
    }

    #[test]
    fn sanitize_replaces_unsupported_glyphs() {
        assert_eq!(sanitize("€ 5 \u{2014} café ✓"), "EUR 5 - café ?");
    }
}
