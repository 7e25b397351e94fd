use std::collections::HashMap;
use std::fmt::Write;

use advisor_core::models::{AnalysisSummary, NewRecommendation, ReportTemplate, ReportType};

use super::{format_amount, RenderContext, RenderError, Section};

const DETAILED_TEMPLATE: &str = include_str!("templates/detailed.html");
const EXECUTIVE_TEMPLATE: &str = include_str!("templates/executive.html");
const REPORT_CSS: &str = include_str!("templates/report.css");

/// Fills `{{placeholder}}` templates. Placeholders it does not know are
/// copied through unchanged.
#[derive(Debug, Clone, Default)]
pub struct HtmlRenderer;

impl HtmlRenderer {
    pub fn new() -> Self {
        Self
    }

    #[tracing::instrument(skip_all, fields(report_type = %ctx.report_type, custom_template = template.is_some()))]
    pub fn render(
        &self,
        ctx: &RenderContext,
        template: Option<&ReportTemplate>,
    ) -> Result<String, RenderError> {
        let (html, css) = match template {
            Some(t) => {
                if t.html_template.trim().is_empty() {
                    return Err(RenderError::Template(format!(
                        "Template '{}' has no HTML",
                        t.name
                    )));
                }
                (
                    t.html_template.as_str(),
                    t.css_styles.as_deref().unwrap_or(REPORT_CSS),
                )
            }
            None => (builtin_template(ctx.report_type), REPORT_CSS),
        };

        let values = placeholder_values(ctx, css);
        Ok(substitute(html, &values))
    }
}

fn builtin_template(report_type: ReportType) -> &'static str {
    match report_type {
        ReportType::Executive => EXECUTIVE_TEMPLATE,
        _ => DETAILED_TEMPLATE,
    }
}

fn placeholder_values(ctx: &RenderContext, css: &str) -> HashMap<&'static str, String> {
    let sections = ctx.sections();
    let listed: usize = sections.iter().map(|s| s.items.len()).sum();

    let mut values = HashMap::new();
    values.insert("title", escape(&ctx.title));
    values.insert("client_name", escape(&ctx.client_name));
    values.insert("report_type", escape(ctx.report_type.label()));
    values.insert(
        "generated_at",
        escape(&ctx.generated_at.format("%B %-d, %Y %H:%M UTC").to_string()),
    );
    // a stylesheet must not be able to close its own <style> element
    values.insert("css", css.replace("</", "<\\/"));
    values.insert("summary_cards", summary_cards(&ctx.summary));
    values.insert("category_table", category_table(&ctx.summary));
    values.insert("impact_table", impact_table(&ctx.summary));
    values.insert(
        "recommendations",
        recommendations_html(&sections, &ctx.summary.currency),
    );
    values.insert(
        "total_savings",
        format_amount(ctx.summary.total_potential_savings),
    );
    values.insert("currency", escape(&ctx.summary.currency));
    values.insert("recommendation_count", listed.to_string());
    values
}

fn substitute(template: &str, values: &HashMap<&'static str, String>) -> String {
    let mut out = String::with_capacity(template.len() * 2);
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = after[..end].trim();
                match values.get(key) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

pub(crate) fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

fn summary_cards(summary: &AnalysisSummary) -> String {
    let high = summary
        .by_impact
        .iter()
        .filter(|i| i.business_impact == advisor_core::models::BusinessImpact::High)
        .map(|i| i.count)
        .sum::<i64>();
    let cards = [
        (
            "Recommendations",
            summary.total_recommendations.to_string(),
        ),
        ("High impact", high.to_string()),
        (
            "Annual savings",
            format!(
                "{} {}",
                escape(&summary.currency),
                format_amount(summary.total_potential_savings)
            ),
        ),
        ("Subscriptions", summary.subscription_count.to_string()),
        ("Resources", summary.resource_count.to_string()),
    ];

    let mut html = String::from("<div class=\"cards\">");
    for (label, value) in cards {
        let _ = write!(
            html,
            "<div class=\"card\"><span class=\"value\">{}</span><span class=\"label\">{}</span></div>",
            value, label
        );
    }
    html.push_str("</div>");
    html
}

fn category_table(summary: &AnalysisSummary) -> String {
    if summary.by_category.is_empty() {
        return "<p class=\"empty\">No recommendations.</p>".to_string();
    }
    let mut html = String::from(
        "<table class=\"category-table\"><thead><tr><th>Category</th><th class=\"num\">Count</th><th class=\"num\">High impact</th><th class=\"num\">Savings</th></tr></thead><tbody>",
    );
    for row in &summary.by_category {
        let _ = write!(
            html,
            "<tr><td>{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td></tr>",
            row.category.label(),
            row.count,
            row.high_impact,
            format_amount(row.potential_savings)
        );
    }
    html.push_str("</tbody></table>");
    html
}

fn impact_table(summary: &AnalysisSummary) -> String {
    let mut html = String::from(
        "<table class=\"impact-table\"><thead><tr><th>Impact</th><th class=\"num\">Count</th></tr></thead><tbody>",
    );
    for row in &summary.by_impact {
        let _ = write!(
            html,
            "<tr><td><span class=\"impact impact-{}\">{}</span></td><td class=\"num\">{}</td></tr>",
            row.business_impact.as_str(),
            row.business_impact.label(),
            row.count
        );
    }
    html.push_str("</tbody></table>");
    html
}

fn recommendations_html(sections: &[Section<'_>], currency: &str) -> String {
    if sections.is_empty() {
        return "<p class=\"empty\">No recommendations for this report type.</p>".to_string();
    }
    let mut html = String::new();
    for section in sections {
        let _ = write!(
            html,
            "<h3>{}</h3><table class=\"recommendation-table\"><thead><tr><th>Impact</th><th>Recommendation</th><th>Resource</th><th class=\"num\">Savings ({})</th></tr></thead><tbody>",
            escape(&section.heading),
            escape(currency)
        );
        for rec in &section.items {
            html.push_str(&recommendation_row(rec));
        }
        html.push_str("</tbody></table>");
    }
    html
}

fn recommendation_row(rec: &NewRecommendation) -> String {
    let resource = match (&rec.resource_name, &rec.resource_group) {
        (Some(name), Some(group)) => format!("{}<br><small>{}</small>", escape(name), escape(group)),
        (Some(name), None) => escape(name),
        (None, Some(group)) => escape(group),
        (None, None) => String::new(),
    };
    let savings = if rec.potential_savings.is_zero() {
        "-".to_string()
    } else {
        format_amount(rec.potential_savings)
    };
    format!(
        "<tr><td><span class=\"impact impact-{}\">{}</span></td><td>{}</td><td>{}</td><td class=\"num\">{}</td></tr>",
        rec.business_impact.as_str(),
        rec.business_impact.label(),
        escape(&rec.recommendation),
        resource,
        savings
    )
}

#[cfg(test)]
mod tests {
    use super::super::test_support::context;
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn custom(html: &str, css: Option<&str>) -> ReportTemplate {
        ReportTemplate {
            id: Uuid::new_v4(),
            name: "Branded".to_string(),
            description: None,
            report_type: ReportType::Detailed,
            html_template: html.to_string(),
            css_styles: css.map(String::from),
            is_default: true,
            is_active: true,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn builtin_template_is_fully_substituted() {
        let html = HtmlRenderer::new()
            .render(&context(ReportType::Detailed), None)
            .unwrap();
        assert!(!html.contains("{{"), "leftover placeholder in output");
        assert!(html.contains("Contoso &amp; Partners"));
        assert!(html.contains("Restrict &lt;public&gt; access"));
        assert!(!html.contains("<public>"));
        assert!(html.contains("1,450.00"));
        assert!(html.contains("Recommendations (6)"));
    }

    #[test]
    fn executive_layout_is_used_for_executive_reports() {
        let html = HtmlRenderer::new()
            .render(&context(ReportType::Executive), None)
            .unwrap();
        assert!(html.contains("class=\"executive\""));
        assert!(html.contains("Top Recommendations"));
    }

    #[test]
    fn custom_template_overrides_html_and_css() {
        let template = custom(
            "<style>{{css}}</style><h1>{{ title }}</h1>{{recommendations}}<p>{{unknown_value}}</p>",
            Some("h1 { color: red; }"),
        );
        let html = HtmlRenderer::new()
            .render(&context(ReportType::Security), Some(&template))
            .unwrap();
        assert!(html.starts_with("<style>h1 { color: red; }</style><h1>Q3 Review</h1>"));
        assert!(html.contains("{{unknown_value}}"));
        assert!(html.contains("Security Recommendations"));
        assert!(!html.contains("Right-size VMs"));
    }

    #[test]
    fn empty_custom_template_is_rejected() {
        let template = custom("   ", None);
        assert!(matches!(
            HtmlRenderer::new().render(&context(ReportType::Detailed), Some(&template)),
            Err(RenderError::Template(_))
        ));
    }

    #[test]
    fn substitution_keeps_unterminated_braces() {
        let mut values = HashMap::new();
        values.insert("a", "1".to_string());
        assert_eq!(substitute("{{a}} {{b}} {{a", &values), "1 {{b}} {{a");
    }
}
