//! Report rendering.
//!
//! [`RenderContext`] carries everything a document needs; the report type
//! decides which recommendations appear and how they are grouped.

mod html;
#[cfg(feature = "pdf")]
mod pdf;

pub use html::HtmlRenderer;
#[cfg(feature = "pdf")]
pub use pdf::PdfRenderer;

use advisor_core::models::{AnalysisSummary, Category, NewRecommendation, ReportType};
use advisor_core::AppError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::analysis::TOP_RECOMMENDATIONS;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Template error: {0}")]
    Template(String),

    #[error("PDF generation failed: {0}")]
    Pdf(String),
}

impl From<RenderError> for AppError {
    fn from(err: RenderError) -> Self {
        AppError::Rendering(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct RenderContext {
    pub title: String,
    pub client_name: String,
    pub report_type: ReportType,
    pub generated_at: DateTime<Utc>,
    pub summary: AnalysisSummary,
    pub recommendations: Vec<NewRecommendation>,
}

/// A headed group of recommendations in a rendered report.
#[derive(Debug)]
pub struct Section<'a> {
    pub heading: String,
    pub items: Vec<&'a NewRecommendation>,
}

const OPERATIONS_CATEGORIES: [Category; 3] = [
    Category::Reliability,
    Category::OperationalExcellence,
    Category::Performance,
];

impl RenderContext {
    /// Groups and orders recommendations for the report type. Empty groups
    /// are omitted.
    pub fn sections(&self) -> Vec<Section<'_>> {
        match self.report_type {
            ReportType::Detailed => self.by_categories(&Category::ALL),
            ReportType::Operations => self.by_categories(&OPERATIONS_CATEGORIES),
            ReportType::Executive => {
                let mut items: Vec<&NewRecommendation> = self.recommendations.iter().collect();
                items.sort_by(|a, b| by_savings(a, b).then(by_impact(a, b)));
                items.truncate(TOP_RECOMMENDATIONS);
                single("Top Recommendations", items)
            }
            ReportType::Cost => {
                let mut items = self.in_category(Category::Cost);
                items.sort_by(|a, b| by_savings(a, b).then(by_impact(a, b)));
                single("Cost Optimization Opportunities", items)
            }
            ReportType::Security => {
                let mut items = self.in_category(Category::Security);
                items.sort_by(|a, b| by_impact(a, b).then(by_savings(a, b)));
                single("Security Recommendations", items)
            }
        }
    }

    /// Number of recommendations the report lists.
    pub fn listed_count(&self) -> usize {
        self.sections().iter().map(|s| s.items.len()).sum()
    }

    fn in_category(&self, category: Category) -> Vec<&NewRecommendation> {
        self.recommendations
            .iter()
            .filter(|r| r.category == category)
            .collect()
    }

    fn by_categories(&self, categories: &[Category]) -> Vec<Section<'_>> {
        categories
            .iter()
            .filter_map(|category| {
                let mut items = self.in_category(*category);
                if items.is_empty() {
                    return None;
                }
                items.sort_by(|a, b| by_impact(a, b).then(by_savings(a, b)));
                Some(Section {
                    heading: category.label().to_string(),
                    items,
                })
            })
            .collect()
    }
}

fn single<'a>(heading: &str, items: Vec<&'a NewRecommendation>) -> Vec<Section<'a>> {
    if items.is_empty() {
        return Vec::new();
    }
    vec![Section {
        heading: heading.to_string(),
        items,
    }]
}

fn by_savings(a: &NewRecommendation, b: &NewRecommendation) -> std::cmp::Ordering {
    b.potential_savings.cmp(&a.potential_savings)
}

fn by_impact(a: &NewRecommendation, b: &NewRecommendation) -> std::cmp::Ordering {
    b.business_impact.cmp(&a.business_impact)
}

/// `1234.5` -> `1,234.50`
pub(crate) fn format_amount(value: Decimal) -> String {
    let rounded = value.round_dp(2);
    let text = format!("{:.2}", rounded);
    let (sign, digits) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text.as_str()),
    };
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{}{}.{}", sign, grouped, fraction)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use advisor_core::models::BusinessImpact;

    pub fn recommendation(
        category: Category,
        impact: BusinessImpact,
        savings: i64,
        text: &str,
    ) -> NewRecommendation {
        NewRecommendation {
            category,
            business_impact: impact,
            recommendation: text.to_string(),
            subscription_id: Some("3fa85f64-5717-4562-b3fc-2c963f66afa6".to_string()),
            subscription_name: Some("Production".to_string()),
            resource_group: Some("rg-web".to_string()),
            resource_name: Some("vm-web-01".to_string()),
            resource_type: Some("Microsoft.Compute/virtualMachines".to_string()),
            potential_benefits: None,
            potential_savings: Decimal::new(savings, 0),
            currency: "USD".to_string(),
            retirement_date: None,
            retiring_feature: None,
            advisor_updated_at: None,
        }
    }

    pub fn context(report_type: ReportType) -> RenderContext {
        let recommendations = vec![
            recommendation(Category::Cost, BusinessImpact::Low, 250, "Buy reserved instances"),
            recommendation(Category::Cost, BusinessImpact::High, 1200, "Right-size VMs"),
            recommendation(Category::Security, BusinessImpact::Medium, 0, "Enable MFA"),
            recommendation(Category::Security, BusinessImpact::High, 0, "Restrict <public> access"),
            recommendation(Category::Reliability, BusinessImpact::Medium, 0, "Use zones"),
            recommendation(Category::Performance, BusinessImpact::Low, 0, "Enable accelerated networking"),
        ];
        RenderContext {
            title: "Q3 Review".to_string(),
            client_name: "Contoso & Partners".to_string(),
            report_type,
            generated_at: Utc::now(),
            summary: crate::analysis::summarize(&recommendations),
            recommendations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::context;
    use super::*;

    fn headings(ctx: &RenderContext) -> Vec<String> {
        ctx.sections().into_iter().map(|s| s.heading).collect()
    }

    #[test]
    fn detailed_groups_every_category_present() {
        let ctx = context(ReportType::Detailed);
        assert_eq!(
            headings(&ctx),
            vec!["Cost", "Security", "Reliability", "Performance"]
        );
        assert_eq!(ctx.listed_count(), 6);
        let cost = &ctx.sections()[0];
        assert_eq!(cost.items[0].recommendation, "Right-size VMs");
    }

    #[test]
    fn cost_report_lists_cost_by_savings() {
        let ctx = context(ReportType::Cost);
        let sections = ctx.sections();
        assert_eq!(sections.len(), 1);
        let savings: Vec<Decimal> = sections[0].items.iter().map(|r| r.potential_savings).collect();
        assert_eq!(savings, vec![Decimal::new(1200, 0), Decimal::new(250, 0)]);
    }

    #[test]
    fn security_and_operations_filter_categories() {
        let security = context(ReportType::Security);
        assert_eq!(security.listed_count(), 2);
        assert_eq!(
            security.sections()[0].items[0].recommendation,
            "Restrict <public> access"
        );

        let operations = context(ReportType::Operations);
        assert_eq!(headings(&operations), vec!["Reliability", "Performance"]);
    }

    #[test]
    fn executive_lists_top_recommendations() {
        let ctx = context(ReportType::Executive);
        let sections = ctx.sections();
        assert_eq!(sections[0].heading, "Top Recommendations");
        assert_eq!(sections[0].items[0].recommendation, "Right-size VMs");
        assert_eq!(ctx.listed_count(), 6);
    }

    #[test]
    fn amounts_are_grouped() {
        assert_eq!(format_amount(Decimal::new(123450, 2)), "1,234.50");
        assert_eq!(format_amount(Decimal::new(1_000_000, 0)), "1,000,000.00");
        assert_eq!(format_amount(Decimal::new(999, 1)), "99.90");
        assert_eq!(format_amount(Decimal::ZERO), "0.00");
    }
}
