use std::collections::{HashMap, HashSet};

use advisor_core::constants::DEFAULT_CURRENCY;
use advisor_core::models::{
    AnalysisSummary, BusinessImpact, Category, CategorySummary, ImpactSummary, NewRecommendation,
    TopRecommendation,
};
use chrono::Utc;
use rust_decimal::Decimal;

pub const TOP_RECOMMENDATIONS: usize = 10;

/// Aggregates a parsed report. Categories with no rows are left out of
/// `by_category`; every impact level is always present in `by_impact`.
pub fn summarize(rows: &[NewRecommendation]) -> AnalysisSummary {
    let by_category = Category::ALL
        .iter()
        .filter_map(|category| {
            let matching: Vec<&NewRecommendation> =
                rows.iter().filter(|r| r.category == *category).collect();
            if matching.is_empty() {
                return None;
            }
            Some(CategorySummary {
                category: *category,
                count: matching.len() as i64,
                potential_savings: matching.iter().map(|r| r.potential_savings).sum(),
                high_impact: matching
                    .iter()
                    .filter(|r| r.business_impact == BusinessImpact::High)
                    .count() as i64,
            })
        })
        .collect();

    let by_impact = BusinessImpact::ALL
        .iter()
        .map(|impact| ImpactSummary {
            business_impact: *impact,
            count: rows.iter().filter(|r| r.business_impact == *impact).count() as i64,
        })
        .collect();

    let distinct = |f: fn(&NewRecommendation) -> Option<&str>| -> i64 {
        rows.iter().filter_map(f).collect::<HashSet<_>>().len() as i64
    };

    let mut ranked: Vec<&NewRecommendation> = rows.iter().collect();
    ranked.sort_by(|a, b| {
        b.potential_savings
            .cmp(&a.potential_savings)
            .then(b.business_impact.cmp(&a.business_impact))
    });
    let top_recommendations = ranked
        .into_iter()
        .take(TOP_RECOMMENDATIONS)
        .map(|r| TopRecommendation {
            category: r.category,
            business_impact: r.business_impact,
            recommendation: r.recommendation.clone(),
            resource_name: r.resource_name.clone(),
            potential_savings: r.potential_savings,
        })
        .collect();

    AnalysisSummary {
        total_recommendations: rows.len() as i64,
        total_potential_savings: rows.iter().map(|r| r.potential_savings).sum::<Decimal>(),
        currency: dominant_currency(rows),
        by_category,
        by_impact,
        subscription_count: distinct(|r| r.subscription_id.as_deref()),
        resource_group_count: distinct(|r| r.resource_group.as_deref()),
        resource_count: distinct(|r| r.resource_name.as_deref()),
        top_recommendations,
        generated_at: Utc::now(),
    }
}

fn dominant_currency(rows: &[NewRecommendation]) -> String {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for row in rows {
        *counts.entry(row.currency.as_str()).or_default() += 1;
    }
    counts
        .into_iter()
        // ties resolve alphabetically so the result is stable
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(a.0)))
        .map(|(currency, _)| currency.to_string())
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(category: Category, impact: BusinessImpact, savings: i64, resource: &str) -> NewRecommendation {
        NewRecommendation {
            category,
            business_impact: impact,
            recommendation: format!("Fix {}", resource),
            subscription_id: Some("sub-a".to_string()),
            subscription_name: None,
            resource_group: Some(format!("rg-{}", category.as_str())),
            resource_name: Some(resource.to_string()),
            resource_type: None,
            potential_benefits: None,
            potential_savings: Decimal::new(savings, 0),
            currency: "USD".to_string(),
            retirement_date: None,
            retiring_feature: None,
            advisor_updated_at: None,
        }
    }

    #[test]
    fn summarizes_by_category_and_impact() {
        let rows = vec![
            row(Category::Cost, BusinessImpact::High, 500, "vm-1"),
            row(Category::Cost, BusinessImpact::Low, 100, "vm-2"),
            row(Category::Security, BusinessImpact::High, 0, "kv-1"),
            row(Category::Performance, BusinessImpact::Medium, 0, "vm-1"),
        ];
        let summary = summarize(&rows);

        assert_eq!(summary.total_recommendations, 4);
        assert_eq!(summary.total_potential_savings, Decimal::new(600, 0));
        assert_eq!(summary.currency, "USD");
        assert_eq!(summary.subscription_count, 1);
        assert_eq!(summary.resource_group_count, 3);
        assert_eq!(summary.resource_count, 3);

        let categories: Vec<Category> = summary.by_category.iter().map(|c| c.category).collect();
        assert_eq!(
            categories,
            vec![Category::Cost, Category::Security, Category::Performance]
        );
        assert_eq!(summary.by_category[0].count, 2);
        assert_eq!(summary.by_category[0].high_impact, 1);
        assert_eq!(summary.by_category[0].potential_savings, Decimal::new(600, 0));

        assert_eq!(summary.by_impact.len(), 3);
        assert_eq!(summary.by_impact[0].business_impact, BusinessImpact::High);
        assert_eq!(summary.by_impact[0].count, 2);
    }

    #[test]
    fn top_recommendations_rank_savings_then_impact() {
        let mut rows: Vec<NewRecommendation> = (0..12)
            .map(|i| row(Category::Cost, BusinessImpact::Low, i, &format!("vm-{}", i)))
            .collect();
        rows.push(row(Category::Security, BusinessImpact::High, 11, "kv-1"));

        let top = summarize(&rows).top_recommendations;
        assert_eq!(top.len(), TOP_RECOMMENDATIONS);
        assert_eq!(top[0].resource_name.as_deref(), Some("kv-1"));
        assert_eq!(top[1].resource_name.as_deref(), Some("vm-11"));
        assert_eq!(top[9].potential_savings, Decimal::new(3, 0));
    }

    #[test]
    fn empty_input_defaults_currency() {
        let summary = summarize(&[]);
        assert_eq!(summary.currency, DEFAULT_CURRENCY);
        assert!(summary.by_category.is_empty());
        assert!(summary.by_impact.iter().all(|i| i.count == 0));
    }
}
