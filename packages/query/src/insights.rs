//! Derived summaries for comparison and regional impact results.

use std::collections::BTreeMap;

use efficiency_index_appliance_models::Category;
use efficiency_index_catalog::stats::ranking_order;
use efficiency_index_catalog_models::CatalogEntry;
use efficiency_index_regional_models::RegionalImpact;
use serde::Serialize;

/// One model referenced by a comparison insight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparedModel {
    /// Manufacturer name.
    pub manufacturer: String,
    /// Model number.
    pub model_number: String,
    /// Category the match came from.
    pub category: Category,
    /// Efficiency score.
    pub open_efficiency_score: f64,
}

impl From<&CatalogEntry> for ComparedModel {
    fn from(entry: &CatalogEntry) -> Self {
        Self {
            manufacturer: entry.manufacturer().to_string(),
            model_number: entry.model_number().to_string(),
            category: entry.category(),
            open_efficiency_score: entry.score(),
        }
    }
}

/// Summary of a comparison with two or more matches from one category.
///
/// Scores are only comparable within a category, so a comparison that
/// spans categories carries no insights.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonInsights {
    /// Category shared by every match.
    pub category: Category,
    /// Lowest score among the matches.
    pub score_min: f64,
    /// Highest score among the matches.
    pub score_max: f64,
    /// Highest-ranked match.
    pub best_performer: ComparedModel,
    /// Lowest-ranked match.
    pub worst_performer: ComparedModel,
    /// US-average annual cost of the worst match minus that of the best,
    /// when both carry a US-average impact.
    pub potential_annual_savings: Option<f64>,
}

/// Summary of a model's regional impacts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionalInsights {
    /// Region id with the highest annual cost.
    pub highest_cost_region: String,
    /// Region id with the lowest annual cost.
    pub lowest_cost_region: String,
    /// Lowest annual cost across the regions.
    pub min_annual_cost: f64,
    /// Highest annual cost across the regions.
    pub max_annual_cost: f64,
}

pub(crate) fn compare(entries: &[CatalogEntry]) -> Option<ComparisonInsights> {
    let (first, rest) = entries.split_first()?;
    if rest.is_empty() || rest.iter().any(|e| e.category() != first.category()) {
        return None;
    }
    let best = entries.iter().min_by(|a, b| ranking_order(a, b))?;
    let worst = entries.iter().max_by(|a, b| ranking_order(a, b))?;

    let score_min = entries.iter().map(CatalogEntry::score).fold(f64::INFINITY, f64::min);
    let score_max = entries
        .iter()
        .map(CatalogEntry::score)
        .fold(f64::NEG_INFINITY, f64::max);

    let potential_annual_savings = match (worst.us_average(), best.us_average()) {
        (Some(w), Some(b)) => Some(((w.annual_cost - b.annual_cost) * 100.0).round() / 100.0),
        _ => None,
    };

    Some(ComparisonInsights {
        category: first.category(),
        score_min,
        score_max,
        best_performer: best.into(),
        worst_performer: worst.into(),
        potential_annual_savings,
    })
}

pub(crate) fn regional(impacts: &BTreeMap<String, RegionalImpact>) -> Option<RegionalInsights> {
    let by_cost = |a: &&RegionalImpact, b: &&RegionalImpact| a.annual_cost.total_cmp(&b.annual_cost);
    let highest = impacts.values().max_by(by_cost)?;
    let lowest = impacts.values().min_by(by_cost)?;

    Some(RegionalInsights {
        highest_cost_region: highest.region.clone(),
        lowest_cost_region: lowest.region.clone(),
        min_annual_cost: lowest.annual_cost,
        max_annual_cost: highest.annual_cost,
    })
}
