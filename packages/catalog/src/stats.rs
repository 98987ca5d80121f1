//! Aggregate statistics over a finished catalog.
//!
//! Computed once per pipeline run, after every category has completed, and
//! stored alongside the snapshot. Queries never recompute them.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use efficiency_index_appliance_models::{Category, EfficiencyRating};
use efficiency_index_catalog_models::{CatalogEntry, CategoryStats, DatabaseStats, TopPerformer};

/// Canonical result ordering: score descending, then manufacturer, then
/// model number.
#[must_use]
pub fn ranking_order(a: &CatalogEntry, b: &CatalogEntry) -> Ordering {
    b.score()
        .total_cmp(&a.score())
        .then_with(|| a.manufacturer().cmp(b.manufacturer()))
        .then_with(|| a.model_number().cmp(b.model_number()))
}

/// Computes statistics for one category's entries.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn category_stats(category: Category, entries: &[CatalogEntry]) -> CategoryStats {
    let total_count = entries.len() as u64;
    let energy_star_count = entries
        .iter()
        .filter(|e| e.scored.record.energy_star_certified)
        .count() as u64;

    let (average_score, energy_star_percentage) = if entries.is_empty() {
        (0.0, 0.0)
    } else {
        let sum: f64 = entries.iter().map(CatalogEntry::score).sum();
        (
            round1(sum / total_count as f64),
            round1(energy_star_count as f64 / total_count as f64 * 100.0),
        )
    };

    let mut rating_distribution = BTreeMap::new();
    for entry in entries {
        *rating_distribution
            .entry(entry.scored.efficiency_rating)
            .or_insert(0) += 1;
    }

    let top_performer = entries
        .iter()
        .min_by(|a, b| ranking_order(a, b))
        .map(|best| TopPerformer {
            manufacturer: best.manufacturer().to_string(),
            model_number: best.model_number().to_string(),
            open_efficiency_score: best.score(),
            efficiency_rating: best.scored.efficiency_rating,
        });

    CategoryStats {
        category,
        total_count,
        energy_star_count,
        energy_star_percentage,
        average_score,
        rating_distribution,
        top_performer,
    }
}

/// Computes statistics across every published category.
#[must_use]
pub fn database_stats(
    categories: &BTreeMap<Category, Vec<CatalogEntry>>,
    generated_at: DateTime<Utc>,
) -> DatabaseStats {
    let per_category: Vec<CategoryStats> = categories
        .iter()
        .map(|(category, entries)| category_stats(*category, entries))
        .collect();

    let mut rating_distribution: BTreeMap<EfficiencyRating, u64> = BTreeMap::new();
    for stats in &per_category {
        for (rating, count) in &stats.rating_distribution {
            *rating_distribution.entry(*rating).or_insert(0) += count;
        }
    }

    DatabaseStats {
        generated_at,
        total_models: per_category.iter().map(|s| s.total_count).sum(),
        total_energy_star: per_category.iter().map(|s| s.energy_star_count).sum(),
        categories: per_category,
        rating_distribution,
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use efficiency_index_appliance_models::FuelType;
    use efficiency_index_catalog_models::ScoredRecord;
    use efficiency_index_source_models::NormalizedRecord;

    use super::*;

    fn entry(manufacturer: &str, model: &str, score: f64, certified: bool) -> CatalogEntry {
        CatalogEntry {
            scored: ScoredRecord {
                record: NormalizedRecord {
                    manufacturer: manufacturer.to_string(),
                    model_number: model.to_string(),
                    category: Category::Dishwashers,
                    fuel: FuelType::Electric,
                    annual_energy_kwh_equivalent: 270.0,
                    annual_therms: None,
                    capacity_or_throughput: 12.0,
                    efficiency_factor: None,
                    energy_star_certified: certified,
                },
                open_efficiency_score: score,
                efficiency_rating: EfficiencyRating::from_score(score),
                raw_efficiency_ratio: 12.0,
                efficiency_percentile: 0.0,
            },
            regional_impact: BTreeMap::new(),
        }
    }

    #[test]
    fn aggregates_category() {
        let entries = vec![
            entry("Bosch", "B1", 92.0, true),
            entry("Asko", "A1", 92.0, true),
            entry("Maytag", "M1", 40.0, false),
        ];
        let stats = category_stats(Category::Dishwashers, &entries);
        assert_eq!(stats.total_count, 3);
        assert_eq!(stats.energy_star_count, 2);
        assert!((stats.average_score - 74.7).abs() < f64::EPSILON);
        assert!((stats.energy_star_percentage - 66.7).abs() < f64::EPSILON);
        assert_eq!(stats.rating_distribution[&EfficiencyRating::APlus], 2);
        assert_eq!(stats.rating_distribution[&EfficiencyRating::C], 1);

        // Tie on score resolves by manufacturer
        let top = stats.top_performer.unwrap();
        assert_eq!(top.manufacturer, "Asko");
    }

    #[test]
    fn empty_category_has_no_top_performer() {
        let stats = category_stats(Category::Dishwashers, &[]);
        assert_eq!(stats.total_count, 0);
        assert!(stats.top_performer.is_none());
        assert!(stats.average_score.abs() < f64::EPSILON);
    }

    #[test]
    fn database_totals_sum_categories() {
        let mut categories = BTreeMap::new();
        categories.insert(
            Category::Dishwashers,
            vec![entry("Bosch", "B1", 92.0, true), entry("GE", "G1", 10.0, false)],
        );
        categories.insert(Category::Refrigerators, vec![entry("LG", "L1", 80.0, true)]);
        let stats = database_stats(&categories, Utc::now());
        assert_eq!(stats.total_models, 3);
        assert_eq!(stats.total_energy_star, 2);
        assert_eq!(stats.categories.len(), 2);
        assert_eq!(stats.categories[0].category, Category::Refrigerators);
        assert_eq!(stats.rating_distribution[&EfficiencyRating::F], 1);
    }
}
