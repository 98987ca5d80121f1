#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Catalog snapshot types.
//!
//! A [`Catalog`] is the immutable output of one pipeline run: every scored
//! appliance grouped by category, each with its precomputed regional
//! impacts, plus aggregate [`DatabaseStats`]. It is rebuilt wholesale on
//! every run and never mutated in place.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use efficiency_index_appliance_models::{Category, EfficiencyRating};
use efficiency_index_regional_models::{RegionalImpact, US_AVERAGE};
use efficiency_index_source_models::NormalizedRecord;
use serde::{Deserialize, Serialize};

/// A normalized record with its category-relative score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    /// The normalized appliance record.
    #[serde(flatten)]
    pub record: NormalizedRecord,
    /// Category-normalized score, 0-100 with one decimal.
    pub open_efficiency_score: f64,
    /// Letter rating derived from the score.
    pub efficiency_rating: EfficiencyRating,
    /// The category's raw efficiency ratio before calibration.
    pub raw_efficiency_ratio: f64,
    /// Percentile rank of the raw ratio within the category (0-100).
    /// Informational only; never used for the rating.
    pub efficiency_percentile: f64,
}

/// One appliance as stored in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// The scored record.
    #[serde(flatten)]
    pub scored: ScoredRecord,
    /// Precomputed impacts keyed by region id.
    pub regional_impact: BTreeMap<String, RegionalImpact>,
}

impl CatalogEntry {
    /// Manufacturer name.
    #[must_use]
    pub fn manufacturer(&self) -> &str {
        &self.scored.record.manufacturer
    }

    /// Model number.
    #[must_use]
    pub fn model_number(&self) -> &str {
        &self.scored.record.model_number
    }

    /// Appliance category.
    #[must_use]
    pub const fn category(&self) -> Category {
        self.scored.record.category
    }

    /// Efficiency score.
    #[must_use]
    pub const fn score(&self) -> f64 {
        self.scored.open_efficiency_score
    }

    /// Impact for the national average region, which every entry carries.
    #[must_use]
    pub fn us_average(&self) -> Option<&RegionalImpact> {
        self.regional_impact.get(US_AVERAGE)
    }
}

/// Best-scoring appliance in a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopPerformer {
    /// Manufacturer name.
    pub manufacturer: String,
    /// Model number.
    pub model_number: String,
    /// Efficiency score.
    pub open_efficiency_score: f64,
    /// Letter rating.
    pub efficiency_rating: EfficiencyRating,
}

/// Aggregate statistics for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryStats {
    /// Category.
    pub category: Category,
    /// Number of scored models.
    pub total_count: u64,
    /// Number of ENERGY STAR certified models.
    pub energy_star_count: u64,
    /// Certified share as a percentage, one decimal.
    pub energy_star_percentage: f64,
    /// Mean efficiency score, one decimal.
    pub average_score: f64,
    /// Model count per rating.
    pub rating_distribution: BTreeMap<EfficiencyRating, u64>,
    /// Highest-scoring model, if the category is non-empty.
    pub top_performer: Option<TopPerformer>,
}

/// Aggregate statistics across the whole catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseStats {
    /// When the snapshot was generated.
    pub generated_at: DateTime<Utc>,
    /// Total scored models across all categories.
    pub total_models: u64,
    /// Total certified models across all categories.
    pub total_energy_star: u64,
    /// Per-category statistics, in category order.
    pub categories: Vec<CategoryStats>,
    /// Model count per rating across all categories.
    pub rating_distribution: BTreeMap<EfficiencyRating, u64>,
}

/// An immutable catalog snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    /// Directory name of the published snapshot.
    pub snapshot_id: String,
    /// When the pipeline produced this snapshot.
    pub generated_at: DateTime<Utc>,
    /// Version of the score threshold table used.
    pub thresholds_version: String,
    /// Version of the region constants table used.
    pub regions_version: String,
    /// Region ids with precomputed impacts. Always includes `us_average`.
    pub regions: Vec<String>,
    /// Scored entries per category.
    pub categories: BTreeMap<Category, Vec<CatalogEntry>>,
    /// Aggregate statistics.
    pub stats: DatabaseStats,
}

impl Catalog {
    /// A catalog with no categories, served before the first publish.
    #[must_use]
    pub fn empty() -> Self {
        let generated_at = DateTime::<Utc>::default();
        Self {
            snapshot_id: String::new(),
            generated_at,
            thresholds_version: String::new(),
            regions_version: String::new(),
            regions: vec![US_AVERAGE.to_string()],
            categories: BTreeMap::new(),
            stats: DatabaseStats {
                generated_at,
                total_models: 0,
                total_energy_star: 0,
                categories: Vec::new(),
                rating_distribution: BTreeMap::new(),
            },
        }
    }

    /// Entries for `category`, empty if the category was not published.
    #[must_use]
    pub fn entries(&self, category: Category) -> &[CatalogEntry] {
        self.categories.get(&category).map_or(&[], Vec::as_slice)
    }

    /// Every entry whose model number equals `model_number`, in category
    /// order.
    pub fn find_all<'a>(&'a self, model_number: &'a str) -> impl Iterator<Item = &'a CatalogEntry> {
        self.categories
            .values()
            .flatten()
            .filter(move |entry| entry.model_number() == model_number)
    }

    /// First entry whose model number equals `model_number`, in category
    /// order.
    #[must_use]
    pub fn find_model(&self, model_number: &str) -> Option<&CatalogEntry> {
        self.categories
            .values()
            .flatten()
            .find(|entry| entry.model_number() == model_number)
    }
}
