//! Static description of how scores and impacts are produced.

use efficiency_index_appliance_models::{Category, EfficiencyRating};
use efficiency_index_catalog_models::Catalog;
use efficiency_index_regional_models::APPLIANCE_LIFETIME_YEARS;
use serde::Serialize;

/// How a category is scored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryMethod {
    /// Category.
    pub category: Category,
    /// Display name.
    pub name: &'static str,
    /// Unit of the raw efficiency ratio.
    pub ratio_unit: &'static str,
}

/// Minimum score for a rating.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatingCutoff {
    /// Letter rating.
    pub rating: EfficiencyRating,
    /// Minimum score.
    pub min_score: f64,
}

/// Methodology block returned alongside database statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Methodology {
    /// Scoring approach.
    pub scoring: &'static str,
    /// Regional pricing approach.
    pub regional_factors: &'static str,
    /// Upstream data sources.
    pub data_sources: Vec<&'static str>,
    /// Per-category ratio definitions.
    pub categories: Vec<CategoryMethod>,
    /// Letter rating cutoffs, best first.
    pub rating_cutoffs: Vec<RatingCutoff>,
    /// Years used for lifetime projections.
    pub lifetime_years: f64,
    /// Threshold table version of the snapshot.
    pub thresholds_version: String,
    /// Region table version of the snapshot.
    pub regions_version: String,
    /// Precomputed region ids.
    pub regions: Vec<String>,
}

impl Methodology {
    /// Describes the methodology behind `catalog`.
    #[must_use]
    pub fn for_catalog(catalog: &Catalog) -> Self {
        Self {
            scoring: "Category-relative: each category's raw efficiency ratio is mapped onto \
                      0-100 by a versioned calibration curve; scores are not comparable \
                      across categories",
            regional_factors: "Electric appliances use regional electricity prices and grid \
                               emissions per kWh; gas appliances use regional gas prices and \
                               combustion emissions per therm",
            data_sources: vec!["ENERGY STAR certified product datasets", "EIA energy prices"],
            categories: Category::all()
                .iter()
                .map(|category| CategoryMethod {
                    category: *category,
                    name: category.display_name(),
                    ratio_unit: category.ratio_unit(),
                })
                .collect(),
            rating_cutoffs: EfficiencyRating::CUTOFFS
                .iter()
                .map(|(min_score, rating)| RatingCutoff {
                    rating: *rating,
                    min_score: *min_score,
                })
                .collect(),
            lifetime_years: APPLIANCE_LIFETIME_YEARS,
            thresholds_version: catalog.thresholds_version.clone(),
            regions_version: catalog.regions_version.clone(),
            regions: catalog.regions.clone(),
        }
    }
}
