#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the efficiency index server.
//!
//! These types are serialized to JSON for the REST API. They are separate
//! from the catalog types so the stored snapshot layout and the API
//! contract can evolve independently.

use std::collections::BTreeMap;

use efficiency_index_appliance_models::{Category, EfficiencyRating, FuelType};
use efficiency_index_catalog_models::{CatalogEntry, CategoryStats, DatabaseStats, TopPerformer};
use efficiency_index_query::{
    Comparison, ComparisonInsights, Methodology, RegionalInsights, RegionalView, SearchFilters,
    SearchResults, StatsView,
};
use efficiency_index_regional_models::RegionalImpact;
use serde::{Deserialize, Serialize};

/// An appliance as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiAppliance {
    /// Manufacturer name.
    pub manufacturer: String,
    /// Model number.
    pub model_number: String,
    /// Category.
    pub category: Category,
    /// Efficiency score, 0-100.
    pub open_efficiency_score: f64,
    /// Letter rating.
    pub efficiency_rating: EfficiencyRating,
    /// Percentile of the raw efficiency ratio within the category.
    pub efficiency_percentile: f64,
    /// ENERGY STAR certification.
    pub energy_star_certified: bool,
    /// Fuel type.
    pub fuel: FuelType,
    /// Annual energy use in kWh (kWh-equivalent for gas appliances).
    pub annual_energy_kwh: f64,
    /// Annual gas use in therms, for gas appliances.
    pub annual_therms: Option<f64>,
    /// Annual operating cost at US-average prices.
    pub annual_cost_us_average: Option<f64>,
    /// Annual CO₂ at US-average emissions factors.
    pub annual_co2_lbs_us_average: Option<f64>,
}

impl From<&CatalogEntry> for ApiAppliance {
    fn from(entry: &CatalogEntry) -> Self {
        let record = &entry.scored.record;
        let us = entry.us_average();
        Self {
            manufacturer: record.manufacturer.clone(),
            model_number: record.model_number.clone(),
            category: record.category,
            open_efficiency_score: entry.scored.open_efficiency_score,
            efficiency_rating: entry.scored.efficiency_rating,
            efficiency_percentile: entry.scored.efficiency_percentile,
            energy_star_certified: record.energy_star_certified,
            fuel: record.fuel,
            annual_energy_kwh: record.annual_energy_kwh_equivalent,
            annual_therms: record.annual_therms,
            annual_cost_us_average: us.map(|i| i.annual_cost),
            annual_co2_lbs_us_average: us.map(|i| i.annual_co2_lbs),
        }
    }
}

/// Error body for every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// Human-readable message.
    pub error: String,
    /// HTTP status code, repeated in the body.
    pub status_code: u16,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct ApiHealth {
    /// Whether the service is healthy.
    pub healthy: bool,
    /// Service version.
    pub version: String,
    /// Snapshot being served, if one has been published.
    pub snapshot_id: Option<String>,
}

/// Query parameters for the search endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQueryParams {
    /// Category name (required).
    pub category: Option<String>,
    /// Manufacturer substring.
    #[serde(alias = "brand")]
    pub manufacturer: Option<String>,
    /// Model number substring.
    pub model: Option<String>,
    /// Inclusive lower score bound.
    #[serde(alias = "min_efficiency")]
    pub min_score: Option<f64>,
    /// Inclusive upper score bound.
    pub max_score: Option<f64>,
    /// Only ENERGY STAR certified models.
    pub energy_star: Option<bool>,
    /// Maximum number of results.
    pub limit: Option<i64>,
}

impl SearchQueryParams {
    /// The filter portion of the parameters.
    #[must_use]
    pub fn filters(&self) -> SearchFilters {
        SearchFilters {
            manufacturer: self.manufacturer.clone(),
            model: self.model.clone(),
            min_score: self.min_score,
            max_score: self.max_score,
            energy_star_only: self.energy_star.unwrap_or(false),
        }
    }
}

/// Query parameters carrying only a limit.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LimitQueryParams {
    /// Maximum number of results.
    pub limit: Option<i64>,
}

/// Query parameters for the compare endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompareQueryParams {
    /// Comma-separated model numbers.
    pub models: Option<String>,
}

impl CompareQueryParams {
    /// The requested model numbers, in order.
    #[must_use]
    pub fn model_list(&self) -> Vec<&str> {
        self.models
            .as_deref()
            .map(|m| m.split(',').map(str::trim).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }
}

/// Query parameters for the regional impact endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegionQueryParams {
    /// Region id, name, or abbreviation.
    pub region: Option<String>,
}

/// Response from the search endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ApiSearchResponse {
    /// Category searched.
    pub category: Category,
    /// Number of appliances returned.
    pub total_results: usize,
    /// Filters as applied.
    pub filters: SearchFilters,
    /// Matching appliances in ranking order.
    pub appliances: Vec<ApiAppliance>,
}

impl From<SearchResults> for ApiSearchResponse {
    fn from(results: SearchResults) -> Self {
        let appliances: Vec<ApiAppliance> = results.entries.iter().map(ApiAppliance::from).collect();
        Self {
            category: results.category,
            total_results: appliances.len(),
            filters: results.filters,
            appliances,
        }
    }
}

/// Response from the top performers endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ApiTopPerformersResponse {
    /// Category.
    pub category: Category,
    /// Number of appliances returned.
    pub total_results: usize,
    /// Best appliances in ranking order.
    pub appliances: Vec<ApiAppliance>,
}

impl From<SearchResults> for ApiTopPerformersResponse {
    fn from(results: SearchResults) -> Self {
        let appliances: Vec<ApiAppliance> = results.entries.iter().map(ApiAppliance::from).collect();
        Self {
            category: results.category,
            total_results: appliances.len(),
            appliances,
        }
    }
}

/// Response from the compare endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ApiCompareResponse {
    /// Every match, with its category.
    pub comparison: Vec<ApiAppliance>,
    /// Distinct requested model numbers that matched.
    pub models_found: usize,
    /// Distinct model numbers requested.
    pub models_requested: usize,
    /// Requested model numbers with no match.
    pub models_not_found: Vec<String>,
    /// Present when at least two appliances from one category matched.
    pub insights: Option<ComparisonInsights>,
}

impl From<Comparison> for ApiCompareResponse {
    fn from(comparison: Comparison) -> Self {
        Self {
            comparison: comparison.entries.iter().map(ApiAppliance::from).collect(),
            models_found: comparison.models_requested - comparison.models_not_found.len(),
            models_requested: comparison.models_requested,
            models_not_found: comparison.models_not_found,
            insights: comparison.insights,
        }
    }
}

/// Response from the regional impact endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ApiRegionalImpactResponse {
    /// The appliance.
    pub appliance: ApiAppliance,
    /// Impact per region id.
    pub regional_impact: BTreeMap<String, RegionalImpact>,
    /// Cost extremes across the returned regions.
    pub insights: Option<RegionalInsights>,
}

impl From<RegionalView> for ApiRegionalImpactResponse {
    fn from(view: RegionalView) -> Self {
        Self {
            appliance: ApiAppliance::from(&view.entry),
            regional_impact: view.impacts,
            insights: view.insights,
        }
    }
}

/// Snapshot-wide statistics.
#[derive(Debug, Clone, Serialize)]
pub struct ApiDatabaseInfo {
    /// Snapshot being served.
    pub snapshot_id: String,
    /// ENERGY STAR share across all models, one decimal.
    pub energy_star_percentage: f64,
    /// Precomputed statistics.
    #[serde(flatten)]
    pub stats: DatabaseStats,
}

/// Response from the stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ApiStatsResponse {
    /// Snapshot-wide statistics.
    pub database_info: ApiDatabaseInfo,
    /// How scores and impacts are produced.
    pub methodology: Methodology,
}

impl ApiStatsResponse {
    /// Wraps a stats view for the snapshot `snapshot_id`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(snapshot_id: String, view: StatsView) -> Self {
        let stats = view.database;
        let energy_star_percentage = if stats.total_models == 0 {
            0.0
        } else {
            (stats.total_energy_star as f64 / stats.total_models as f64 * 1000.0).round() / 10.0
        };
        Self {
            database_info: ApiDatabaseInfo {
                snapshot_id,
                energy_star_percentage,
                stats,
            },
            methodology: view.methodology,
        }
    }
}

/// One category in the categories listing.
#[derive(Debug, Clone, Serialize)]
pub struct ApiCategorySummary {
    /// Category id.
    pub name: Category,
    /// Display name.
    pub display_name: &'static str,
    /// Unit of the raw efficiency ratio.
    pub ratio_unit: &'static str,
    /// Number of scored models.
    pub total_count: u64,
    /// Number of ENERGY STAR certified models.
    pub energy_star_count: u64,
    /// Certified share as a percentage.
    pub energy_star_percentage: f64,
    /// Mean score.
    pub average_score: f64,
    /// Best model, if any.
    pub top_performer: Option<TopPerformer>,
}

impl From<&CategoryStats> for ApiCategorySummary {
    fn from(stats: &CategoryStats) -> Self {
        Self {
            name: stats.category,
            display_name: stats.category.display_name(),
            ratio_unit: stats.category.ratio_unit(),
            total_count: stats.total_count,
            energy_star_count: stats.energy_star_count,
            energy_star_percentage: stats.energy_star_percentage,
            average_score: stats.average_score,
            top_performer: stats.top_performer.clone(),
        }
    }
}

/// Response from the categories endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ApiCategoriesResponse {
    /// Published categories.
    pub categories: Vec<ApiCategorySummary>,
}

#[cfg(test)]
mod tests {
    use efficiency_index_catalog_models::ScoredRecord;
    use efficiency_index_regional_models::US_AVERAGE;
    use efficiency_index_source_models::NormalizedRecord;

    use super::*;

    fn gas_heater() -> CatalogEntry {
        CatalogEntry {
            scored: ScoredRecord {
                record: NormalizedRecord {
                    manufacturer: "Rheem".to_string(),
                    model_number: "XG50T06".to_string(),
                    category: Category::WaterHeaters,
                    fuel: FuelType::NaturalGas,
                    annual_energy_kwh_equivalent: 7178.5,
                    annual_therms: Some(245.0),
                    capacity_or_throughput: 50.0,
                    efficiency_factor: Some(0.64),
                    energy_star_certified: true,
                },
                open_efficiency_score: 32.8,
                efficiency_rating: EfficiencyRating::D,
                raw_efficiency_ratio: 0.64,
                efficiency_percentile: 50.0,
            },
            regional_impact: BTreeMap::from([(
                US_AVERAGE.to_string(),
                RegionalImpact {
                    region: US_AVERAGE.to_string(),
                    region_name: "US Average".to_string(),
                    fuel: FuelType::NaturalGas,
                    annual_cost: 313.6,
                    annual_co2_lbs: 2866.5,
                    lifetime_cost: 3763.2,
                    lifetime_co2_lbs: 34398.0,
                    unit_price: 1.28,
                    emissions_factor: 11.7,
                },
            )]),
        }
    }

    #[test]
    fn appliance_flattens_us_average_impact() {
        let json = serde_json::to_value(ApiAppliance::from(&gas_heater())).unwrap();
        assert_eq!(json["category"], "water_heaters");
        assert_eq!(json["fuel"], "natural_gas");
        assert_eq!(json["efficiency_rating"], "D");
        assert_eq!(json["annual_therms"], 245.0);
        assert_eq!(json["annual_cost_us_average"], 313.6);
    }

    #[test]
    fn compare_model_list_splits_and_trims() {
        let params = CompareQueryParams {
            models: Some(" A-1, ,B-2,".to_string()),
        };
        assert_eq!(params.model_list(), vec!["A-1", "B-2"]);
        assert!(CompareQueryParams::default().model_list().is_empty());
    }

    #[test]
    fn error_body_shape() {
        let body = serde_json::to_value(ApiError {
            error: "model 'X' not found".to_string(),
            status_code: 404,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"error": "model 'X' not found", "status_code": 404})
        );
    }
}
