#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Read-only queries over a catalog snapshot.
//!
//! Every operation borrows an immutable [`Catalog`] and never mutates it,
//! so any number of queries can run concurrently against the same
//! snapshot. Results are owned copies and stay valid after the snapshot is
//! replaced.

pub mod insights;
pub mod methodology;

use std::collections::BTreeMap;

use efficiency_index_appliance_models::{Category, UnknownCategoryError};
use efficiency_index_catalog::stats::ranking_order;
use efficiency_index_catalog_models::{Catalog, CatalogEntry, CategoryStats, DatabaseStats};
use efficiency_index_regional::{RegionTable, UnknownRegionError};
use efficiency_index_regional_models::RegionalImpact;
use serde::Serialize;

pub use insights::{ComparedModel, ComparisonInsights, RegionalInsights};
pub use methodology::Methodology;

/// Result count when the caller gives no limit.
pub const DEFAULT_LIMIT: i64 = 50;

/// Most distinct model numbers a single comparison accepts.
pub const MAX_COMPARE_MODELS: usize = 10;

/// Errors surfaced to query callers.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    /// The category name matches no known category.
    #[error(transparent)]
    UnknownCategory(#[from] UnknownCategoryError),

    /// The region key matches no region in the table.
    #[error(transparent)]
    UnknownRegion(#[from] UnknownRegionError),

    /// A parameter is outside its contract.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No category contains the model number.
    #[error("model '{model_number}' not found")]
    ModelNotFound {
        /// The requested model number.
        model_number: String,
    },

    /// The region was not precomputed and the loaded region table is not
    /// the one the snapshot was built with.
    #[error(
        "impact for region '{region}' is unavailable: snapshot uses region table \
         '{snapshot_version}', server has '{table_version}'"
    )]
    RegionTableMismatch {
        /// Resolved region id.
        region: String,
        /// Region table version recorded in the snapshot.
        snapshot_version: String,
        /// Version of the loaded region table.
        table_version: String,
    },
}

impl QueryError {
    /// HTTP status code for this error at the API boundary.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::UnknownCategory(_) | Self::UnknownRegion(_) | Self::InvalidParameter(_) => 400,
            Self::ModelNotFound { .. } => 404,
            Self::RegionTableMismatch { .. } => 409,
        }
    }
}

/// Optional filters for [`CatalogQuery::search`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchFilters {
    /// Case-insensitive substring of the manufacturer name.
    pub manufacturer: Option<String>,
    /// Case-insensitive substring of the model number.
    pub model: Option<String>,
    /// Inclusive lower score bound.
    pub min_score: Option<f64>,
    /// Inclusive upper score bound.
    pub max_score: Option<f64>,
    /// Only ENERGY STAR certified models.
    pub energy_star_only: bool,
}

impl SearchFilters {
    fn validate(&self) -> Result<(), QueryError> {
        for (name, bound) in [("min_score", self.min_score), ("max_score", self.max_score)] {
            if let Some(value) = bound
                && !(0.0..=100.0).contains(&value)
            {
                return Err(QueryError::InvalidParameter(format!(
                    "{name} must be between 0 and 100, got {value}"
                )));
            }
        }
        if let (Some(min), Some(max)) = (self.min_score, self.max_score)
            && min > max
        {
            return Err(QueryError::InvalidParameter(format!(
                "min_score ({min}) must not exceed max_score ({max})"
            )));
        }
        Ok(())
    }
}

/// Ordered search results for one category.
#[derive(Debug, Clone)]
pub struct SearchResults {
    /// Category searched.
    pub category: Category,
    /// Filters as applied.
    pub filters: SearchFilters,
    /// Matching entries in ranking order, truncated to the limit.
    pub entries: Vec<CatalogEntry>,
}

/// Outcome of comparing several model numbers.
#[derive(Debug, Clone)]
pub struct Comparison {
    /// Every entry matching a requested model number, in request order.
    pub entries: Vec<CatalogEntry>,
    /// Number of distinct model numbers requested.
    pub models_requested: usize,
    /// Requested model numbers with no match in any category.
    pub models_not_found: Vec<String>,
    /// Present when at least two entries were found.
    pub insights: Option<ComparisonInsights>,
}

/// Regional impacts for one model.
#[derive(Debug, Clone)]
pub struct RegionalView {
    /// The model's catalog entry.
    pub entry: CatalogEntry,
    /// Impacts keyed by region id.
    pub impacts: BTreeMap<String, RegionalImpact>,
    /// Present when at least one impact is available.
    pub insights: Option<RegionalInsights>,
}

/// Database statistics plus how they were produced.
#[derive(Debug, Clone)]
pub struct StatsView {
    /// Precomputed aggregate statistics.
    pub database: DatabaseStats,
    /// Static scoring and pricing methodology.
    pub methodology: Methodology,
}

/// Query operations over one catalog snapshot.
#[derive(Debug, Clone, Copy)]
pub struct CatalogQuery<'a> {
    catalog: &'a Catalog,
    regions: &'a RegionTable,
}

impl<'a> CatalogQuery<'a> {
    /// Binds queries to a snapshot and the region table used for impacts
    /// that were not precomputed.
    #[must_use]
    pub const fn new(catalog: &'a Catalog, regions: &'a RegionTable) -> Self {
        Self { catalog, regions }
    }

    /// Searches one category.
    ///
    /// Results are ordered by score descending, then manufacturer, then
    /// model number.
    ///
    /// # Errors
    ///
    /// * [`QueryError::UnknownCategory`] if `category` is not a category
    /// * [`QueryError::InvalidParameter`] if `limit` is not positive or the
    ///   score bounds are out of range
    pub fn search(
        &self,
        category: &str,
        filters: SearchFilters,
        limit: Option<i64>,
    ) -> Result<SearchResults, QueryError> {
        let category = Category::parse(category)?;
        let limit = validate_limit(limit)?;
        filters.validate()?;

        let manufacturer = needle(filters.manufacturer.as_deref());
        let model = needle(filters.model.as_deref());
        let min_score = filters.min_score.unwrap_or(0.0);
        let max_score = filters.max_score.unwrap_or(100.0);

        let mut entries: Vec<&CatalogEntry> = self
            .catalog
            .entries(category)
            .iter()
            .filter(|e| (min_score..=max_score).contains(&e.score()))
            .filter(|e| !filters.energy_star_only || e.scored.record.energy_star_certified)
            .filter(|e| manufacturer.as_deref().is_none_or(|m| contains(e.manufacturer(), m)))
            .filter(|e| model.as_deref().is_none_or(|m| contains(e.model_number(), m)))
            .collect();
        entries.sort_by(|a, b| ranking_order(a, b));
        entries.truncate(limit);

        log::debug!("search {category}: {} result(s)", entries.len());

        Ok(SearchResults {
            category,
            filters,
            entries: entries.into_iter().cloned().collect(),
        })
    }

    /// Best models in a category; a search without filters.
    ///
    /// # Errors
    ///
    /// See [`Self::search`].
    pub fn top_performers(
        &self,
        category: &str,
        limit: Option<i64>,
    ) -> Result<SearchResults, QueryError> {
        self.search(category, SearchFilters::default(), limit)
    }

    /// Looks up several model numbers across every category.
    ///
    /// Names are trimmed and deduplicated. A model number published in more
    /// than one category yields one entry per category. Missing names are
    /// reported rather than failing the call.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidParameter`] if no model numbers, or more
    /// than [`MAX_COMPARE_MODELS`], are requested.
    pub fn compare<S: AsRef<str>>(&self, models: &[S]) -> Result<Comparison, QueryError> {
        let mut requested: Vec<&str> = Vec::new();
        for name in models.iter().map(|m| m.as_ref().trim()) {
            if !name.is_empty() && !requested.contains(&name) {
                requested.push(name);
            }
        }
        if requested.is_empty() {
            return Err(QueryError::InvalidParameter(
                "at least one model number is required".to_string(),
            ));
        }
        if requested.len() > MAX_COMPARE_MODELS {
            return Err(QueryError::InvalidParameter(format!(
                "at most {MAX_COMPARE_MODELS} models can be compared, got {}",
                requested.len()
            )));
        }

        let mut entries = Vec::new();
        let mut models_not_found = Vec::new();
        for name in &requested {
            let before = entries.len();
            entries.extend(self.catalog.find_all(name).cloned());
            if entries.len() == before {
                models_not_found.push((*name).to_string());
            }
        }

        let insights = insights::compare(&entries);

        Ok(Comparison {
            entries,
            models_requested: requested.len(),
            models_not_found,
            insights,
        })
    }

    /// Regional impacts for one model.
    ///
    /// With a region key, returns just that region: the precomputed impact
    /// if the snapshot has one, otherwise one computed from the region
    /// table. Without a key, returns every precomputed region.
    ///
    /// # Errors
    ///
    /// * [`QueryError::ModelNotFound`] if no category has the model
    /// * [`QueryError::UnknownRegion`] if the region key doesn't resolve
    /// * [`QueryError::RegionTableMismatch`] if the region was not
    ///   precomputed and the snapshot used a different region table
    pub fn regional_impact(
        &self,
        model_number: &str,
        region: Option<&str>,
    ) -> Result<RegionalView, QueryError> {
        let model_number = model_number.trim();
        let entry = self
            .catalog
            .find_model(model_number)
            .ok_or_else(|| QueryError::ModelNotFound {
                model_number: model_number.to_string(),
            })?;

        let impacts = match region.map(str::trim).filter(|r| !r.is_empty()) {
            None => entry.regional_impact.clone(),
            Some(key) => {
                let region = self.regions.resolve(key)?;
                let impact = match entry.regional_impact.get(&region.id) {
                    Some(impact) => impact.clone(),
                    None if self.catalog.regions_version == self.regions.version() => {
                        efficiency_index_regional::impact(&entry.scored, region)
                    }
                    None => {
                        return Err(QueryError::RegionTableMismatch {
                            region: region.id.clone(),
                            snapshot_version: self.catalog.regions_version.clone(),
                            table_version: self.regions.version().to_string(),
                        });
                    }
                };
                BTreeMap::from([(region.id.clone(), impact)])
            }
        };

        let insights = insights::regional(&impacts);

        Ok(RegionalView {
            entry: entry.clone(),
            impacts,
            insights,
        })
    }

    /// Precomputed per-category statistics.
    #[must_use]
    pub fn categories(&self) -> &'a [CategoryStats] {
        &self.catalog.stats.categories
    }

    /// Precomputed database statistics with the methodology used.
    #[must_use]
    pub fn stats(&self) -> StatsView {
        StatsView {
            database: self.catalog.stats.clone(),
            methodology: Methodology::for_catalog(self.catalog),
        }
    }
}

fn validate_limit(limit: Option<i64>) -> Result<usize, QueryError> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT);
    if limit <= 0 {
        return Err(QueryError::InvalidParameter(format!(
            "limit must be positive, got {limit}"
        )));
    }
    Ok(usize::try_from(limit).unwrap_or(usize::MAX))
}

fn needle(filter: Option<&str>) -> Option<String> {
    filter
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
}

fn contains(haystack: &str, lowercase_needle: &str) -> bool {
    haystack.to_lowercase().contains(lowercase_needle)
}
