#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Regional operating cost and carbon impact.
//!
//! Electric appliances are priced and charged emissions per kWh; gas
//! appliances per therm of their original gas usage. The kWh-equivalent of
//! a gas appliance only exists for cross-fuel comparison and never feeds
//! cost or carbon.

use std::path::{Path, PathBuf};

use efficiency_index_appliance_models::FuelType;
use efficiency_index_catalog_models::ScoredRecord;
use efficiency_index_regional_models::{
    APPLIANCE_LIFETIME_YEARS, RegionConstants, RegionalImpact, US_AVERAGE,
};
use efficiency_index_source_models::KWH_PER_THERM;
use serde::Deserialize;

/// The embedded default table.
const DEFAULT_REGIONS: &str = include_str!("../data/regions.toml");

/// A region key that matches no region in the table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown region '{key}'")]
pub struct UnknownRegionError {
    /// The key that failed to resolve.
    pub key: String,
}

/// Errors raised while loading a region table.
#[derive(Debug, thiserror::Error)]
pub enum RegionTableError {
    /// The override file could not be read.
    #[error("failed to read region table {path}: {source}")]
    Io {
        /// File that failed to load.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The table is not valid TOML or doesn't match the schema.
    #[error("invalid region table: {0}")]
    Parse(#[from] toml::de::Error),

    /// Two regions share an id or abbreviation.
    #[error("duplicate region key '{key}'")]
    Duplicate {
        /// The repeated key.
        key: String,
    },

    /// A price or emissions factor is negative or not finite.
    #[error("region '{id}' has an invalid {field}")]
    InvalidValue {
        /// Region id.
        id: String,
        /// Offending field.
        field: &'static str,
    },

    /// Every table must carry the national aggregate.
    #[error("region table has no 'us_average' entry")]
    MissingUsAverage,
}

#[derive(Deserialize)]
struct RawRegionTable {
    version: String,
    regions: Vec<RegionConstants>,
}

/// A validated, versioned table of region constants.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionTable {
    version: String,
    regions: Vec<RegionConstants>,
}

/// Canonical lookup form of a region key: trimmed, lowercased, with
/// spaces and hyphens folded to underscores.
fn region_key(key: &str) -> String {
    key.trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

impl RegionTable {
    /// Parses and validates a region table from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`RegionTableError`] if the TOML is malformed, a value is
    /// invalid, keys collide, or `us_average` is missing.
    pub fn from_toml(text: &str) -> Result<Self, RegionTableError> {
        let raw: RawRegionTable = toml::de::from_str(text)?;

        let mut seen = std::collections::BTreeSet::new();
        for region in &raw.regions {
            let values = [
                ("electricity_price_per_kwh", region.electricity_price_per_kwh),
                ("grid_emissions_lbs_per_kwh", region.grid_emissions_lbs_per_kwh),
                ("gas_price_per_therm", region.gas_price_per_therm),
                ("gas_emissions_lbs_per_therm", region.gas_emissions_lbs_per_therm),
            ];
            if let Some(&(field, _)) = values.iter().find(|(_, v)| !v.is_finite() || *v < 0.0) {
                return Err(RegionTableError::InvalidValue {
                    id: region.id.clone(),
                    field,
                });
            }
            for key in [region_key(&region.id), region_key(&region.abbreviation)] {
                if !seen.insert(key.clone()) {
                    return Err(RegionTableError::Duplicate { key });
                }
            }
        }
        if !raw.regions.iter().any(|r| r.id == US_AVERAGE) {
            return Err(RegionTableError::MissingUsAverage);
        }

        Ok(Self {
            version: raw.version,
            regions: raw.regions,
        })
    }

    /// Loads and validates an override table from disk.
    ///
    /// # Errors
    ///
    /// Returns [`RegionTableError`] if the file cannot be read or fails
    /// validation.
    pub fn from_path(path: &Path) -> Result<Self, RegionTableError> {
        let text = std::fs::read_to_string(path).map_err(|source| RegionTableError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::from_toml(&text)?;
        log::info!(
            "Loaded region table {} ({} regions) from {}",
            table.version,
            table.regions.len(),
            path.display()
        );
        Ok(table)
    }

    /// Returns the embedded default table.
    ///
    /// # Panics
    ///
    /// Panics if the embedded table is invalid, which the crate tests rule
    /// out.
    #[must_use]
    pub fn embedded() -> Self {
        Self::from_toml(DEFAULT_REGIONS)
            .unwrap_or_else(|e| panic!("embedded regions.toml is invalid: {e}"))
    }

    /// Loads `path` if given, otherwise the embedded table.
    ///
    /// # Errors
    ///
    /// Returns [`RegionTableError`] if the override cannot be loaded.
    pub fn load(path: Option<&Path>) -> Result<Self, RegionTableError> {
        path.map_or_else(|| Ok(Self::embedded()), Self::from_path)
    }

    /// Table version string.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// All regions, in table order.
    #[must_use]
    pub fn all(&self) -> &[RegionConstants] {
        &self.regions
    }

    /// Resolves a region by id, display name, or postal abbreviation,
    /// ignoring case (`"Texas"`, `"TX"`, `"new-york"`, `"US_Average"`).
    ///
    /// # Errors
    ///
    /// Returns [`UnknownRegionError`] if nothing matches.
    pub fn resolve(&self, key: &str) -> Result<&RegionConstants, UnknownRegionError> {
        let wanted = region_key(key);
        self.regions
            .iter()
            .find(|r| {
                region_key(&r.id) == wanted
                    || region_key(&r.abbreviation) == wanted
                    || region_key(&r.name) == wanted
            })
            .ok_or_else(|| UnknownRegionError {
                key: key.to_string(),
            })
    }

    /// Resolves a list of keys, always including `us_average` first.
    /// Duplicates are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownRegionError`] for the first key that fails.
    pub fn select<S: AsRef<str>>(
        &self,
        keys: &[S],
    ) -> Result<Vec<&RegionConstants>, UnknownRegionError> {
        let mut selected = vec![self.resolve(US_AVERAGE)?];
        for key in keys {
            let region = self.resolve(key.as_ref())?;
            if !selected.iter().any(|r| r.id == region.id) {
                selected.push(region);
            }
        }
        Ok(selected)
    }

    /// Computes the impact of `scored` in the region named by `key`.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownRegionError`] if `key` matches no region.
    pub fn impact_for(
        &self,
        scored: &ScoredRecord,
        key: &str,
    ) -> Result<RegionalImpact, UnknownRegionError> {
        Ok(impact(scored, self.resolve(key)?))
    }
}

impl Default for RegionTable {
    fn default() -> Self {
        Self::embedded()
    }
}

/// Computes the annual and lifetime cost and emissions of an appliance in
/// one region.
#[must_use]
pub fn impact(scored: &ScoredRecord, region: &RegionConstants) -> RegionalImpact {
    let record = &scored.record;
    let (usage, unit_price, emissions_factor) = match record.fuel {
        FuelType::Electric => (
            record.annual_energy_kwh_equivalent,
            region.electricity_price_per_kwh,
            region.grid_emissions_lbs_per_kwh,
        ),
        FuelType::NaturalGas => (
            record
                .annual_therms
                .unwrap_or(record.annual_energy_kwh_equivalent / KWH_PER_THERM),
            region.gas_price_per_therm,
            region.gas_emissions_lbs_per_therm,
        ),
    };

    let annual_cost = usage * unit_price;
    let annual_co2_lbs = usage * emissions_factor;

    RegionalImpact {
        region: region.id.clone(),
        region_name: region.name.clone(),
        fuel: record.fuel,
        annual_cost: round2(annual_cost),
        annual_co2_lbs: round2(annual_co2_lbs),
        lifetime_cost: round2(annual_cost * APPLIANCE_LIFETIME_YEARS),
        lifetime_co2_lbs: round2(annual_co2_lbs * APPLIANCE_LIFETIME_YEARS),
        unit_price,
        emissions_factor,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use efficiency_index_appliance_models::{Category, EfficiencyRating};
    use efficiency_index_source_models::NormalizedRecord;

    use super::*;

    fn scored(fuel: FuelType, kwh: f64, therms: Option<f64>) -> ScoredRecord {
        ScoredRecord {
            record: NormalizedRecord {
                manufacturer: "Rheem".to_string(),
                model_number: "XG50T".to_string(),
                category: Category::WaterHeaters,
                fuel,
                annual_energy_kwh_equivalent: kwh,
                annual_therms: therms,
                capacity_or_throughput: 50.0,
                efficiency_factor: Some(0.7),
                energy_star_certified: true,
            },
            open_efficiency_score: 49.0,
            efficiency_rating: EfficiencyRating::C,
            raw_efficiency_ratio: 0.7,
            efficiency_percentile: 50.0,
        }
    }

    #[test]
    fn embedded_table_has_states_and_us_average() {
        let table = RegionTable::embedded();
        assert_eq!(table.all().len(), 51);
        assert_eq!(table.all()[0].id, US_AVERAGE);
    }

    #[test]
    fn gas_water_heater_in_texas() {
        let table = RegionTable::embedded();
        let heater = scored(FuelType::NaturalGas, 245.0 * KWH_PER_THERM, Some(245.0));
        let impact = table.impact_for(&heater, "Texas").unwrap();
        assert!((impact.annual_cost - 257.25).abs() < 0.005);
        assert!((impact.annual_co2_lbs - 2866.5).abs() < 0.005);
        assert!((impact.lifetime_cost - 3087.0).abs() < 0.005);
        assert_eq!(impact.fuel, FuelType::NaturalGas);
    }

    #[test]
    fn gas_ignores_kwh_equivalent() {
        let table = RegionTable::embedded();
        let heater = scored(FuelType::NaturalGas, 99_999.0, Some(100.0));
        let impact = table.impact_for(&heater, "us_average").unwrap();
        assert!((impact.annual_cost - 128.0).abs() < 0.005);
        assert!((impact.annual_co2_lbs - 1170.0).abs() < 0.005);
    }

    #[test]
    fn gas_cost_does_not_depend_on_electricity_price() {
        let table = RegionTable::embedded();
        let heater = scored(FuelType::NaturalGas, 245.0 * KWH_PER_THERM, Some(245.0));
        let texas = table.resolve("TX").unwrap().clone();
        let pricier_grid = RegionConstants {
            electricity_price_per_kwh: texas.electricity_price_per_kwh * 3.0,
            grid_emissions_lbs_per_kwh: texas.grid_emissions_lbs_per_kwh * 2.0,
            ..texas.clone()
        };

        let base = impact(&heater, &texas);
        let other = impact(&heater, &pricier_grid);
        assert!((base.annual_cost - other.annual_cost).abs() < f64::EPSILON);
        assert!((base.annual_co2_lbs - other.annual_co2_lbs).abs() < f64::EPSILON);

        let pricier_gas = RegionConstants {
            gas_price_per_therm: texas.gas_price_per_therm + 0.5,
            ..texas.clone()
        };
        let gas = impact(&heater, &pricier_gas);
        // 245 therms at 0.50 USD more per therm
        assert!((gas.annual_cost - base.annual_cost - 122.5).abs() < 0.011);
    }

    #[test]
    fn electric_uses_grid_factors() {
        let table = RegionTable::embedded();
        let heater = scored(FuelType::Electric, 1000.0, None);
        let impact = table.impact_for(&heater, "CA").unwrap();
        assert!((impact.annual_cost - 270.40).abs() < 0.005);
        assert!((impact.annual_co2_lbs - 450.0).abs() < 0.005);
        assert!((impact.lifetime_co2_lbs - 5400.0).abs() < 0.005);
    }

    #[test]
    fn resolves_keys_case_insensitively() {
        let table = RegionTable::embedded();
        assert_eq!(table.resolve("TEXAS").unwrap().id, "texas");
        assert_eq!(table.resolve("tx").unwrap().id, "texas");
        assert_eq!(table.resolve("New York").unwrap().id, "new_york");
        assert_eq!(table.resolve("new-york").unwrap().id, "new_york");
        assert_eq!(table.resolve("US_Average").unwrap().id, US_AVERAGE);
        assert_eq!(
            table.resolve("Atlantis").unwrap_err(),
            UnknownRegionError {
                key: "Atlantis".to_string()
            }
        );
    }

    #[test]
    fn select_always_includes_us_average() {
        let table = RegionTable::embedded();
        let ids: Vec<&str> = table
            .select(&["texas", "TX", "florida"])
            .unwrap()
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(ids, vec![US_AVERAGE, "texas", "florida"]);
    }

    #[test]
    fn rejects_table_without_us_average() {
        let err = RegionTable::from_toml(
            r#"
            version = "x"
            [[regions]]
            id = "texas"
            name = "Texas"
            abbreviation = "TX"
            electricity_price_per_kwh = 0.1281
            grid_emissions_lbs_per_kwh = 1.0
            gas_price_per_therm = 1.05
            gas_emissions_lbs_per_therm = 11.7
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, RegionTableError::MissingUsAverage));
    }

    #[test]
    fn loads_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regions.toml");
        std::fs::write(
            &path,
            r#"
            version = "custom"
            [[regions]]
            id = "us_average"
            name = "US Average"
            abbreviation = "US"
            electricity_price_per_kwh = 0.2
            grid_emissions_lbs_per_kwh = 0.8
            gas_price_per_therm = 1.5
            gas_emissions_lbs_per_therm = 11.7
            "#,
        )
        .unwrap();
        let table = RegionTable::load(Some(&path)).unwrap();
        assert_eq!(table.version(), "custom");
        assert_eq!(table.all().len(), 1);
    }
}
