#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Region constants and regional impact types.

use efficiency_index_appliance_models::FuelType;
use serde::{Deserialize, Serialize};

/// Id of the national aggregate region, always precomputed.
pub const US_AVERAGE: &str = "us_average";

/// Expected service life used for lifetime projections, in years.
pub const APPLIANCE_LIFETIME_YEARS: f64 = 12.0;

/// Energy prices and emissions factors for one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionConstants {
    /// Stable snake-case id (e.g., `"new_york"`, `"us_average"`).
    pub id: String,
    /// Display name (e.g., `"New York"`).
    pub name: String,
    /// Postal abbreviation (`"US"` for the national aggregate).
    pub abbreviation: String,
    /// Residential electricity price in USD per kWh.
    pub electricity_price_per_kwh: f64,
    /// Grid emissions in pounds of CO₂ per kWh.
    pub grid_emissions_lbs_per_kwh: f64,
    /// Residential natural gas price in USD per therm.
    pub gas_price_per_therm: f64,
    /// Combustion emissions in pounds of CO₂ per therm.
    pub gas_emissions_lbs_per_therm: f64,
}

/// Operating cost and carbon footprint of one appliance in one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionalImpact {
    /// Region id.
    pub region: String,
    /// Region display name.
    pub region_name: String,
    /// Fuel basis the figures were computed on.
    pub fuel: FuelType,
    /// Annual operating cost in USD.
    pub annual_cost: f64,
    /// Annual CO₂ emissions in pounds.
    pub annual_co2_lbs: f64,
    /// Operating cost over the appliance lifetime in USD.
    pub lifetime_cost: f64,
    /// CO₂ emissions over the appliance lifetime in pounds.
    pub lifetime_co2_lbs: f64,
    /// Unit price applied (USD per kWh or per therm, matching `fuel`).
    pub unit_price: f64,
    /// Emissions factor applied (lbs per kWh or per therm, matching `fuel`).
    pub emissions_factor: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_constants_deserialize_from_json() {
        let region: RegionConstants = serde_json::from_value(serde_json::json!({
            "id": "texas",
            "name": "Texas",
            "abbreviation": "TX",
            "electricity_price_per_kwh": 0.1281,
            "grid_emissions_lbs_per_kwh": 1.0,
            "gas_price_per_therm": 1.05,
            "gas_emissions_lbs_per_therm": 11.7,
        }))
        .unwrap();
        assert_eq!(region.abbreviation, "TX");
    }
}
