#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Raw upstream record and normalized appliance record types.
//!
//! Every certification dataset produces [`RawRecord`]s keyed by its own
//! column names. The normalizer projects them onto the category-agnostic
//! [`NormalizedRecord`] that the scorer consumes.

use efficiency_index_appliance_models::{Category, FuelType};
use serde::{Deserialize, Serialize};

/// One upstream row, keyed by the upstream column names (CSV header text
/// or SODA field names).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(serde_json::Value);

impl RawRecord {
    /// Wraps a JSON value as a raw record.
    #[must_use]
    pub const fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Returns the field value, if present and not `null`.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.0.get(field).filter(|v| !v.is_null())
    }

    /// Returns the underlying JSON value.
    #[must_use]
    pub const fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

impl From<serde_json::Value> for RawRecord {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// An appliance record projected onto the category-agnostic schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    /// Cleaned manufacturer (brand) name.
    pub manufacturer: String,
    /// Model number, unique within a category.
    pub model_number: String,
    /// Appliance category.
    pub category: Category,
    /// Whether the appliance is electric or gas fueled.
    pub fuel: FuelType,
    /// Annual energy use in kWh. Gas usage is converted at
    /// [`KWH_PER_THERM`] for comparison only.
    pub annual_energy_kwh_equivalent: f64,
    /// Original annual gas usage in therms (gas appliances only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annual_therms: Option<f64>,
    /// Category-specific capacity basis (ft³, place settings, or gallons).
    pub capacity_or_throughput: f64,
    /// Published efficiency factor (UEF for water heaters, IMEF for
    /// clothes washers), when the dataset provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub efficiency_factor: Option<f64>,
    /// Whether the model is ENERGY STAR certified.
    pub energy_star_certified: bool,
}

/// Thermal-to-electric equivalence used to place gas appliances on the
/// same kWh basis as electric ones. Never used for cost or emissions.
pub const KWH_PER_THERM: f64 = 29.3;
