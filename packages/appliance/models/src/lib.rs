#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Appliance category, fuel, and efficiency rating taxonomy.
//!
//! This crate defines the canonical enums shared across the whole
//! efficiency index: which appliance categories exist, how an appliance is
//! fueled, and the letter ratings derived from category-normalized scores.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// An appliance category with its own certification dataset, physical
/// units, and score calibration.
///
/// Scores are only comparable within a single category.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Category {
    /// Residential refrigerators and refrigerator-freezers
    Refrigerators,
    /// Residential dishwashers
    Dishwashers,
    /// Residential clothes washers
    ClothesWashers,
    /// Residential water heaters (gas storage and tankless)
    WaterHeaters,
}

impl Category {
    /// Returns all categories in canonical order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Refrigerators,
            Self::Dishwashers,
            Self::ClothesWashers,
            Self::WaterHeaters,
        ]
    }

    /// Human-readable name (e.g., `"Clothes Washers"`).
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Refrigerators => "Refrigerators",
            Self::Dishwashers => "Dishwashers",
            Self::ClothesWashers => "Clothes Washers",
            Self::WaterHeaters => "Water Heaters",
        }
    }

    /// Unit of the category's raw efficiency ratio.
    #[must_use]
    pub const fn ratio_unit(self) -> &'static str {
        match self {
            Self::Refrigerators => "ft³ per annual kWh",
            Self::Dishwashers => "place settings per kWh/cycle",
            Self::ClothesWashers => "ft³ per kWh/load",
            Self::WaterHeaters => "Uniform Energy Factor",
        }
    }

    /// Unit of the category's capacity/throughput basis.
    #[must_use]
    pub const fn capacity_unit(self) -> &'static str {
        match self {
            Self::Refrigerators | Self::ClothesWashers => "ft³",
            Self::Dishwashers => "place settings",
            Self::WaterHeaters => "gallons",
        }
    }

    /// Parses a category name leniently.
    ///
    /// Accepts the canonical snake-case id as well as spaced, hyphenated,
    /// or capitalized variants (`"Clothes Washers"`, `"clothes-washers"`).
    ///
    /// # Errors
    ///
    /// Returns [`UnknownCategoryError`] if the name matches no category.
    pub fn parse(name: &str) -> Result<Self, UnknownCategoryError> {
        let key: String = name
            .trim()
            .chars()
            .map(|c| match c {
                ' ' | '-' => '_',
                c => c.to_ascii_lowercase(),
            })
            .collect();
        key.parse().map_err(|_| UnknownCategoryError {
            name: name.to_string(),
        })
    }
}

/// Error returned when a category name is not one of the known categories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCategoryError {
    /// The name that failed to resolve.
    pub name: String,
}

impl std::fmt::Display for UnknownCategoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unknown category '{}': expected one of refrigerators, dishwashers, clothes_washers, water_heaters",
            self.name
        )
    }
}

impl std::error::Error for UnknownCategoryError {}

/// How an appliance is fueled. Determines which regional price and
/// emissions factors apply.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FuelType {
    /// Grid electricity, metered in kWh
    Electric,
    /// Natural gas, metered in therms
    NaturalGas,
}

/// Letter rating derived from a category-normalized efficiency score.
///
/// Variants are declared best-first so that ordered maps list `A+` first.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
pub enum EfficiencyRating {
    /// Score of 90 or above
    #[serde(rename = "A+")]
    #[strum(serialize = "A+")]
    APlus,
    /// Score of 75 or above
    A,
    /// Score of 55 or above
    B,
    /// Score of 35 or above
    C,
    /// Score of 15 or above
    D,
    /// Anything lower
    F,
}

impl EfficiencyRating {
    /// Minimum score for each rating, best first. Shared by all categories.
    pub const CUTOFFS: &[(f64, Self)] = &[
        (90.0, Self::APlus),
        (75.0, Self::A),
        (55.0, Self::B),
        (35.0, Self::C),
        (15.0, Self::D),
    ];

    /// Derives the rating for an already category-normalized score.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        Self::CUTOFFS
            .iter()
            .find(|(min, _)| score >= *min)
            .map_or(Self::F, |(_, rating)| *rating)
    }

    /// Minimum score required for this rating.
    #[must_use]
    pub fn min_score(self) -> f64 {
        Self::CUTOFFS
            .iter()
            .find(|(_, rating)| *rating == self)
            .map_or(0.0, |(min, _)| *min)
    }
}
