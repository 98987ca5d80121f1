//! Versioned score threshold tables.
//!
//! Each category maps its raw efficiency ratio onto a 0-100 score through a
//! list of `(ratio, score)` breakpoints. The default table is embedded at
//! compile time; an override file with the same layout can be loaded at
//! process start. Every table is validated on load, so a table that would
//! let a better ratio earn a lower score is never used.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use efficiency_index_appliance_models::Category;
use serde::Deserialize;

/// The embedded default table.
const DEFAULT_THRESHOLDS: &str = include_str!("../data/thresholds.toml");

/// Errors raised while loading or validating a threshold table.
#[derive(Debug, thiserror::Error)]
pub enum ThresholdError {
    /// The override file could not be read.
    #[error("failed to read threshold table {path}: {source}")]
    Io {
        /// File that failed to load.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The table is not valid TOML or doesn't match the schema.
    #[error("invalid threshold table: {0}")]
    Parse(#[from] toml::de::Error),

    /// A category has no breakpoints.
    #[error("{category}: threshold table has no breakpoints")]
    Empty {
        /// Offending category.
        category: Category,
    },

    /// A ratio or score is NaN or infinite.
    #[error("{category}: breakpoint {index} is not finite")]
    NonFinite {
        /// Offending category.
        category: Category,
        /// Breakpoint index.
        index: usize,
    },

    /// Ratios must strictly increase.
    #[error("{category}: breakpoint ratios must strictly increase (index {index})")]
    RatioNotIncreasing {
        /// Offending category.
        category: Category,
        /// Index of the first breakpoint out of order.
        index: usize,
    },

    /// Scores must never decrease as the ratio grows.
    #[error("{category}: breakpoint scores must not decrease (index {index})")]
    ScoreDecreasing {
        /// Offending category.
        category: Category,
        /// Index of the first breakpoint out of order.
        index: usize,
    },

    /// Scores must lie within 0-100.
    #[error("{category}: breakpoint score {score} is outside 0-100")]
    ScoreOutOfRange {
        /// Offending category.
        category: Category,
        /// Offending score.
        score: f64,
    },
}

/// One category's calibration curve.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CategoryThresholds {
    /// `(ratio, score)` pairs, ratios strictly increasing.
    pub breakpoints: Vec<(f64, f64)>,
}

impl CategoryThresholds {
    /// Maps a raw ratio onto the curve.
    ///
    /// Ratios below the first breakpoint take the first score, ratios above
    /// the last take the last score, and anything between is linearly
    /// interpolated. The result is not rounded.
    #[must_use]
    pub fn interpolate(&self, ratio: f64) -> f64 {
        let Some(&(first_ratio, first_score)) = self.breakpoints.first() else {
            return 0.0;
        };
        if ratio <= first_ratio {
            return first_score;
        }

        for pair in self.breakpoints.windows(2) {
            let (x0, y0) = pair[0];
            let (x1, y1) = pair[1];
            if ratio <= x1 {
                return (ratio - x0).mul_add((y1 - y0) / (x1 - x0), y0);
            }
        }

        self.breakpoints.last().map_or(first_score, |&(_, score)| score)
    }

    fn validate(&self, category: Category) -> Result<(), ThresholdError> {
        if self.breakpoints.is_empty() {
            return Err(ThresholdError::Empty { category });
        }
        for (index, &(ratio, score)) in self.breakpoints.iter().enumerate() {
            if !ratio.is_finite() || !score.is_finite() {
                return Err(ThresholdError::NonFinite { category, index });
            }
            if !(0.0..=100.0).contains(&score) {
                return Err(ThresholdError::ScoreOutOfRange { category, score });
            }
        }
        for (i, pair) in self.breakpoints.windows(2).enumerate() {
            let index = i + 1;
            if pair[1].0 <= pair[0].0 {
                return Err(ThresholdError::RatioNotIncreasing { category, index });
            }
            if pair[1].1 < pair[0].1 {
                return Err(ThresholdError::ScoreDecreasing { category, index });
            }
        }
        Ok(())
    }
}

/// A validated set of per-category calibration curves.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdTable {
    version: String,
    categories: BTreeMap<Category, CategoryThresholds>,
}

#[derive(Deserialize)]
struct RawThresholdTable {
    version: String,
    categories: BTreeMap<Category, CategoryThresholds>,
}

impl TryFrom<RawThresholdTable> for ThresholdTable {
    type Error = ThresholdError;

    fn try_from(raw: RawThresholdTable) -> Result<Self, Self::Error> {
        for (category, thresholds) in &raw.categories {
            thresholds.validate(*category)?;
        }
        Ok(Self {
            version: raw.version,
            categories: raw.categories,
        })
    }
}

impl ThresholdTable {
    /// Parses and validates a threshold table from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ThresholdError`] if the TOML is malformed or any category
    /// fails validation.
    pub fn from_toml(text: &str) -> Result<Self, ThresholdError> {
        let raw: RawThresholdTable = toml::de::from_str(text)?;
        raw.try_into()
    }

    /// Loads and validates an override table from disk.
    ///
    /// # Errors
    ///
    /// Returns [`ThresholdError`] if the file cannot be read or fails
    /// validation.
    pub fn from_path(path: &Path) -> Result<Self, ThresholdError> {
        let text = std::fs::read_to_string(path).map_err(|source| ThresholdError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::from_toml(&text)?;
        log::info!(
            "Loaded threshold table {} from {}",
            table.version,
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
        Self::from_toml(DEFAULT_THRESHOLDS)
            .unwrap_or_else(|e| panic!("embedded thresholds.toml is invalid: {e}"))
    }

    /// Loads `path` if given, otherwise the embedded table.
    ///
    /// # Errors
    ///
    /// Returns [`ThresholdError`] if the override cannot be loaded.
    pub fn load(path: Option<&Path>) -> Result<Self, ThresholdError> {
        path.map_or_else(|| Ok(Self::embedded()), Self::from_path)
    }

    /// Table version string.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Calibration curve for `category`, if the table defines one.
    #[must_use]
    pub fn get(&self, category: Category) -> Option<&CategoryThresholds> {
        self.categories.get(&category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_table_covers_every_category() {
        let table = ThresholdTable::embedded();
        assert!(!table.version().is_empty());
        for category in Category::all() {
            assert!(table.get(*category).is_some(), "{category} missing");
        }
    }

    #[test]
    fn embedded_curves_are_monotonic() {
        let table = ThresholdTable::embedded();
        for category in Category::all() {
            let curve = table.get(*category).unwrap();
            let last = curve.breakpoints.last().unwrap().0 * 1.2;
            let mut previous = f64::MIN;
            for step in 0..=1000 {
                let ratio = last * f64::from(step) / 1000.0;
                let score = curve.interpolate(ratio);
                assert!(score >= previous, "{category}: {score} < {previous} at {ratio}");
                previous = score;
            }
        }
    }

    #[test]
    fn interpolates_between_breakpoints() {
        let curve = CategoryThresholds {
            breakpoints: vec![(1.0, 10.0), (2.0, 30.0), (4.0, 50.0)],
        };
        assert!((curve.interpolate(0.5) - 10.0).abs() < 1e-9);
        assert!((curve.interpolate(1.5) - 20.0).abs() < 1e-9);
        assert!((curve.interpolate(3.0) - 40.0).abs() < 1e-9);
        assert!((curve.interpolate(9.0) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_non_increasing_ratios() {
        let err = ThresholdTable::from_toml(
            r"
            version = 'bad'
            [categories.refrigerators]
            breakpoints = [[0.0, 0.0], [0.05, 50.0], [0.05, 60.0]]
            ",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ThresholdError::RatioNotIncreasing { index: 2, .. }
        ));
    }

    #[test]
    fn rejects_decreasing_scores() {
        let err = ThresholdTable::from_toml(
            r"
            version = 'bad'
            [categories.dishwashers]
            breakpoints = [[0.0, 0.0], [10.0, 60.0], [12.0, 55.0]]
            ",
        )
        .unwrap_err();
        assert!(matches!(err, ThresholdError::ScoreDecreasing { .. }));
    }

    #[test]
    fn rejects_out_of_range_scores() {
        let err = ThresholdTable::from_toml(
            r"
            version = 'bad'
            [categories.water_heaters]
            breakpoints = [[0.0, 0.0], [1.0, 120.0]]
            ",
        )
        .unwrap_err();
        assert!(matches!(err, ThresholdError::ScoreOutOfRange { .. }));
    }

    #[test]
    fn loads_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thresholds.toml");
        std::fs::write(
            &path,
            "version = 'custom'\n[categories.refrigerators]\nbreakpoints = [[0.0, 0.0], [0.1, 100.0]]\n",
        )
        .unwrap();
        let table = ThresholdTable::load(Some(&path)).unwrap();
        assert_eq!(table.version(), "custom");
        assert!(table.get(Category::Dishwashers).is_none());
    }
}
