#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Category-relative efficiency scoring.
//!
//! Every category reduces a normalized record to one raw efficiency ratio
//! (bigger is better) and maps that ratio onto a 0-100 score through the
//! category's calibration curve in a [`ThresholdTable`]. Scores are only
//! comparable within a category; the letter rating is always derived from
//! the score, never from the raw ratio.

pub mod thresholds;

use efficiency_index_appliance_models::{Category, EfficiencyRating};
use efficiency_index_catalog_models::ScoredRecord;
use efficiency_index_source_models::NormalizedRecord;

pub use thresholds::{CategoryThresholds, ThresholdError, ThresholdTable};

/// EPA usage assumption for dishwashers.
pub const DISHWASHER_CYCLES_PER_YEAR: f64 = 280.0;

/// DOE usage assumption for clothes washers.
pub const WASHER_LOADS_PER_YEAR: f64 = 300.0;

/// Why a normalized record could not be scored.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoringError {
    /// Annual energy is zero or negative.
    #[error("annual energy is not positive ({value})")]
    ZeroEnergy {
        /// The offending energy value.
        value: f64,
    },

    /// The category's ratio needs a capacity but the record has none.
    #[error("capacity is zero for a capacity-based category")]
    ZeroCapacity,

    /// Water heaters are scored on UEF, which this record lacks.
    #[error("no efficiency factor published")]
    MissingEfficiencyFactor,

    /// The ratio came out NaN, infinite, or non-positive.
    #[error("efficiency ratio is undefined ({value})")]
    UndefinedRatio {
        /// The offending ratio.
        value: f64,
    },

    /// The threshold table has no curve for this category.
    #[error("no score thresholds for {category}")]
    MissingThresholds {
        /// The category without a curve.
        category: Category,
    },
}

impl ScoringError {
    /// Short, stable reason code used in drop counters and run reports.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::ZeroEnergy { .. } => "zero_energy",
            Self::ZeroCapacity => "zero_capacity",
            Self::MissingEfficiencyFactor => "missing_efficiency_factor",
            Self::UndefinedRatio { .. } => "undefined_ratio",
            Self::MissingThresholds { .. } => "missing_thresholds",
        }
    }
}

/// Computes the category's raw efficiency ratio.
///
/// * refrigerators: ft³ per annual kWh
/// * dishwashers: place settings per kWh/cycle at 280 cycles/yr
/// * clothes washers: ft³ per kWh/load at 300 loads/yr
/// * water heaters: the published UEF
///
/// # Errors
///
/// Returns [`ScoringError`] if the inputs for the category's ratio are
/// zero, missing, or yield a non-finite value.
pub fn raw_ratio(record: &NormalizedRecord) -> Result<f64, ScoringError> {
    let energy = record.annual_energy_kwh_equivalent;
    if energy <= 0.0 || !energy.is_finite() {
        return Err(ScoringError::ZeroEnergy { value: energy });
    }

    let capacity = || {
        let c = record.capacity_or_throughput;
        if c > 0.0 { Ok(c) } else { Err(ScoringError::ZeroCapacity) }
    };

    let ratio = match record.category {
        Category::Refrigerators => capacity()? / energy,
        Category::Dishwashers => capacity()? / (energy / DISHWASHER_CYCLES_PER_YEAR),
        Category::ClothesWashers => capacity()? / (energy / WASHER_LOADS_PER_YEAR),
        Category::WaterHeaters => record
            .efficiency_factor
            .ok_or(ScoringError::MissingEfficiencyFactor)?,
    };

    if !ratio.is_finite() || ratio <= 0.0 {
        return Err(ScoringError::UndefinedRatio { value: ratio });
    }
    Ok(ratio)
}

/// Scores a normalized record against a threshold table.
///
/// The percentile is left at zero; see [`assign_percentiles`].
///
/// # Errors
///
/// Returns [`ScoringError`] if the ratio is undefined or the table has no
/// curve for the record's category.
pub fn score(
    record: &NormalizedRecord,
    thresholds: &ThresholdTable,
) -> Result<ScoredRecord, ScoringError> {
    let curve = thresholds
        .get(record.category)
        .ok_or(ScoringError::MissingThresholds {
            category: record.category,
        })?;
    let ratio = raw_ratio(record)?;
    let score = round1(curve.interpolate(ratio).clamp(0.0, 100.0));

    Ok(ScoredRecord {
        record: record.clone(),
        open_efficiency_score: score,
        efficiency_rating: EfficiencyRating::from_score(score),
        raw_efficiency_ratio: ratio,
        efficiency_percentile: 0.0,
    })
}

/// A loaded threshold table, ready to score records.
#[derive(Debug, Clone)]
pub struct Scorer {
    thresholds: ThresholdTable,
}

impl Scorer {
    /// Wraps a validated threshold table.
    #[must_use]
    pub const fn new(thresholds: ThresholdTable) -> Self {
        Self { thresholds }
    }

    /// Version of the threshold table in use.
    #[must_use]
    pub fn thresholds_version(&self) -> &str {
        self.thresholds.version()
    }

    /// The threshold table in use.
    #[must_use]
    pub const fn thresholds(&self) -> &ThresholdTable {
        &self.thresholds
    }

    /// Scores a normalized record.
    ///
    /// # Errors
    ///
    /// See [`score`].
    pub fn score(&self, record: &NormalizedRecord) -> Result<ScoredRecord, ScoringError> {
        score(record, &self.thresholds)
    }
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new(ThresholdTable::embedded())
    }
}

/// Fills in `efficiency_percentile` for one category's scored records.
///
/// Uses the average-rank percentile of the raw ratio: tied ratios share the
/// mean of their ranks, and the best record gets 100.
#[allow(clippy::cast_precision_loss)]
pub fn assign_percentiles(records: &mut [ScoredRecord]) {
    let n = records.len();
    if n == 0 {
        return;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        records[a]
            .raw_efficiency_ratio
            .total_cmp(&records[b].raw_efficiency_ratio)
    });

    let mut start = 0;
    while start < n {
        let ratio = records[order[start]].raw_efficiency_ratio;
        let mut end = start + 1;
        while end < n && records[order[end]].raw_efficiency_ratio.total_cmp(&ratio).is_eq() {
            end += 1;
        }
        // 1-based ranks start+1..=end share their mean
        let average_rank = (start + 1 + end) as f64 / 2.0;
        let percentile = round1(average_rank / n as f64 * 100.0);
        for &index in &order[start..end] {
            records[index].efficiency_percentile = percentile;
        }
        start = end;
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use efficiency_index_appliance_models::FuelType;

    use super::*;

    fn record(category: Category, capacity: f64, kwh: f64) -> NormalizedRecord {
        NormalizedRecord {
            manufacturer: "Acme".to_string(),
            model_number: "M1".to_string(),
            category,
            fuel: FuelType::Electric,
            annual_energy_kwh_equivalent: kwh,
            annual_therms: None,
            capacity_or_throughput: capacity,
            efficiency_factor: None,
            energy_star_certified: true,
        }
    }

    #[test]
    fn refrigerator_at_calibration_point_scores_93() {
        let scored = Scorer::default()
            .score(&record(Category::Refrigerators, 20.0, 400.0))
            .unwrap();
        assert!((scored.raw_efficiency_ratio - 0.05).abs() < 1e-12);
        assert!((scored.open_efficiency_score - 93.0).abs() < f64::EPSILON);
        assert_eq!(scored.efficiency_rating, EfficiencyRating::APlus);
    }

    #[test]
    fn dishwasher_ratio_uses_cycles_per_year() {
        // 16 place settings at 280 kWh/yr is 16 per kWh/cycle
        let ratio = raw_ratio(&record(Category::Dishwashers, 16.0, 280.0)).unwrap();
        assert!((ratio - 16.0).abs() < 1e-9);
    }

    #[test]
    fn washer_ratio_uses_loads_per_year() {
        let ratio = raw_ratio(&record(Category::ClothesWashers, 4.5, 100.0)).unwrap();
        assert!((ratio - 13.5).abs() < 1e-9);
    }

    #[test]
    fn water_heater_scores_on_uef() {
        let mut heater = record(Category::WaterHeaters, 0.0, 7178.5);
        assert_eq!(
            Scorer::default().score(&heater).unwrap_err(),
            ScoringError::MissingEfficiencyFactor
        );
        heater.efficiency_factor = Some(0.93);
        let scored = Scorer::default().score(&heater).unwrap();
        assert!((scored.open_efficiency_score - 90.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_capacity_and_energy_are_errors() {
        let scorer = Scorer::default();
        assert_eq!(
            scorer
                .score(&record(Category::Refrigerators, 0.0, 400.0))
                .unwrap_err(),
            ScoringError::ZeroCapacity
        );
        assert_eq!(
            scorer
                .score(&record(Category::Dishwashers, 12.0, 0.0))
                .unwrap_err()
                .reason(),
            "zero_energy"
        );
    }

    #[test]
    fn missing_curve_is_an_error() {
        let table = ThresholdTable::from_toml(
            "version = 'x'\n[categories.dishwashers]\nbreakpoints = [[0.0, 0.0], [20.0, 100.0]]\n",
        )
        .unwrap();
        let err = score(&record(Category::Refrigerators, 20.0, 400.0), &table).unwrap_err();
        assert_eq!(
            err,
            ScoringError::MissingThresholds {
                category: Category::Refrigerators
            }
        );
    }

    #[test]
    fn better_ratio_never_scores_lower() {
        let scorer = Scorer::default();
        let mut previous = 0.0;
        for kwh in (150..=900).rev().step_by(25) {
            let scored = scorer
                .score(&record(Category::Refrigerators, 20.0, f64::from(kwh)))
                .unwrap();
            assert!(scored.open_efficiency_score >= previous);
            assert!((0.0..=100.0).contains(&scored.open_efficiency_score));
            previous = scored.open_efficiency_score;
        }
    }

    #[test]
    fn percentiles_average_tied_ranks() {
        let scorer = Scorer::default();
        let mut records: Vec<ScoredRecord> = [500.0, 400.0, 400.0, 300.0]
            .iter()
            .map(|kwh| {
                scorer
                    .score(&record(Category::Refrigerators, 20.0, *kwh))
                    .unwrap()
            })
            .collect();
        assign_percentiles(&mut records);
        let percentiles: Vec<f64> = records.iter().map(|r| r.efficiency_percentile).collect();
        assert_eq!(percentiles, vec![25.0, 62.5, 62.5, 100.0]);
    }
}
