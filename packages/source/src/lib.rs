#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Certification dataset sources and the unit normalizer.
//!
//! Each appliance category is described by a declarative
//! [`SourceDefinition`](source_def::SourceDefinition) loaded from an
//! embedded TOML file. The definition knows how to fetch raw rows from the
//! ENERGY STAR open-data portal (CSV export or Socrata SODA paging) and how
//! to project those rows onto the category-agnostic
//! [`NormalizedRecord`].
//!
//! The orchestrator talks to sources through the [`RecordSource`] trait so
//! that tests can substitute in-memory record sets.

pub mod csv_export;
pub mod parsing;
pub mod progress;
pub mod registry;
pub mod retry;
pub mod socrata;
pub mod source_def;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use efficiency_index_appliance_models::{Category, UnknownCategoryError};
use efficiency_index_source_models::{NormalizedRecord, RawRecord};

use crate::progress::ProgressCallback;

/// Errors that can occur while fetching upstream records.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV parsing failed.
    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    /// The upstream service answered with a non-retryable status or a body
    /// of the wrong shape.
    #[error("Upstream error: {message}")]
    Upstream {
        /// Description of what went wrong.
        message: String,
    },

    /// The fetch task panicked or was aborted.
    #[error("Fetch task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Why a single raw record could not be normalized.
///
/// These are per-record failures: the orchestrator logs and counts them
/// and keeps going with the rest of the batch.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NormalizationError {
    /// None of the upstream columns for a required field had a value.
    #[error("missing required field '{field}'")]
    MissingField {
        /// Canonical field name.
        field: &'static str,
    },

    /// A numeric field held something that is not a finite number.
    #[error("field '{field}' is not numeric: '{value}'")]
    NotNumeric {
        /// Canonical field name.
        field: &'static str,
        /// The offending upstream value.
        value: String,
    },

    /// Annual energy use was zero or negative.
    #[error("annual energy must be positive, got {value}")]
    NonPositiveEnergy {
        /// The parsed energy value.
        value: f64,
    },

    /// The category has no registered field map.
    #[error(transparent)]
    UnknownCategory(#[from] UnknownCategoryError),
}

impl NormalizationError {
    /// Short, stable reason code used in drop counters and run reports.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::MissingField { .. } => "missing_field",
            Self::NotNumeric { .. } => "not_numeric",
            Self::NonPositiveEnergy { .. } => "non_positive_energy",
            Self::UnknownCategory(_) => "unknown_category",
        }
    }
}

/// Retry schedule for transient HTTP failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubled on each subsequent retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
    }
}

/// Configuration for fetching records from a source.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Maximum number of records to fetch.
    pub limit: Option<u64>,
    /// Per-request timeout. Always applied.
    pub timeout: Duration,
    /// Backoff schedule for transient failures.
    pub retry: RetryPolicy,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            limit: None,
            timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

impl FetchOptions {
    /// Builds the HTTP client every fetcher uses, with the per-request
    /// timeout applied.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the TLS backend fails to
    /// initialize.
    pub fn client(&self) -> Result<reqwest::Client, SourceError> {
        Ok(reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()?)
    }
}

/// A provider of raw records for one appliance category.
///
/// The network implementation is
/// [`SourceDefinition`](source_def::SourceDefinition); tests provide fixed
/// in-memory record sets.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// The category this source feeds.
    fn category(&self) -> Category;

    /// Human-readable name of the upstream dataset.
    fn name(&self) -> &str;

    /// Downloads all raw records (up to `options.limit`).
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the upstream cannot be reached after all
    /// retries or answers with malformed data.
    async fn fetch(
        &self,
        options: &FetchOptions,
        progress: Arc<dyn ProgressCallback>,
    ) -> Result<Vec<RawRecord>, SourceError>;

    /// Projects one raw record onto the normalized schema.
    ///
    /// # Errors
    ///
    /// Returns [`NormalizationError`] describing why the record is unusable.
    fn normalize(&self, raw: &RawRecord) -> Result<NormalizedRecord, NormalizationError>;
}

/// Normalizes a raw record using the registered field map for `category`.
///
/// # Errors
///
/// Returns [`NormalizationError`] if a required field is missing, a
/// numeric field is malformed, or annual energy use is not positive.
pub fn normalize(raw: &RawRecord, category: Category) -> Result<NormalizedRecord, NormalizationError> {
    registry::definition_for(category).normalize(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
    }

    #[test]
    fn normalization_reason_codes() {
        assert_eq!(
            NormalizationError::MissingField { field: "model_number" }.reason(),
            "missing_field"
        );
        assert_eq!(
            NormalizationError::NonPositiveEnergy { value: 0.0 }.reason(),
            "non_positive_energy"
        );
    }

    #[test]
    fn normalize_dispatches_by_category() {
        let raw = RawRecord::new(serde_json::json!({
            "Brand Name": "LG",
            "Model Number": "LRMVS3006S",
            "Annual Energy Use (kWh/yr)": "647",
            "Capacity (Total Volume) (ft3)": "29.7",
        }));
        let record = normalize(&raw, Category::Refrigerators).unwrap();
        assert_eq!(record.category, Category::Refrigerators);
        assert!((record.annual_energy_kwh_equivalent - 647.0).abs() < f64::EPSILON);
    }
}
