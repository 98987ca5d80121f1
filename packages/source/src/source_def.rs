//! Config-driven certification dataset definition.
//!
//! [`SourceDefinition`] captures everything unique about one category's
//! upstream dataset in a serializable config struct: where to fetch it,
//! which columns hold each canonical field, and how to derive annual energy
//! use. A single generic implementation handles every category.
//!
//! Pages of raw records are streamed through a [`tokio::sync::mpsc`] channel
//! from a background task, so fetching overlaps with the consumer.

use std::sync::Arc;

use async_trait::async_trait;
use efficiency_index_appliance_models::{Category, FuelType};
use efficiency_index_source_models::{KWH_PER_THERM, NormalizedRecord, RawRecord};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::csv_export::{CsvExportConfig, fetch_csv_export};
use crate::parsing::{clean_manufacturer, first_present, parse_flag, parse_number, value_text};
use crate::progress::ProgressCallback;
use crate::socrata::{SocrataConfig, fetch_socrata};
use crate::{FetchOptions, NormalizationError, RecordSource, SourceError};

// ── Top-level source definition ──────────────────────────────────────────

/// A complete, config-driven dataset definition for one category.
///
/// Loaded from TOML files embedded at compile time.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceDefinition {
    /// Category this dataset certifies.
    pub category: Category,
    /// Human-readable dataset name.
    pub name: String,
    /// Open-data portal base URL (e.g., `"https://data.energystar.gov"`).
    pub portal: String,
    /// Socrata dataset id (e.g., `"p5st-her9"`).
    pub dataset_id: String,
    /// Certification status for records without a certification column.
    /// ENERGY STAR datasets only list certified models.
    #[serde(default = "default_certified")]
    pub certified_by_default: bool,
    /// Attribution text shown in the methodology description.
    #[serde(default)]
    pub attribution: Option<String>,
    /// How to fetch raw data from the portal.
    pub fetcher: FetcherConfig,
    /// Upstream column names for each canonical field.
    pub fields: FieldMapping,
}

const fn default_certified() -> bool {
    true
}

// ── Fetcher config ───────────────────────────────────────────────────────

/// How to fetch raw data from the portal.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FetcherConfig {
    /// Whole-dataset CSV export (`/api/views/{id}/rows.csv`).
    CsvExport {
        /// Field delimiter (default: comma).
        #[serde(default)]
        delimiter: Option<String>,
    },
    /// Socrata SODA API paging (`/resource/{id}.json`).
    Socrata {
        /// Records per page.
        page_size: u64,
        /// Column used for stable ordering.
        #[serde(default = "default_order_column")]
        order_column: String,
    },
}

fn default_order_column() -> String {
    ":id".to_string()
}

// ── Field mapping ────────────────────────────────────────────────────────

/// Upstream column names for each canonical field.
///
/// Every list is a fallback chain: the first column holding a non-empty
/// value wins.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldMapping {
    /// Brand/manufacturer columns.
    pub manufacturer: Vec<String>,
    /// Model number columns.
    pub model_number: Vec<String>,
    /// Capacity or throughput columns (ft³, place settings, gallons).
    pub capacity: Vec<String>,
    /// When `true`, a missing capacity is recorded as `0` instead of
    /// rejecting the record (tankless water heaters have no storage).
    #[serde(default)]
    pub capacity_optional: bool,
    /// How to derive annual energy use.
    pub energy: EnergyExtractor,
    /// Published efficiency factor columns (UEF, IMEF).
    #[serde(default)]
    pub efficiency_factor: Vec<String>,
    /// Certification flag columns.
    #[serde(default)]
    pub certified: Vec<String>,
}

/// Strategy for deriving annual energy use from a record.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EnergyExtractor {
    /// Annual kWh published directly.
    AnnualKwh {
        /// Annual kWh columns.
        fields: Vec<String>,
    },
    /// kWh per cycle multiplied by a fixed usage assumption.
    PerCycleKwh {
        /// kWh-per-cycle columns.
        fields: Vec<String>,
        /// Cycles (or loads) per year.
        cycles_per_year: f64,
    },
    /// Gas appliances publish therms, electric ones publish kWh. A positive
    /// therms value marks the record as gas.
    GasOrElectric {
        /// Annual therms columns.
        therms: Vec<String>,
        /// Annual kWh columns.
        kwh: Vec<String>,
    },
}

/// Annual energy use derived from a record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyReading {
    /// Fuel the appliance runs on.
    pub fuel: FuelType,
    /// Annual kWh (gas converted at [`KWH_PER_THERM`]).
    pub kwh_equivalent: f64,
    /// Original annual therms, for gas appliances.
    pub therms: Option<f64>,
}

/// Reads a required numeric field, distinguishing "absent" from "garbage".
fn required_number(
    record: &RawRecord,
    fields: &[String],
    field: &'static str,
) -> Result<f64, NormalizationError> {
    optional_number(record, fields, field)?.ok_or(NormalizationError::MissingField { field })
}

fn optional_number(
    record: &RawRecord,
    fields: &[String],
    field: &'static str,
) -> Result<Option<f64>, NormalizationError> {
    let Some((_, value)) = first_present(record, fields) else {
        return Ok(None);
    };
    parse_number(value)
        .map(Some)
        .ok_or_else(|| NormalizationError::NotNumeric {
            field,
            value: value_text(value).unwrap_or_else(|| value.to_string()),
        })
}

fn electric(kwh: f64) -> Result<EnergyReading, NormalizationError> {
    if kwh <= 0.0 {
        return Err(NormalizationError::NonPositiveEnergy { value: kwh });
    }
    Ok(EnergyReading {
        fuel: FuelType::Electric,
        kwh_equivalent: kwh,
        therms: None,
    })
}

impl EnergyExtractor {
    /// Derives annual energy use from a record.
    ///
    /// # Errors
    ///
    /// Returns [`NormalizationError`] if the energy columns are missing,
    /// malformed, or not positive.
    pub fn extract(&self, record: &RawRecord) -> Result<EnergyReading, NormalizationError> {
        match self {
            Self::AnnualKwh { fields } => {
                electric(required_number(record, fields, "annual_energy")?)
            }
            Self::PerCycleKwh {
                fields,
                cycles_per_year,
            } => {
                let per_cycle = required_number(record, fields, "energy_per_cycle")?;
                electric(per_cycle * cycles_per_year)
            }
            Self::GasOrElectric { therms, kwh } => {
                if let Some(therms) = optional_number(record, therms, "annual_therms")?
                    && therms > 0.0
                {
                    return Ok(EnergyReading {
                        fuel: FuelType::NaturalGas,
                        kwh_equivalent: therms * KWH_PER_THERM,
                        therms: Some(therms),
                    });
                }
                electric(required_number(record, kwh, "annual_energy")?)
            }
        }
    }
}

// ── Normalization ────────────────────────────────────────────────────────

impl SourceDefinition {
    /// Returns the human-readable dataset name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the CSV export URL for this dataset.
    #[must_use]
    pub fn csv_export_url(&self) -> String {
        format!(
            "{}/api/views/{}/rows.csv?accessType=DOWNLOAD",
            self.portal.trim_end_matches('/'),
            self.dataset_id
        )
    }

    /// Returns the SODA resource URL for this dataset.
    #[must_use]
    pub fn resource_url(&self) -> String {
        format!(
            "{}/resource/{}.json",
            self.portal.trim_end_matches('/'),
            self.dataset_id
        )
    }

    /// Returns the human-readable dataset page on the portal.
    #[must_use]
    pub fn dataset_url(&self) -> String {
        format!("{}/d/{}", self.portal.trim_end_matches('/'), self.dataset_id)
    }

    /// Projects one raw record onto the normalized schema.
    ///
    /// # Errors
    ///
    /// Returns [`NormalizationError`] if a required field is missing, a
    /// numeric field is malformed, or annual energy use is not positive.
    pub fn normalize(&self, record: &RawRecord) -> Result<NormalizedRecord, NormalizationError> {
        let fields = &self.fields;

        let manufacturer = first_present(record, &fields.manufacturer)
            .and_then(|(_, v)| value_text(v))
            .map(|s| clean_manufacturer(&s))
            .ok_or(NormalizationError::MissingField {
                field: "manufacturer",
            })?;

        let model_number = first_present(record, &fields.model_number)
            .and_then(|(_, v)| value_text(v))
            .ok_or(NormalizationError::MissingField {
                field: "model_number",
            })?;

        let energy = fields.energy.extract(record)?;

        let capacity = match optional_number(record, &fields.capacity, "capacity")? {
            Some(c) if c < 0.0 => {
                return Err(NormalizationError::NotNumeric {
                    field: "capacity",
                    value: c.to_string(),
                });
            }
            Some(c) => c,
            None if fields.capacity_optional => 0.0,
            None => {
                return Err(NormalizationError::MissingField { field: "capacity" });
            }
        };

        let efficiency_factor =
            optional_number(record, &fields.efficiency_factor, "efficiency_factor")?;

        let energy_star_certified = first_present(record, &fields.certified)
            .and_then(|(_, v)| parse_flag(v))
            .unwrap_or(self.certified_by_default);

        Ok(NormalizedRecord {
            manufacturer,
            model_number,
            category: self.category,
            fuel: energy.fuel,
            annual_energy_kwh_equivalent: energy.kwh_equivalent,
            annual_therms: energy.therms,
            capacity_or_throughput: capacity,
            efficiency_factor,
            energy_star_certified,
        })
    }
}

// ── Streaming fetch ──────────────────────────────────────────────────────

/// Channel buffer size. Lets the fetcher stay one page ahead of the
/// consumer.
const PAGE_CHANNEL_BUFFER: usize = 2;

impl SourceDefinition {
    /// Starts fetching pages in a background task and returns a receiver
    /// that yields one page of raw records at a time.
    ///
    /// A fetch error (if any) is returned via the [`tokio::task::JoinHandle`].
    #[must_use]
    pub fn fetch_pages(
        &self,
        options: &FetchOptions,
        progress: Arc<dyn ProgressCallback>,
    ) -> (
        mpsc::Receiver<Vec<RawRecord>>,
        tokio::task::JoinHandle<Result<u64, SourceError>>,
    ) {
        let (tx, rx) = mpsc::channel(PAGE_CHANNEL_BUFFER);
        let fetcher = self.fetcher.clone();
        let name = self.name.clone();
        let csv_url = self.csv_export_url();
        let resource_url = self.resource_url();
        let options = options.clone();

        let handle = tokio::spawn(async move {
            match &fetcher {
                FetcherConfig::CsvExport { delimiter } => {
                    fetch_csv_export(
                        &CsvExportConfig {
                            url: &csv_url,
                            label: &name,
                            delimiter: delimiter.as_deref(),
                        },
                        &options,
                        &tx,
                        &progress,
                    )
                    .await
                }
                FetcherConfig::Socrata {
                    page_size,
                    order_column,
                } => {
                    fetch_socrata(
                        &SocrataConfig {
                            api_url: &resource_url,
                            order_column,
                            label: &name,
                            page_size: *page_size,
                        },
                        &options,
                        &tx,
                        &progress,
                    )
                    .await
                }
            }
        });

        (rx, handle)
    }
}

#[async_trait]
impl RecordSource for SourceDefinition {
    fn category(&self) -> Category {
        self.category
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(
        &self,
        options: &FetchOptions,
        progress: Arc<dyn ProgressCallback>,
    ) -> Result<Vec<RawRecord>, SourceError> {
        let (mut rx, handle) = self.fetch_pages(options, progress);
        let mut records = Vec::new();
        while let Some(page) = rx.recv().await {
            records.extend(page);
        }
        let total = handle.await??;
        log::debug!("[{}] Fetch task reported {total} records", self.name);
        Ok(records)
    }

    fn normalize(&self, raw: &RawRecord) -> Result<NormalizedRecord, NormalizationError> {
        Self::normalize(self, raw)
    }
}

/// Parses a TOML string into a [`SourceDefinition`].
///
/// # Errors
///
/// Returns an error if the TOML is invalid or doesn't match the schema.
pub fn parse_source_toml(toml_str: &str) -> Result<SourceDefinition, toml::de::Error> {
    toml::de::from_str(toml_str)
}
