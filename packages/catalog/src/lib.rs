#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Catalog assembly, persistence, and the live snapshot handle.
//!
//! The pipeline assembles a [`Catalog`] with [`assemble`], persists it with
//! [`CatalogStore::publish`], and the query side serves it through a
//! [`CatalogHandle`].

pub mod handle;
pub mod paths;
pub mod stats;
pub mod store;

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use efficiency_index_appliance_models::Category;
use efficiency_index_catalog_models::{Catalog, CatalogEntry};

pub use handle::CatalogHandle;
pub use store::{CatalogStore, SnapshotManifest, new_snapshot_id};

/// Errors raised while reading or writing snapshots.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Filesystem operation failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A snapshot file is not valid JSON or doesn't match the schema.
    #[error("malformed snapshot file {path}: {source}")]
    Json {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// Snapshot ids become directory names and must be plain.
    #[error("invalid snapshot id '{id}'")]
    InvalidSnapshotId {
        /// The rejected id.
        id: String,
    },
}

/// Versions and region list recorded with a snapshot.
#[derive(Debug, Clone)]
pub struct CatalogMetadata {
    /// When the pipeline run started.
    pub generated_at: DateTime<Utc>,
    /// Threshold table version.
    pub thresholds_version: String,
    /// Region table version.
    pub regions_version: String,
    /// Precomputed region ids.
    pub regions: Vec<String>,
}

/// Builds a catalog from finished categories: sorts each category into
/// ranking order and computes aggregate statistics.
#[must_use]
pub fn assemble(
    metadata: CatalogMetadata,
    mut categories: BTreeMap<Category, Vec<CatalogEntry>>,
) -> Catalog {
    for entries in categories.values_mut() {
        entries.sort_by(stats::ranking_order);
    }
    let stats = stats::database_stats(&categories, metadata.generated_at);

    Catalog {
        snapshot_id: new_snapshot_id(metadata.generated_at),
        generated_at: metadata.generated_at,
        thresholds_version: metadata.thresholds_version,
        regions_version: metadata.regions_version,
        regions: metadata.regions,
        categories,
        stats,
    }
}
