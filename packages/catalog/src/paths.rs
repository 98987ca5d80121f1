#![allow(clippy::module_name_repetitions)]
//! Canonical file paths for the catalog data directory.
//!
//! ```text
//! <data_dir>/catalog/CURRENT
//! <data_dir>/catalog/snapshots/<snapshot_id>/manifest.json
//! <data_dir>/catalog/snapshots/<snapshot_id>/stats.json
//! <data_dir>/catalog/snapshots/<snapshot_id>/pipeline_report.json
//! <data_dir>/catalog/snapshots/<snapshot_id>/<category>.json
//! ```

use std::path::{Path, PathBuf};

use efficiency_index_appliance_models::Category;

/// Environment variable that overrides the data directory.
pub const DATA_DIR_ENV: &str = "EFFICIENCY_INDEX_DATA_DIR";

/// Returns the workspace root directory, resolved at compile time from
/// `CARGO_MANIFEST_DIR`.
#[must_use]
pub fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Returns the data directory: `$EFFICIENCY_INDEX_DATA_DIR` if set,
/// otherwise `data/` under the project root.
#[must_use]
pub fn data_dir() -> PathBuf {
    std::env::var_os(DATA_DIR_ENV)
        .filter(|v| !v.is_empty())
        .map_or_else(|| project_root().join("data"), PathBuf::from)
}

/// Returns the `catalog/` directory under `data_dir`.
#[must_use]
pub fn catalog_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("catalog")
}

/// Returns the directory holding every published snapshot.
#[must_use]
pub fn snapshots_dir(catalog_dir: &Path) -> PathBuf {
    catalog_dir.join("snapshots")
}

/// Returns the pointer file naming the current snapshot.
#[must_use]
pub fn current_pointer(catalog_dir: &Path) -> PathBuf {
    catalog_dir.join("CURRENT")
}

/// Returns the file holding one category's entries.
#[must_use]
pub fn category_file(snapshot_dir: &Path, category: Category) -> PathBuf {
    snapshot_dir.join(format!("{category}.json"))
}

/// Snapshot manifest file name.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Aggregate statistics file name.
pub const STATS_FILE: &str = "stats.json";

/// Pipeline run report file name.
pub const REPORT_FILE: &str = "pipeline_report.json";
