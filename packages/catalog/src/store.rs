//! On-disk catalog snapshots.
//!
//! Each publish writes a complete snapshot into a fresh directory, then
//! makes it current by atomically renaming a new `CURRENT` pointer file
//! over the old one. Readers follow the pointer, so they see either the
//! previous snapshot or the new one, never a mix. Superseded snapshot
//! directories are removed after the pointer moves.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write as _};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use efficiency_index_appliance_models::Category;
use efficiency_index_catalog_models::{Catalog, DatabaseStats};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::PersistenceError;
use crate::paths::{
    self, MANIFEST_FILE, REPORT_FILE, STATS_FILE, catalog_dir, category_file, current_pointer,
    snapshots_dir,
};

/// Snapshot metadata written as `manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    /// Snapshot directory name.
    pub snapshot_id: String,
    /// When the pipeline produced the snapshot.
    pub generated_at: DateTime<Utc>,
    /// Threshold table version used for scoring.
    pub thresholds_version: String,
    /// Region table version used for impacts.
    pub regions_version: String,
    /// Precomputed region ids.
    pub regions: Vec<String>,
    /// Categories present in the snapshot.
    pub categories: Vec<Category>,
}

/// Builds a new snapshot id: a sortable UTC timestamp plus a random suffix.
#[must_use]
pub fn new_snapshot_id(generated_at: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}",
        generated_at.format("%Y%m%dT%H%M%S%3fZ"),
        &suffix[..8]
    )
}

/// Reads and writes catalog snapshots under `<data_dir>/catalog/`.
#[derive(Debug, Clone)]
pub struct CatalogStore {
    root: PathBuf,
}

impl CatalogStore {
    /// A store rooted at `<data_dir>/catalog/`.
    #[must_use]
    pub fn new(data_dir: &Path) -> Self {
        Self {
            root: catalog_dir(data_dir),
        }
    }

    /// A store rooted at the default data directory.
    #[must_use]
    pub fn open_default() -> Self {
        Self::new(&paths::data_dir())
    }

    /// The `catalog/` directory this store manages.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of the snapshot named `snapshot_id`.
    #[must_use]
    pub fn snapshot_dir(&self, snapshot_id: &str) -> PathBuf {
        snapshots_dir(&self.root).join(snapshot_id)
    }

    /// Writes `catalog` and `report` as a new snapshot and makes it current.
    ///
    /// Returns the snapshot directory.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if any file cannot be written. The
    /// previous snapshot stays current on failure.
    pub fn publish<R: Serialize>(
        &self,
        catalog: &Catalog,
        report: &R,
    ) -> Result<PathBuf, PersistenceError> {
        let id = &catalog.snapshot_id;
        if id.is_empty() || id.starts_with('.') || id.contains(['/', '\\']) {
            return Err(PersistenceError::InvalidSnapshotId { id: id.clone() });
        }

        let snapshots = snapshots_dir(&self.root);
        create_dir_all(&snapshots)?;

        let staging = snapshots.join(format!(".staging-{id}"));
        if staging.exists() {
            remove_dir_all(&staging)?;
        }
        create_dir_all(&staging)?;

        let manifest = SnapshotManifest {
            snapshot_id: id.clone(),
            generated_at: catalog.generated_at,
            thresholds_version: catalog.thresholds_version.clone(),
            regions_version: catalog.regions_version.clone(),
            regions: catalog.regions.clone(),
            categories: catalog.categories.keys().copied().collect(),
        };
        write_json(&staging.join(MANIFEST_FILE), &manifest)?;
        write_json(&staging.join(STATS_FILE), &catalog.stats)?;
        write_json(&staging.join(REPORT_FILE), report)?;
        for (category, entries) in &catalog.categories {
            write_json(&category_file(&staging, *category), entries)?;
        }

        let final_dir = self.snapshot_dir(id);
        rename(&staging, &final_dir)?;

        let pointer = current_pointer(&self.root);
        let pointer_tmp = self.root.join("CURRENT.tmp");
        {
            let mut file = File::create(&pointer_tmp).map_err(|e| io_err(&pointer_tmp, e))?;
            writeln!(file, "{id}").map_err(|e| io_err(&pointer_tmp, e))?;
            file.sync_all().map_err(|e| io_err(&pointer_tmp, e))?;
        }
        rename(&pointer_tmp, &pointer)?;

        log::info!("Published catalog snapshot {id} to {}", final_dir.display());
        self.prune(id);

        Ok(final_dir)
    }

    /// Removes every snapshot directory except `keep`. Failures are logged.
    fn prune(&self, keep: &str) {
        let Ok(dir) = std::fs::read_dir(snapshots_dir(&self.root)) else {
            return;
        };
        for entry in dir.flatten() {
            let name = entry.file_name();
            if name.to_string_lossy() == keep {
                continue;
            }
            let path = entry.path();
            match std::fs::remove_dir_all(&path) {
                Ok(()) => log::debug!("Removed superseded snapshot {}", path.display()),
                Err(e) => log::warn!("Failed to remove {}: {e}", path.display()),
            }
        }
    }

    /// Id of the current snapshot, or `None` if nothing was published yet.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the pointer exists but cannot be read.
    pub fn current_id(&self) -> Result<Option<String>, PersistenceError> {
        let pointer = current_pointer(&self.root);
        match std::fs::read_to_string(&pointer) {
            Ok(text) => {
                let id = text.trim();
                Ok((!id.is_empty()).then(|| id.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(&pointer, e)),
        }
    }

    /// Loads the current snapshot, or `None` if nothing was published yet.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the snapshot files are missing or
    /// malformed.
    pub fn load_current(&self) -> Result<Option<Catalog>, PersistenceError> {
        self.current_id()?.map(|id| self.load(&id)).transpose()
    }

    /// Loads the snapshot named `snapshot_id`.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the snapshot files are missing or
    /// malformed.
    pub fn load(&self, snapshot_id: &str) -> Result<Catalog, PersistenceError> {
        let dir = self.snapshot_dir(snapshot_id);
        let manifest: SnapshotManifest = read_json(&dir.join(MANIFEST_FILE))?;
        let stats: DatabaseStats = read_json(&dir.join(STATS_FILE))?;

        let mut categories = std::collections::BTreeMap::new();
        for category in &manifest.categories {
            categories.insert(*category, read_json(&category_file(&dir, *category))?);
        }

        log::debug!(
            "Loaded snapshot {snapshot_id}: {} models in {} categories",
            stats.total_models,
            categories.len()
        );

        Ok(Catalog {
            snapshot_id: manifest.snapshot_id,
            generated_at: manifest.generated_at,
            thresholds_version: manifest.thresholds_version,
            regions_version: manifest.regions_version,
            regions: manifest.regions,
            categories,
            stats,
        })
    }

    /// Loads the current snapshot's pipeline report as untyped JSON.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the report exists but is malformed.
    pub fn load_current_report(&self) -> Result<Option<serde_json::Value>, PersistenceError> {
        self.current_id()?
            .map(|id| read_json(&self.snapshot_dir(&id).join(REPORT_FILE)))
            .transpose()
    }
}

fn io_err(path: &Path, source: std::io::Error) -> PersistenceError {
    PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn create_dir_all(path: &Path) -> Result<(), PersistenceError> {
    std::fs::create_dir_all(path).map_err(|e| io_err(path, e))
}

fn remove_dir_all(path: &Path) -> Result<(), PersistenceError> {
    std::fs::remove_dir_all(path).map_err(|e| io_err(path, e))
}

fn rename(from: &Path, to: &Path) -> Result<(), PersistenceError> {
    std::fs::rename(from, to).map_err(|e| io_err(to, e))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    let file = File::create(path).map_err(|e| io_err(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value).map_err(|source| PersistenceError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(|e| io_err(path, e))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, PersistenceError> {
    let file = File::open(path).map_err(|e| io_err(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| PersistenceError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use efficiency_index_appliance_models::{EfficiencyRating, FuelType};
    use efficiency_index_catalog_models::{CatalogEntry, ScoredRecord};
    use efficiency_index_source_models::NormalizedRecord;

    use super::*;
    use crate::stats::database_stats;

    fn catalog(id: &str, models: &[&str]) -> Catalog {
        let entries: Vec<CatalogEntry> = models
            .iter()
            .map(|model| CatalogEntry {
                scored: ScoredRecord {
                    record: NormalizedRecord {
                        manufacturer: "LG".to_string(),
                        model_number: (*model).to_string(),
                        category: Category::Refrigerators,
                        fuel: FuelType::Electric,
                        annual_energy_kwh_equivalent: 400.0,
                        annual_therms: None,
                        capacity_or_throughput: 20.0,
                        efficiency_factor: None,
                        energy_star_certified: true,
                    },
                    open_efficiency_score: 93.0,
                    efficiency_rating: EfficiencyRating::APlus,
                    raw_efficiency_ratio: 0.05,
                    efficiency_percentile: 100.0,
                },
                regional_impact: BTreeMap::new(),
            })
            .collect();
        let mut categories = BTreeMap::new();
        categories.insert(Category::Refrigerators, entries);
        let generated_at = Utc::now();
        Catalog {
            snapshot_id: id.to_string(),
            generated_at,
            thresholds_version: "t1".to_string(),
            regions_version: "r1".to_string(),
            regions: vec!["us_average".to_string()],
            stats: database_stats(&categories, generated_at),
            categories,
        }
    }

    #[test]
    fn empty_store_has_no_current_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = CatalogStore::new(dir.path());
        assert!(store.current_id().unwrap().is_none());
        assert!(store.load_current().unwrap().is_none());
    }

    #[test]
    fn publish_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = CatalogStore::new(dir.path());
        let original = catalog("snap-1", &["A1", "A2"]);

        store
            .publish(&original, &serde_json::json!({"committed": true}))
            .unwrap();

        assert_eq!(store.current_id().unwrap().as_deref(), Some("snap-1"));
        let loaded = store.load_current().unwrap().unwrap();
        assert_eq!(loaded, original);
        assert_eq!(
            store.load_current_report().unwrap().unwrap()["committed"],
            true
        );
    }

    #[test]
    fn publish_replaces_and_prunes_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = CatalogStore::new(dir.path());
        store
            .publish(&catalog("snap-1", &["A1"]), &serde_json::json!({}))
            .unwrap();
        store
            .publish(&catalog("snap-2", &["B1"]), &serde_json::json!({}))
            .unwrap();

        let loaded = store.load_current().unwrap().unwrap();
        assert_eq!(loaded.snapshot_id, "snap-2");
        assert!(loaded.find_model("A1").is_none());
        assert!(!store.snapshot_dir("snap-1").exists());
    }

    #[test]
    fn rejects_path_like_snapshot_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = CatalogStore::new(dir.path());
        let err = store
            .publish(&catalog("../escape", &["A1"]), &serde_json::json!({}))
            .unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidSnapshotId { .. }));
        assert!(store.current_id().unwrap().is_none());
    }

    #[test]
    fn snapshot_ids_sort_by_time() {
        let earlier = new_snapshot_id("2024-01-01T00:00:00Z".parse().unwrap());
        let later = new_snapshot_id("2024-06-01T00:00:00Z".parse().unwrap());
        assert!(earlier < later);
        assert!(earlier.starts_with("20240101T000000000Z-"));
    }
}
