//! Atomically swappable reference to the live catalog.

use std::sync::{Arc, PoisonError, RwLock};

use efficiency_index_catalog_models::Catalog;

use crate::PersistenceError;
use crate::store::CatalogStore;

/// Shared handle to the current catalog snapshot.
///
/// Readers take a cheap [`Arc`] clone and release the lock immediately, so
/// a request keeps a consistent snapshot for its whole lifetime even if a
/// newer one is swapped in meanwhile.
#[derive(Debug)]
pub struct CatalogHandle {
    current: RwLock<Arc<Catalog>>,
}

impl CatalogHandle {
    /// Wraps an initial snapshot.
    #[must_use]
    pub fn new(catalog: Catalog) -> Self {
        Self {
            current: RwLock::new(Arc::new(catalog)),
        }
    }

    /// The current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Catalog> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replaces the current snapshot, returning the previous one.
    pub fn replace(&self, catalog: Catalog) -> Arc<Catalog> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(catalog))
    }

    /// Loads the store's current snapshot if it differs from the one being
    /// served. Returns `true` if a new snapshot was swapped in.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the new snapshot cannot be loaded;
    /// the handle keeps serving the old one.
    pub fn reload_if_changed(&self, store: &CatalogStore) -> Result<bool, PersistenceError> {
        let Some(id) = store.current_id()? else {
            return Ok(false);
        };
        if id == self.snapshot().snapshot_id {
            return Ok(false);
        }
        let catalog = store.load(&id)?;
        let previous = self.replace(catalog);
        log::info!(
            "Swapped catalog snapshot {} -> {id}",
            if previous.snapshot_id.is_empty() {
                "(empty)"
            } else {
                previous.snapshot_id.as_str()
            }
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readers_keep_their_snapshot_across_swaps() {
        let handle = CatalogHandle::new(Catalog::empty());
        let before = handle.snapshot();

        let mut next = Catalog::empty();
        next.snapshot_id = "next".to_string();
        handle.replace(next);

        assert_eq!(before.snapshot_id, "");
        assert_eq!(handle.snapshot().snapshot_id, "next");
    }

    #[test]
    fn reload_without_published_snapshot_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = CatalogStore::new(dir.path());
        let handle = CatalogHandle::new(Catalog::empty());
        assert!(!handle.reload_if_changed(&store).unwrap());
    }
}
