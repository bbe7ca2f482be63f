//! Dataset name to backend dataset id registry.
//!
//! The backend allocates a dataset id on the first write to a new name, so the
//! mapping is learned at runtime from write receipts and may be seeded from
//! configuration.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use mnemos_backend::WriteReceipt;
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct DatasetRegistry {
    ids: RwLock<HashMap<String, String>>,
}

impl DatasetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_datasets<I, K, V>(seed: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let ids = seed
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(k, v): &(String, String)| !k.trim().is_empty() && !v.trim().is_empty())
            .collect();
        Self {
            ids: RwLock::new(ids),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, String>> {
        self.ids.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, String>> {
        self.ids.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `name → id`. Returns the previous id when it changed. Blank
    /// names or ids are ignored.
    pub fn register(&self, name: &str, id: &str) -> Option<String> {
        if name.trim().is_empty() || id.trim().is_empty() {
            debug!(dataset = %name, dataset_id = %id, "ignoring blank dataset mapping");
            return None;
        }
        let previous = self.write().insert(name.to_string(), id.to_string());
        match previous {
            Some(ref old) if old != id => {
                info!(
                    dataset = %name,
                    old_id = %old,
                    new_id = %id,
                    "backend reassigned dataset id"
                );
                previous
            }
            Some(_) => None,
            None => {
                debug!(dataset = %name, dataset_id = %id, "dataset id learned");
                None
            }
        }
    }

    pub fn record_receipt(&self, receipt: &WriteReceipt) {
        self.register(&receipt.dataset_name, &receipt.dataset_id);
    }

    pub fn id_for(&self, name: &str) -> Option<String> {
        self.read().get(name).cloned()
    }

    /// `(name, id)` pairs for the names that have an id, in the given order.
    pub fn resolve(&self, names: &[String]) -> Vec<(String, String)> {
        let ids = self.read();
        names
            .iter()
            .filter_map(|n| ids.get(n).map(|id| (n.clone(), id.clone())))
            .collect()
    }

    pub fn snapshot(&self) -> HashMap<String, String> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
