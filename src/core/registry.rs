//! Case-insensitive directories of live trunks and stations.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::model::{Station, Trunk};
use crate::core::SlaError;

/// Objects stored in a [`Registry`].
pub trait Named {
    /// Kind label used in errors.
    const KIND: &'static str;
    /// Configured name.
    fn name(&self) -> &str;
}

impl Named for Trunk {
    const KIND: &'static str = "trunk";
    fn name(&self) -> &str {
        Self::name(self)
    }
}

impl Named for Station {
    const KIND: &'static str = "station";
    fn name(&self) -> &str {
        Self::name(self)
    }
}

/// Concurrent name-to-object map.
///
/// Lookups hand out a cloned [`Arc`], so an object evicted while a call is
/// using it stays alive until that call lets go.
pub struct Registry<T> {
    entries: RwLock<HashMap<String, Arc<T>>>,
}

impl<T: Named> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn key(name: &str) -> String {
    name.to_lowercase()
}

impl<T: Named> Registry<T> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Look up an object by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<Arc<T>> {
        self.entries.read().get(&key(name)).cloned()
    }

    /// Look up an object by name, failing with [`SlaError::NotFound`].
    pub fn get(&self, name: &str) -> Result<Arc<T>, SlaError> {
        self.find(name)
            .ok_or_else(|| SlaError::NotFound(format!("{} {name}", T::KIND)))
    }

    /// Return the object named like `object`, inserting `object` if absent.
    ///
    /// The second value is `true` when the object was newly inserted.
    pub fn upsert(&self, object: Arc<T>) -> (Arc<T>, bool) {
        let mut entries = self.entries.write();
        let k = key(object.name());
        if let Some(existing) = entries.get(&k) {
            return (Arc::clone(existing), false);
        }
        entries.insert(k, Arc::clone(&object));
        (object, true)
    }

    /// Unlink the object with `name`.
    pub fn remove(&self, name: &str) -> Option<Arc<T>> {
        self.entries.write().remove(&key(name))
    }

    /// All objects, ordered by name.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        let mut all: Vec<Arc<T>> = self.entries.read().values().cloned().collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    /// Unlink everything and return what was stored.
    pub fn drain(&self) -> Vec<Arc<T>> {
        self.entries.write().drain().map(|(_, v)| v).collect()
    }

    /// Number of objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
