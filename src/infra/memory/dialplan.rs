//! Recording dialplan.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::core::{Dialplan, Extension, ExtensionPriority, SlaError};

type Key = (String, String, ExtensionPriority);

/// Dialplan that keeps extensions in memory, grouped by context.
#[derive(Default)]
pub struct MemoryDialplan {
    entries: Mutex<BTreeMap<Key, (String, Extension)>>,
}

impl MemoryDialplan {
    /// Empty dialplan.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up one extension.
    #[must_use]
    pub fn get(&self, context: &str, exten: &str, priority: ExtensionPriority) -> Option<Extension> {
        self.entries
            .lock()
            .get(&(context.to_owned(), exten.to_owned(), priority))
            .map(|(_, e)| e.clone())
    }

    /// Extensions in `context`.
    #[must_use]
    pub fn extensions(&self, context: &str) -> Vec<Extension> {
        self.entries
            .lock()
            .iter()
            .filter(|((ctx, _, _), _)| ctx == context)
            .map(|(_, (_, e))| e.clone())
            .collect()
    }

    /// Total number of extensions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no extension is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Dialplan for MemoryDialplan {
    fn add_extension(&self, context: &str, registrar: &str, extension: Extension) -> Result<(), SlaError> {
        if context.is_empty() {
            return Err(SlaError::Dialplan("context name required".into()));
        }
        let key = (context.to_owned(), extension.exten.clone(), extension.priority);
        self.entries
            .lock()
            .insert(key, (registrar.to_owned(), extension));
        Ok(())
    }

    fn remove_extension(&self, context: &str, exten: &str, priority: ExtensionPriority, registrar: &str) {
        let mut entries = self.entries.lock();
        let key = (context.to_owned(), exten.to_owned(), priority);
        if entries.get(&key).is_some_and(|(owner, _)| owner == registrar) {
            entries.remove(&key);
        }
    }

    fn remove_registrar(&self, registrar: &str) {
        self.entries.lock().retain(|_, (owner, _)| owner != registrar);
    }
}
