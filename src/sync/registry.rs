//! Tracks which model types hold unflushed documents within one unit of work.

use std::collections::BTreeSet;

use parking_lot::Mutex;

/// Model types that queued documents since the last commit sweep.
#[derive(Debug, Default)]
pub struct PendingRegistry {
    models: Mutex<BTreeSet<String>>,
}

impl PendingRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self, model: &str) {
        let mut models = self.models.lock();
        if !models.contains(model) {
            models.insert(model.to_string());
        }
    }

    #[must_use]
    pub fn contains(&self, model: &str) -> bool {
        self.models.lock().contains(model)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.models.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.lock().is_empty()
    }

    /// Drain the registry, returning the marked models in name order.
    pub fn take_all(&self) -> Vec<String> {
        std::mem::take(&mut *self.models.lock()).into_iter().collect()
    }
}
