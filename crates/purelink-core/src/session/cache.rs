// ── Cached device state ──

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Last-known device state, key → value, last writer wins per key.
///
/// All access goes through a short critical section; readers get a copy.
#[derive(Debug, Default)]
pub struct StateCache {
    values: Mutex<HashMap<String, String>>,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    pub fn snapshot(&self) -> HashMap<String, String> {
        self.lock().clone()
    }

    /// Union update: every given key is overwritten, the rest kept.
    pub fn update(&self, values: HashMap<String, String>) {
        self.lock().extend(values);
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
