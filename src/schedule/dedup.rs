//! Per-category record of the most recent firing.

use super::decider::EventKey;
use super::table::Category;
use std::collections::HashMap;

/// Remembers the last fired [`EventKey`] per [`Category`].
///
/// Only the most recent key per category is kept: the decider only ever
/// compares against "now", so older keys can never match again. The engine
/// guards this with a mutex; `record` happens before the next `decide`.
#[derive(Debug, Clone, Default)]
pub struct DedupGuard {
    last: HashMap<Category, EventKey>,
}

impl DedupGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `key` as the latest firing for its category.
    pub fn record(&mut self, key: EventKey) {
        self.last.insert(key.category, key);
    }

    pub fn last_key(&self, category: Category) -> Option<&EventKey> {
        self.last.get(&category)
    }

    /// `true` when `key` is the last recorded firing of its category.
    pub fn has_fired(&self, key: &EventKey) -> bool {
        self.last_key(key.category) == Some(key)
    }

    /// Forget every recorded firing.
    pub fn reset(&mut self) {
        self.last.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }
}
