use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// What a transformer actually changed, relative to the changes it was asked
/// for: a sparse word -> signed-count map, plus the words it found
/// unrealizable (these feed the feature-space blocking list).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureDelta {
    #[serde(default)]
    pub changes: BTreeMap<String, i64>,
    #[serde(default)]
    pub unrealizable: BTreeSet<String>,
}

impl FeatureDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn get(&self, word: &str) -> i64 {
        self.changes.get(word).copied().unwrap_or(0)
    }

    /// Adds `count` to the entry for `word`, dropping the entry if it nets
    /// out to zero.
    pub fn record(&mut self, word: &str, count: i64) {
        if count == 0 {
            return;
        }
        let entry = self.changes.entry(word.to_owned()).or_insert(0);
        *entry += count;
        if *entry == 0 {
            self.changes.remove(word);
        }
    }

    pub fn set(&mut self, word: &str, count: i64) {
        if count == 0 {
            self.changes.remove(word);
        } else {
            self.changes.insert(word.to_owned(), count);
        }
    }

    pub fn mark_unrealizable(&mut self, word: &str) {
        self.unrealizable.insert(word.to_owned());
    }
}
