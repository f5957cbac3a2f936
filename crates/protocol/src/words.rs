use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Bag-of-words representation of a document: word -> occurrence count.
///
/// This is the feature space the ranking model sees. Counts never go
/// negative; applying a signed delta clamps at zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WordMultiset {
    counts: HashMap<String, u32>,
}

impl WordMultiset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut counts: HashMap<String, u32> = HashMap::new();
        for word in words {
            *counts.entry(word.into()).or_insert(0) += 1;
        }
        Self { counts }
    }

    pub fn count(&self, word: &str) -> u32 {
        self.counts.get(word).copied().unwrap_or(0)
    }

    pub fn contains(&self, word: &str) -> bool {
        self.count(word) > 0
    }

    /// Total number of word occurrences.
    pub fn total(&self) -> u64 {
        self.counts.values().map(|&c| u64::from(c)).sum()
    }

    /// Number of distinct words.
    pub fn distinct(&self) -> usize {
        self.counts.iter().filter(|(_, &c)| c > 0).count()
    }

    pub fn add(&mut self, word: &str, count: u32) {
        if count > 0 {
            *self.counts.entry(word.to_owned()).or_insert(0) += count;
        }
    }

    /// Removes up to `count` occurrences; returns how many were removed.
    pub fn remove(&mut self, word: &str, count: u32) -> u32 {
        match self.counts.get_mut(word) {
            Some(current) => {
                let removed = count.min(*current);
                *current -= removed;
                removed
            }
            None => 0,
        }
    }

    /// Applies a signed word->count delta, clamping every count at zero.
    pub fn apply_signed(&mut self, changes: &BTreeMap<String, i64>) {
        for (word, &delta) in changes {
            if delta >= 0 {
                self.add(word, delta as u32);
            } else {
                self.remove(word, delta.unsigned_abs().min(u64::from(u32::MAX)) as u32);
            }
        }
    }

    /// Signed difference `self - initial` per word (positive = added).
    pub fn diff(&self, initial: &WordMultiset) -> BTreeMap<String, i64> {
        let mut modifications = BTreeMap::new();
        for (word, &count) in &self.counts {
            let delta = i64::from(count) - i64::from(initial.count(word));
            if delta != 0 {
                modifications.insert(word.clone(), delta);
            }
        }
        for (word, &count) in &initial.counts {
            if !self.counts.contains_key(word) && count > 0 {
                modifications.insert(word.clone(), -i64::from(count));
            }
        }
        modifications
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.counts
            .iter()
            .filter(|(_, &c)| c > 0)
            .map(|(w, &c)| (w.as_str(), c))
    }

    /// Expands back into a word list (order unspecified).
    pub fn to_words(&self) -> Vec<String> {
        let mut words = Vec::with_capacity(self.total() as usize);
        for (word, count) in self.iter() {
            for _ in 0..count {
                words.push(word.to_owned());
            }
        }
        words
    }

    /// L1 norm of a signed modification map.
    pub fn l1_norm(changes: &BTreeMap<String, i64>) -> u64 {
        changes.values().map(|c| c.unsigned_abs()).sum()
    }

    /// L-infinity norm of a signed modification map.
    pub fn linf_norm(changes: &BTreeMap<String, i64>) -> u64 {
        changes.values().map(|c| c.unsigned_abs()).max().unwrap_or(0)
    }
}

impl FromIterator<String> for WordMultiset {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self::from_words(iter)
    }
}
