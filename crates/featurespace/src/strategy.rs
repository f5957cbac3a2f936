use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};

use advbid_protocol::{ReviewerId, WordMultiset};
use advbid_ranker::{LexiconModel, RankingModel};
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveOp {
    Add,
    Delete,
}

/// Whether the move is meant to pull the targeted reviewer into the
/// assignment or push them out of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContrastMode {
    Promote,
    Demote,
}

/// Addresses one word list inside a word source: the targeted reviewer, the
/// neighbouring reviewers it is contrasted against, and the direction of the
/// edit. Two submissions sharing a source see identical lists for identical
/// keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MoveKey {
    pub surrogate: usize,
    pub reviewer: ReviewerId,
    pub others: Vec<ReviewerId>,
    pub mode: ContrastMode,
    pub op: MoveOp,
}

impl std::fmt::Display for MoveKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match self.mode {
            ContrastMode::Promote => "promote",
            ContrastMode::Demote => "demote",
        };
        let op = match self.op {
            MoveOp::Add => "add",
            MoveOp::Delete => "del",
        };
        write!(
            f,
            "s{}/{}/{}/{}/{}",
            self.surrogate,
            self.reviewer,
            self.others.join(","),
            mode,
            op
        )
    }
}

/// Word-source contract consumed by the grid builder and by submission
/// replay. Lists are stable per key: removal never removes more instances
/// than present, and replaying the same `(key, count)` yields the same words.
pub trait WordSource: Send + Sync {
    /// The sampled word list behind a key (empty when the key yields no
    /// admissible words).
    fn words_for(&self, key: &MoveKey) -> Arc<Vec<String>>;

    fn has_words(&self, key: &MoveKey) -> bool {
        !self.words_for(key).is_empty()
    }

    /// Adds the first `count` sampled words to the multiset.
    fn add_words(&self, words: &mut WordMultiset, count: usize, key: &MoveKey) {
        for word in self.words_for(key).iter().take(count) {
            words.add(word, 1);
        }
    }

    /// Walks the sampled list removing present words until `count` removals
    /// succeeded or the list ends.
    fn remove_words(&self, words: &mut WordMultiset, count: usize, key: &MoveKey) {
        let mut removed = 0;
        for word in self.words_for(key).iter() {
            if removed == count {
                break;
            }
            if words.remove(word, 1) == 1 {
                removed += 1;
            }
        }
    }
}

/// Reviewer-contrast word source: words predictive for the targeted reviewer
/// but not their ranking neighbours (or vice versa), weighted-sampled from
/// the surrogate lexicons.
///
/// The sample cache is owned by the instance and filled lazily behind an
/// `RwLock`; each key derives its own RNG seed, so concurrent candidate
/// scoring sees deterministic lists without a shared-cursor bottleneck.
pub struct ContrastWordSource {
    rosters: Vec<Vec<ReviewerId>>,
    reviewer_words: Vec<Vec<HashMap<String, f64>>>,
    submission_words: WordMultiset,
    blocked: HashSet<String>,
    n_sample_words: usize,
    seed: u64,
    cache: RwLock<HashMap<MoveKey, Arc<Vec<String>>>>,
}

impl ContrastWordSource {
    pub fn new(
        surrogates: &[Arc<LexiconModel>],
        submission_words: WordMultiset,
        blocked: impl IntoIterator<Item = String>,
        n_sample_words: usize,
        seed: u64,
    ) -> Self {
        let rosters = surrogates
            .iter()
            .map(|model| model.reviewers().to_vec())
            .collect();
        let reviewer_words = surrogates
            .iter()
            .map(|model| {
                (0..model.reviewers().len())
                    .map(|idx| model.reviewer_words(idx).clone())
                    .collect()
            })
            .collect();
        Self {
            rosters,
            reviewer_words,
            submission_words,
            blocked: blocked.into_iter().collect(),
            n_sample_words,
            seed,
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn reviewer_index(&self, surrogate: usize, reviewer: &str) -> Option<usize> {
        self.rosters
            .get(surrogate)?
            .iter()
            .position(|r| r == reviewer)
    }

    /// Word pool and weights for a key, before sampling.
    fn candidate_pool(&self, key: &MoveKey) -> Vec<(String, f64)> {
        let Some(target_idx) = self.reviewer_index(key.surrogate, &key.reviewer) else {
            return Vec::new();
        };
        let lexicon = &self.reviewer_words[key.surrogate];
        let target_words = &lexicon[target_idx];
        let other_indices: Vec<usize> = key
            .others
            .iter()
            .filter_map(|r| self.reviewer_index(key.surrogate, r))
            .collect();

        let target_weighted = matches!(
            (key.mode, key.op),
            (ContrastMode::Promote, MoveOp::Add) | (ContrastMode::Demote, MoveOp::Delete)
        ) || other_indices.is_empty();

        let words: Vec<String> = if other_indices.is_empty() {
            target_words.keys().cloned().collect()
        } else if target_weighted {
            // Predictive for the target but none of the neighbours.
            target_words
                .keys()
                .filter(|word| {
                    other_indices
                        .iter()
                        .all(|&idx| !lexicon[idx].contains_key(*word))
                })
                .cloned()
                .collect()
        } else {
            // Predictive for every neighbour but not the target.
            let first = &lexicon[other_indices[0]];
            first
                .keys()
                .filter(|word| {
                    other_indices[1..]
                        .iter()
                        .all(|&idx| lexicon[idx].contains_key(*word))
                        && !target_words.contains_key(*word)
                })
                .cloned()
                .collect()
        };

        words
            .into_iter()
            .filter(|word| !self.blocked.contains(word))
            .filter(|word| key.op != MoveOp::Delete || self.submission_words.contains(word))
            .map(|word| {
                let weight = if target_weighted {
                    target_words.get(&word).copied().unwrap_or(0.0)
                } else {
                    let sum: f64 = other_indices
                        .iter()
                        .map(|&idx| lexicon[idx].get(&word).copied().unwrap_or(0.0))
                        .sum();
                    sum / other_indices.len() as f64
                };
                (word, weight)
            })
            .filter(|(_, weight)| *weight > 0.0)
            .collect()
    }

    fn key_seed(&self, key: &MoveKey) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        self.seed ^ hasher.finish()
    }
}

impl WordSource for ContrastWordSource {
    fn words_for(&self, key: &MoveKey) -> Arc<Vec<String>> {
        if let Some(cached) = self.cache.read().expect("cache poisoned").get(key) {
            return Arc::clone(cached);
        }

        let pool = self.candidate_pool(key);
        let sampled = if pool.is_empty() {
            Vec::new()
        } else {
            let mut rng = StdRng::seed_from_u64(self.key_seed(key));
            let weights: Vec<f64> = pool.iter().map(|(_, w)| *w).collect();
            match WeightedIndex::new(&weights) {
                Ok(dist) => (0..self.n_sample_words)
                    .map(|_| pool[dist.sample(&mut rng)].0.clone())
                    .collect(),
                Err(_) => Vec::new(),
            }
        };

        let sampled = Arc::new(sampled);
        self.cache
            .write()
            .expect("cache poisoned")
            .insert(key.clone(), Arc::clone(&sampled));
        sampled
    }
}
