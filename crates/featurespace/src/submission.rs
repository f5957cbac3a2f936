use std::collections::BTreeMap;
use std::sync::Arc;

use advbid_protocol::WordMultiset;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::grid::CandidateMove;
use crate::strategy::{MoveKey, MoveOp, WordSource};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub key: MoveKey,
    pub count: usize,
}

/// One feature-space candidate: an append-only history of word-source edits
/// over an initial multiset. The effective multiset is computed by replay,
/// never stored, so branching a submission is cheap and branched siblings
/// can be scored in parallel without aliasing.
#[derive(Clone)]
pub struct Submission {
    initial: WordMultiset,
    /// Signed delta already realized in the document by earlier switches.
    prior_modifications: BTreeMap<String, i64>,
    extra_words: Vec<String>,
    /// Full edit history, including ancestor edits from earlier branches.
    history: Vec<HistoryEntry>,
    source: Arc<dyn WordSource>,
}

impl Submission {
    /// `words` is the current (possibly already modified) multiset,
    /// `initial` the clean document's multiset; the difference becomes the
    /// prior-modification delta.
    pub fn new(source: Arc<dyn WordSource>, words: &WordMultiset, initial: &WordMultiset) -> Self {
        Self {
            initial: initial.clone(),
            prior_modifications: words.diff(initial),
            extra_words: Vec::new(),
            history: Vec::new(),
            source,
        }
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn source(&self) -> &dyn WordSource {
        self.source.as_ref()
    }

    pub fn prior_modifications(&self) -> &BTreeMap<String, i64> {
        &self.prior_modifications
    }

    pub fn push_extra_words(&mut self, words: impl IntoIterator<Item = String>) {
        self.extra_words.extend(words);
    }

    /// Effective multiset: initial + extra + prior modifications + replayed
    /// history. History counts are aggregated per key and applied additions
    /// first, deletions second, in key order, so replay is deterministic.
    pub fn words_cnt(&self) -> WordMultiset {
        self.words_cnt_with(false)
    }

    fn words_cnt_with(&self, skip_prior: bool) -> WordMultiset {
        let mut words = self.initial.clone();
        for word in &self.extra_words {
            words.add(word, 1);
        }
        if !skip_prior {
            words.apply_signed(&self.prior_modifications);
        }

        let mut additions: BTreeMap<&MoveKey, usize> = BTreeMap::new();
        let mut deletions: BTreeMap<&MoveKey, usize> = BTreeMap::new();
        for entry in &self.history {
            let bucket = match entry.key.op {
                MoveOp::Add => &mut additions,
                MoveOp::Delete => &mut deletions,
            };
            *bucket.entry(&entry.key).or_insert(0) += entry.count;
        }
        for (key, count) in additions {
            self.source.add_words(&mut words, count, key);
        }
        for (key, count) in deletions {
            self.source.remove_words(&mut words, count, key);
        }
        words
    }

    /// Signed modification map relative to the clean document. With
    /// `skip_prior`, only this switch's edits are reported — this is the
    /// delta handed to the problem space.
    pub fn modified_words(&self, skip_prior: bool) -> BTreeMap<String, i64> {
        self.words_cnt_with(skip_prior).diff(&self.initial)
    }

    pub fn l1(&self) -> u64 {
        WordMultiset::l1_norm(&self.modified_words(false))
    }

    pub fn linf(&self) -> u64 {
        WordMultiset::linf_norm(&self.modified_words(false))
    }

    /// (deleted, added) totals relative to the clean document.
    pub fn no_modified_words(&self) -> (u64, u64) {
        let mods = self.modified_words(false);
        let added = mods.values().filter(|&&c| c > 0).map(|&c| c as u64).sum();
        let deleted = mods
            .values()
            .filter(|&&c| c < 0)
            .map(|&c| c.unsigned_abs())
            .sum();
        (deleted, added)
    }

    /// New submission with one more edit appended. Ancestor history is
    /// retained so every candidate stays auditable end-to-end.
    pub fn branch(&self, key: MoveKey, count: usize) -> Self {
        let mut child = self.clone();
        child.history.push(HistoryEntry { key, count });
        child
    }

    /// Materializes every grid move into a child, scores them in parallel,
    /// and returns the `n` lowest-loss children within the norm caps.
    pub fn successors<F>(
        &self,
        grid: &[CandidateMove],
        loss: F,
        n: usize,
        max_inf_norm: Option<u64>,
        max_man_norm: Option<u64>,
    ) -> Vec<Submission>
    where
        F: Fn(&WordMultiset) -> f64 + Sync,
    {
        let current = self.words_cnt();
        let mut scored: Vec<(usize, f64)> = grid
            .par_iter()
            .enumerate()
            .filter_map(|(idx, candidate)| {
                let mut words = current.clone();
                match candidate.key.op {
                    MoveOp::Add => {
                        self.source.add_words(&mut words, candidate.count, &candidate.key)
                    }
                    MoveOp::Delete => {
                        self.source
                            .remove_words(&mut words, candidate.count, &candidate.key)
                    }
                }
                let mods = words.diff(&self.initial);
                if let Some(cap) = max_inf_norm {
                    if WordMultiset::linf_norm(&mods) > cap {
                        return None;
                    }
                }
                if let Some(cap) = max_man_norm {
                    if WordMultiset::l1_norm(&mods) > cap {
                        return None;
                    }
                }
                Some((idx, loss(&words)))
            })
            .collect();

        scored.sort_by(|(ia, a), (ib, b)| a.total_cmp(b).then(ia.cmp(ib)));
        scored
            .into_iter()
            .take(n)
            .map(|(idx, _)| {
                let candidate = &grid[idx];
                self.branch(candidate.key.clone(), candidate.count)
            })
            .collect()
    }
}
