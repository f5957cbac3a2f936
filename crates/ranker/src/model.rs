use advbid_protocol::{ReviewerId, WordMultiset};

use crate::error::{RankerError, Result};

/// Reviewers ranked at positions `< REVIEWER_CUTOFF` (0-based) are treated
/// as assigned to the paper.
pub const REVIEWER_CUTOFF: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct RankedReviewer {
    pub reviewer: ReviewerId,
    pub score: f64,
}

/// A paper-to-reviewer assignment model, seen as a black box: it scores a
/// word multiset per reviewer and induces a total order. Implementations
/// live outside this core (topic models, trained rankers); the engine only
/// depends on this contract.
pub trait RankingModel: Send + Sync {
    /// Stable reviewer roster. Score vectors are parallel to this slice.
    fn reviewers(&self) -> &[ReviewerId];

    /// Raw (unnormalized) per-reviewer scores for a word multiset.
    fn scores(&self, words: &WordMultiset) -> Vec<f64>;

    /// Reviewers sorted by descending score. Ties break by roster order so
    /// rankings are deterministic across runs.
    fn ranking(&self, words: &WordMultiset) -> Vec<RankedReviewer> {
        let scores = self.scores(words);
        let mut ranked: Vec<(usize, f64)> = scores.into_iter().enumerate().collect();
        ranked.sort_by(|(ia, a), (ib, b)| b.total_cmp(a).then(ia.cmp(ib)));
        ranked
            .into_iter()
            .map(|(idx, score)| RankedReviewer {
                reviewer: self.reviewers()[idx].clone(),
                score,
            })
            .collect()
    }

    /// 0-based rank of a reviewer for a word multiset.
    fn rank_of(&self, reviewer: &str, words: &WordMultiset) -> Result<usize> {
        self.ranking(words)
            .iter()
            .position(|r| r.reviewer == reviewer)
            .ok_or_else(|| RankerError::UnknownReviewer(reviewer.to_owned()))
    }

    /// Roster index of a reviewer.
    fn reviewer_index(&self, reviewer: &str) -> Result<usize> {
        self.reviewers()
            .iter()
            .position(|r| r == reviewer)
            .ok_or_else(|| RankerError::UnknownReviewer(reviewer.to_owned()))
    }
}
