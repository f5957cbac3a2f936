use advbid_protocol::{FeatureSpaceConfig, Target};
use advbid_ranker::RankingModel;
use rand::prelude::*;

use crate::strategy::{ContrastMode, MoveKey, MoveOp, WordSource};
use crate::submission::Submission;

/// One admissible edit, generated per round and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateMove {
    pub key: MoveKey,
    pub count: usize,
}

/// Builds the move grid for one submission: for every surrogate and every
/// targeted reviewer, a rank window of neighbouring reviewers is taken
/// around the target and every neighbour subset becomes a contrast key, in
/// both edit directions. Keys whose word list is empty are skipped; the
/// grid is finally capped at `no_successors` by uniform sampling.
pub fn build_candidate_grid(
    surrogates: &[&dyn RankingModel],
    target: &Target,
    submission: &Submission,
    source: &dyn WordSource,
    config: &FeatureSpaceConfig,
    rng: &mut StdRng,
) -> Vec<CandidateMove> {
    let words = submission.words_cnt();
    let mut grid = Vec::new();

    for (surrogate_idx, model) in surrogates.iter().enumerate() {
        let ranking = model.ranking(&words);
        let n = ranking.len();
        if n == 0 {
            continue;
        }

        for reviewer in target.reviewers() {
            let Some(target_rank) = ranking.iter().position(|r| &r.reviewer == reviewer) else {
                log::debug!("Reviewer '{reviewer}' unknown to surrogate {surrogate_idx}");
                continue;
            };
            let requested = target.request.contains(reviewer);

            let (rank_low, rank_high) = if requested {
                // Window ends just past the target and reaches upwards.
                let high = (target_rank + config.reviewer_offset).min(n).max(1) - 1;
                let low = high.saturating_sub(config.reviewer_window);
                (low, high)
            } else {
                // Window starts just above the target and reaches downwards.
                let low = target_rank.saturating_sub(config.reviewer_offset);
                let high = (target_rank + config.reviewer_window).min(n).max(1) - 1;
                (low, high)
            };

            let neighbours: Vec<&str> = (rank_low..=rank_high)
                .filter(|&rank| rank != target_rank)
                .map(|rank| ranking[rank].reviewer.as_str())
                .collect();

            let mode = if requested {
                ContrastMode::Promote
            } else {
                ContrastMode::Demote
            };

            // Every neighbour subset, including the empty one.
            for mask in 0u32..(1 << neighbours.len().min(31)) {
                let mut others: Vec<String> = neighbours
                    .iter()
                    .enumerate()
                    .filter(|(bit, _)| mask & (1 << bit) != 0)
                    .map(|(_, name)| name.to_string())
                    .collect();
                others.sort();

                for op in [MoveOp::Add, MoveOp::Delete] {
                    let key = MoveKey {
                        surrogate: surrogate_idx,
                        reviewer: reviewer.clone(),
                        others: others.clone(),
                        mode,
                        op,
                    };
                    if source.has_words(&key) {
                        grid.push(CandidateMove {
                            key,
                            count: config.step,
                        });
                    }
                }
            }
        }
    }

    if grid.len() > config.no_successors {
        grid = grid
            .into_iter()
            .choose_multiple(rng, config.no_successors);
    }
    grid
}
