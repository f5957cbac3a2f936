use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

use advbid_protocol::{FeatureSpaceConfig, StopCondition, Target, WordMultiset};
use advbid_ranker::RankingModel;
use rand::prelude::*;
use rayon::prelude::*;
use serde::Serialize;

use crate::cluster::cluster_representatives;
use crate::grid::build_candidate_grid;
use crate::loss::{loss, surrogate_loss};
use crate::submission::Submission;

/// Per-round statistics, kept for the transcript and the loss-trace
/// artifact.
#[derive(Debug, Clone, Serialize)]
pub struct RoundTrace {
    pub round: usize,
    pub best_loss: f64,
    pub worst_loss: f64,
    pub kept: usize,
    pub unique_candidates: usize,
    pub grid_size: usize,
    pub elapsed_ms: u64,
    pub surrogate_losses: Vec<f64>,
}

pub struct SearchOutcome {
    pub beam: Vec<Submission>,
    pub rounds: usize,
    pub trace: Vec<RoundTrace>,
}

/// Beam search over feature-space submissions: expand every beam member via
/// the candidate grid, score with the summed surrogate loss, deduplicate on
/// the realized word-count delta, select greedily or by softmax sampling,
/// and stop on the configured per-surrogate condition or when the iteration
/// budget runs out.
pub struct BeamSearchEngine<'a> {
    surrogates: Vec<&'a dyn RankingModel>,
    /// Judged instead of the surrogates when the stop condition is
    /// `hold_out_surrogates`; falls back to the surrogates when empty.
    hold_out: Vec<&'a dyn RankingModel>,
    target: &'a Target,
    config: &'a FeatureSpaceConfig,
}

impl<'a> BeamSearchEngine<'a> {
    pub fn new(
        surrogates: Vec<&'a dyn RankingModel>,
        hold_out: Vec<&'a dyn RankingModel>,
        target: &'a Target,
        config: &'a FeatureSpaceConfig,
    ) -> Self {
        Self {
            surrogates,
            hold_out,
            target,
            config,
        }
    }

    fn total_loss(&self, words: &WordMultiset) -> f64 {
        surrogate_loss(&self.surrogates, self.target, words)
    }

    fn stop_losses(&self, words: &WordMultiset) -> Vec<f64> {
        let models = match self.config.stop_condition {
            StopCondition::HoldOutSurrogates if !self.hold_out.is_empty() => &self.hold_out,
            _ => &self.surrogates,
        };
        models
            .iter()
            .map(|model| loss(*model, self.target, words))
            .collect()
    }

    fn stop_condition_holds(&self, words: &WordMultiset) -> bool {
        let losses = self.stop_losses(words);
        let below = losses.iter().filter(|&&l| l <= self.config.delta).count();
        match self.config.stop_condition {
            StopCondition::AllSuccessful | StopCondition::HoldOutSurrogates => {
                below == losses.len()
            }
            StopCondition::OneSuccessful => below > 0,
            StopCondition::MajorityVote => below >= losses.len() / 2 + 1,
        }
    }

    pub fn search(&self, submission0: Submission, rng: &mut StdRng) -> SearchOutcome {
        let mut trace = Vec::new();

        if self.stop_condition_holds(&submission0.words_cnt()) {
            log::debug!("Stop condition already holds on the input submission");
            return SearchOutcome {
                beam: vec![submission0],
                rounds: 0,
                trace,
            };
        }

        // Bootstrap round.
        let grid = build_candidate_grid(
            &self.surrogates,
            self.target,
            &submission0,
            submission0.source(),
            self.config,
            rng,
        );
        let mut beam = submission0.successors(
            &grid,
            |words| self.total_loss(words),
            self.config.beam_width,
            self.config.max_inf_norm,
            self.config.max_man_norm,
        );
        if beam.is_empty() {
            log::debug!("No successors from the initial submission");
            return SearchOutcome {
                beam: vec![submission0],
                rounds: 0,
                trace,
            };
        }

        let mut rounds = 1;
        for round in 1..self.config.max_itr {
            let tic = Instant::now();
            rounds = round;

            let finished: Vec<bool> = beam
                .iter()
                .map(|s| self.stop_condition_holds(&s.words_cnt()))
                .collect();
            let done = if self.config.finish_all {
                finished.iter().all(|&f| f)
            } else {
                finished.iter().any(|&f| f)
            };
            if done {
                log::debug!("Beam search finished after {round} rounds");
                break;
            }

            // Expand every beam member.
            let mut grid_size = 0;
            let mut candidates: Vec<Submission> = Vec::new();
            for submission in &beam {
                let grid = build_candidate_grid(
                    &self.surrogates,
                    self.target,
                    submission,
                    submission.source(),
                    self.config,
                    rng,
                );
                grid_size = grid.len();
                candidates.extend(submission.successors(
                    &grid,
                    |words| self.total_loss(words),
                    self.config.beam_width,
                    self.config.max_inf_norm,
                    self.config.max_man_norm,
                ));
            }

            // Drop candidates whose realized delta matches a beam member or
            // an earlier candidate.
            let beam_deltas: HashSet<BTreeMap<String, i64>> =
                beam.iter().map(|s| s.modified_words(false)).collect();
            let mut seen: HashSet<BTreeMap<String, i64>> = HashSet::new();
            let unique: Vec<Submission> = candidates
                .into_iter()
                .filter(|candidate| {
                    let delta = candidate.modified_words(false);
                    !beam_deltas.contains(&delta) && seen.insert(delta)
                })
                .collect();
            if unique.is_empty() {
                log::debug!("No candidates left in round {round}");
                break;
            }

            let mut scored: Vec<(f64, Submission)> = unique
                .into_par_iter()
                .map(|candidate| (self.total_loss(&candidate.words_cnt()), candidate))
                .collect();
            scored.sort_by(|(a, _), (b, _)| a.total_cmp(b));
            let unique_candidates = scored.len();

            beam = self.select(scored, rng);

            let best = self.total_loss(&beam[0].words_cnt());
            let worst = self.total_loss(&beam[beam.len() - 1].words_cnt());
            trace.push(RoundTrace {
                round,
                best_loss: best,
                worst_loss: worst,
                kept: beam.len(),
                unique_candidates,
                grid_size,
                elapsed_ms: tic.elapsed().as_millis() as u64,
                surrogate_losses: self.stop_losses(&beam[0].words_cnt()),
            });
        }

        if let Some(n_clusters) = self.config.no_clusters {
            beam = cluster_representatives(beam, n_clusters, |words| self.total_loss(words));
        }

        SearchOutcome {
            beam,
            rounds,
            trace,
        }
    }

    /// Greedy top-n, or softmax sampling without replacement over the
    /// normalized loss gap (prefers low loss but escapes greedy ties).
    fn select(
        &self,
        scored: Vec<(f64, Submission)>,
        rng: &mut StdRng,
    ) -> Vec<Submission> {
        let width = self.config.beam_width;
        if self.config.regular_beam_search || scored.len() <= width {
            return scored
                .into_iter()
                .take(width)
                .map(|(_, candidate)| candidate)
                .collect();
        }

        let loss_max = scored.iter().map(|(l, _)| *l).fold(f64::NEG_INFINITY, f64::max);
        let loss_min = scored.iter().map(|(l, _)| *l).fold(f64::INFINITY, f64::min);
        let span = loss_max - loss_min;
        let weights: Vec<f64> = scored
            .iter()
            .map(|(l, _)| {
                let normalized = if span > 0.0 { (loss_max - l) / span } else { 0.0 };
                normalized.exp()
            })
            .collect();

        let picked = rand::seq::index::sample_weighted(
            rng,
            scored.len(),
            |idx| weights[idx],
            width,
        )
        .map(|indices| indices.into_vec())
        .unwrap_or_else(|_| (0..width).collect());

        let mut picked: Vec<usize> = picked;
        picked.sort_unstable();
        picked
            .into_iter()
            .map(|idx| scored[idx].1.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::ContrastWordSource;
    use advbid_ranker::LexiconModel;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn tag_model(n: usize) -> Arc<LexiconModel> {
        let reviewers = (0..n)
            .map(|i| {
                let mut words = HashMap::new();
                words.insert(format!("tag{i}"), 1.0);
                (format!("r{i}"), words)
            })
            .collect();
        Arc::new(LexiconModel::new("beam", reviewers))
    }

    fn clean_words(n: usize) -> WordMultiset {
        let mut words = WordMultiset::new();
        for i in 0..n {
            words.add(&format!("tag{i}"), (n - i) as u32 * 2);
        }
        words
    }

    fn engine_setup(
        model: &Arc<LexiconModel>,
        words: &WordMultiset,
        config: &FeatureSpaceConfig,
    ) -> Submission {
        let source = ContrastWordSource::new(
            &[Arc::clone(model)],
            words.clone(),
            [],
            config.n_sample_words,
            config.seed,
        );
        Submission::new(Arc::new(source), words, words)
    }

    #[test]
    fn greedy_beam_loss_is_monotone() {
        let model = tag_model(10);
        let words = clean_words(10);
        let target = Target::new(vec!["r7".into()], vec![]).unwrap();
        let config = FeatureSpaceConfig {
            regular_beam_search: true,
            beam_width: 2,
            step: 2,
            max_itr: 12,
            n_sample_words: 50,
            ..Default::default()
        };
        let submission0 = engine_setup(&model, &words, &config);
        let surrogate: &dyn RankingModel = model.as_ref();
        let engine = BeamSearchEngine::new(vec![surrogate], vec![], &target, &config);
        let outcome = engine.search(submission0, &mut StdRng::seed_from_u64(3));
        for window in outcome.trace.windows(2) {
            assert!(
                window[1].best_loss <= window[0].best_loss + 1e-9,
                "best loss regressed: {} -> {}",
                window[0].best_loss,
                window[1].best_loss
            );
        }
    }

    #[test]
    fn beam_never_holds_duplicate_deltas() {
        let model = tag_model(10);
        let words = clean_words(10);
        let target = Target::new(vec!["r7".into()], vec![]).unwrap();
        let config = FeatureSpaceConfig {
            regular_beam_search: true,
            beam_width: 4,
            step: 2,
            max_itr: 6,
            n_sample_words: 50,
            ..Default::default()
        };
        let submission0 = engine_setup(&model, &words, &config);
        let surrogate: &dyn RankingModel = model.as_ref();
        let engine = BeamSearchEngine::new(vec![surrogate], vec![], &target, &config);
        let outcome = engine.search(submission0, &mut StdRng::seed_from_u64(3));
        let deltas: HashSet<_> = outcome
            .beam
            .iter()
            .map(|s| s.modified_words(false))
            .collect();
        assert_eq!(deltas.len(), outcome.beam.len());
    }

    #[test]
    fn trivially_satisfied_input_returns_immediately() {
        let model = tag_model(10);
        let words = clean_words(10);
        // r0 is already rank 0.
        let target = Target::new(vec!["r0".into()], vec![]).unwrap();
        let config = FeatureSpaceConfig {
            // Positive margin: satisfied means loss <= delta right away.
            delta: 1.0,
            ..Default::default()
        };
        let submission0 = engine_setup(&model, &words, &config);
        let surrogate: &dyn RankingModel = model.as_ref();
        let engine = BeamSearchEngine::new(vec![surrogate], vec![], &target, &config);
        let outcome = engine.search(submission0, &mut StdRng::seed_from_u64(3));
        assert_eq!(outcome.rounds, 0);
        assert_eq!(outcome.beam.len(), 1);
    }
}
