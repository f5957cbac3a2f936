use advbid_protocol::{Target, WordMultiset};
use advbid_ranker::{RankingModel, REVIEWER_CUTOFF};

/// Rank up to which a rejected reviewer still contributes loss pressure.
const REJECT_RELAX_RANK: usize = 10;

/// Ranking loss for one model.
///
/// Before the target condition holds, the loss accumulates a smooth descent
/// signal on raw scores: per requested reviewer `rank * (top1 - score)`, per
/// rejected reviewer `max(0, 10 - rank) * (score - score@rank10)`. Once the
/// condition holds, the loss switches to the negated robustness margin on
/// min-max-normalized scores and is therefore non-positive; the stop margin
/// `delta` is negative so the search keeps widening the margin.
pub fn loss(model: &dyn RankingModel, target: &Target, words: &WordMultiset) -> f64 {
    let ranking = model.ranking(words);
    let n = ranking.len();
    if n == 0 {
        return 0.0;
    }
    let rank_of = |reviewer: &str| ranking.iter().position(|r| r.reviewer == reviewer);

    let requests_done = target
        .request
        .iter()
        .all(|r| matches!(rank_of(r), Some(rank) if rank < REVIEWER_CUTOFF));
    let rejects_done = target
        .reject
        .iter()
        .all(|r| !matches!(rank_of(r), Some(rank) if rank < REVIEWER_CUTOFF));

    if !(requests_done && rejects_done) {
        let top_score = ranking[0].score;
        let relax_score = ranking[(REJECT_RELAX_RANK - 1).min(n - 1)].score;
        let mut total = 0.0;
        for reviewer in &target.request {
            if let Some(rank) = rank_of(reviewer) {
                total += rank as f64 * (top_score - ranking[rank].score);
            }
        }
        for reviewer in &target.reject {
            if let Some(rank) = rank_of(reviewer) {
                let pressure = REJECT_RELAX_RANK.saturating_sub(rank) as f64;
                total += pressure * (ranking[rank].score - relax_score);
            }
        }
        return total;
    }

    // Satisfied: maximize the margin to the cutoff on normalized scores.
    let max = ranking[0].score;
    let min = ranking[n - 1].score;
    let span = max - min;
    let normalized = |score: f64| {
        if span > 0.0 {
            (score - min) / span
        } else {
            0.0
        }
    };

    let request_distance = if target.request.is_empty() {
        None
    } else {
        let worst_requested = target
            .request
            .iter()
            .filter_map(|r| rank_of(r))
            .map(|rank| normalized(ranking[rank].score))
            .fold(f64::INFINITY, f64::min);
        let cutoff_score = normalized(ranking[REVIEWER_CUTOFF.min(n - 1)].score);
        Some(cutoff_score - worst_requested)
    };

    let reject_distance = if target.reject.is_empty() {
        None
    } else {
        let best_rejected = target
            .reject
            .iter()
            .filter_map(|r| rank_of(r))
            .map(|rank| normalized(ranking[rank].score))
            .fold(f64::NEG_INFINITY, f64::max);
        let cutoff_score = normalized(ranking[(REVIEWER_CUTOFF - 1).min(n - 1)].score);
        Some(best_rejected - cutoff_score)
    };

    match (request_distance, reject_distance) {
        (Some(request), Some(reject)) => request.max(reject),
        (Some(request), None) => request,
        (None, Some(reject)) => reject,
        (None, None) => 0.0,
    }
}

/// Summed loss over all surrogate models.
pub fn surrogate_loss(models: &[&dyn RankingModel], target: &Target, words: &WordMultiset) -> f64 {
    models.iter().map(|model| loss(*model, target, words)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use advbid_ranker::LexiconModel;
    use std::collections::HashMap;

    fn tag_model(n: usize) -> LexiconModel {
        let reviewers = (0..n)
            .map(|i| {
                let mut words = HashMap::new();
                words.insert(format!("tag{i}"), 1.0);
                (format!("r{i}"), words)
            })
            .collect();
        LexiconModel::new("tags", reviewers)
    }

    fn words_with_counts(counts: &[u32]) -> WordMultiset {
        let mut words = WordMultiset::new();
        for (i, &count) in counts.iter().enumerate() {
            words.add(&format!("tag{i}"), count);
        }
        words
    }

    #[test]
    fn loss_positive_until_target_holds() {
        let model = tag_model(12);
        let target = Target::new(vec!["r7".into()], vec![]).unwrap();
        let words = words_with_counts(&[12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1]);
        assert!(loss(&model, &target, &words) > 0.0);
    }

    #[test]
    fn loss_nonpositive_once_satisfied() {
        let model = tag_model(12);
        let target = Target::new(vec!["r7".into()], vec![]).unwrap();
        let words = words_with_counts(&[12, 11, 10, 9, 8, 7, 6, 20, 4, 3, 2, 1]);
        assert!(loss(&model, &target, &words) <= 0.0);
    }

    #[test]
    fn loss_decreases_as_requested_reviewer_climbs() {
        let model = tag_model(12);
        let target = Target::new(vec!["r7".into()], vec![]).unwrap();
        let far = words_with_counts(&[12, 11, 10, 9, 8, 7, 6, 1, 0, 0, 0, 0]);
        let near = words_with_counts(&[12, 11, 10, 9, 8, 7, 6, 8, 0, 0, 0, 0]);
        assert!(loss(&model, &target, &near) < loss(&model, &target, &far));
    }

    #[test]
    fn reject_pressure_vanishes_past_relax_rank() {
        let model = tag_model(12);
        let target = Target::new(vec![], vec!["r0".into()]).unwrap();
        // r0 demoted to last: condition holds, margin regime.
        let words = words_with_counts(&[1, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2]);
        assert!(loss(&model, &target, &words) <= 0.0);
    }

    #[test]
    fn margin_widens_with_larger_gap() {
        let model = tag_model(12);
        let target = Target::new(vec!["r7".into()], vec![]).unwrap();
        let thin = words_with_counts(&[12, 11, 10, 9, 8, 7, 6, 9, 4, 3, 2, 1]);
        let wide = words_with_counts(&[12, 11, 10, 9, 8, 7, 6, 30, 4, 3, 2, 1]);
        // Both satisfied; the wider gap must score strictly lower.
        assert!(loss(&model, &target, &wide) < loss(&model, &target, &thin));
    }
}
