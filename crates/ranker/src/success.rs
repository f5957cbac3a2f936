use advbid_protocol::{RankGains, Target, WordMultiset};

use crate::error::Result;
use crate::model::{RankingModel, REVIEWER_CUTOFF};

/// Outcome of checking one model: `successful` is `None` when the clean
/// document already satisfied the target (trivial, excluded from
/// success-rate statistics).
#[derive(Debug, Clone, Default)]
pub struct ModelVerdict {
    pub successful: Option<bool>,
    pub ranks: Option<RankGains>,
}

/// Whether the ranking condition holds: every requested reviewer inside the
/// cutoff, every rejected reviewer outside it.
pub fn target_satisfied(model: &dyn RankingModel, target: &Target, words: &WordMultiset) -> Result<bool> {
    let ranking = model.ranking(words);
    let rank = |reviewer: &str| ranking.iter().position(|r| r.reviewer == reviewer);
    for reviewer in &target.request {
        match rank(reviewer) {
            Some(r) if r < REVIEWER_CUTOFF => {}
            _ => return Ok(false),
        }
    }
    for reviewer in &target.reject {
        match rank(reviewer) {
            Some(r) if r >= REVIEWER_CUTOFF => {}
            None => {}
            _ => return Ok(false),
        }
    }
    Ok(true)
}

/// Judges the adversarial features against every model, also recording how
/// far each targeted reviewer moved relative to the clean document.
pub fn evaluate_attack(
    models: &[&dyn RankingModel],
    target: &Target,
    clean: &WordMultiset,
    adversarial: &WordMultiset,
) -> Result<Vec<ModelVerdict>> {
    let mut verdicts = Vec::with_capacity(models.len());
    for &model in models {
        if target_satisfied(model, target, clean)? {
            // Nothing to attack for this model.
            verdicts.push(ModelVerdict::default());
            continue;
        }

        let successful = target_satisfied(model, target, adversarial)?;
        let mut gains = RankGains::default();
        for reviewer in &target.request {
            let clean_rank = model.rank_of(reviewer, clean)? as i64;
            let adv_rank = model.rank_of(reviewer, adversarial)? as i64;
            gains.request.insert(reviewer.clone(), clean_rank - adv_rank);
        }
        for reviewer in &target.reject {
            let clean_rank = model.rank_of(reviewer, clean)? as i64;
            let adv_rank = model.rank_of(reviewer, adversarial)? as i64;
            gains.reject.insert(reviewer.clone(), clean_rank - adv_rank);
        }
        verdicts.push(ModelVerdict {
            successful: Some(successful),
            ranks: Some(gains),
        });
    }
    Ok(verdicts)
}
