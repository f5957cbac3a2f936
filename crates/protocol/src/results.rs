use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Clean-rank minus adversarial-rank per targeted reviewer, per model.
/// Positive request gains and negative reject gains mean the attack moved
/// the reviewer the right way.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankGains {
    pub request: BTreeMap<String, i64>,
    pub reject: BTreeMap<String, i64>,
}

/// Final verdict of one attack, written as `results.json`. A `None` entry in
/// `successful` means the clean document already satisfied the target for
/// that model (trivial; excluded from success-rate statistics).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttackResults {
    pub successful: Vec<Option<bool>>,
    pub ranks: Vec<Option<RankGains>>,
    pub l1: u64,
    pub linf: u64,
    pub running_time: u64,
    pub feature_problem_switch: usize,
}

/// Per-iteration snapshot of the final beam, written as
/// `feature_space_results_<i>.json`. Arrays are parallel over the beam.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureSpaceResults {
    pub loss: Vec<f64>,
    pub l1: Vec<u64>,
    pub linf: Vec<u64>,
    pub words_cnt: Vec<BTreeMap<String, i64>>,
    #[serde(default)]
    pub successful: Vec<Option<bool>>,
}

impl FeatureSpaceResults {
    /// Index of the lowest-loss beam member.
    pub fn best(&self) -> Option<usize> {
        self.loss
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(idx, _)| idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_picks_lowest_loss() {
        let results = FeatureSpaceResults {
            loss: vec![3.0, 0.5, 2.0],
            ..Default::default()
        };
        assert_eq!(results.best(), Some(1));
        assert_eq!(FeatureSpaceResults::default().best(), None);
    }
}
