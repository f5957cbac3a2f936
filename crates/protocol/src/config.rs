use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// When the beam search may declare a candidate finished, judged on the
/// per-surrogate losses against the margin `delta`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StopCondition {
    /// Every surrogate is below the margin.
    #[default]
    AllSuccessful,
    /// At least one surrogate is below the margin.
    OneSuccessful,
    /// More than half of the surrogates are below the margin.
    MajorityVote,
    /// Judged on a held-out model set instead of the optimization surrogates.
    HoldOutSurrogates,
}

/// Feature-space search parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureSpaceConfig {
    /// Word-source strategy id (the engine is generic over the source; this
    /// names the one to construct).
    pub strategy: String,
    /// Number of parallel beam candidates.
    pub beam_width: usize,
    /// Words added or removed per move.
    pub step: usize,
    /// Loss margin for the stop condition. Negative values keep pushing
    /// into the robustness margin after the ranking condition holds.
    pub delta: f64,
    /// Maximum number of beam-search rounds.
    pub max_itr: usize,
    pub stop_condition: StopCondition,
    /// Model refs judged when `stop_condition` is `hold_out_surrogates`.
    pub hold_out_surrogates: Vec<String>,
    /// Cap on total modified words (L1); `None` = unbounded.
    pub max_man_norm: Option<u64>,
    /// Cap on per-word modifications (L-inf); `None` = unbounded.
    pub max_inf_norm: Option<u64>,
    /// Keep searching until every beam member meets the stop condition.
    pub finish_all: bool,
    /// Greedy selection instead of stochastic softmax sampling.
    pub regular_beam_search: bool,
    /// Cluster final candidates and keep one representative per cluster.
    pub no_clusters: Option<usize>,
    /// Cap on candidate moves generated per round.
    pub no_successors: usize,
    /// Rank-window size around a targeted reviewer for move generation.
    pub reviewer_window: usize,
    /// Rank-window offset past the targeted reviewer.
    pub reviewer_offset: usize,
    /// Words sampled per word-source key.
    pub n_sample_words: usize,
    pub seed: u64,
}

impl Default for FeatureSpaceConfig {
    fn default() -> Self {
        Self {
            strategy: "reviewer_contrast".into(),
            beam_width: 1,
            step: 64,
            delta: -0.02,
            max_itr: 1000,
            stop_condition: StopCondition::AllSuccessful,
            hold_out_surrogates: Vec::new(),
            max_man_norm: None,
            max_inf_norm: None,
            finish_all: false,
            regular_beam_search: false,
            no_clusters: None,
            no_successors: 10_000,
            reviewer_window: 9,
            reviewer_offset: 1,
            n_sample_words: 1000,
            seed: 2023,
        }
    }
}

/// Problem-space realization parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProblemSpaceConfig {
    /// Enable text-level transformers (synonyms, generated sentences, ...).
    pub text_level: bool,
    /// Enable encoding-level transformers (homoglyphs, ...).
    pub encoding_level: bool,
    /// Enable format-level transformers (comment boxes).
    pub format_level: bool,
    /// Number of feature-space <-> problem-space alternations.
    pub feature_problem_switch: usize,
    /// Scalar applied to every transformer's base modification budget.
    pub attack_budget: f64,
    /// Feed unrealized words back as blocked features.
    pub problem_space_block_features: bool,
    /// Full restarts allowed after an unsuccessful pass.
    pub repeat: usize,
}

impl Default for ProblemSpaceConfig {
    fn default() -> Self {
        Self {
            text_level: false,
            encoding_level: false,
            format_level: true,
            feature_problem_switch: 1,
            attack_budget: 1.0,
            problem_space_block_features: false,
            repeat: 0,
        }
    }
}

/// Merges per-target JSON overrides over a base config. Unknown keys are
/// rejected so a typo in a targets file fails loudly.
pub fn merge_overrides<T>(base: &T, overrides: Option<&Value>) -> Result<T>
where
    T: Serialize + serde::de::DeserializeOwned,
{
    let mut merged = serde_json::to_value(base)?;
    if let (Value::Object(merged), Some(Value::Object(overrides))) = (&mut merged, overrides) {
        for (key, value) in overrides {
            merged.insert(key.clone(), value.clone());
        }
    }
    Ok(serde_json::from_value(merged)?)
}
