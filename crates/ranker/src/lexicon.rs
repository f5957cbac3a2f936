use std::collections::HashMap;
use std::fs;
use std::path::Path;

use advbid_protocol::{ReviewerId, WordMultiset};
use serde::Deserialize;

use crate::error::Result;
use crate::model::RankingModel;

/// Bag-of-words ranking model backed by per-reviewer word-weight tables.
///
/// This is the adapter seam for the external assignment system: a model
/// directory carries a `model.json` mapping each reviewer to the words that
/// are predictive for them, with weights. Scoring is the weighted word-count
/// dot product. A real topic-model binding replaces this by implementing
/// [`RankingModel`]; the word tables additionally feed the
/// reviewer-contrast word source in the feature-space crate.
#[derive(Debug, Clone)]
pub struct LexiconModel {
    name: String,
    reviewers: Vec<ReviewerId>,
    word_weights: Vec<HashMap<String, f64>>,
}

#[derive(Deserialize)]
struct LexiconFile {
    reviewers: Vec<ReviewerEntry>,
}

#[derive(Deserialize)]
struct ReviewerEntry {
    name: ReviewerId,
    words: HashMap<String, f64>,
}

impl LexiconModel {
    pub fn new(name: impl Into<String>, reviewers: Vec<(ReviewerId, HashMap<String, f64>)>) -> Self {
        let (reviewers, word_weights) = reviewers.into_iter().unzip();
        Self {
            name: name.into(),
            reviewers,
            word_weights,
        }
    }

    /// Loads `<model_dir>/model.json`.
    pub fn load(model_dir: &Path) -> Result<Self> {
        let raw = fs::read_to_string(model_dir.join("model.json"))?;
        let file: LexiconFile = serde_json::from_str(&raw)?;
        let name = model_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model".into());
        log::debug!(
            "Loaded lexicon model '{}' with {} reviewers",
            name,
            file.reviewers.len()
        );
        Ok(Self::new(
            name,
            file.reviewers
                .into_iter()
                .map(|r| (r.name, r.words))
                .collect(),
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Word-weight table of one reviewer, by roster index.
    pub fn reviewer_words(&self, idx: usize) -> &HashMap<String, f64> {
        &self.word_weights[idx]
    }
}

impl RankingModel for LexiconModel {
    fn reviewers(&self) -> &[ReviewerId] {
        &self.reviewers
    }

    fn scores(&self, words: &WordMultiset) -> Vec<f64> {
        self.word_weights
            .iter()
            .map(|weights| {
                words
                    .iter()
                    .map(|(word, count)| {
                        weights.get(word).copied().unwrap_or(0.0) * f64::from(count)
                    })
                    .sum()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(w, p)| (w.to_string(), *p)).collect()
    }

    #[test]
    fn scores_are_weighted_counts() {
        let model = LexiconModel::new(
            "test",
            vec![
                ("alice".into(), weights(&[("fuzzing", 1.0), ("kernel", 0.5)])),
                ("bob".into(), weights(&[("crypto", 2.0)])),
            ],
        );
        let words = WordMultiset::from_words(["fuzzing", "fuzzing", "kernel"]);
        let scores = model.scores(&words);
        assert_eq!(scores, vec![2.5, 0.0]);
        let ranking = model.ranking(&words);
        assert_eq!(ranking[0].reviewer, "alice");
    }

    #[test]
    fn load_round_trips_model_json() {
        let dir = tempfile::tempdir().unwrap();
        let model_dir = dir.path().join("m0");
        fs::create_dir(&model_dir).unwrap();
        fs::write(
            model_dir.join("model.json"),
            r#"{"reviewers": [{"name": "alice", "words": {"fuzzing": 1.0}}]}"#,
        )
        .unwrap();
        let model = LexiconModel::load(&model_dir).unwrap();
        assert_eq!(model.reviewers(), ["alice".to_string()]);
        assert_eq!(model.name(), "m0");
    }
}
