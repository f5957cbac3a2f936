use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProtocolError, Result};

pub type ReviewerId = String;

/// Which reviewers the adversarial document should pull into, and push out
/// of, the assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    #[serde(default)]
    pub request: Vec<ReviewerId>,
    #[serde(default)]
    pub reject: Vec<ReviewerId>,
}

impl Target {
    pub fn new(request: Vec<ReviewerId>, reject: Vec<ReviewerId>) -> Result<Self> {
        let target = Self { request, reject };
        target.validate()?;
        Ok(target)
    }

    /// A reviewer must never appear in both sets.
    pub fn validate(&self) -> Result<()> {
        let requested: HashSet<&str> = self.request.iter().map(String::as_str).collect();
        for reviewer in &self.reject {
            if requested.contains(reviewer.as_str()) {
                return Err(ProtocolError::ConflictingTarget(reviewer.clone()));
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.request.is_empty() && self.reject.is_empty()
    }

    /// All targeted reviewers, requested first.
    pub fn reviewers(&self) -> impl Iterator<Item = &ReviewerId> {
        self.request.iter().chain(self.reject.iter())
    }
}

/// One attack, as read from the targets file: which submission to modify,
/// which models to attack and to optimize against, plus optional per-target
/// configuration overrides (merged over the CLI-level configuration).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSpec {
    pub submission: PathBuf,
    pub target_reviewer: Target,
    pub victim_models: Vec<String>,
    pub surrogate_models: Vec<String>,
    #[serde(default)]
    pub featurespace_config: Option<Value>,
    #[serde(default)]
    pub problemspace_config: Option<Value>,
    #[serde(default)]
    pub working_dir_prefix: Option<String>,
}

impl TargetSpec {
    pub fn validate(&self) -> Result<()> {
        self.target_reviewer.validate()?;
        if self.victim_models.is_empty() {
            return Err(ProtocolError::InvalidSpec("no victim models".into()));
        }
        if self.surrogate_models.is_empty() {
            return Err(ProtocolError::InvalidSpec("no surrogate models".into()));
        }
        Ok(())
    }

    /// Directory name for this attack inside a trial directory.
    pub fn working_dir_name(&self) -> String {
        let stem = self
            .submission
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "submission".into());
        let prefix = self
            .working_dir_prefix
            .as_ref()
            .map(|p| format!("{p}__"))
            .unwrap_or_default();
        format!(
            "{prefix}{stem}__select.{}__reject.{}",
            self.target_reviewer.request.join("_"),
            self.target_reviewer.reject.join("_"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicting_target_is_rejected() {
        let err = Target::new(vec!["alice".into()], vec!["alice".into()]);
        assert!(err.is_err());
    }

    #[test]
    fn disjoint_target_is_accepted() {
        let target = Target::new(vec!["alice".into()], vec!["bob".into()]).unwrap();
        assert_eq!(target.reviewers().count(), 2);
    }

    #[test]
    fn working_dir_name_contains_targets() {
        let spec = TargetSpec {
            submission: PathBuf::from("papers/sub_01"),
            target_reviewer: Target::new(vec!["alice".into()], vec![]).unwrap(),
            victim_models: vec!["m0".into()],
            surrogate_models: vec!["m1".into()],
            featurespace_config: None,
            problemspace_config: None,
            working_dir_prefix: None,
        };
        assert_eq!(spec.working_dir_name(), "sub_01__select.alice__reject.");
    }
}
