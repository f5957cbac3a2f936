mod config;
mod delta;
mod error;
mod results;
mod target;
mod words;

pub use config::{FeatureSpaceConfig, ProblemSpaceConfig, StopCondition};
pub use delta::FeatureDelta;
pub use error::{ProtocolError, Result};
pub use results::{AttackResults, FeatureSpaceResults, RankGains};
pub use target::{ReviewerId, Target, TargetSpec};
pub use words::WordMultiset;
