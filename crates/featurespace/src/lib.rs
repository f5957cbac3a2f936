mod beam;
mod cluster;
mod error;
mod grid;
mod loss;
mod strategy;
mod submission;

pub use beam::{BeamSearchEngine, RoundTrace, SearchOutcome};
pub use cluster::cluster_representatives;
pub use error::{FeatureSpaceError, Result};
pub use grid::{build_candidate_grid, CandidateMove};
pub use loss::{loss, surrogate_loss};
pub use strategy::{ContrastMode, ContrastWordSource, MoveKey, MoveOp, WordSource};
pub use submission::{HistoryEntry, Submission};
