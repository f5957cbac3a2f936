mod error;
mod lexicon;
mod model;
mod success;

pub use error::{RankerError, Result};
pub use lexicon::LexiconModel;
pub use model::{RankedReviewer, RankingModel, REVIEWER_CUTOFF};
pub use success::{evaluate_attack, target_satisfied, ModelVerdict};
