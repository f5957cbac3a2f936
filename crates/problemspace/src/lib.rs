mod budget;
mod chain;
mod commentbox;
mod error;
mod project;
mod requested;
mod state;
mod stopwords;
mod toolchain;
mod transformer;

pub use budget::{standard_budgets, CostBudget, EqualBudgetManager};
pub use chain::{ModificationChain, ModificationLevel, TransformerLevel};
pub use commentbox::{CommentBoxAddWordsTransformer, CommentBoxDeleteWordsTransformer};
pub use error::{ProblemSpaceError, Result};
pub use project::{LatexProject, ProjectArena};
pub use requested::RequestedChanges;
pub use state::{HistoryRecord, TransformationState};
pub use stopwords::{is_number, stop_words};
pub use toolchain::{tokenize, PdflatexToolchain, PlainTextToolchain, Toolchain};
pub use transformer::{Transformer, TransformerHarness};
