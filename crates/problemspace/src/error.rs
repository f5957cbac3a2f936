use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProblemSpaceError>;

#[derive(Error, Debug)]
pub enum ProblemSpaceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Compile error: {0}")]
    Compile(String),

    #[error("Transformer error: {0}")]
    Transformer(String),

    #[error("Budget contract violation: {0}")]
    BudgetContract(String),

    #[error("No modification level enabled")]
    NoModificationLevel,

    #[error("Invalid project: {0}")]
    InvalidProject(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
