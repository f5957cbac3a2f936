use thiserror::Error;

pub type Result<T> = std::result::Result<T, RankerError>;

#[derive(Error, Debug)]
pub enum RankerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Model file error: {0}")]
    ModelFile(#[from] serde_json::Error),

    #[error("Unknown reviewer: {0}")]
    UnknownReviewer(String),
}
