use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProtocolError>;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Reviewer '{0}' appears in both request and reject")]
    ConflictingTarget(String),

    #[error("Invalid target spec: {0}")]
    InvalidSpec(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
