use thiserror::Error;

pub type Result<T> = std::result::Result<T, FeatureSpaceError>;

#[derive(Error, Debug)]
pub enum FeatureSpaceError {
    #[error("Ranker error: {0}")]
    Ranker(#[from] advbid_ranker::RankerError),

    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("{0}")]
    Other(String),
}
