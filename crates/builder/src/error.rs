use thiserror::Error;

pub type Result<T> = std::result::Result<T, BuilderError>;

#[derive(Error, Debug)]
pub enum BuilderError {
    #[error("failed to load C grammar: {0}")]
    Language(String),

    #[error("parse failed: {0}")]
    ParseFailed(String),

    #[error("duchain error: {0}")]
    DuChain(#[from] duchain::DuChainError),

    /// Cooperative cancellation: the store is left as it was before the job.
    #[error("build aborted")]
    Aborted,

    #[error("{0}")]
    Other(String),
}
