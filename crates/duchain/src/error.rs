use thiserror::Error;

pub type Result<T> = std::result::Result<T, DuChainError>;

#[derive(Error, Debug)]
pub enum DuChainError {
    /// A build claimed to have produced a top context but none is registered.
    /// Callers treat this as "no semantic info yet", not corruption.
    #[error("no semantic context registered for document: {0}")]
    MissingContext(String),
}
