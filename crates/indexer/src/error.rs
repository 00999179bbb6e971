use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexerError>;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("document not open: {0}")]
    DocumentNotOpen(String),

    #[error("edit out of bounds: {0}")]
    EditOutOfBounds(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Builder(#[from] duchain_builder::BuilderError),

    #[error(transparent)]
    DuChain(#[from] duchain::DuChainError),

    #[error("background task failed: {0}")]
    Join(String),
}
