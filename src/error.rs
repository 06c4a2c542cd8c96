use thiserror::Error;

use crate::indexer::IndexerError;

#[derive(Debug, Error)]
pub enum FisoError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("indexer unavailable: {0}")]
    Upstream(#[from] IndexerError),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid indexer data: {0}")]
    InvalidData(String),
    #[error("store failure: {0:#}")]
    Store(anyhow::Error),
}

impl From<anyhow::Error> for FisoError {
    fn from(error: anyhow::Error) -> Self {
        Self::Store(error)
    }
}

impl FisoError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
