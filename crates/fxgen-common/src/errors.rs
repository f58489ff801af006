//! Errors raised by the engine's collaborators.
//!
//! - `StoreError` — persistence failures. Callers treat them as transient:
//!   the job keeps its last successfully written state.
//! - `GenerationError` — the generator could not produce code. Terminal for
//!   the job that hit it.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store query failed: {0}")]
    Query(#[source] anyhow::Error),

    #[error("Corrupt {entity} record {id}: {message}")]
    Corrupt {
        entity: &'static str,
        id: String,
        message: String,
    },

    #[error("Store lock poisoned")]
    LockPoisoned,
}

impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        StoreError::Query(err)
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Description is empty")]
    EmptyDescription,

    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
