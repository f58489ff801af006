//! Typed errors for the fxgen engine.
//!
//! Collaborator errors (`StoreError`, `GenerationError`) live in
//! `fxgen-common`. This module adds the scheduler's own error type, which
//! only surfaces at the intake boundary: per-job failures are recorded on the
//! job itself and wrong-state transitions are reported as outcomes.

use fxgen_common::StoreError;
use thiserror::Error;

/// Errors returned by scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl SchedulerError {
    /// True for failures the caller may retry unchanged.
    ///
    /// A corrupt record fails the same way on every read.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Store(e) if !matches!(e, StoreError::Corrupt { .. }))
    }
}
