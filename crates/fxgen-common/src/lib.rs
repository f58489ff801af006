//! Shared domain types for the fxgen effect-generation engine.
//!
//! The job engine in the `fxgen` crate talks to its collaborators only
//! through the traits defined here:
//!
//! - [`JobStore`] persists job records and effects and answers queries.
//! - [`Generator`] turns a description into effect code plus metadata.
//!
//! Everything a poller can observe about a job lives in [`JobRecord`].

pub mod errors;
pub mod models;
pub mod traits;

pub use errors::{GenerationError, StoreError};
pub use models::*;
pub use traits::{Generator, JobStore};
