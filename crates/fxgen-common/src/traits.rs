use async_trait::async_trait;

use crate::errors::{GenerationError, StoreError};
use crate::models::*;

/// Durable keyed storage for jobs and effects.
///
/// Real implementation: `fxgen::store::SqliteStore`.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert_job(&self, job: NewJob) -> Result<JobRecord, StoreError>;

    async fn get_job(&self, id: &str) -> Result<Option<JobRecord>, StoreError>;

    /// Apply a partial update. Returns `false` when the job is absent or its
    /// status did not satisfy `update.only_if`.
    async fn update_job(&self, id: &str, update: JobUpdate) -> Result<bool, StoreError>;

    /// Jobs in insertion order, optionally filtered by status.
    async fn get_jobs(&self, status: Option<JobStatus>) -> Result<Vec<JobRecord>, StoreError>;

    async fn get_queue_stats(&self) -> Result<QueueStats, StoreError>;

    async fn create_effect(&self, effect: NewEffect) -> Result<Effect, StoreError>;

    async fn list_effects(&self) -> Result<Vec<Effect>, StoreError>;

    async fn get_effect(&self, id: &str) -> Result<Option<Effect>, StoreError>;

    async fn effects_for_job(&self, job_id: &str) -> Result<Vec<Effect>, StoreError>;
}

/// Turns a description into effect code plus metadata.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationOutput, GenerationError>;

    /// Coarse estimate of how long `generate` will take, in milliseconds.
    fn estimate_ms(&self, _request: &GenerationRequest) -> Option<i64> {
        None
    }
}
