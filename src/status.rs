//! Read-only views over the store for pollers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use fxgen_common::*;
use serde::{Deserialize, Serialize};

/// Scheduler state that is not stored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerSnapshot {
    pub max_concurrent: usize,
    pub in_flight: usize,
    pub paused: bool,
}

/// Job counts plus scheduler state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub queued: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub total_processed: u64,
    pub max_concurrent: usize,
    pub in_flight: usize,
    pub paused: bool,
}

impl QueueStatus {
    pub fn new(stats: QueueStats, snapshot: SchedulerSnapshot) -> Self {
        Self {
            queued: stats.queued,
            processing: stats.processing,
            completed: stats.completed,
            failed: stats.failed,
            total_processed: stats.total_processed,
            max_concurrent: snapshot.max_concurrent,
            in_flight: snapshot.in_flight,
            paused: snapshot.paused,
        }
    }
}

/// What a polling client sees for one job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub id: String,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<GenerationOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_time: Option<i64>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<JobRecord> for JobStatusView {
    fn from(job: JobRecord) -> Self {
        Self {
            id: job.id,
            status: job.status,
            progress: job.progress,
            result: job.result,
            error: job.error,
            estimated_time: job.estimated_time_ms,
            actual_time: job.actual_time_ms,
            created_at: job.created_at,
            completed_at: job.completed_at,
        }
    }
}

/// Aggregates over the store. Never writes and never caches.
#[derive(Clone)]
pub struct StatusReporter {
    store: Arc<dyn JobStore>,
}

impl StatusReporter {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    pub async fn queue_stats(&self) -> Result<QueueStats, StoreError> {
        self.store.get_queue_stats().await
    }

    pub async fn job_status(&self, id: &str) -> Result<Option<JobStatusView>, StoreError> {
        Ok(self.store.get_job(id).await?.map(JobStatusView::from))
    }

    pub async fn jobs(&self, status: Option<JobStatus>) -> Result<Vec<JobStatusView>, StoreError> {
        Ok(self
            .store
            .get_jobs(status)
            .await?
            .into_iter()
            .map(JobStatusView::from)
            .collect())
    }
}
