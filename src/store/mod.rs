//! SQLite-backed job and effect storage.
//!
//! [`StoreDb`] is the synchronous rusqlite layer. [`SqliteStore`] wraps it
//! behind `Arc<Mutex>` and runs every call on tokio's blocking pool, which is
//! what the scheduler and the HTTP layer hold.

pub mod db;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use fxgen_common::*;

pub use db::StoreDb;

/// Async-safe handle to the job database.
#[derive(Clone)]
pub struct SqliteStore {
    inner: Arc<std::sync::Mutex<StoreDb>>,
}

impl SqliteStore {
    pub fn new(db: StoreDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Open (or create) the database file, creating parent directories.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self::new(StoreDb::new(path)?))
    }

    pub fn in_memory() -> anyhow::Result<Self> {
        Ok(Self::new(StoreDb::new_in_memory()?))
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&StoreDb) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| StoreError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("store task panicked: {}", e)))?
    }
}

#[async_trait]
impl JobStore for SqliteStore {
    async fn insert_job(&self, job: NewJob) -> Result<JobRecord, StoreError> {
        self.call(move |db| db.insert_job(&job)).await
    }

    async fn get_job(&self, id: &str) -> Result<Option<JobRecord>, StoreError> {
        let id = id.to_string();
        self.call(move |db| db.get_job(&id)).await
    }

    async fn update_job(&self, id: &str, update: JobUpdate) -> Result<bool, StoreError> {
        let id = id.to_string();
        self.call(move |db| db.update_job(&id, &update)).await
    }

    async fn get_jobs(&self, status: Option<JobStatus>) -> Result<Vec<JobRecord>, StoreError> {
        self.call(move |db| db.get_jobs(status)).await
    }

    async fn get_queue_stats(&self) -> Result<QueueStats, StoreError> {
        self.call(|db| db.get_queue_stats()).await
    }

    async fn create_effect(&self, effect: NewEffect) -> Result<Effect, StoreError> {
        self.call(move |db| db.create_effect(&effect)).await
    }

    async fn list_effects(&self) -> Result<Vec<Effect>, StoreError> {
        self.call(|db| db.list_effects()).await
    }

    async fn get_effect(&self, id: &str) -> Result<Option<Effect>, StoreError> {
        let id = id.to_string();
        self.call(move |db| db.get_effect(&id)).await
    }

    async fn effects_for_job(&self, job_id: &str) -> Result<Vec<Effect>, StoreError> {
        let job_id = job_id.to_string();
        self.call(move |db| db.effects_for_job(&job_id)).await
    }
}
