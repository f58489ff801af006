//! Bounded job scheduler.
//!
//! A periodic admission tick moves queued jobs into `processing` up to the
//! concurrency ceiling, then runs each admitted job on its own task:
//! progress checkpoints, the generator call, the terminal write, and (on
//! success) cataloging into the effect library.
//!
//! All writes that follow admission are guarded on the job still being
//! `processing`, so a concurrent cancel is never overwritten. A cancelled job
//! keeps its slot until its own task notices and exits.

pub mod clock;
pub mod events;

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::FutureExt;
use fxgen_common::*;
use tokio::sync::{Notify, broadcast, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::cataloger::Cataloger;
use crate::config::SchedulerConfig;
use crate::errors::SchedulerError;
use crate::status::{QueueStatus, SchedulerSnapshot, StatusReporter};

pub use clock::{Clock, ManualClock, SystemClock};
pub use events::{EVENT_CHANNEL_CAPACITY, JobEvent};

/// Error recorded on jobs found `processing` with no task behind them.
pub const INTERRUPTED_MESSAGE: &str = "interrupted";

/// Error recorded when the generator panics.
pub const PANICKED_MESSAGE: &str = "generator panicked";

/// Timing and sizing for a scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    pub max_concurrent: usize,
    pub tick_interval: Duration,
    pub step_delay: Duration,
    pub checkpoints: Vec<u8>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

impl From<&SchedulerConfig> for SchedulerSettings {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            max_concurrent: clamp_concurrency(config.max_concurrent),
            tick_interval: config.tick_interval(),
            step_delay: config.progress_step_delay(),
            checkpoints: config.progress_checkpoints.clone(),
        }
    }
}

pub fn clamp_concurrency(n: usize) -> usize {
    n.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY)
}

/// Result of one admission pass.
#[derive(Debug)]
pub enum TickOutcome {
    /// Another admission pass was already running.
    Skipped,
    /// Admission is paused.
    Paused,
    /// Every slot is taken.
    AtCapacity,
    /// Nothing was admitted.
    Idle,
    /// Listing queued jobs failed; the next tick tries again.
    StoreUnavailable,
    /// These jobs are now `processing` and running.
    Admitted(Batch),
}

impl TickOutcome {
    pub fn admitted(&self) -> usize {
        match self {
            Self::Admitted(batch) => batch.len(),
            _ => 0,
        }
    }

    pub fn into_batch(self) -> Option<Batch> {
        match self {
            Self::Admitted(batch) => Some(batch),
            _ => None,
        }
    }
}

/// How one job's task ended.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed {
        job_id: String,
        effect_id: Option<String>,
    },
    Failed {
        job_id: String,
        error: String,
    },
    /// The job left `processing` underneath the task, normally by cancel.
    Cancelled { job_id: String },
    /// A store write failed; the job keeps its last written state.
    Interrupted { job_id: String, reason: String },
}

impl JobOutcome {
    pub fn job_id(&self) -> &str {
        match self {
            Self::Completed { job_id, .. }
            | Self::Failed { job_id, .. }
            | Self::Cancelled { job_id }
            | Self::Interrupted { job_id, .. } => job_id,
        }
    }
}

/// Result of a retry or cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The job moved to this status.
    Applied(JobStatus),
    /// The job was in this status, which does not allow the transition.
    Ignored(JobStatus),
    NotFound,
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Jobs admitted by one tick, running concurrently.
pub struct Batch {
    tasks: JoinSet<JobOutcome>,
    job_ids: Vec<String>,
}

impl Batch {
    fn new() -> Self {
        Self {
            tasks: JoinSet::new(),
            job_ids: Vec::new(),
        }
    }

    pub fn job_ids(&self) -> &[String] {
        &self.job_ids
    }

    pub fn len(&self) -> usize {
        self.job_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.job_ids.is_empty()
    }

    /// Wait for every job in the batch. One job's failure never affects another's.
    pub async fn settle(mut self) -> Vec<JobOutcome> {
        let mut outcomes = Vec::with_capacity(self.job_ids.len());
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => error!(error = %e, "Job task aborted"),
            }
        }
        outcomes
    }
}

impl std::fmt::Debug for Batch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batch").field("job_ids", &self.job_ids).finish()
    }
}

/// Membership of one job in the in-flight set. Dropping it frees the slot.
pub struct SlotGuard {
    job_id: String,
    in_flight: Arc<Mutex<HashSet<String>>>,
    wake: Arc<Notify>,
}

impl SlotGuard {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.remove(&self.job_id);
        drop(in_flight);
        debug!(job_id = %self.job_id, "Slot released");
        self.wake.notify_one();
    }
}

/// Held for the duration of one admission pass.
struct AdmissionPass<'a>(&'a AtomicBool);

impl<'a> AdmissionPass<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for AdmissionPass<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Scheduler {
    store: Arc<dyn JobStore>,
    generator: Arc<dyn Generator>,
    cataloger: Cataloger,
    clock: Arc<dyn Clock>,
    settings: SchedulerSettings,
    max_concurrent: AtomicUsize,
    in_flight: Arc<Mutex<HashSet<String>>>,
    paused: AtomicBool,
    admitting: AtomicBool,
    wake: Arc<Notify>,
    events: broadcast::Sender<JobEvent>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn JobStore>,
        generator: Arc<dyn Generator>,
        settings: SchedulerSettings,
    ) -> Self {
        Self::with_clock(store, generator, settings, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn JobStore>,
        generator: Arc<dyn Generator>,
        settings: SchedulerSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            max_concurrent: AtomicUsize::new(clamp_concurrency(settings.max_concurrent)),
            store,
            generator,
            cataloger: Cataloger::new(),
            clock,
            settings,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            paused: AtomicBool::new(false),
            admitting: AtomicBool::new(false),
            wake: Arc::new(Notify::new()),
            events,
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::Acquire)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_in_flight(&self, job_id: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(job_id)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            max_concurrent: self.max_concurrent(),
            in_flight: self.in_flight_count(),
            paused: self.is_paused(),
        }
    }

    // ── Intake ────────────────────────────────────────────────────────

    /// Ask for an admission pass now instead of waiting for the next tick.
    pub fn submit(&self, job_id: &str) {
        debug!(job_id = %job_id, "Admission requested");
        self.wake.notify_one();
    }

    /// Insert a queued job for `request` and request admission.
    pub async fn enqueue(&self, request: GenerationRequest) -> Result<JobRecord, SchedulerError> {
        if request.description.trim().is_empty() {
            return Err(SchedulerError::InvalidRequest(
                "description must not be empty".to_string(),
            ));
        }
        let estimated_time_ms = self.generator.estimate_ms(&request);
        let job = self
            .store
            .insert_job(NewJob {
                request,
                estimated_time_ms,
            })
            .await?;
        info!(job_id = %job.id, platform = %job.platform, "Job queued");
        self.submit(&job.id);
        Ok(job)
    }

    // ── Admission ─────────────────────────────────────────────────────

    fn reserve_slot(&self, job_id: &str) -> Option<SlotGuard> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if in_flight.len() >= self.max_concurrent() || in_flight.contains(job_id) {
            return None;
        }
        in_flight.insert(job_id.to_string());
        Some(SlotGuard {
            job_id: job_id.to_string(),
            in_flight: self.in_flight.clone(),
            wake: self.wake.clone(),
        })
    }

    /// Run one admission pass.
    ///
    /// Each pass first fails orphaned `processing` jobs, so a job whose
    /// terminal write was lost is settled once the store recovers.
    /// Admitted jobs are already `processing` in the store when this returns;
    /// their work continues on the returned batch.
    pub async fn tick(self: &Arc<Self>) -> TickOutcome {
        let Some(_pass) = AdmissionPass::try_acquire(&self.admitting) else {
            debug!("Admission pass already running, skipping tick");
            return TickOutcome::Skipped;
        };

        // Jobs whose terminal write failed are `processing` with no task.
        match self.recover_interrupted().await {
            Ok(0) => {}
            Ok(n) => info!(count = n, "Recovered interrupted jobs"),
            Err(e) => warn!(error = %e, "Failed to recover interrupted jobs"),
        }

        if self.is_paused() {
            return TickOutcome::Paused;
        }

        let available = self.max_concurrent().saturating_sub(self.in_flight_count());
        if available == 0 {
            return TickOutcome::AtCapacity;
        }

        let queued = match self.store.get_jobs(Some(JobStatus::Queued)).await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(error = %e, "Failed to list queued jobs");
                return TickOutcome::StoreUnavailable;
            }
        };

        let mut batch = Batch::new();
        for job in queued {
            if batch.len() >= available {
                break;
            }
            // A requeued job whose previous task has not exited yet waits.
            let Some(slot) = self.reserve_slot(&job.id) else {
                continue;
            };
            match self.store.update_job(&job.id, JobUpdate::admitted()).await {
                Ok(true) => {
                    info!(job_id = %job.id, "Job admitted");
                    events::publish(
                        &self.events,
                        JobEvent::Admitted {
                            job_id: job.id.clone(),
                        },
                    );
                    batch.job_ids.push(job.id.clone());
                    let this = Arc::clone(self);
                    batch.tasks.spawn(async move { this.process_one(job, slot).await });
                }
                Ok(false) => {
                    debug!(job_id = %job.id, "Job left the queue before admission");
                }
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, "Failed to admit job");
                }
            }
        }

        if batch.is_empty() {
            TickOutcome::Idle
        } else {
            TickOutcome::Admitted(batch)
        }
    }

    // ── Execution ─────────────────────────────────────────────────────

    async fn process_one(self: Arc<Self>, job: JobRecord, slot: SlotGuard) -> JobOutcome {
        let _slot = slot;
        let job_id = job.id.clone();

        for &progress in &self.settings.checkpoints {
            self.clock.sleep(self.settings.step_delay).await;
            match self.store.update_job(&job_id, JobUpdate::checkpoint(progress)).await {
                Ok(true) => events::publish(
                    &self.events,
                    JobEvent::Progress {
                        job_id: job_id.clone(),
                        progress,
                    },
                ),
                Ok(false) => {
                    info!(job_id = %job_id, "Job no longer processing, stopping");
                    return JobOutcome::Cancelled { job_id };
                }
                Err(e) => {
                    warn!(job_id = %job_id, progress, error = %e, "Failed to record progress");
                }
            }
        }

        let request = job.request();
        let started = self.clock.now();
        let generated = AssertUnwindSafe(self.generator.generate(&request))
            .catch_unwind()
            .await;
        let elapsed_ms = self.clock.elapsed_ms(started);

        let output = match generated {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return self.record_failure(job_id, e.to_string()).await,
            Err(_) => {
                error!(job_id = %job_id, "Generator panicked");
                return self.record_failure(job_id, PANICKED_MESSAGE.to_string()).await;
            }
        };

        match self
            .store
            .update_job(&job_id, JobUpdate::completed(output.clone(), elapsed_ms))
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                info!(job_id = %job_id, "Job cancelled during generation, discarding result");
                return JobOutcome::Cancelled { job_id };
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Failed to record completion");
                return JobOutcome::Interrupted {
                    job_id,
                    reason: e.to_string(),
                };
            }
        }
        info!(job_id = %job_id, elapsed_ms, "Job completed");
        events::publish(
            &self.events,
            JobEvent::Completed {
                job_id: job_id.clone(),
                actual_time_ms: elapsed_ms,
            },
        );

        let effect = self.cataloger.catalog(&job, &output);
        let effect_id = match self.store.create_effect(effect).await {
            Ok(effect) => {
                info!(job_id = %job_id, effect_id = %effect.id, name = %effect.fields.name, "Effect cataloged");
                events::publish(
                    &self.events,
                    JobEvent::EffectCreated {
                        job_id: job_id.clone(),
                        effect_id: effect.id.clone(),
                    },
                );
                Some(effect.id)
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Failed to create effect");
                None
            }
        };

        JobOutcome::Completed { job_id, effect_id }
    }

    async fn record_failure(&self, job_id: String, message: String) -> JobOutcome {
        match self
            .store
            .update_job(&job_id, JobUpdate::failed(message.clone()))
            .await
        {
            Ok(true) => {
                warn!(job_id = %job_id, error = %message, "Job failed");
                events::publish(
                    &self.events,
                    JobEvent::Failed {
                        job_id: job_id.clone(),
                        error: message.clone(),
                    },
                );
                JobOutcome::Failed {
                    job_id,
                    error: message,
                }
            }
            Ok(false) => JobOutcome::Cancelled { job_id },
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Failed to record failure");
                JobOutcome::Interrupted {
                    job_id,
                    reason: e.to_string(),
                }
            }
        }
    }

    // ── Transitions ───────────────────────────────────────────────────

    /// Requeue a failed job. Any other state is left alone.
    pub async fn retry(&self, job_id: &str) -> Result<TransitionOutcome, SchedulerError> {
        let Some(job) = self.store.get_job(job_id).await? else {
            return Ok(TransitionOutcome::NotFound);
        };
        if !job.status.is_retryable() {
            debug!(job_id = %job_id, status = %job.status, "Retry ignored");
            return Ok(TransitionOutcome::Ignored(job.status));
        }
        if !self.store.update_job(job_id, JobUpdate::requeued()).await? {
            return self.current_status(job_id).await;
        }
        info!(job_id = %job_id, "Job requeued");
        events::publish(
            &self.events,
            JobEvent::Retried {
                job_id: job_id.to_string(),
            },
        );
        self.submit(job_id);
        Ok(TransitionOutcome::Applied(JobStatus::Queued))
    }

    /// Fail a queued or processing job with the cancellation message.
    ///
    /// A processing job keeps its slot until its task observes the change.
    pub async fn cancel(&self, job_id: &str) -> Result<TransitionOutcome, SchedulerError> {
        let Some(job) = self.store.get_job(job_id).await? else {
            return Ok(TransitionOutcome::NotFound);
        };
        if !job.status.is_cancellable() {
            debug!(job_id = %job_id, status = %job.status, "Cancel ignored");
            return Ok(TransitionOutcome::Ignored(job.status));
        }
        if !self.store.update_job(job_id, JobUpdate::cancelled()).await? {
            return self.current_status(job_id).await;
        }
        info!(job_id = %job_id, was = %job.status, "Job cancelled");
        events::publish(
            &self.events,
            JobEvent::Cancelled {
                job_id: job_id.to_string(),
            },
        );
        Ok(TransitionOutcome::Applied(JobStatus::Failed))
    }

    async fn current_status(&self, job_id: &str) -> Result<TransitionOutcome, SchedulerError> {
        Ok(match self.store.get_job(job_id).await? {
            Some(job) => TransitionOutcome::Ignored(job.status),
            None => TransitionOutcome::NotFound,
        })
    }

    /// Fail jobs left `processing` without a task, e.g. by a previous process.
    pub async fn recover_interrupted(&self) -> Result<usize, SchedulerError> {
        let mut recovered = 0;
        for job in self.store.get_jobs(Some(JobStatus::Processing)).await? {
            if self.is_in_flight(&job.id) {
                continue;
            }
            if self
                .store
                .update_job(&job.id, JobUpdate::failed(INTERRUPTED_MESSAGE))
                .await?
            {
                warn!(job_id = %job.id, "Marked interrupted job as failed");
                events::publish(
                    &self.events,
                    JobEvent::Failed {
                        job_id: job.id.clone(),
                        error: INTERRUPTED_MESSAGE.to_string(),
                    },
                );
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    // ── Control ───────────────────────────────────────────────────────

    /// Set the concurrency ceiling, clamped to 1..=10. Returns the applied value.
    ///
    /// Lowering the ceiling never preempts running jobs; admission waits
    /// until the in-flight count drops below it.
    pub fn set_concurrency(&self, requested: usize) -> usize {
        let applied = clamp_concurrency(requested);
        let previous = self.max_concurrent.swap(applied, Ordering::AcqRel);
        if previous != applied {
            info!(requested, applied, previous, "Concurrency changed");
            events::publish(
                &self.events,
                JobEvent::ConcurrencyChanged {
                    max_concurrent: applied,
                },
            );
        }
        self.wake.notify_one();
        applied
    }

    pub fn pause(&self) {
        if !self.paused.swap(true, Ordering::AcqRel) {
            info!("Admission paused");
            events::publish(&self.events, JobEvent::Paused);
        }
    }

    pub fn resume(&self) {
        if self.paused.swap(false, Ordering::AcqRel) {
            info!("Admission resumed");
            events::publish(&self.events, JobEvent::Resumed);
        }
        self.wake.notify_one();
    }

    pub async fn queue_status(&self) -> Result<QueueStatus, SchedulerError> {
        let stats = StatusReporter::new(self.store.clone()).queue_stats().await?;
        Ok(QueueStatus::new(stats, self.snapshot()))
    }

    // ── Run loop ──────────────────────────────────────────────────────

    /// Start the driver task: tick on the interval and on every wake-up.
    pub fn spawn(self: &Arc<Self>) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let this = Arc::clone(self);

        let driver = tokio::spawn(async move {
            let mut interval = tokio::time::interval(this.settings.tick_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut running: JoinSet<Vec<JobOutcome>> = JoinSet::new();
            info!(
                max_concurrent = this.max_concurrent(),
                tick_interval = ?this.settings.tick_interval,
                "Scheduler started"
            );

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = interval.tick() => {}
                    _ = this.wake.notified() => {}
                    Some(settled) = running.join_next(), if !running.is_empty() => {
                        match settled {
                            Ok(outcomes) => debug!(jobs = outcomes.len(), "Batch settled"),
                            Err(e) => error!(error = %e, "Batch task failed"),
                        }
                        continue;
                    }
                }
                if let TickOutcome::Admitted(batch) = this.tick().await {
                    running.spawn(batch.settle());
                }
            }

            info!(running = running.len(), "Scheduler stopping, waiting for in-flight jobs");
            while let Some(settled) = running.join_next().await {
                if let Err(e) = settled {
                    error!(error = %e, "Batch task failed");
                }
            }
            info!("Scheduler stopped");
        });

        SchedulerHandle {
            shutdown: shutdown_tx,
            driver,
        }
    }
}

/// Controls a running scheduler driver.
pub struct SchedulerHandle {
    shutdown: oneshot::Sender<()>,
    driver: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop admitting and wait for in-flight jobs to settle.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.driver.await {
            error!(error = %e, "Scheduler driver failed");
        }
    }
}
