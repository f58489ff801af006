use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Highest value the concurrency ceiling may take.
pub const MAX_CONCURRENCY: usize = 10;
/// Lowest value the concurrency ceiling may take.
pub const MIN_CONCURRENCY: usize = 1;
/// Error message recorded on a job that was cancelled.
pub const CANCELLED_MESSAGE: &str = "cancelled";

// ── Job lifecycle ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Queued,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// `completed` and `failed` are terminal; only an explicit retry leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::Queued | Self::Processing)
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Validate a status transition.
    ///
    /// `Queued -> Failed` is the cancel path and `Failed -> Queued` the retry path.
    pub fn can_transition_to(&self, to: JobStatus) -> bool {
        matches!(
            (self, to),
            (Self::Queued, Self::Processing)
                | (Self::Queued, Self::Failed)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
                | (Self::Failed, Self::Queued)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid job status: {}", s)),
        }
    }
}

/// Target platform for generated effect code.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Canvas 2D JavaScript
    #[default]
    Web,
    /// Three.js points system
    #[serde(rename = "threejs")]
    ThreeJs,
    /// Standalone GLSL fragment shader
    Glsl,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::ThreeJs => "threejs",
            Self::Glsl => "glsl",
        }
    }

    /// Shader and 3D targets cost more to render than plain 2D canvas code.
    pub fn is_gpu_bound(&self) -> bool {
        matches!(self, Self::ThreeJs | Self::Glsl)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "web" | "canvas" => Ok(Self::Web),
            "threejs" | "three.js" | "three" => Ok(Self::ThreeJs),
            "glsl" | "shader" => Ok(Self::Glsl),
            _ => Err(format!(
                "Invalid platform '{}'. Valid values: web, threejs, glsl",
                s
            )),
        }
    }
}

/// The immutable payload of a generation request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationRequest {
    pub description: String,
    pub platform: Platform,
    #[serde(default = "empty_options")]
    pub options: serde_json::Value,
}

impl GenerationRequest {
    pub fn new(description: impl Into<String>, platform: Platform) -> Self {
        Self {
            description: description.into(),
            platform,
            options: empty_options(),
        }
    }

    pub fn with_options(mut self, options: serde_json::Value) -> Self {
        self.options = options;
        self
    }
}

pub fn empty_options() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// Opaque generator output stored on a completed job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationOutput {
    pub code: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// A job as inserted by the intake boundary.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub request: GenerationRequest,
    pub estimated_time_ms: Option<i64>,
}

impl From<GenerationRequest> for NewJob {
    fn from(request: GenerationRequest) -> Self {
        Self {
            request,
            estimated_time_ms: None,
        }
    }
}

/// One generation request and its tracked lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobRecord {
    pub id: String,
    pub description: String,
    pub platform: Platform,
    pub options: serde_json::Value,
    pub status: JobStatus,
    pub progress: u8,
    pub result: Option<GenerationOutput>,
    pub error: Option<String>,
    pub estimated_time_ms: Option<i64>,
    pub actual_time_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    pub fn request(&self) -> GenerationRequest {
        GenerationRequest {
            description: self.description.clone(),
            platform: self.platform,
            options: self.options.clone(),
        }
    }

    /// Exactly one of `result`/`error` is set in a terminal state, neither otherwise.
    pub fn is_consistent(&self) -> bool {
        match self.status {
            JobStatus::Queued | JobStatus::Processing => {
                self.result.is_none() && self.error.is_none()
            }
            JobStatus::Completed => self.result.is_some() && self.error.is_none(),
            JobStatus::Failed => self.result.is_none() && self.error.is_some(),
        }
    }

    pub fn was_cancelled(&self) -> bool {
        self.status == JobStatus::Failed && self.error.as_deref() == Some(CANCELLED_MESSAGE)
    }
}

/// A partial write to a job record.
///
/// Fields left as `None` are untouched. `Some(None)` clears a nullable column.
/// When `only_if` is non-empty the write applies only while the stored
/// status is one of the listed statuses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub result: Option<Option<GenerationOutput>>,
    pub error: Option<Option<String>>,
    pub actual_time_ms: Option<Option<i64>>,
    pub only_if: Vec<JobStatus>,
}

impl JobUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    pub fn result(mut self, result: Option<GenerationOutput>) -> Self {
        self.result = Some(result);
        self
    }

    pub fn error(mut self, error: Option<String>) -> Self {
        self.error = Some(error);
        self
    }

    pub fn actual_time_ms(mut self, ms: Option<i64>) -> Self {
        self.actual_time_ms = Some(ms);
        self
    }

    pub fn only_if(mut self, statuses: &[JobStatus]) -> Self {
        self.only_if = statuses.to_vec();
        self
    }

    /// True when every guarded source status may move to the target status.
    pub fn follows_transitions(&self) -> bool {
        match self.status {
            Some(to) => self.only_if.iter().all(|from| from.can_transition_to(to)),
            None => true,
        }
    }

    /// Admission: `queued -> processing` at progress 0.
    pub fn admitted() -> Self {
        Self::new()
            .status(JobStatus::Processing)
            .progress(0)
            .only_if(&[JobStatus::Queued])
    }

    /// A progress checkpoint while the job is still owned by the scheduler.
    pub fn checkpoint(progress: u8) -> Self {
        Self::new()
            .progress(progress)
            .only_if(&[JobStatus::Processing])
    }

    pub fn completed(output: GenerationOutput, elapsed_ms: i64) -> Self {
        Self::new()
            .status(JobStatus::Completed)
            .progress(100)
            .result(Some(output))
            .error(None)
            .actual_time_ms(Some(elapsed_ms))
            .only_if(&[JobStatus::Processing])
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new()
            .status(JobStatus::Failed)
            .result(None)
            .error(Some(message.into()))
            .only_if(&[JobStatus::Processing])
    }

    pub fn cancelled() -> Self {
        Self::new()
            .status(JobStatus::Failed)
            .result(None)
            .error(Some(CANCELLED_MESSAGE.to_string()))
            .only_if(&[JobStatus::Queued, JobStatus::Processing])
    }

    /// Retry: `failed -> queued`, clearing the previous attempt's outcome.
    pub fn requeued() -> Self {
        Self::new()
            .status(JobStatus::Queued)
            .progress(0)
            .result(None)
            .error(None)
            .actual_time_ms(None)
            .only_if(&[JobStatus::Failed])
    }
}

/// Job counts by status.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueStats {
    pub queued: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub total_processed: u64,
}

impl QueueStats {
    pub fn from_counts(queued: u64, processing: u64, completed: u64, failed: u64) -> Self {
        Self {
            queued,
            processing,
            completed,
            failed,
            total_processed: completed + failed,
        }
    }

    pub fn total(&self) -> u64 {
        self.queued + self.processing + self.completed + self.failed
    }
}

// ── Effect library ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EffectType {
    Particle,
    Lighting,
    Morphing,
    Physics,
    Digital,
}

impl EffectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Particle => "PARTICLE",
            Self::Lighting => "LIGHTING",
            Self::Morphing => "MORPHING",
            Self::Physics => "PHYSICS",
            Self::Digital => "DIGITAL",
        }
    }
}

impl FromStr for EffectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PARTICLE" => Ok(Self::Particle),
            "LIGHTING" => Ok(Self::Lighting),
            "MORPHING" => Ok(Self::Morphing),
            "PHYSICS" => Ok(Self::Physics),
            "DIGITAL" => Ok(Self::Digital),
            _ => Err(format!("Invalid effect type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EffectCategory {
    Explosion,
    Transition,
    Fire,
    Atmospheric,
    Transformation,
    Distortion,
    Effect,
}

impl EffectCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Explosion => "EXPLOSION",
            Self::Transition => "TRANSITION",
            Self::Fire => "FIRE",
            Self::Atmospheric => "ATMOSPHERIC",
            Self::Transformation => "TRANSFORMATION",
            Self::Distortion => "DISTORTION",
            Self::Effect => "EFFECT",
        }
    }
}

impl FromStr for EffectCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EXPLOSION" => Ok(Self::Explosion),
            "TRANSITION" => Ok(Self::Transition),
            "FIRE" => Ok(Self::Fire),
            "ATMOSPHERIC" => Ok(Self::Atmospheric),
            "TRANSFORMATION" => Ok(Self::Transformation),
            "DISTORTION" => Ok(Self::Distortion),
            "EFFECT" => Ok(Self::Effect),
            _ => Err(format!("Invalid effect category: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Moderate => "moderate",
            Self::Complex => "complex",
        }
    }
}

impl FromStr for Complexity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simple" => Ok(Self::Simple),
            "moderate" => Ok(Self::Moderate),
            "complex" => Ok(Self::Complex),
            _ => Err(format!("Invalid complexity: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceTier {
    Light,
    Standard,
    Heavy,
}

impl PerformanceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Standard => "standard",
            Self::Heavy => "heavy",
        }
    }
}

impl FromStr for PerformanceTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "light" => Ok(Self::Light),
            "standard" => Ok(Self::Standard),
            "heavy" => Ok(Self::Heavy),
            _ => Err(format!("Invalid performance tier: {}", s)),
        }
    }
}

/// A cataloged effect ready for insertion into the library.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewEffect {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub effect_type: EffectType,
    pub category: EffectCategory,
    pub platform: Platform,
    pub code: String,
    pub parameters: serde_json::Value,
    pub metadata: serde_json::Value,
    pub tags: Vec<String>,
    pub complexity: Complexity,
    pub performance_tier: PerformanceTier,
}

impl NewEffect {
    /// Id of the job this effect was derived from, if recorded.
    pub fn job_id(&self) -> Option<&str> {
        self.metadata.get("jobId").and_then(|v| v.as_str())
    }
}

/// An effect owned by the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Effect {
    pub id: String,
    #[serde(flatten)]
    pub fields: NewEffect,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_round_trips_through_str() {
        for status in JobStatus::ALL {
            assert_eq!(JobStatus::from_str(status.as_str()).unwrap(), status);
        }
        assert!(JobStatus::from_str("running").is_err());
    }

    #[test]
    fn test_job_status_terminal_and_cancellable() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());

        assert!(JobStatus::Queued.is_cancellable());
        assert!(JobStatus::Processing.is_cancellable());
        assert!(!JobStatus::Completed.is_cancellable());
        assert!(!JobStatus::Failed.is_cancellable());

        assert!(JobStatus::Failed.is_retryable());
        assert!(!JobStatus::Completed.is_retryable());
    }

    #[test]
    fn test_valid_transitions() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Processing));
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Failed.can_transition_to(JobStatus::Queued));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Queued));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Processing));
        assert!(!JobStatus::Processing.can_transition_to(JobStatus::Queued));
    }

    #[test]
    fn test_update_presets_follow_transitions() {
        let output = GenerationOutput {
            code: "void main() {}".into(),
            metadata: serde_json::Value::Null,
        };
        for update in [
            JobUpdate::admitted(),
            JobUpdate::checkpoint(40),
            JobUpdate::completed(output, 1200),
            JobUpdate::failed("boom"),
            JobUpdate::cancelled(),
            JobUpdate::requeued(),
        ] {
            assert!(update.follows_transitions(), "{update:?}");
        }

        let reopen = JobUpdate::new()
            .status(JobStatus::Queued)
            .only_if(&[JobStatus::Completed]);
        assert!(!reopen.follows_transitions());
    }

    #[test]
    fn test_platform_parsing_accepts_aliases() {
        assert_eq!("web".parse::<Platform>().unwrap(), Platform::Web);
        assert_eq!("Three.js".parse::<Platform>().unwrap(), Platform::ThreeJs);
        assert_eq!("shader".parse::<Platform>().unwrap(), Platform::Glsl);
        let err = "unity".parse::<Platform>().unwrap_err();
        assert!(err.contains("unity"));
    }

    #[test]
    fn test_platform_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Platform::ThreeJs).unwrap(),
            "\"threejs\""
        );
    }

    #[test]
    fn test_job_update_presets_guard_their_source_states() {
        assert_eq!(JobUpdate::admitted().only_if, vec![JobStatus::Queued]);
        assert_eq!(JobUpdate::checkpoint(40).only_if, vec![JobStatus::Processing]);
        assert_eq!(JobUpdate::requeued().only_if, vec![JobStatus::Failed]);
        assert_eq!(
            JobUpdate::cancelled().only_if,
            vec![JobStatus::Queued, JobStatus::Processing]
        );
    }

    #[test]
    fn test_job_update_progress_is_capped() {
        assert_eq!(JobUpdate::new().progress(150).progress, Some(100));
    }

    #[test]
    fn test_queue_stats_total_processed() {
        let stats = QueueStats::from_counts(2, 3, 4, 1);
        assert_eq!(stats.total_processed, 5);
        assert_eq!(stats.total(), 10);
    }

    #[test]
    fn test_record_consistency() {
        let mut job = JobRecord {
            id: "j1".into(),
            description: "blue sparks".into(),
            platform: Platform::Web,
            options: empty_options(),
            status: JobStatus::Queued,
            progress: 0,
            result: None,
            error: None,
            estimated_time_ms: None,
            actual_time_ms: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        assert!(job.is_consistent());

        job.status = JobStatus::Completed;
        assert!(!job.is_consistent());
        job.result = Some(GenerationOutput {
            code: "x".into(),
            metadata: serde_json::json!({}),
        });
        assert!(job.is_consistent());

        job.status = JobStatus::Failed;
        job.result = None;
        job.error = Some(CANCELLED_MESSAGE.into());
        assert!(job.is_consistent());
        assert!(job.was_cancelled());
    }

    #[test]
    fn test_effect_serializes_type_field() {
        let effect = NewEffect {
            name: "Blue Sparks Effect".into(),
            description: "blue sparks".into(),
            effect_type: EffectType::Particle,
            category: EffectCategory::Effect,
            platform: Platform::Web,
            code: String::new(),
            parameters: serde_json::json!({}),
            metadata: serde_json::json!({"jobId": "abc"}),
            tags: vec!["blue".into()],
            complexity: Complexity::Simple,
            performance_tier: PerformanceTier::Light,
        };
        let json = serde_json::to_value(&effect).unwrap();
        assert_eq!(json["type"], "PARTICLE");
        assert_eq!(effect.job_id(), Some("abc"));
    }
}
