use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};

use fxgen_common::*;

type StoreResult<T> = Result<T, StoreError>;

const JOB_COLUMNS: &str = "id, description, platform, options, status, progress, result, error, \
     estimated_time_ms, actual_time_ms, created_at, completed_at";

const EFFECT_COLUMNS: &str = "id, name, description, effect_type, category, platform, code, \
     parameters, metadata, tags, complexity, performance_tier, created_at";

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(entity: &'static str, id: &str, raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            entity,
            id: id.to_string(),
            message: format!("bad timestamp '{}': {}", raw, e),
        })
}

fn parse_field<T: FromStr<Err = String>>(
    entity: &'static str,
    id: &str,
    raw: &str,
) -> StoreResult<T> {
    T::from_str(raw).map_err(|message| StoreError::Corrupt {
        entity,
        id: id.to_string(),
        message,
    })
}

fn parse_json<T: serde::de::DeserializeOwned>(
    entity: &'static str,
    id: &str,
    raw: &str,
) -> StoreResult<T> {
    serde_json::from_str(raw).map_err(|e| StoreError::Corrupt {
        entity,
        id: id.to_string(),
        message: format!("bad JSON: {}", e),
    })
}

pub struct StoreDb {
    conn: Connection,
}

impl StoreDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> anyhow::Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> anyhow::Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.conn
            .busy_timeout(std::time::Duration::from_secs(5))
            .context("Failed to set busy timeout")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> anyhow::Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS jobs (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    id TEXT NOT NULL UNIQUE,
                    description TEXT NOT NULL,
                    platform TEXT NOT NULL,
                    options TEXT NOT NULL DEFAULT '{}',
                    status TEXT NOT NULL DEFAULT 'queued',
                    progress INTEGER NOT NULL DEFAULT 0,
                    result TEXT,
                    error TEXT,
                    estimated_time_ms INTEGER,
                    actual_time_ms INTEGER,
                    created_at TEXT NOT NULL,
                    completed_at TEXT
                );

                CREATE TABLE IF NOT EXISTS effects (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    id TEXT NOT NULL UNIQUE,
                    job_id TEXT,
                    name TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    effect_type TEXT NOT NULL,
                    category TEXT NOT NULL,
                    platform TEXT NOT NULL,
                    code TEXT NOT NULL,
                    parameters TEXT NOT NULL DEFAULT '{}',
                    metadata TEXT NOT NULL DEFAULT '{}',
                    tags TEXT NOT NULL DEFAULT '[]',
                    complexity TEXT NOT NULL,
                    performance_tier TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status, seq);
                CREATE INDEX IF NOT EXISTS idx_effects_job ON effects(job_id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Jobs ──────────────────────────────────────────────────────────

    pub fn insert_job(&self, job: &NewJob) -> StoreResult<JobRecord> {
        let id = uuid::Uuid::new_v4().to_string();
        let options = serde_json::to_string(&job.request.options)
            .context("Failed to serialize job options")?;
        self.conn
            .execute(
                "INSERT INTO jobs (id, description, platform, options, estimated_time_ms, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id,
                    job.request.description,
                    job.request.platform.as_str(),
                    options,
                    job.estimated_time_ms,
                    timestamp(Utc::now()),
                ],
            )
            .context("Failed to insert job")?;
        self.get_job(&id)?
            .ok_or_else(|| StoreError::Unavailable(format!("job {} not found after insert", id)))
    }

    pub fn get_job(&self, id: &str) -> StoreResult<Option<JobRecord>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS),
                params![id],
                JobRow::from_row,
            )
            .optional()
            .context("Failed to query job")?;
        row.map(JobRow::into_job_record).transpose()
    }

    pub fn get_jobs(&self, status: Option<JobStatus>) -> StoreResult<Vec<JobRecord>> {
        let rows: Vec<JobRow> = match status {
            Some(status) => {
                let mut stmt = self
                    .conn
                    .prepare(&format!(
                        "SELECT {} FROM jobs WHERE status = ?1 ORDER BY seq ASC",
                        JOB_COLUMNS
                    ))
                    .context("Failed to prepare get_jobs")?;
                stmt.query_map(params![status.as_str()], JobRow::from_row)
                    .context("Failed to query jobs")?
                    .collect::<Result<_, _>>()
                    .context("Failed to read job row")?
            }
            None => {
                let mut stmt = self
                    .conn
                    .prepare(&format!("SELECT {} FROM jobs ORDER BY seq ASC", JOB_COLUMNS))
                    .context("Failed to prepare get_jobs")?;
                stmt.query_map([], JobRow::from_row)
                    .context("Failed to query jobs")?
                    .collect::<Result<_, _>>()
                    .context("Failed to read job row")?
            }
        };
        rows.into_iter().map(JobRow::into_job_record).collect()
    }

    /// Apply a partial update.
    ///
    /// Progress only moves forward unless the job is being requeued.
    /// `completed_at` is stamped on the first terminal write of an attempt
    /// and cleared when the job is requeued.
    pub fn update_job(&self, id: &str, update: &JobUpdate) -> StoreResult<bool> {
        debug_assert!(
            update.follows_transitions(),
            "illegal status transition: {update:?}"
        );
        let mut sets: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(status) = update.status {
            values.push(Value::Text(status.as_str().to_string()));
            sets.push(format!("status = ?{}", values.len()));
            if status.is_terminal() {
                values.push(Value::Text(timestamp(Utc::now())));
                sets.push(format!("completed_at = COALESCE(completed_at, ?{})", values.len()));
            } else if status == JobStatus::Queued {
                sets.push("completed_at = NULL".to_string());
            }
        }
        if let Some(progress) = update.progress {
            values.push(Value::Integer(i64::from(progress)));
            if update.status == Some(JobStatus::Queued) {
                sets.push(format!("progress = ?{}", values.len()));
            } else {
                sets.push(format!("progress = MAX(progress, ?{})", values.len()));
            }
        }
        if let Some(result) = &update.result {
            let value = match result {
                Some(output) => Value::Text(
                    serde_json::to_string(output).context("Failed to serialize job result")?,
                ),
                None => Value::Null,
            };
            values.push(value);
            sets.push(format!("result = ?{}", values.len()));
        }
        if let Some(error) = &update.error {
            values.push(error.clone().map(Value::Text).unwrap_or(Value::Null));
            sets.push(format!("error = ?{}", values.len()));
        }
        if let Some(actual) = update.actual_time_ms {
            values.push(actual.map(Value::Integer).unwrap_or(Value::Null));
            sets.push(format!("actual_time_ms = ?{}", values.len()));
        }

        values.push(Value::Text(id.to_string()));
        let mut filter = format!("id = ?{}", values.len());
        if !update.only_if.is_empty() {
            let mut placeholders = Vec::new();
            for status in &update.only_if {
                values.push(Value::Text(status.as_str().to_string()));
                placeholders.push(format!("?{}", values.len()));
            }
            filter.push_str(&format!(" AND status IN ({})", placeholders.join(", ")));
        }

        if sets.is_empty() {
            let count: i64 = self
                .conn
                .query_row(
                    &format!("SELECT COUNT(*) FROM jobs WHERE {}", filter),
                    params_from_iter(values.iter()),
                    |row| row.get(0),
                )
                .context("Failed to check job")?;
            return Ok(count > 0);
        }

        let changed = self
            .conn
            .execute(
                &format!("UPDATE jobs SET {} WHERE {}", sets.join(", "), filter),
                params_from_iter(values.iter()),
            )
            .context("Failed to update job")?;
        Ok(changed > 0)
    }

    pub fn get_queue_stats(&self) -> StoreResult<QueueStats> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status")
            .context("Failed to prepare queue stats")?;
        let counts: Vec<(String, i64)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .context("Failed to query queue stats")?
            .collect::<Result<_, _>>()
            .context("Failed to read queue stats row")?;

        let (mut queued, mut processing, mut completed, mut failed) = (0u64, 0u64, 0u64, 0u64);
        for (status, count) in counts {
            let count = count.max(0) as u64;
            match parse_field::<JobStatus>("job", "*", &status)? {
                JobStatus::Queued => queued = count,
                JobStatus::Processing => processing = count,
                JobStatus::Completed => completed = count,
                JobStatus::Failed => failed = count,
            }
        }
        Ok(QueueStats::from_counts(queued, processing, completed, failed))
    }

    // ── Effects ───────────────────────────────────────────────────────

    pub fn create_effect(&self, effect: &NewEffect) -> StoreResult<Effect> {
        let id = uuid::Uuid::new_v4().to_string();
        let parameters =
            serde_json::to_string(&effect.parameters).context("Failed to serialize parameters")?;
        let metadata =
            serde_json::to_string(&effect.metadata).context("Failed to serialize metadata")?;
        let tags = serde_json::to_string(&effect.tags).context("Failed to serialize tags")?;
        self.conn
            .execute(
                "INSERT INTO effects (id, job_id, name, description, effect_type, category, platform,
                     code, parameters, metadata, tags, complexity, performance_tier, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    id,
                    effect.job_id(),
                    effect.name,
                    effect.description,
                    effect.effect_type.as_str(),
                    effect.category.as_str(),
                    effect.platform.as_str(),
                    effect.code,
                    parameters,
                    metadata,
                    tags,
                    effect.complexity.as_str(),
                    effect.performance_tier.as_str(),
                    timestamp(Utc::now()),
                ],
            )
            .context("Failed to insert effect")?;
        self.get_effect(&id)?
            .ok_or_else(|| StoreError::Unavailable(format!("effect {} not found after insert", id)))
    }

    pub fn get_effect(&self, id: &str) -> StoreResult<Option<Effect>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM effects WHERE id = ?1", EFFECT_COLUMNS),
                params![id],
                EffectRow::from_row,
            )
            .optional()
            .context("Failed to query effect")?;
        row.map(EffectRow::into_effect).transpose()
    }

    pub fn list_effects(&self) -> StoreResult<Vec<Effect>> {
        self.query_effects(
            &format!("SELECT {} FROM effects ORDER BY seq ASC", EFFECT_COLUMNS),
            None,
        )
    }

    pub fn effects_for_job(&self, job_id: &str) -> StoreResult<Vec<Effect>> {
        self.query_effects(
            &format!(
                "SELECT {} FROM effects WHERE job_id = ?1 ORDER BY seq ASC",
                EFFECT_COLUMNS
            ),
            Some(job_id),
        )
    }

    fn query_effects(&self, sql: &str, job_id: Option<&str>) -> StoreResult<Vec<Effect>> {
        let mut stmt = self.conn.prepare(sql).context("Failed to prepare effect query")?;
        let rows: Vec<EffectRow> = match job_id {
            Some(job_id) => stmt
                .query_map(params![job_id], EffectRow::from_row)
                .context("Failed to query effects")?
                .collect::<Result<_, _>>()
                .context("Failed to read effect row")?,
            None => stmt
                .query_map([], EffectRow::from_row)
                .context("Failed to query effects")?
                .collect::<Result<_, _>>()
                .context("Failed to read effect row")?,
        };
        rows.into_iter().map(EffectRow::into_effect).collect()
    }
}

// ── Row mapping ───────────────────────────────────────────────────────

/// Intermediate row struct for jobs.
struct JobRow {
    id: String,
    description: String,
    platform: String,
    options: String,
    status: String,
    progress: i64,
    result: Option<String>,
    error: Option<String>,
    estimated_time_ms: Option<i64>,
    actual_time_ms: Option<i64>,
    created_at: String,
    completed_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            description: row.get(1)?,
            platform: row.get(2)?,
            options: row.get(3)?,
            status: row.get(4)?,
            progress: row.get(5)?,
            result: row.get(6)?,
            error: row.get(7)?,
            estimated_time_ms: row.get(8)?,
            actual_time_ms: row.get(9)?,
            created_at: row.get(10)?,
            completed_at: row.get(11)?,
        })
    }

    fn into_job_record(self) -> StoreResult<JobRecord> {
        let id = self.id;
        let result = self
            .result
            .as_deref()
            .map(|raw| parse_json::<GenerationOutput>("job", &id, raw))
            .transpose()?;
        let completed_at = self
            .completed_at
            .as_deref()
            .map(|raw| parse_timestamp("job", &id, raw))
            .transpose()?;
        Ok(JobRecord {
            platform: parse_field("job", &id, &self.platform)?,
            options: parse_json("job", &id, &self.options)?,
            status: parse_field("job", &id, &self.status)?,
            progress: self.progress.clamp(0, 100) as u8,
            result,
            error: self.error,
            estimated_time_ms: self.estimated_time_ms,
            actual_time_ms: self.actual_time_ms,
            created_at: parse_timestamp("job", &id, &self.created_at)?,
            completed_at,
            description: self.description,
            id,
        })
    }
}

/// Intermediate row struct for effects.
struct EffectRow {
    id: String,
    name: String,
    description: String,
    effect_type: String,
    category: String,
    platform: String,
    code: String,
    parameters: String,
    metadata: String,
    tags: String,
    complexity: String,
    performance_tier: String,
    created_at: String,
}

impl EffectRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            effect_type: row.get(3)?,
            category: row.get(4)?,
            platform: row.get(5)?,
            code: row.get(6)?,
            parameters: row.get(7)?,
            metadata: row.get(8)?,
            tags: row.get(9)?,
            complexity: row.get(10)?,
            performance_tier: row.get(11)?,
            created_at: row.get(12)?,
        })
    }

    fn into_effect(self) -> StoreResult<Effect> {
        let id = self.id;
        let fields = NewEffect {
            effect_type: parse_field("effect", &id, &self.effect_type)?,
            category: parse_field("effect", &id, &self.category)?,
            platform: parse_field("effect", &id, &self.platform)?,
            parameters: parse_json("effect", &id, &self.parameters)?,
            metadata: parse_json("effect", &id, &self.metadata)?,
            tags: parse_json("effect", &id, &self.tags)?,
            complexity: parse_field("effect", &id, &self.complexity)?,
            performance_tier: parse_field("effect", &id, &self.performance_tier)?,
            name: self.name,
            description: self.description,
            code: self.code,
        };
        Ok(Effect {
            created_at: parse_timestamp("effect", &id, &self.created_at)?,
            fields,
            id,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
