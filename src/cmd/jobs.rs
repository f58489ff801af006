//! Job intake and inspection commands — `fxgen submit|status|retry|cancel|effects`.

use std::str::FromStr;

use anyhow::{Context, Result, bail};
use console::style;
use fxgen::config::FxgenConfig;
use fxgen::scheduler::TransitionOutcome;
use fxgen::status::{JobStatusView, StatusReporter};
use fxgen_common::*;

pub async fn cmd_submit(
    config: &FxgenConfig,
    description: String,
    platform: &str,
    options: Option<&str>,
) -> Result<()> {
    let platform = Platform::from_str(platform).map_err(anyhow::Error::msg)?;
    let options = match options {
        Some(raw) => {
            let value: serde_json::Value =
                serde_json::from_str(raw).context("--options is not valid JSON")?;
            if !value.is_object() {
                bail!("--options must be a JSON object");
            }
            value
        }
        None => empty_options(),
    };

    let scheduler = super::build_scheduler(config)?;
    let job = scheduler
        .enqueue(GenerationRequest::new(description, platform).with_options(options))
        .await?;

    println!("{} Queued job {}", style("✓").green(), style(&job.id).bold());
    if let Some(ms) = job.estimated_time_ms {
        println!(
            "  platform: {}, estimated: {:.1}s",
            job.platform,
            ms as f64 / 1000.0
        );
    }
    println!("  Run {} to process the queue.", style("fxgen serve").cyan());
    Ok(())
}

fn status_label(status: JobStatus) -> console::StyledObject<&'static str> {
    let label = style(status.as_str());
    match status {
        JobStatus::Queued => label.dim(),
        JobStatus::Processing => label.yellow(),
        JobStatus::Completed => label.green(),
        JobStatus::Failed => label.red(),
    }
}

fn print_job(view: &JobStatusView) {
    println!("Job {}", style(&view.id).bold());
    println!("  status:    {}", status_label(view.status));
    println!("  progress:  {}%", view.progress);
    println!("  created:   {}", view.created_at.to_rfc3339());
    if let Some(completed) = view.completed_at {
        println!("  completed: {}", completed.to_rfc3339());
    }
    if let Some(ms) = view.estimated_time {
        println!("  estimated: {}ms", ms);
    }
    if let Some(ms) = view.actual_time {
        println!("  actual:    {}ms", ms);
    }
    if let Some(error) = &view.error {
        println!("  error:     {}", style(error).red());
    }
    if let Some(result) = &view.result {
        println!("  code:      {} lines", result.code.lines().count());
    }
}

pub async fn cmd_status(
    config: &FxgenConfig,
    id: Option<&str>,
    status: Option<&str>,
    json: bool,
) -> Result<()> {
    let store = super::open_store(config)?;
    let reporter = StatusReporter::new(store);

    if let Some(id) = id {
        let Some(view) = reporter.job_status(id).await? else {
            bail!("No job with id {}", id);
        };
        if json {
            println!("{}", serde_json::to_string_pretty(&view)?);
        } else {
            print_job(&view);
        }
        return Ok(());
    }

    let filter = status
        .map(JobStatus::from_str)
        .transpose()
        .map_err(anyhow::Error::msg)?;
    let stats = reporter.queue_stats().await?;
    let jobs = reporter.jobs(filter).await?;

    if json {
        let body = serde_json::json!({ "stats": stats, "jobs": jobs });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    println!();
    println!("Queue");
    println!("=====");
    println!(
        "  queued: {}  processing: {}  completed: {}  failed: {}",
        stats.queued, stats.processing, stats.completed, stats.failed
    );
    println!();
    if jobs.is_empty() {
        println!("No jobs.");
        return Ok(());
    }
    for job in &jobs {
        println!(
            "  {}  {:<10} {:>3}%  {}",
            job.id,
            status_label(job.status),
            job.progress,
            style(job.error.as_deref().unwrap_or("")).dim()
        );
    }
    println!();
    Ok(())
}

fn report_transition(verb: &str, id: &str, outcome: TransitionOutcome) -> Result<()> {
    match outcome {
        TransitionOutcome::Applied(status) => {
            println!(
                "{} {} job {} (now {})",
                style("✓").green(),
                verb,
                id,
                status_label(status)
            );
            Ok(())
        }
        TransitionOutcome::Ignored(status) => {
            println!(
                "{} Job {} is {}; nothing to do",
                style("·").dim(),
                id,
                status_label(status)
            );
            Ok(())
        }
        TransitionOutcome::NotFound => bail!("No job with id {}", id),
    }
}

pub async fn cmd_retry(config: &FxgenConfig, id: &str) -> Result<()> {
    let scheduler = super::build_scheduler(config)?;
    report_transition("Requeued", id, scheduler.retry(id).await?)
}

pub async fn cmd_cancel(config: &FxgenConfig, id: &str) -> Result<()> {
    let scheduler = super::build_scheduler(config)?;
    report_transition("Cancelled", id, scheduler.cancel(id).await?)
}

pub async fn cmd_effects(config: &FxgenConfig, id: Option<&str>) -> Result<()> {
    let store = super::open_store(config)?;

    if let Some(id) = id {
        let Some(effect) = store.get_effect(id).await? else {
            bail!("No effect with id {}", id);
        };
        let fields = &effect.fields;
        println!("{}", style(&fields.name).bold());
        println!("  {}", fields.description);
        println!(
            "  {} / {} on {} ({}, {})",
            fields.effect_type.as_str(),
            fields.category.as_str(),
            fields.platform,
            fields.complexity.as_str(),
            fields.performance_tier.as_str()
        );
        if !fields.tags.is_empty() {
            println!("  tags: {}", fields.tags.join(", "));
        }
        println!();
        println!("{}", fields.code);
        return Ok(());
    }

    let effects = store.list_effects().await?;
    if effects.is_empty() {
        println!("No effects yet.");
        return Ok(());
    }
    for effect in &effects {
        println!(
            "  {}  {:<28} {:<10} {:<14} {}",
            effect.id,
            effect.fields.name,
            effect.fields.effect_type.as_str(),
            effect.fields.category.as_str(),
            style(effect.fields.platform).dim()
        );
    }
    Ok(())
}
