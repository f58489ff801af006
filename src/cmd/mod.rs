//! CLI command implementations.
//!
//! | Module    | Commands handled                                  |
//! |-----------|---------------------------------------------------|
//! | `project` | `Init`                                            |
//! | `serve`   | `Serve`                                           |
//! | `jobs`    | `Submit`, `Status`, `Retry`, `Cancel`, `Effects`  |
//! | `config`  | `Config`                                          |

pub mod config;
pub mod jobs;
pub mod project;
pub mod serve;

pub use config::cmd_config;
pub use jobs::{cmd_cancel, cmd_effects, cmd_retry, cmd_status, cmd_submit};
pub use project::cmd_init;
pub use serve::{ServeArgs, cmd_serve};

use std::sync::Arc;

use anyhow::{Context, Result};
use fxgen::config::FxgenConfig;
use fxgen::generator::TemplateGenerator;
use fxgen::scheduler::{Scheduler, SchedulerSettings};
use fxgen::store::SqliteStore;

/// Open the project database, creating it if needed.
pub(crate) fn open_store(config: &FxgenConfig) -> Result<Arc<SqliteStore>> {
    let db_path = config.db_path();
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
    Ok(Arc::new(store))
}

/// A scheduler over the project database. Commands other than `serve`
/// use it for intake and transitions only and never start its loop.
pub(crate) fn build_scheduler(config: &FxgenConfig) -> Result<Arc<Scheduler>> {
    let store = open_store(config)?;
    Ok(Arc::new(Scheduler::new(
        store,
        Arc::new(TemplateGenerator::new()),
        SchedulerSettings::from(&config.toml.scheduler),
    )))
}
