use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use fxgen::config::FxgenConfig;

mod cmd;

#[derive(Parser)]
#[command(name = "fxgen")]
#[command(version, about = "Queue and generate visual-effect code")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize .fxgen/ with a default config and an empty database
    Init,
    /// Run the scheduler and the HTTP/WebSocket server
    Serve {
        /// Port to serve on (overrides fxgen.toml)
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind (overrides fxgen.toml)
        #[arg(long)]
        host: Option<String>,

        /// Concurrency ceiling, clamped to 1..=10
        #[arg(long)]
        max_concurrent: Option<usize>,

        /// Allow cross-origin requests (for a local UI dev server)
        #[arg(long)]
        cors: bool,
    },
    /// Queue a generation request
    Submit {
        /// What the effect should look like
        description: String,

        /// Target platform: web, threejs, glsl
        #[arg(short, long, default_value = "web")]
        platform: String,

        /// Generation options as a JSON object
        #[arg(long)]
        options: Option<String>,
    },
    /// Show queue counts, a job list, or one job
    Status {
        /// Job id to show
        id: Option<String>,

        /// Only list jobs in this status: queued, processing, completed, failed
        #[arg(long)]
        status: Option<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Requeue a failed job
    Retry { id: String },
    /// Cancel a queued or processing job
    Cancel { id: String },
    /// List cataloged effects, or show one with its code
    Effects { id: Option<String> },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default fxgen.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let config = FxgenConfig::new(project_dir)?;
    let _log_guard = fxgen::logging::init(
        &config.toml.logging,
        config.log_dir().as_deref(),
        cli.verbose,
    )?;

    match cli.command {
        Commands::Init => cmd::cmd_init(&config).await?,
        Commands::Serve {
            port,
            host,
            max_concurrent,
            cors,
        } => {
            cmd::cmd_serve(
                config,
                cmd::ServeArgs {
                    port,
                    host,
                    max_concurrent,
                    cors,
                },
            )
            .await?
        }
        Commands::Submit {
            description,
            platform,
            options,
        } => cmd::cmd_submit(&config, description, &platform, options.as_deref()).await?,
        Commands::Status { id, status, json } => {
            cmd::cmd_status(&config, id.as_deref(), status.as_deref(), json).await?
        }
        Commands::Retry { id } => cmd::cmd_retry(&config, &id).await?,
        Commands::Cancel { id } => cmd::cmd_cancel(&config, &id).await?,
        Commands::Effects { id } => cmd::cmd_effects(&config, id.as_deref()).await?,
        Commands::Config { command } => cmd::cmd_config(&config, command)?,
    }

    Ok(())
}
