//! Configuration view and validation commands — `fxgen config`.

use anyhow::Result;
use console::style;
use fxgen::config::{FxgenConfig, FxgenToml};

use super::super::ConfigCommands;

fn print_toml(toml: &FxgenToml) {
    let sched = &toml.scheduler;
    println!("[scheduler]");
    println!("  max_concurrent = {}", sched.max_concurrent);
    println!("  tick_interval_ms = {}", sched.tick_interval_ms);
    println!("  progress_step_delay_ms = {}", sched.progress_step_delay_ms);
    println!("  progress_checkpoints = {:?}", sched.progress_checkpoints);
    println!();
    println!("[server]");
    println!("  host = \"{}\"", toml.server.host);
    println!("  port = {}", toml.server.port);
    println!("  db_path = \"{}\"", toml.server.db_path.display());
    println!();
    println!("[logging]");
    println!("  filter = \"{}\"", toml.logging.filter);
    println!("  json = {}", toml.logging.json);
    if let Some(dir) = &toml.logging.directory {
        println!("  directory = \"{}\"", dir.display());
    }
    println!();
}

pub fn cmd_config(config: &FxgenConfig, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = config.config_file();

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("fxgen Configuration");
            println!("===================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No fxgen.toml found at {}", config_path.display());
                println!("Using defaults. Run 'fxgen config init' to create one.");
            }
            println!();

            println!("Effective values (with env overrides):");
            println!();
            print_toml(&config.toml);
            println!("Database: {}", config.db_path().display());
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No fxgen.toml found. Using defaults.");
            }

            let warnings = config.validate();
            if warnings.is_empty() {
                println!("{} Configuration is valid.", style("✓").green());
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", style(warning).yellow());
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("fxgen.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            std::fs::create_dir_all(&config.config_dir)?;
            FxgenToml::default().save(&config_path)?;

            println!("Created fxgen.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [scheduler] max_concurrent, tick_interval_ms, progress_checkpoints");
            println!("  - [server] host, port, db_path");
            println!("  - [logging] filter, json, directory");
            println!();
        }
    }

    Ok(())
}
