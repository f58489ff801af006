//! Project setup command — `fxgen init`.

use anyhow::{Context, Result};
use console::style;
use fxgen::config::{FxgenConfig, FxgenToml};

pub async fn cmd_init(config: &FxgenConfig) -> Result<()> {
    std::fs::create_dir_all(&config.config_dir).with_context(|| {
        format!("Failed to create {}", config.config_dir.display())
    })?;

    let config_path = config.config_file();
    if config_path.exists() {
        println!(
            "{} {} already exists, leaving it unchanged",
            style("·").dim(),
            config_path.display()
        );
    } else {
        FxgenToml::default().save(&config_path)?;
        println!("{} Created {}", style("✓").green(), config_path.display());
    }

    let store = super::open_store(config)?;
    let stats = fxgen::status::StatusReporter::new(store).queue_stats().await?;
    println!(
        "{} Database ready at {} ({} jobs)",
        style("✓").green(),
        config.db_path().display(),
        stats.total()
    );
    println!();
    println!("Next: {}", style("fxgen serve").cyan());
    Ok(())
}
