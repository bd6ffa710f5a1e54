use anyhow::{Result, Context};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::cli::config::ProbeConfig;
use crate::probe::{HttpFetcher, ProbeRunner};
use crate::report::{JsonReport, ReportSink, TextReport};

/// Probe the configured targets once and render the report
pub async fn run(config_path: Option<PathBuf>, only: Vec<String>, json: bool, output: Option<PathBuf>) -> Result<()> {
    let config = ProbeConfig::load(config_path.as_deref())?;
    let targets = config.select_targets(&only)?;

    if targets.is_empty() {
        warn!("No targets configured, nothing to probe");
    }

    let fetcher = HttpFetcher::from_settings(config.request.clone())
        .context("Failed to set up the HTTP fetcher")?;
    let runner = ProbeRunner::from_config(fetcher, &config);

    let run = runner.run(&targets).await;

    let writer: Box<dyn Write> = match &output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).context(format!("Failed to create report file: {}", path.display()))?,
        )),
        None => Box::new(io::stdout().lock()),
    };

    if json {
        JsonReport::new(writer).render(&run)?;
    } else {
        TextReport::new(writer, &config.discovery).render(&run)?;
    }

    if let Some(path) = output {
        info!("Report written to: {}", path.display());
    }

    Ok(())
}

/// List the configured targets in run order
pub fn list_targets(config_path: Option<PathBuf>) -> Result<()> {
    let config = ProbeConfig::load(config_path.as_deref())?;

    println!("Configured targets:");
    if config.targets.is_empty() {
        println!("  No targets configured.");
    } else {
        for target in &config.targets {
            println!("  - {:<16} {}", target.category, target.url);
        }
    }

    Ok(())
}

/// Write the default configuration file
pub fn init_config() -> Result<()> {
    let path = ProbeConfig::default().save_as_default()?;
    println!("Created default configuration: {}", path.display());
    Ok(())
}

/// Show the current configuration
pub fn show_config() -> Result<()> {
    let path = ProbeConfig::default_path();
    let config = ProbeConfig::load_default()?;
    if path.exists() {
        println!("Current configuration ({}):", path.display());
    } else {
        println!("Built-in defaults ({} not found, create it with `config --init`):", path.display());
    }
    println!("{}", serde_yaml::to_string(&config).context("Failed to serialize configuration")?);

    Ok(())
}
