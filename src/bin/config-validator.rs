//! # Decommission Configuration Validator
//!
//! Command-line tool that loads the decommission configuration the same way a
//! storage process does and prints the effective settings.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use range_decommission::config::{ConfigManager, DecommissionConfig};
use range_decommission::logging::init_structured_logging;
use std::path::PathBuf;
use std::process;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate decommission configuration")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Environment overlay to apply (development, test, production, ...)
    #[arg(short, long)]
    environment: Option<String>,

    /// Configuration directory (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Validate a single file instead of a directory
    #[arg(short, long, conflicts_with = "config_dir")]
    file: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,
}

fn main() {
    init_structured_logging();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => {
            info!("Configuration validation completed successfully");
        }
        Err(e) => {
            error!(error = %e, "Configuration validation failed");
            eprintln!("❌ {e:#}");
            process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let manager = match (&cli.file, &cli.environment) {
        (Some(file), _) => ConfigManager::load_from_file(file)
            .with_context(|| format!("loading {}", file.display()))?,
        (None, Some(environment)) => {
            ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), environment, None)
                .with_context(|| format!("loading environment {environment}"))?
        }
        (None, None) => ConfigManager::load_from_directory(cli.config_dir.clone())
            .context("loading configuration")?,
    };

    match cli.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(manager.config())?);
        }
        OutputFormat::Table => {
            println!("🔧 Decommission configuration");
            println!("Environment: {}", manager.environment());
            println!("Directory:   {}", manager.config_directory().display());
            println!();
            print_table(manager.config());
        }
    }

    Ok(())
}

fn print_table(config: &DecommissionConfig) {
    let streaming = &config.streaming;
    let throughput = match streaming.throughput_bytes_per_sec() {
        Some(bytes) => format!(
            "{} Mb/s ({bytes} bytes/s)",
            streaming.stream_throughput_outbound_megabits_per_sec
        ),
        None => "unthrottled".to_string(),
    };

    println!("streaming");
    println!("  outbound throughput       {throughput}");
    println!("  max concurrent transfers  {}", streaming.max_concurrent_transfers);
    println!("  chunk size                {} bytes", streaming.chunk_size_bytes);
    println!("  inactivity timeout        {} ms", streaming.inactivity_timeout_ms);
    println!("ledger");
    println!("  path                      {}", config.ledger.path().display());
    println!("events");
    println!("  channel capacity          {}", config.events.channel_capacity);
    println!();
    println!("✅ Configuration is valid");
}
