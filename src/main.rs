use std::path::PathBuf;

use anyhow::{Context, Result};
use cfgsnap::core::FleetRunner;
use cfgsnap::logging::{self, LogConfig};
use cfgsnap::{config, context};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "cfgsnap")]
#[command(about = "Configuration backups for a fleet of RouterOS devices", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to /etc/cfgsnap/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Back up every configured device
    Run(RunArgs),
    /// Connect to every device and print its identity
    Probe(RunArgs),
    /// Write a default configuration file
    InitConfig { path: PathBuf },
}

#[derive(Args, Serialize)]
struct RunArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    backup_directory: Option<PathBuf>,

    /// Device address; repeat to replace the configured inventory
    #[serde(rename = "devices", skip_serializing_if = "Vec::is_empty")]
    #[arg(long = "device")]
    devices: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    retry_attempts: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    retry_delay_secs: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    simulation: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    verbose: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    json_logs: Option<bool>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_file = cli.config.as_deref();

    match &cli.command {
        Commands::Run(args) => {
            let config = config::AppConfig::new(config_file, Some(args))?;
            init_logging(&config);
            run_backup(context::AppContext::new(config))
                .await
                .context("Fleet backup failed")?
        }
        Commands::Probe(args) => {
            let config = config::AppConfig::new(config_file, Some(args))?;
            init_logging(&config);
            run_probe(context::AppContext::new(config)).await
        }
        Commands::InitConfig { path } => config::AppConfig::default()
            .write_to(path)
            .context("Failed to write default configuration")?,
    }

    Ok(())
}

fn init_logging(config: &config::AppConfig) {
    logging::init(LogConfig {
        json: config.json_logs,
        verbose: config.verbose,
    });
}

async fn run_backup(ctx: context::AppContext) -> Result<()> {
    let summary = FleetRunner::new(ctx).run().await?;
    println!("{}", summary.render());
    Ok(())
}

async fn run_probe(ctx: context::AppContext) {
    for result in FleetRunner::new(ctx).probe().await {
        match result.identity {
            Ok(identity) => println!("{:<18} {}", result.address, identity),
            Err(reason) => println!("{:<18} unreachable: {}", result.address, reason),
        }
    }
}
