//! loadscaled — the loadscale daemon.
//!
//! # Usage
//!
//! ```text
//! loadscaled run --config loadscale.toml --data-dir /var/lib/loadscale
//! loadscaled run --config loadscale.toml --drive http://127.0.0.1:8080/ --workload web
//! loadscaled loadtest http://127.0.0.1:8080/health --requests 500 --concurrency 20 --duration 30s
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info};

use loadscale_core::{LoadscaleConfig, parse_duration};
use loadscale_loadgen::{HyperClient, LoadGenerator, LoadTestSpec};
use loadscaled::{Daemon, Drive};

#[derive(Parser)]
#[command(name = "loadscaled", about = "loadscale daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the autoscaler and load test registry until Ctrl-C.
    Run {
        /// Configuration file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Data directory for persistent state. Overrides `[state] data_dir`.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Drive a load test against this URL and feed its throughput to
        /// the simulated workload.
        #[arg(long)]
        drive: Option<String>,

        /// Workload receiving the driven load. Defaults to the first
        /// configured policy's workload.
        #[arg(long)]
        workload: Option<String>,

        #[arg(long, default_value = "600")]
        requests: u32,

        #[arg(long, default_value = "20")]
        concurrency: u32,

        #[arg(long, default_value = "60s", value_parser = parse_duration_arg)]
        duration: Duration,
    },

    /// Run one load test and print its aggregate as JSON.
    Loadtest {
        /// Target URL.
        target: String,

        /// Configuration file, for limits and the request timeout.
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long, default_value = "100")]
        requests: u32,

        #[arg(long, default_value = "10")]
        concurrency: u32,

        #[arg(long, default_value = "10s", value_parser = parse_duration_arg)]
        duration: Duration,
    },
}

fn parse_duration_arg(s: &str) -> Result<Duration, String> {
    parse_duration(s).map_err(|e| e.to_string())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,loadscaled=debug,loadscale=debug"));

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<LoadscaleConfig> {
    match path {
        Some(path) => LoadscaleConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(LoadscaleConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Run {
            config,
            data_dir,
            drive,
            workload,
            requests,
            concurrency,
            duration,
        } => {
            let mut config = load_config(config.as_ref())?;
            if data_dir.is_some() {
                config.state.data_dir = data_dir;
            }

            let drive = match drive {
                Some(target) => {
                    let workload_id = workload
                        .or_else(|| config.policies.first().map(|p| p.spec.workload_id.clone()))
                        .context("--drive needs --workload or at least one configured policy")?;
                    Some(Drive {
                        spec: LoadTestSpec::new(target, requests, concurrency, duration),
                        workload_id,
                    })
                }
                None => None,
            };

            run_daemon(config, drive).await
        }
        Command::Loadtest {
            target,
            config,
            requests,
            concurrency,
            duration,
        } => {
            let config = load_config(config.as_ref())?;
            run_loadtest(config, LoadTestSpec::new(target, requests, concurrency, duration)).await
        }
    }
}

async fn run_daemon(config: LoadscaleConfig, drive: Option<Drive>) -> anyhow::Result<()> {
    info!("loadscale daemon starting");
    let daemon = Daemon::open(config)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
        }
        let _ = shutdown_tx.send(true);
    });

    daemon.run(drive, shutdown_rx).await
}

async fn run_loadtest(config: LoadscaleConfig, spec: LoadTestSpec) -> anyhow::Result<()> {
    spec.validate(&config.loadtest)?;

    let client = Arc::new(HyperClient::new(config.loadtest.request_timeout));
    let summary = LoadGenerator::new(client).run(&spec).await;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
