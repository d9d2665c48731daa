//! qscaled — queue-driven service autoscaler daemon.
//!
//! # Usage
//!
//! ```text
//! qscaled run --config /etc/qscale/scaler.toml
//! qscaled check --config /etc/qscale/scaler.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use qscaled::{ClusterClient, DaemonOptions, HttpControlPlane};

#[derive(Parser)]
#[command(name = "qscaled", about = "Queue-driven service autoscaler")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the autoscaler until SIGINT/SIGTERM.
    Run {
        /// Path to the scaler configuration file.
        #[arg(long, short, default_value = "scaler.toml")]
        config: PathBuf,

        /// Decision loop interval in seconds.
        #[arg(long, default_value = "10")]
        decision_interval: u64,

        /// Metric purge interval in seconds.
        #[arg(long, default_value = "120")]
        purge_interval: u64,

        /// Timeout for each broker and control-plane call, in milliseconds.
        #[arg(long, default_value = "2500")]
        call_timeout_ms: u64,

        /// Seconds to wait for tasks to finish after a shutdown signal.
        #[arg(long, default_value = "5")]
        shutdown_grace: u64,

        /// Seconds before the first scaling decision. Defaults to the
        /// larger of the polling interval and 60s, plus 10s.
        #[arg(long)]
        warmup: Option<u64>,
    },
    /// Validate a configuration file and exit.
    Check {
        #[arg(long, short, default_value = "scaler.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Run {
            config,
            decision_interval,
            purge_interval,
            call_timeout_ms,
            shutdown_grace,
            warmup,
        } => {
            let options = DaemonOptions {
                decision_interval: Duration::from_secs(decision_interval),
                purge_interval: Duration::from_secs(purge_interval),
                call_timeout: Duration::from_millis(call_timeout_ms),
                shutdown_grace: Duration::from_secs(shutdown_grace),
                warmup: warmup.map(Duration::from_secs),
                ..DaemonOptions::default()
            };
            run(config, options).await
        }
        Command::Check { config } => {
            let cfg = qscale_config::load(&config)
                .with_context(|| format!("invalid configuration {}", config.display()))?;
            info!(
                path = %config.display(),
                services = cfg.services.len(),
                "configuration is valid"
            );
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,qscaled=debug,qscale=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(config_path: PathBuf, options: DaemonOptions) -> anyhow::Result<()> {
    info!(config = %config_path.display(), "qscale daemon starting");

    let config = qscale_config::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let control_plane = config
        .control_plane
        .as_ref()
        .context("[control_plane] section is required to run the daemon")?;

    let cluster = Arc::new(HttpControlPlane::new(
        control_plane.base_url.clone(),
        options.call_timeout,
    ));
    let client = ClusterClient {
        counts: cluster.clone(),
        mutator: cluster,
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let running = qscaled::spawn(&config, client, &options, shutdown_rx);
    info!(services = config.services.len(), "qscale daemon running");

    shutdown_signal().await;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    for status in running.join(options.shutdown_grace).await {
        info!(
            service = %status.service,
            cycles = status.cycles,
            last_decision = ?status.last_decision,
            confirmed_replicas = ?status.last_confirmed,
            "final scaling status"
        );
    }

    info!("qscale daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
