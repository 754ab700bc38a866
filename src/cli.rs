use crate::activity::ActivityLog;
use crate::api::{self, AppState};
use crate::config::ConfigStore;
use crate::engine::WorkerCommand;
use crate::orchestrator::{Supervisor, SupervisorSettings};
use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Parser, Clone)]
#[command(
    name = "applybot-control",
    version,
    about = "Supervise the job-application worker and expose its status over HTTP"
)]
pub struct Cli {
    /// Address the HTTP API listens on
    #[arg(long, env = "APPLYBOT_BIND", default_value = "0.0.0.0:8000")]
    pub bind: SocketAddr,

    /// Worker configuration file (YAML)
    #[arg(long, env = "APPLYBOT_CONFIG", default_value = "config.yaml")]
    pub config: PathBuf,

    /// Directory holding the worker's activity log
    #[arg(long, env = "APPLYBOT_LOGS_DIR", default_value = "logs")]
    pub logs_dir: PathBuf,

    /// Worker executable
    #[arg(long, default_value = "python3")]
    pub worker_program: PathBuf,

    /// Argument passed to the worker (repeatable)
    #[arg(long = "worker-arg", default_values_t = vec!["main.py".to_string()])]
    pub worker_args: Vec<String>,

    /// Working directory for the worker (defaults to the current directory)
    #[arg(long)]
    pub worker_dir: Option<PathBuf>,

    /// Browser binary exported to the worker as CHROME_BINARY
    #[arg(long, env = "CHROME_BINARY", default_value = "/opt/google/chrome/chrome")]
    pub chrome_binary: PathBuf,

    /// How long a stop waits for a graceful exit before killing the worker
    #[arg(long, default_value = "5s")]
    pub stop_timeout: humantime::Duration,

    /// Polling interval while waiting for the worker to exit
    #[arg(long, default_value = "500ms")]
    pub poll_interval: humantime::Duration,

    /// Validate the configuration file, print a summary and exit
    #[arg(long)]
    pub check: bool,
}

pub async fn run(args: Cli) -> Result<()> {
    if args.check {
        return run_check(&args);
    }
    serve(args).await
}

/// Build `SupervisorSettings` from CLI arguments.
pub fn build_settings(args: &Cli) -> SupervisorSettings {
    SupervisorSettings {
        worker: WorkerCommand {
            program: args.worker_program.clone(),
            args: args.worker_args.clone(),
            current_dir: args.worker_dir.clone(),
            browser_binary: Some(args.chrome_binary.clone()),
        },
        poll_interval: Duration::from(args.poll_interval),
        stop_timeout: Duration::from(args.stop_timeout),
    }
}

fn run_check(args: &Cli) -> Result<()> {
    let store = ConfigStore::new(&args.config);
    let validated = store
        .load_validated()
        .with_context(|| format!("configuration check failed for {}", args.config.display()))?;
    let summary = crate::text_summary::build_text_summary(store.path(), &validated);
    for line in summary.lines {
        println!("{line}");
    }
    Ok(())
}

async fn serve(args: Cli) -> Result<()> {
    std::fs::create_dir_all(&args.logs_dir)
        .with_context(|| format!("failed to create logs directory {}", args.logs_dir.display()))?;

    let config = ConfigStore::new(&args.config);
    let supervisor = Arc::new(Supervisor::new(build_settings(&args)).with_config(config.clone()));
    let state = AppState {
        supervisor: supervisor.clone(),
        activity: ActivityLog::new(&args.logs_dir),
        config,
    };

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    tracing::info!(addr = %args.bind, config = %args.config.display(), "control API listening");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    tracing::info!("shutting down; stopping worker if running");
    supervisor.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_settings() {
        let args = Cli::parse_from(["applybot-control"]);
        let settings = build_settings(&args);
        assert_eq!(settings.worker.program, PathBuf::from("python3"));
        assert_eq!(settings.worker.args, vec!["main.py".to_string()]);
        assert_eq!(settings.stop_timeout, Duration::from_secs(5));
        assert_eq!(settings.poll_interval, Duration::from_millis(500));
        assert!(!args.check);
    }

    #[test]
    fn worker_args_are_repeatable() {
        let args = Cli::parse_from([
            "applybot-control",
            "--worker-program",
            "/usr/bin/env",
            "--worker-arg",
            "python3",
            "--worker-arg",
            "main.py",
            "--stop-timeout",
            "2s",
        ]);
        let settings = build_settings(&args);
        assert_eq!(settings.worker.args, vec!["python3", "main.py"]);
        assert_eq!(settings.stop_timeout, Duration::from_secs(2));
    }
}
