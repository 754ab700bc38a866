mod activity;
mod api;
mod cli;
mod config;
mod engine;
mod model;
mod orchestrator;
mod text_summary;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("applybot_control=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let is_check = args.check;
    match cli::run(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            if is_check {
                // Keep `--check` output scriptable: one line on stdout, non-zero exit.
                println!("{e:#}");
                std::process::exit(1);
            } else {
                Err(e)
            }
        }
    }
}
