//! trip-migrate - Main entry point

use clap::Parser;
use std::process;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use trip_cli::{commands, context, Cli, Commands, EXIT_FAILURE};
use trip_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Environment variables take precedence over the verbose flag
    let log_config = LogConfig::builder()
        .level(if cli.verbose {
            LogLevel::Debug
        } else {
            LogLevel::Warn
        })
        .output(LogOutput::Console)
        .log_file_prefix("trip-migrate")
        .build();
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    // The CLI works without logging; the guard flushes file output before exit
    let guard = init_logging(&log_config).ok();

    let status = match execute_command(&cli).await {
        Ok(status) => status,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {}", e);
            EXIT_FAILURE
        }
    };

    drop(guard);
    process::exit(status);
}

/// Stop starting new trips on Ctrl+C; trips in flight finish.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing trips in flight");
            eprintln!("Interrupted, finishing trips in flight...");
            token.cancel();
        }
    });
    cancel
}

async fn execute_command(cli: &Cli) -> trip_cli::Result<i32> {
    let mut config = context::load_config()?;

    if let Commands::ProcessAll {
        concurrency: Some(n),
        ..
    } = cli.command
    {
        config.pipeline.concurrency = usize::from(n);
    }

    let pipeline = context::connect(&config).await?;

    match &cli.command {
        Commands::Process {
            trip_id,
            start_date,
        } => commands::process::run(&pipeline, trip_id, start_date).await,

        Commands::ProcessAll { pattern, .. } => {
            let cancel = cancel_on_ctrl_c();
            commands::process::run_all(&pipeline, pattern.as_deref(), &cancel).await
        }

        Commands::List { pattern } => commands::list::run(&pipeline, pattern.as_deref()).await,

        Commands::Show {
            trip_id,
            start_date,
        } => commands::show::run(&pipeline, trip_id, start_date).await,

        Commands::Purge {
            trip_id,
            start_date,
            force,
        } => commands::purge::run(&pipeline, trip_id, start_date, *force).await,
    }
}
