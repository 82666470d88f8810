use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use pulse_store::AggregationWriter;
use pulse_stream::StreamClient;
use pulse_worker::shutdown::shutdown_signal;
use pulse_worker::telemetry::init_tracing;
use pulse_worker::{supervise, Stopped, Worker, WorkerConfig};

#[derive(Parser)]
#[command(
    name = "pulse-worker",
    about = "Consumes product-usage events and maintains analytics aggregates"
)]
struct Cli {
    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match run().await {
        Ok(()) => {
            info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "Worker exited with error");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let config = WorkerConfig::from_env().context("loading configuration")?;
    config.log_redacted();

    // Startup failures are fatal.
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("connecting to Postgres")?;
    info!(max_connections = config.database_max_connections, "Connected to Postgres");

    if config.run_migrations {
        pulse_store::migrate(&pool)
            .await
            .context("running migrations")?;
    }

    let mut client = StreamClient::new(config.stream.clone());
    client.connect().await.context("connecting to Redis")?;
    client
        .ensure_group(&config.stream.stream, &config.stream.group)
        .await
        .context("ensuring consumer group")?;

    let cancel = CancellationToken::new();
    let worker = Worker::new(client, AggregationWriter::new(pool.clone()), cancel.clone())
        .with_backlog_on_startup(config.process_pending_on_startup)
        .with_error_backoff(config.error_backoff);

    let handle = tokio::spawn(async move {
        let stats = worker.run().await;
        (worker, stats)
    });

    let stopped = supervise(handle, &cancel, config.shutdown_grace, shutdown_signal()).await;

    let fault = match stopped {
        Ok(Stopped::Finished((worker, stats))) => {
            info!(%stats, "Worker stopped");
            let (mut client, _) = worker.into_parts();
            client.disconnect();
            None
        }
        Ok(Stopped::Aborted) => {
            info!("Redis connection dropped with the aborted worker");
            None
        }
        Err(e) => Some(anyhow!(e)),
    };

    pool.close().await;
    info!("Postgres pool closed");

    match fault {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
