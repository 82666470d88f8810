//! Applies the embedded SQL migrations and exits.
//!
//! Used as a deploy step when workers run with RUN_MIGRATIONS=false.

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;

use pulse_worker::telemetry::init_tracing;
use pulse_worker::WorkerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("info");

    let config = WorkerConfig::from_env().context("loading configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&config.database_url)
        .await
        .context("connecting to Postgres")?;

    pulse_store::migrate(&pool).await.context("running migrations")?;
    pool.close().await;

    Ok(())
}
