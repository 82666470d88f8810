use sqlx::PgPool;
use tracing::info;

use crate::error::StoreError;

/// Apply the embedded `ingestion` and `analytics` migrations. Idempotent.
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    info!("Migrations complete");
    Ok(())
}
