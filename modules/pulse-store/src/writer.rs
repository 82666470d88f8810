//! AggregationWriter — the sole writer of ingestion and analytics tables.
//!
//! Every statement is an insert-if-absent or an upsert-increment guarded by a
//! unique key, so concurrent workers converge without any in-process locking.
//! `analytics.daily_user_log` is what keeps racing workers from counting the
//! same user twice for a day.

use async_trait::async_trait;
use chrono::NaiveDate;
use pulse_events::CanonicalEvent;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

use crate::error::StoreError;
use crate::sink::EventSink;
use crate::types::ProcessOutcome;

#[derive(Clone)]
pub struct AggregationWriter {
    pool: PgPool,
}

impl AggregationWriter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert the event and, if it is new, update every dependent aggregate.
    /// All-or-nothing: any failure rolls the whole unit back.
    pub async fn process(&self, event: &CanonicalEvent) -> Result<ProcessOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO ingestion.events (id, org_id, user_id, event_name, properties, event_timestamp, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&event.id)
        .bind(&event.org_id)
        .bind(&event.user_id)
        .bind(&event.event_name)
        .bind(Json(&event.properties))
        .bind(event.event_timestamp)
        .bind(event.created_at)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if inserted {
            apply_aggregates(&mut tx, event).await?;
        }

        // Dropping `tx` on an early return above rolls back.
        tx.commit().await?;

        Ok(ProcessOutcome { inserted })
    }

    // -----------------------------------------------------------------------
    // Reads over the committed tables
    // -----------------------------------------------------------------------

    /// Number of committed rows with this event id (0 or 1).
    pub async fn event_rows(&self, id: &str) -> Result<i64, StoreError> {
        let row = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM ingestion.events WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    /// Committed events for an organization.
    pub async fn event_count(&self, org_id: &str) -> Result<i64, StoreError> {
        let row =
            sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM ingestion.events WHERE org_id = $1")
                .bind(org_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0)
    }

    pub async fn daily_active_users(&self, org_id: &str, date: NaiveDate) -> Result<i64, StoreError> {
        let row = sqlx::query_as::<_, (i64,)>(
            "SELECT active_users FROM analytics.daily_active_users WHERE org_id = $1 AND date = $2",
        )
        .bind(org_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.0).unwrap_or(0))
    }

    pub async fn event_count_daily(
        &self,
        org_id: &str,
        event_name: &str,
        date: NaiveDate,
    ) -> Result<i64, StoreError> {
        let row = sqlx::query_as::<_, (i64,)>(
            r#"
            SELECT event_count FROM analytics.event_counts_daily
            WHERE org_id = $1 AND event_name = $2 AND date = $3
            "#,
        )
        .bind(org_id)
        .bind(event_name)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.0).unwrap_or(0))
    }

    pub async fn daily_revenue(&self, org_id: &str, date: NaiveDate) -> Result<f64, StoreError> {
        let row = sqlx::query_as::<_, (f64,)>(
            "SELECT revenue::float8 FROM analytics.daily_revenue WHERE org_id = $1 AND date = $2",
        )
        .bind(org_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.0).unwrap_or(0.0))
    }

    /// Lifetime value, or None if the user never contributed revenue.
    pub async fn lifetime_value(&self, org_id: &str, user_id: &str) -> Result<Option<f64>, StoreError> {
        let row = sqlx::query_as::<_, (f64,)>(
            r#"
            SELECT lifetime_value::float8 FROM analytics.user_lifetime_value
            WHERE org_id = $1 AND user_id = $2
            "#,
        )
        .bind(org_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.0))
    }
}

#[async_trait]
impl EventSink for AggregationWriter {
    async fn process(&self, event: &CanonicalEvent) -> Result<ProcessOutcome, StoreError> {
        AggregationWriter::process(self, event).await
    }
}

async fn apply_aggregates(
    tx: &mut Transaction<'_, Postgres>,
    event: &CanonicalEvent,
) -> Result<(), StoreError> {
    let date = event.event_date();

    sqlx::query(
        r#"
        INSERT INTO analytics.event_counts_daily (org_id, event_name, date, event_count)
        VALUES ($1, $2, $3, 1)
        ON CONFLICT (org_id, event_name, date)
        DO UPDATE SET event_count = analytics.event_counts_daily.event_count + 1
        "#,
    )
    .bind(&event.org_id)
    .bind(&event.event_name)
    .bind(date)
    .execute(&mut **tx)
    .await?;

    let first_today = sqlx::query(
        r#"
        INSERT INTO analytics.daily_user_log (org_id, user_id, date)
        VALUES ($1, $2, $3)
        ON CONFLICT (org_id, user_id, date) DO NOTHING
        "#,
    )
    .bind(&event.org_id)
    .bind(&event.user_id)
    .bind(date)
    .execute(&mut **tx)
    .await?
    .rows_affected()
        > 0;

    if first_today {
        sqlx::query(
            r#"
            INSERT INTO analytics.daily_active_users (org_id, date, active_users)
            VALUES ($1, $2, 1)
            ON CONFLICT (org_id, date)
            DO UPDATE SET active_users = analytics.daily_active_users.active_users + 1
            "#,
        )
        .bind(&event.org_id)
        .bind(date)
        .execute(&mut **tx)
        .await?;
    }

    if let Some(amount) = event.monetary_amount() {
        sqlx::query(
            r#"
            INSERT INTO analytics.daily_revenue (org_id, date, revenue)
            VALUES ($1, $2, $3::numeric)
            ON CONFLICT (org_id, date)
            DO UPDATE SET revenue = analytics.daily_revenue.revenue + EXCLUDED.revenue
            "#,
        )
        .bind(&event.org_id)
        .bind(date)
        .bind(amount)
        .execute(&mut **tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO analytics.user_lifetime_value (org_id, user_id, lifetime_value, last_updated)
            VALUES ($1, $2, $3::numeric, now())
            ON CONFLICT (org_id, user_id)
            DO UPDATE SET
                lifetime_value = analytics.user_lifetime_value.lifetime_value + EXCLUDED.lifetime_value,
                last_updated = now()
            "#,
        )
        .bind(&event.org_id)
        .bind(&event.user_id)
        .bind(amount)
        .execute(&mut **tx)
        .await?;

        debug!(
            event_id = %event.id,
            org_id = %event.org_id,
            user_id = %event.user_id,
            amount,
            "Applied revenue"
        );
    }

    Ok(())
}
