//! Integration tests for AggregationWriter.
//! Requires a Postgres instance. Set DATABASE_TEST_URL or these tests are skipped.
//!
//! Tests share one database, so each uses its own org id instead of truncating.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{NaiveDate, TimeZone, Utc};
use pulse_events::{CanonicalEvent, Properties};
use pulse_store::{migrate, AggregationWriter};
use serde_json::json;
use sqlx::PgPool;

/// Get a migrated test database pool, or skip if no test DB is available.
async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let pool = PgPool::connect(&url).await.ok()?;
    migrate(&pool).await.ok()?;
    Some(pool)
}

fn unique(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{prefix}_{nanos}")
}

fn props(value: serde_json::Value) -> Properties {
    match value {
        serde_json::Value::Object(map) => map,
        _ => panic!("properties must be an object"),
    }
}

fn jan_1() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
}

fn event_at(id: &str, org: &str, user: &str, name: &str, hour: u32) -> CanonicalEvent {
    let ts = Utc.with_ymd_and_hms(2026, 1, 1, hour, 0, 0).unwrap();
    CanonicalEvent::new(id, org, user, name, ts)
}

// =========================================================================
// Idempotence
// =========================================================================

#[tokio::test]
async fn redelivered_purchase_counts_once() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let writer = AggregationWriter::new(pool);
    let org = unique("org");
    let id = unique("e1");

    let e1 = event_at(&id, &org, "u1", "purchase_completed", 10)
        .with_properties(props(json!({"amount": 10})));

    let first = writer.process(&e1).await.unwrap();
    let again = writer.process(&e1).await.unwrap();

    assert!(first.inserted);
    assert!(again.is_duplicate());
    assert_eq!(writer.event_rows(&id).await.unwrap(), 1);
    assert_eq!(writer.daily_revenue(&org, jan_1()).await.unwrap(), 10.0);
    assert_eq!(writer.daily_active_users(&org, jan_1()).await.unwrap(), 1);
    assert_eq!(writer.lifetime_value(&org, "u1").await.unwrap(), Some(10.0));
    assert_eq!(
        writer
            .event_count_daily(&org, "purchase_completed", jan_1())
            .await
            .unwrap(),
        1
    );
}

// =========================================================================
// Aggregate correctness
// =========================================================================

#[tokio::test]
async fn many_events_from_one_user_are_one_active_user() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let writer = AggregationWriter::new(pool);
    let org = unique("org");

    for hour in 0..5 {
        let e = event_at(&unique("evt"), &org, "u1", "page_view", hour);
        writer.process(&e).await.unwrap();
    }
    writer
        .process(&event_at(&unique("evt"), &org, "u2", "login", 9))
        .await
        .unwrap();

    assert_eq!(writer.daily_active_users(&org, jan_1()).await.unwrap(), 2);
    assert_eq!(writer.event_count_daily(&org, "page_view", jan_1()).await.unwrap(), 5);
    assert_eq!(writer.event_count(&org).await.unwrap(), 6);
}

#[tokio::test]
async fn revenue_and_lifetime_value_accumulate() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let writer = AggregationWriter::new(pool);
    let org = unique("org");

    let purchase = event_at(&unique("evt"), &org, "u1", "purchase_completed", 10)
        .with_properties(props(json!({"amount": 42.50})));
    let renewal = event_at(&unique("evt"), &org, "u1", "subscription_renewed", 11)
        .with_properties(props(json!({"price": "7.5"})));
    writer.process(&purchase).await.unwrap();
    writer.process(&renewal).await.unwrap();

    assert_eq!(writer.daily_revenue(&org, jan_1()).await.unwrap(), 50.0);
    assert_eq!(writer.lifetime_value(&org, "u1").await.unwrap(), Some(50.0));
}

#[tokio::test]
async fn non_numeric_or_zero_amount_adds_no_revenue() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let writer = AggregationWriter::new(pool);
    let org = unique("org");

    for amount in [json!("free"), json!(0)] {
        let e = event_at(&unique("evt"), &org, "u1", "purchase_completed", 10)
            .with_properties(props(json!({ "amount": amount })));
        assert!(writer.process(&e).await.unwrap().inserted);
    }

    assert_eq!(writer.daily_revenue(&org, jan_1()).await.unwrap(), 0.0);
    assert_eq!(writer.lifetime_value(&org, "u1").await.unwrap(), None);
    assert_eq!(writer.daily_active_users(&org, jan_1()).await.unwrap(), 1);
}

#[tokio::test]
async fn day_boundary_is_utc() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let writer = AggregationWriter::new(pool);
    let org = unique("org");

    // 2026-01-01T23:30-05:00 is 2026-01-02 in UTC.
    let ts = chrono::FixedOffset::west_opt(5 * 3600)
        .unwrap()
        .with_ymd_and_hms(2026, 1, 1, 23, 30, 0)
        .unwrap()
        .with_timezone(&Utc);
    let e = CanonicalEvent::new(unique("evt"), &org, "u1", "login", ts);
    writer.process(&e).await.unwrap();

    let jan_2 = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
    assert_eq!(writer.daily_active_users(&org, jan_1()).await.unwrap(), 0);
    assert_eq!(writer.daily_active_users(&org, jan_2).await.unwrap(), 1);
}

// =========================================================================
// Atomicity
// =========================================================================

#[tokio::test]
async fn aggregate_failure_rolls_back_event_insert() {
    let Some(pool) = test_pool().await else {
        return;
    };

    // Any event-count write for an org prefixed `doomed_` raises.
    sqlx::query(
        r#"
        CREATE OR REPLACE FUNCTION pulse_test_reject_doomed() RETURNS trigger AS $$
        BEGIN
            IF NEW.org_id LIKE 'doomed\_%' THEN
                RAISE EXCEPTION 'rejected by test trigger';
            END IF;
            RETURN NEW;
        END;
        $$ LANGUAGE plpgsql
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query("DROP TRIGGER IF EXISTS pulse_test_reject_doomed ON analytics.event_counts_daily")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(
        r#"
        CREATE TRIGGER pulse_test_reject_doomed
        BEFORE INSERT ON analytics.event_counts_daily
        FOR EACH ROW EXECUTE FUNCTION pulse_test_reject_doomed()
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();

    let writer = AggregationWriter::new(pool);
    let org = unique("doomed");
    let id = unique("evt");
    let e = event_at(&id, &org, "u1", "purchase_completed", 10)
        .with_properties(props(json!({"amount": 10})));

    assert!(writer.process(&e).await.is_err());

    assert_eq!(writer.event_rows(&id).await.unwrap(), 0);
    assert_eq!(writer.daily_active_users(&org, jan_1()).await.unwrap(), 0);
    assert_eq!(writer.daily_revenue(&org, jan_1()).await.unwrap(), 0.0);
    assert_eq!(writer.lifetime_value(&org, "u1").await.unwrap(), None);
}

// =========================================================================
// Concurrency
// =========================================================================

#[tokio::test]
async fn racing_writers_count_a_user_once() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let org = unique("org");

    let mut handles = Vec::new();
    for n in 0..8 {
        let writer = AggregationWriter::new(pool.clone());
        let e = event_at(&format!("{org}_{n}"), &org, "u1", "login", 12);
        handles.push(tokio::spawn(async move { writer.process(&e).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let writer = AggregationWriter::new(pool);
    assert_eq!(writer.daily_active_users(&org, jan_1()).await.unwrap(), 1);
    assert_eq!(writer.event_count_daily(&org, "login", jan_1()).await.unwrap(), 8);
}
