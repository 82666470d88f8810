//! MemoryAggregates — in-process sink with the same semantics as the Postgres
//! writer. Used by worker tests; no database required.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use pulse_events::CanonicalEvent;

use crate::error::StoreError;
use crate::sink::EventSink;
use crate::types::ProcessOutcome;

#[derive(Debug, Default)]
struct Tables {
    events: HashMap<String, CanonicalEvent>,
    event_counts: HashMap<(String, String, NaiveDate), i64>,
    daily_user_log: HashSet<(String, String, NaiveDate)>,
    daily_active_users: HashMap<(String, NaiveDate), i64>,
    daily_revenue: HashMap<(String, NaiveDate), f64>,
    lifetime_value: HashMap<(String, String), (f64, DateTime<Utc>)>,
}

impl Tables {
    fn apply(&mut self, event: &CanonicalEvent) -> bool {
        if self.events.contains_key(&event.id) {
            return false;
        }
        self.events.insert(event.id.clone(), event.clone());

        let date = event.event_date();
        *self
            .event_counts
            .entry((event.org_id.clone(), event.event_name.clone(), date))
            .or_insert(0) += 1;

        if self
            .daily_user_log
            .insert((event.org_id.clone(), event.user_id.clone(), date))
        {
            *self
                .daily_active_users
                .entry((event.org_id.clone(), date))
                .or_insert(0) += 1;
        }

        if let Some(amount) = event.monetary_amount() {
            *self
                .daily_revenue
                .entry((event.org_id.clone(), date))
                .or_insert(0.0) += amount;
            let ltv = self
                .lifetime_value
                .entry((event.org_id.clone(), event.user_id.clone()))
                .or_insert((0.0, Utc::now()));
            ltv.0 += amount;
            ltv.1 = Utc::now();
        }

        true
    }
}

#[derive(Default)]
pub struct MemoryAggregates {
    tables: Mutex<Tables>,
    failing_orgs: Mutex<HashSet<String>>,
}

impl MemoryAggregates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every new event for `org_id` fail as a rolled-back transaction
    /// would: no event row, no aggregate change.
    pub fn fail_aggregates_for(&self, org_id: impl Into<String>) {
        self.failing_orgs.lock().unwrap().insert(org_id.into());
    }

    pub fn clear_failures(&self) {
        self.failing_orgs.lock().unwrap().clear();
    }

    pub fn event_rows(&self, id: &str) -> i64 {
        i64::from(self.tables.lock().unwrap().events.contains_key(id))
    }

    pub fn event_count(&self, org_id: &str) -> i64 {
        let tables = self.tables.lock().unwrap();
        tables.events.values().filter(|e| e.org_id == org_id).count() as i64
    }

    pub fn event(&self, id: &str) -> Option<CanonicalEvent> {
        self.tables.lock().unwrap().events.get(id).cloned()
    }

    pub fn daily_active_users(&self, org_id: &str, date: NaiveDate) -> i64 {
        let tables = self.tables.lock().unwrap();
        tables
            .daily_active_users
            .get(&(org_id.to_string(), date))
            .copied()
            .unwrap_or(0)
    }

    pub fn event_count_daily(&self, org_id: &str, event_name: &str, date: NaiveDate) -> i64 {
        let tables = self.tables.lock().unwrap();
        tables
            .event_counts
            .get(&(org_id.to_string(), event_name.to_string(), date))
            .copied()
            .unwrap_or(0)
    }

    pub fn daily_revenue(&self, org_id: &str, date: NaiveDate) -> f64 {
        let tables = self.tables.lock().unwrap();
        tables
            .daily_revenue
            .get(&(org_id.to_string(), date))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn lifetime_value(&self, org_id: &str, user_id: &str) -> Option<f64> {
        let tables = self.tables.lock().unwrap();
        tables
            .lifetime_value
            .get(&(org_id.to_string(), user_id.to_string()))
            .map(|(value, _)| *value)
    }
}

#[async_trait]
impl EventSink for MemoryAggregates {
    async fn process(&self, event: &CanonicalEvent) -> Result<ProcessOutcome, StoreError> {
        let mut tables = self.tables.lock().unwrap();

        if tables.events.contains_key(&event.id) {
            return Ok(ProcessOutcome::duplicate());
        }

        // The lock is the transaction boundary: a failing event is rejected
        // before anything is written, and `apply` itself cannot fail.
        if self.failing_orgs.lock().unwrap().contains(&event.org_id) {
            return Err(StoreError::Injected(format!(
                "aggregate update failed for event {}",
                event.id
            )));
        }

        let inserted = tables.apply(event);
        Ok(ProcessOutcome { inserted })
    }
}
