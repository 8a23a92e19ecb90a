//! In-memory throttle store fake.
//!
//! Mirrors the conditional-update guards of the real SQL so repeated
//! application of the same transition affects zero rows, exactly like
//! the production writers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use dnsbl_monitor::db::{
    CLEARED_EVENT, DbError, IpRecord, ThrottleStore, new_listing_event, zone_change_event,
};
use dnsbl_monitor::transition::canonical_zones;

#[derive(Default)]
struct Inner {
    rows: Mutex<Vec<IpRecord>>,
    writes: AtomicU64,
}

/// Cloneable handle to a shared in-memory row set.
#[derive(Clone, Default)]
pub struct FakeStore {
    inner: Arc<Inner>,
}

impl FakeStore {
    pub fn new(rows: Vec<IpRecord>) -> Self {
        let store = Self::default();
        *store.inner.rows.lock().unwrap() = rows;
        store
    }

    /// Snapshot of the row with the given id.
    pub fn row(&self, id: i64) -> IpRecord {
        self.inner
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .expect("row exists")
    }

    /// Number of updates that actually changed a row.
    pub fn write_count(&self) -> u64 {
        self.inner.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ThrottleStore for FakeStore {
    async fn fetch_ips(&self) -> Result<Vec<IpRecord>, DbError> {
        Ok(self.inner.rows.lock().unwrap().clone())
    }

    async fn apply_new_listing(
        &self,
        id: i64,
        captured_priority: i32,
        zones: &[String],
        listed_priority: i32,
    ) -> Result<bool, DbError> {
        let canonical = canonical_zones(zones);
        let mut rows = self.inner.rows.lock().unwrap();
        let Some(row) = rows.iter_mut().find(|r| r.id == id) else {
            return Ok(false);
        };
        if row.blocking_lists == canonical {
            return Ok(false);
        }
        row.priority = listed_priority;
        if row.old_priority.is_none() {
            row.old_priority = Some(captured_priority);
        }
        row.blocking_lists = canonical;
        row.last_event = Some(new_listing_event(zones));
        self.inner.writes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn apply_zone_change(&self, id: i64, zones: &[String]) -> Result<bool, DbError> {
        let canonical = canonical_zones(zones);
        let mut rows = self.inner.rows.lock().unwrap();
        let Some(row) = rows.iter_mut().find(|r| r.id == id) else {
            return Ok(false);
        };
        if row.blocking_lists == canonical {
            return Ok(false);
        }
        row.blocking_lists = canonical;
        row.last_event = Some(zone_change_event(zones));
        self.inner.writes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn apply_cleared(&self, id: i64, fallback_priority: i32) -> Result<bool, DbError> {
        let mut rows = self.inner.rows.lock().unwrap();
        let Some(row) = rows.iter_mut().find(|r| r.id == id) else {
            return Ok(false);
        };
        if row.blocking_lists.is_empty() {
            return Ok(false);
        }
        row.priority = row.old_priority.unwrap_or(fallback_priority);
        row.old_priority = None;
        row.blocking_lists = String::new();
        row.last_event = Some(CLEARED_EVENT.to_string());
        self.inner.writes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}
