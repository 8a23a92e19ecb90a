//! IP row model and the conditional transition writers.
//!
//! All three writers are idempotent: the WHERE clause refuses the update
//! when the stored state already matches, so a rerun with identical DNS
//! answers affects zero rows. `oldPriority` is written exactly once per
//! listing episode, guarded inside the statement itself.

use sqlx::mysql::MySqlPool;
use tracing::info;

use super::{CLEARED_EVENT, DbError, new_listing_event, zone_change_event};
use crate::transition::{canonical_zones, tokenize_zones};

/// One row of the throttle table.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct IpRecord {
    pub id: i64,
    pub ip: String,
    pub priority: i32,
    pub old_priority: Option<i32>,
    pub blocking_lists: String,
    pub last_event: Option<String>,
}

impl IpRecord {
    /// An IP is listed iff `blockingLists` is non-empty.
    pub fn is_listed(&self) -> bool {
        !self.blocking_lists.is_empty()
    }

    /// Zones currently stored on the row, sorted ascending.
    pub fn listed_zones(&self) -> Vec<String> {
        tokenize_zones(&self.blocking_lists)
    }
}

/// Repository for throttle-table operations.
pub struct IpRepository<'a> {
    pool: &'a MySqlPool,
}

impl<'a> IpRepository<'a> {
    pub fn new(pool: &'a MySqlPool) -> Self {
        Self { pool }
    }

    /// Fetch all rows carrying an IPv4 address, ordered by id.
    ///
    /// Rows with a NULL priority read as 100, matching the mail server's
    /// treatment of unset priorities.
    pub async fn fetch_all(&self) -> Result<Vec<IpRecord>, DbError> {
        let records = sqlx::query_as::<_, IpRecord>(
            r#"
            SELECT id,
                   ipv4 AS ip,
                   COALESCE(priority, 100) AS priority,
                   oldPriority AS old_priority,
                   COALESCE(blockingLists, '') AS blocking_lists,
                   lastEvent AS last_event
            FROM ip_addresses
            WHERE ipv4 IS NOT NULL
            ORDER BY id
            "#,
        )
        .fetch_all(self.pool)
        .await?;
        Ok(records)
    }

    /// Clean-to-listed transition.
    ///
    /// `oldPriority` is only captured when currently NULL, so a listing
    /// that changes shape across runs never loses the original priority.
    /// The `blockingLists` inequality guard makes reapplication a no-op.
    pub async fn apply_new_listing(
        &self,
        id: i64,
        captured_priority: i32,
        zones: &[String],
        listed_priority: i32,
    ) -> Result<bool, DbError> {
        let canonical = canonical_zones(zones);
        let last_event = new_listing_event(zones);

        let result = sqlx::query(
            r#"
            UPDATE ip_addresses
            SET priority = ?,
                oldPriority = CASE
                    WHEN oldPriority IS NULL THEN ?
                    ELSE oldPriority
                END,
                blockingLists = ?,
                lastEvent = ?
            WHERE id = ?
              AND COALESCE(blockingLists, '') != ?
            "#,
        )
        .bind(listed_priority)
        .bind(captured_priority)
        .bind(&canonical)
        .bind(&last_event)
        .bind(id)
        .bind(&canonical)
        .execute(self.pool)
        .await?;

        let updated = result.rows_affected() > 0;
        if updated {
            info!(
                ip_id = id,
                zones = %canonical,
                listed_priority,
                "throttle update: new listing applied"
            );
        }
        Ok(updated)
    }

    /// Listed-to-listed zone-set change. Priorities are untouched.
    pub async fn apply_zone_change(&self, id: i64, zones: &[String]) -> Result<bool, DbError> {
        let canonical = canonical_zones(zones);
        let last_event = zone_change_event(zones);

        let result = sqlx::query(
            r#"
            UPDATE ip_addresses
            SET blockingLists = ?,
                lastEvent = ?
            WHERE id = ?
              AND COALESCE(blockingLists, '') != ?
            "#,
        )
        .bind(&canonical)
        .bind(&last_event)
        .bind(id)
        .bind(&canonical)
        .execute(self.pool)
        .await?;

        let updated = result.rows_affected() > 0;
        if updated {
            info!(ip_id = id, zones = %canonical, "throttle update: zone change applied");
        }
        Ok(updated)
    }

    /// Listed-to-clean transition.
    ///
    /// MySQL applies SET clauses left to right, so `priority` reads the
    /// pre-update `oldPriority` before the next clause nulls it.
    pub async fn apply_cleared(&self, id: i64, fallback_priority: i32) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE ip_addresses
            SET priority = COALESCE(oldPriority, ?),
                oldPriority = NULL,
                blockingLists = '',
                lastEvent = ?
            WHERE id = ?
              AND COALESCE(blockingLists, '') != ''
            "#,
        )
        .bind(fallback_priority)
        .bind(CLEARED_EVENT)
        .bind(id)
        .execute(self.pool)
        .await?;

        let updated = result.rows_affected() > 0;
        if updated {
            info!(ip_id = id, "throttle update: block cleared");
        }
        Ok(updated)
    }
}
