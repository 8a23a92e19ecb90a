//! MySQL access for the throttle store.
//!
//! The `ip_addresses` table is owned by the mail server; this job only
//! reads rows and applies the three conditional transition updates. Each
//! write is a single-row, single-statement transaction guarded so that
//! reapplying the same transition is a no-op.

mod ips;

pub use ips::{IpRecord, IpRepository};

use std::time::Duration;

use async_trait::async_trait;
use sqlx::Executor;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use thiserror::Error;
use tracing::info;

use crate::transition;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("failed to connect to throttle store: {0}")]
    Connect(#[source] sqlx::Error),
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// The orchestrator's store seam. Tests substitute an in-memory fake.
#[async_trait]
pub trait ThrottleStore: Send + Sync {
    /// Fetch every row with an IPv4 address, ordered by id.
    async fn fetch_ips(&self) -> Result<Vec<IpRecord>, DbError>;

    /// Apply a clean-to-listed transition. `captured_priority` becomes
    /// `oldPriority` only if none is stored yet. Returns whether a row
    /// was actually changed.
    async fn apply_new_listing(
        &self,
        id: i64,
        captured_priority: i32,
        zones: &[String],
        listed_priority: i32,
    ) -> Result<bool, DbError>;

    /// Replace the stored zone set of a listed IP without touching
    /// priorities.
    async fn apply_zone_change(&self, id: i64, zones: &[String]) -> Result<bool, DbError>;

    /// Apply a listed-to-clean transition, restoring `oldPriority` or
    /// falling back to `fallback_priority`.
    async fn apply_cleared(&self, id: i64, fallback_priority: i32) -> Result<bool, DbError>;
}

/// Database handle with connection pool.
#[derive(Clone)]
pub struct Database {
    pool: MySqlPool,
}

impl Database {
    /// Connection acquire timeout - prevents a dead store from hanging
    /// the whole run.
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// The loop writes one row at a time; a handful of connections is
    /// plenty.
    const MAX_CONNECTIONS: u32 = 5;

    /// Connect to the throttle store.
    ///
    /// Every pooled connection runs with READ COMMITTED isolation; the
    /// conditional update guards make overlapping runs safe under it.
    /// Connection failure is fatal to the run.
    pub async fn connect(dsn: &str) -> Result<Self, DbError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(Self::MAX_CONNECTIONS)
            .acquire_timeout(Self::ACQUIRE_TIMEOUT)
            .test_before_acquire(true)
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    conn.execute("SET SESSION TRANSACTION ISOLATION LEVEL READ COMMITTED")
                        .await?;
                    Ok(())
                })
            })
            .connect(dsn)
            .await
            .map_err(DbError::Connect)?;

        info!("throttle store connected");
        Ok(Self { pool })
    }

    /// Get reference to the underlying connection pool.
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Get the IP repository.
    pub fn ips(&self) -> IpRepository<'_> {
        IpRepository::new(&self.pool)
    }
}

#[async_trait]
impl ThrottleStore for Database {
    async fn fetch_ips(&self) -> Result<Vec<IpRecord>, DbError> {
        self.ips().fetch_all().await
    }

    async fn apply_new_listing(
        &self,
        id: i64,
        captured_priority: i32,
        zones: &[String],
        listed_priority: i32,
    ) -> Result<bool, DbError> {
        self.ips()
            .apply_new_listing(id, captured_priority, zones, listed_priority)
            .await
    }

    async fn apply_zone_change(&self, id: i64, zones: &[String]) -> Result<bool, DbError> {
        self.ips().apply_zone_change(id, zones).await
    }

    async fn apply_cleared(&self, id: i64, fallback_priority: i32) -> Result<bool, DbError> {
        self.ips().apply_cleared(id, fallback_priority).await
    }
}

/// Event sentence stored on a clean-to-listed transition.
pub fn new_listing_event(zones: &[String]) -> String {
    format!("new block from list(s) {}", transition::canonical_zones(zones))
}

/// Event sentence stored on a zone-set change.
pub fn zone_change_event(zones: &[String]) -> String {
    format!("blocking list change: {}", transition::canonical_zones(zones))
}

/// Event sentence stored on a listed-to-clean transition.
pub const CLEARED_EVENT: &str = "block removed";
