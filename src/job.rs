//! Run orchestration.
//!
//! One run: fetch every IP row, classify each against all zones, decide
//! and apply the transition, reconcile the tracker, then report. The
//! loop is sequential per IP so each per-IP record is emitted atomically;
//! all parallelism lives inside the checker. The whole working phase
//! runs under the top-level deadline; only the final flush is outside it.

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::db::{IpRecord, ThrottleStore};
use crate::dns::checker::ZoneChecker;
use crate::dns::classify::Classification;
use crate::dns::probe::ProbeResult;
use crate::error::RunError;
use crate::health::HealthTracker;
use crate::health::report::HealthSummary;
use crate::tracker::{self, TicketTracker};
use crate::transition::{self, Transition, canonical_zones};

/// Counters for the final summary record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub total_ips: usize,
    pub listed: u64,
    pub cleared: u64,
    pub unchanged: u64,
    pub tracker_created: u64,
    pub tracker_updated: u64,
}

/// Everything a completed run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub stats: RunStats,
    pub health: HealthSummary,
}

/// The reconciliation job, parameterized over its three external seams.
pub struct Job<S, T, C> {
    config: Config,
    store: S,
    tracker: T,
    checker: C,
}

impl<S, T, C> Job<S, T, C>
where
    S: ThrottleStore,
    T: TicketTracker,
    C: ZoneChecker,
{
    pub fn new(config: Config, store: S, tracker: T, checker: C) -> Self {
        Self {
            config,
            store,
            tracker,
            checker,
        }
    }

    /// Execute one full run.
    pub async fn run(&self) -> Result<RunOutcome, RunError> {
        let started = Instant::now();
        let health = Arc::new(HealthTracker::new(&self.config.dnsbl_zones));
        let stats = Mutex::new(RunStats::default());

        if self.config.dry_run {
            info!("dry-run mode enabled; store and tracker writes are suppressed");
        }

        let deadline = self.config.max_execution_time;
        let work = async {
            self.reconcile_all(&health, &stats).await?;

            // Widespread failure: probe the public resolvers and raise
            // the deduplicated alert.
            let broken_fraction = health.broken_fraction();
            if broken_fraction < 0.5 {
                return Ok::<Option<ProbeResult>, RunError>(None);
            }
            let probe = if self.config.enable_supplemental_probe {
                self.checker.probe_public_resolvers().await
            } else {
                ProbeResult::disabled()
            };
            self.raise_mass_failure_alert(&health, broken_fraction, &stats)
                .await?;
            Ok(Some(probe))
        };

        let probe = match tokio::time::timeout(deadline, work).await {
            Ok(Ok(probe)) => probe,
            Ok(Err(err)) => return Err(err),
            Err(_elapsed) => {
                let stats = snapshot(&stats);
                self.emit_summary(&stats, &health, started, "job deadline exceeded");
                println!("{}", health.summary(None, Utc::now()).render_json());
                return Err(RunError::DeadlineExceeded(deadline.as_secs()));
            }
        };

        let stats = snapshot(&stats);
        self.emit_summary(&stats, &health, started, "job completed");

        let summary = health.summary(probe, Utc::now());
        println!("{}", summary.render_json());
        match health.pruned_zone_list(Utc::now()) {
            Some(pruned) => println!("{}", pruned.render()),
            None => warn!("all configured zones are broken; pruned zone list withheld"),
        }

        Ok(RunOutcome {
            stats,
            health: summary,
        })
    }

    async fn reconcile_all(
        &self,
        health: &Arc<HealthTracker>,
        stats: &Mutex<RunStats>,
    ) -> Result<(), RunError> {
        let records = self.store.fetch_ips().await?;
        info!(count = records.len(), "loaded IP records from throttle store");
        if let Ok(mut s) = stats.lock() {
            s.total_ips = records.len();
        }
        for record in &records {
            self.reconcile_ip(record, health, stats).await?;
        }
        Ok(())
    }

    /// Process one IP end to end and emit its structured record.
    async fn reconcile_ip(
        &self,
        record: &IpRecord,
        health: &Arc<HealthTracker>,
        stats: &Mutex<RunStats>,
    ) -> Result<(), RunError> {
        let ip_started = Instant::now();

        if record.ip.parse::<Ipv4Addr>().is_err() {
            warn!(id = record.id, ip = %record.ip, "skipping row with malformed IPv4 address");
            return Ok(());
        }

        health.record_ip_check_start();
        let answers = self
            .checker
            .check_ip(&record.ip, &self.config.dnsbl_zones, Arc::clone(health))
            .await;

        // The answer map is keyed by zone, so these stay sorted.
        let mut listed = Vec::new();
        let mut not_listed = Vec::new();
        let mut unknown = Vec::new();
        for answer in answers.values() {
            match answer.classification {
                Classification::Listed => listed.push(answer.zone.clone()),
                Classification::NotListed => not_listed.push(answer.zone.clone()),
                Classification::Unknown(_) => unknown.push(answer.zone.clone()),
            }
        }

        let decision = transition::decide(&record.blocking_lists, &listed);
        if let Ok(mut s) = stats.lock() {
            match &decision {
                Transition::NoOp => s.unchanged += 1,
                Transition::NewListing(_) | Transition::ZoneChange(_) => s.listed += 1,
                Transition::Cleared => s.cleared += 1,
            }
        }

        let (db_changes, tracker_action) = if self.config.dry_run {
            self.preview_decision(record, &decision)
        } else {
            self.apply_decision(record, &decision, &listed, &not_listed, &unknown, stats)
                .await?
        };

        info!(
            ip = %record.ip,
            listed_zones = ?listed,
            unknown_zones = ?unknown,
            decision = if listed.is_empty() { "CLEAN" } else { "LISTED" },
            db_changes,
            tracker_action,
            duration_ms = ip_started.elapsed().as_millis() as u64,
            "ip check completed"
        );
        Ok(())
    }

    /// Dry-run: log the write that would happen and report the intended
    /// tracker action without touching either system.
    fn preview_decision(&self, record: &IpRecord, decision: &Transition) -> (bool, &'static str) {
        match decision {
            Transition::NoOp => (false, "none"),
            Transition::NewListing(zones) => {
                info!(
                    ip = %record.ip,
                    zones = %canonical_zones(zones),
                    listed_priority = self.config.listed_priority,
                    "dry-run: would apply new listing and create tracker issue"
                );
                (false, "create")
            }
            Transition::ZoneChange(zones) => {
                info!(
                    ip = %record.ip,
                    zones = %canonical_zones(zones),
                    "dry-run: would apply zone change and comment on tracker issue"
                );
                (false, "comment")
            }
            Transition::Cleared => {
                info!(
                    ip = %record.ip,
                    fallback_priority = self.config.clean_fallback_priority,
                    "dry-run: would clear block and comment on tracker issue"
                );
                (false, "comment")
            }
        }
    }

    /// Apply a decision to the store and reconcile the tracker.
    ///
    /// Returns (rows changed, tracker action taken).
    async fn apply_decision(
        &self,
        record: &IpRecord,
        decision: &Transition,
        listed: &[String],
        not_listed: &[String],
        unknown: &[String],
        stats: &Mutex<RunStats>,
    ) -> Result<(bool, &'static str), RunError> {
        match decision {
            Transition::NoOp => Ok((false, "none")),

            Transition::NewListing(zones) => {
                let db_changes = self
                    .store
                    .apply_new_listing(
                        record.id,
                        record.priority,
                        zones,
                        self.config.listed_priority,
                    )
                    .await?;
                if !db_changes {
                    debug!(id = record.id, "new-listing write affected no rows");
                }

                match self.tracker.find_open_issue(&record.ip).await? {
                    None => {
                        let description = tracker::listing_description(
                            &record.ip, listed, not_listed, unknown,
                        );
                        self.tracker
                            .create_listing_issue(&record.ip, zones, &description)
                            .await?;
                        if let Ok(mut s) = stats.lock() {
                            s.tracker_created += 1;
                        }
                        Ok((db_changes, "create"))
                    }
                    Some(issue) => {
                        let comment = tracker::new_listing_comment(&record.ip, zones);
                        self.tracker.add_comment(&issue.key, &comment).await?;
                        if let Ok(mut s) = stats.lock() {
                            s.tracker_updated += 1;
                        }
                        Ok((db_changes, "comment"))
                    }
                }
            }

            Transition::ZoneChange(zones) => {
                let db_changes = self.store.apply_zone_change(record.id, zones).await?;
                let (added, removed) = transition::zone_delta(&record.listed_zones(), zones);

                match self.tracker.find_open_issue(&record.ip).await? {
                    Some(issue) => {
                        let comment = tracker::zone_change_comment(&added, &removed, zones);
                        self.tracker.add_comment(&issue.key, &comment).await?;
                        if let Ok(mut s) = stats.lock() {
                            s.tracker_updated += 1;
                        }
                        Ok((db_changes, "comment"))
                    }
                    None => {
                        // The operator closed the previous issue while the
                        // IP stayed listed; file a fresh one.
                        let description = tracker::listing_description(
                            &record.ip, listed, not_listed, unknown,
                        );
                        self.tracker
                            .create_listing_issue(&record.ip, zones, &description)
                            .await?;
                        if let Ok(mut s) = stats.lock() {
                            s.tracker_created += 1;
                        }
                        Ok((db_changes, "create"))
                    }
                }
            }

            Transition::Cleared => {
                let db_changes = self
                    .store
                    .apply_cleared(record.id, self.config.clean_fallback_priority)
                    .await?;

                match self.tracker.find_open_issue(&record.ip).await? {
                    Some(issue) => {
                        let comment = tracker::cleared_comment(&record.ip);
                        self.tracker.add_comment(&issue.key, &comment).await?;
                        if let Ok(mut s) = stats.lock() {
                            s.tracker_updated += 1;
                        }
                        Ok((db_changes, "comment"))
                    }
                    None => {
                        warn!(ip = %record.ip, "no open tracker issue found for cleared IP");
                        Ok((db_changes, "none"))
                    }
                }
            }
        }
    }

    /// File the per-calendar-day mass-failure alert.
    async fn raise_mass_failure_alert(
        &self,
        health: &HealthTracker,
        broken_fraction: f64,
        stats: &Mutex<RunStats>,
    ) -> Result<(), RunError> {
        let percent_broken = broken_fraction * 100.0;
        warn!(
            percent_broken,
            broken_zones = ?health.broken_zones(),
            "widespread DNSBL failure detected"
        );

        if self.config.dry_run {
            info!(percent_broken, "dry-run: would file mass-failure alert");
            return Ok(());
        }

        let description =
            tracker::dns_failure_description(percent_broken, &health.broken_zone_reports());
        let created = self
            .tracker
            .ensure_dns_failure_issue(Utc::now().date_naive(), percent_broken, &description)
            .await?;
        if created.is_some() {
            if let Ok(mut s) = stats.lock() {
                s.tracker_created += 1;
            }
        }
        Ok(())
    }

    fn emit_summary(
        &self,
        stats: &RunStats,
        health: &HealthTracker,
        started: Instant,
        message: &str,
    ) {
        info!(
            total_ips = stats.total_ips,
            listed = stats.listed,
            cleared = stats.cleared,
            unchanged = stats.unchanged,
            tracker_created = stats.tracker_created,
            tracker_updated = stats.tracker_updated,
            dns_failures = health.total_failed_checks(),
            duration_sec = started.elapsed().as_secs_f64(),
            "{message}",
        );
    }
}

fn snapshot(stats: &Mutex<RunStats>) -> RunStats {
    match stats.lock() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}
