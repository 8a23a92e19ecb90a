//! DNSBL zone health tracking.
//!
//! Every zone query completion lands here as one counter update. Updates
//! are commutative, so the final counters do not depend on the order in
//! which concurrent queries finish; the `DashMap` gives per-zone
//! atomicity under the checker's fan-out. At end of run the tracker
//! rolls the counters up into the health summary and the pruned zone
//! list (see [`report`]).

pub mod report;

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::warn;

use crate::dns::classify::{Classification, FailureKind, ZoneAnswer};
use crate::dns::probe::ProbeResult;
use report::{ExecutionSummary, HealthSummary, PrunedZoneList, ZoneReport};

/// Counter set for a single zone. Counters only increase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZoneHealth {
    pub checks_performed: u64,
    pub successful_checks: u64,
    pub failed_checks: u64,
    pub failure_types: BTreeMap<&'static str, u64>,
}

impl ZoneHealth {
    pub fn failure_rate(&self) -> f64 {
        if self.checks_performed == 0 {
            0.0
        } else {
            self.failed_checks as f64 / self.checks_performed as f64
        }
    }

    /// A zone is broken when every single check in this run failed.
    pub fn is_broken(&self) -> bool {
        self.checks_performed > 0 && self.failed_checks == self.checks_performed
    }

    pub fn status(&self) -> &'static str {
        if self.is_broken() { "broken" } else { "healthy" }
    }

    fn record(&mut self, outcome: Result<(), FailureKind>) {
        self.checks_performed += 1;
        match outcome {
            Ok(()) => self.successful_checks += 1,
            Err(kind) => {
                self.failed_checks += 1;
                *self.failure_types.entry(kind.as_str()).or_insert(0) += 1;
            }
        }
    }
}

/// Run-wide health aggregator, shared by all in-flight zone queries.
pub struct HealthTracker {
    zones: DashMap<String, ZoneHealth>,
    configured_count: usize,
    total_ip_checks: AtomicU64,
    started_at: Mutex<Option<Instant>>,
}

impl HealthTracker {
    /// Initialize with every configured zone so zones that never answer
    /// still appear in the report.
    pub fn new(zones: &[String]) -> Self {
        let map = DashMap::new();
        for zone in zones {
            map.insert(zone.clone(), ZoneHealth::default());
        }
        Self {
            zones: map,
            configured_count: zones.len(),
            total_ip_checks: AtomicU64::new(0),
            started_at: Mutex::new(None),
        }
    }

    /// Mark the start of one IP's check, starting the run clock on the
    /// first call.
    pub fn record_ip_check_start(&self) {
        if let Ok(mut started) = self.started_at.lock() {
            started.get_or_insert_with(Instant::now);
        }
        self.total_ip_checks.fetch_add(1, Ordering::Relaxed);
    }

    /// Publish one zone answer. LISTED and NOT_LISTED count as success;
    /// UNKNOWN counts as failure under its kind.
    pub fn record_zone_answer(&self, answer: &ZoneAnswer) {
        let outcome = match answer.classification {
            Classification::Listed | Classification::NotListed => Ok(()),
            Classification::Unknown(kind) => Err(kind),
        };
        self.record_check(&answer.zone, outcome);
    }

    /// Record one check outcome for a zone.
    pub fn record_check(&self, zone: &str, outcome: Result<(), FailureKind>) {
        match self.zones.get_mut(zone) {
            Some(mut health) => health.record(outcome),
            None => warn!(zone, "health record for unconfigured zone dropped"),
        }
    }

    /// Zones with a 100% failure rate this run, sorted ascending.
    pub fn broken_zones(&self) -> Vec<String> {
        let mut broken: Vec<String> = self
            .zones
            .iter()
            .filter(|entry| entry.value().is_broken())
            .map(|entry| entry.key().clone())
            .collect();
        broken.sort();
        broken
    }

    /// Fraction of configured zones that are broken.
    pub fn broken_fraction(&self) -> f64 {
        if self.configured_count == 0 {
            0.0
        } else {
            self.broken_zones().len() as f64 / self.configured_count as f64
        }
    }

    /// Total failed checks across all zones.
    pub fn total_failed_checks(&self) -> u64 {
        self.zones.iter().map(|entry| entry.value().failed_checks).sum()
    }

    /// Per-zone reports, sorted by zone name.
    pub fn zone_reports(&self) -> Vec<ZoneReport> {
        let mut reports: Vec<ZoneReport> = self
            .zones
            .iter()
            .map(|entry| ZoneReport::new(entry.key(), entry.value()))
            .collect();
        reports.sort_by(|a, b| a.zone.cmp(&b.zone));
        reports
    }

    /// Reports for broken zones only, sorted by zone name.
    pub fn broken_zone_reports(&self) -> Vec<ZoneReport> {
        self.zone_reports()
            .into_iter()
            .filter(|report| report.status == "broken")
            .collect()
    }

    /// Roll up the final health summary.
    ///
    /// The network-outage flag requires both halves: at least half of the
    /// configured zones broken, and the supplemental probe reporting both
    /// public resolvers unreachable.
    pub fn summary(&self, probe: Option<ProbeResult>, timestamp: DateTime<Utc>) -> HealthSummary {
        let dnsbl_health = self.zone_reports();
        let broken_dnsbls = dnsbl_health.iter().filter(|r| r.status == "broken").count();
        let network_issue_detected = self.broken_fraction() >= 0.5
            && probe.is_some_and(|result| result.both_unreachable());
        let started = self.started_at.lock().ok().and_then(|guard| *guard);
        let execution_duration_ms = started
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);

        HealthSummary {
            execution_summary: ExecutionSummary {
                timestamp: timestamp.to_rfc3339(),
                total_dnsbls: self.configured_count,
                broken_dnsbls,
                network_issue_detected,
                total_ip_checks: self.total_ip_checks.load(Ordering::Relaxed),
                execution_duration_ms,
            },
            dnsbl_health,
            network_connectivity: probe,
        }
    }

    /// Build the pruned zone list, or `None` when no zone is healthy:
    /// suggesting an empty configuration would be worse than the broken
    /// one.
    pub fn pruned_zone_list(&self, generated_at: DateTime<Utc>) -> Option<PrunedZoneList> {
        let mut healthy: Vec<String> = Vec::new();
        let mut removed: Vec<String> = Vec::new();
        for entry in self.zones.iter() {
            if entry.value().is_broken() {
                removed.push(entry.key().clone());
            } else {
                healthy.push(entry.key().clone());
            }
        }
        if healthy.is_empty() {
            return None;
        }
        healthy.sort();
        removed.sort();
        Some(PrunedZoneList {
            healthy,
            removed,
            generated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zones(names: &[&str]) -> Vec<String> {
        names.iter().map(|z| z.to_string()).collect()
    }

    fn listed(zone: &str) -> ZoneAnswer {
        ZoneAnswer {
            zone: zone.to_string(),
            classification: Classification::Listed,
            detail: "127.0.0.2".into(),
        }
    }

    fn timed_out(zone: &str) -> ZoneAnswer {
        ZoneAnswer::unknown(zone, FailureKind::Timeout, "query deadline exceeded")
    }

    #[test]
    fn test_counters_add_up() {
        let tracker = HealthTracker::new(&zones(&["a.org", "b.org"]));
        tracker.record_zone_answer(&listed("a.org"));
        tracker.record_zone_answer(&timed_out("a.org"));
        tracker.record_zone_answer(&timed_out("a.org"));

        let reports = tracker.zone_reports();
        let a = reports.iter().find(|r| r.zone == "a.org").unwrap();
        assert_eq!(a.checks_performed, 3);
        assert_eq!(a.successful_checks, 1);
        assert_eq!(a.failed_checks, 2);
        assert_eq!(
            a.checks_performed,
            a.successful_checks + a.failed_checks
        );
        assert_eq!(a.failure_types.get("timeout"), Some(&2));
    }

    #[test]
    fn test_zone_with_any_success_is_healthy() {
        let tracker = HealthTracker::new(&zones(&["a.org"]));
        tracker.record_zone_answer(&timed_out("a.org"));
        tracker.record_zone_answer(&listed("a.org"));
        assert!(tracker.broken_zones().is_empty());
    }

    #[test]
    fn test_all_failures_mark_zone_broken() {
        let tracker = HealthTracker::new(&zones(&["a.org", "b.org"]));
        tracker.record_zone_answer(&timed_out("a.org"));
        tracker.record_zone_answer(&listed("b.org"));
        assert_eq!(tracker.broken_zones(), zones(&["a.org"]));
        assert_eq!(tracker.broken_fraction(), 0.5);
    }

    #[test]
    fn test_unchecked_zone_is_not_broken() {
        let tracker = HealthTracker::new(&zones(&["a.org"]));
        assert!(tracker.broken_zones().is_empty());
        assert_eq!(tracker.zone_reports()[0].status, "healthy");
    }

    #[test]
    fn test_unknown_zone_record_is_dropped() {
        let tracker = HealthTracker::new(&zones(&["a.org"]));
        tracker.record_check("stray.org", Err(FailureKind::Timeout));
        assert_eq!(tracker.total_failed_checks(), 0);
    }

    #[test]
    fn test_network_flag_requires_probe_failures() {
        let tracker = HealthTracker::new(&zones(&["a.org", "b.org"]));
        tracker.record_zone_answer(&timed_out("a.org"));
        tracker.record_zone_answer(&timed_out("b.org"));

        // Broken fraction is 1.0, but one resolver still answers.
        let reachable = ProbeResult {
            check_enabled: true,
            cloudflare_reachable: Some(true),
            google_reachable: Some(false),
        };
        let summary = tracker.summary(Some(reachable), Utc::now());
        assert!(!summary.execution_summary.network_issue_detected);

        let unreachable = ProbeResult {
            check_enabled: true,
            cloudflare_reachable: Some(false),
            google_reachable: Some(false),
        };
        let summary = tracker.summary(Some(unreachable), Utc::now());
        assert!(summary.execution_summary.network_issue_detected);
    }

    #[test]
    fn test_network_flag_at_exactly_half_broken() {
        let tracker = HealthTracker::new(&zones(&["a.org", "b.org"]));
        tracker.record_zone_answer(&timed_out("a.org"));
        tracker.record_zone_answer(&listed("b.org"));

        let unreachable = ProbeResult {
            check_enabled: true,
            cloudflare_reachable: Some(false),
            google_reachable: Some(false),
        };
        let summary = tracker.summary(Some(unreachable), Utc::now());
        assert!(summary.execution_summary.network_issue_detected);
    }

    #[test]
    fn test_network_flag_below_half_broken() {
        let tracker = HealthTracker::new(&zones(&["a.org", "b.org", "c.org"]));
        tracker.record_zone_answer(&timed_out("a.org"));
        tracker.record_zone_answer(&listed("b.org"));
        tracker.record_zone_answer(&listed("c.org"));

        let unreachable = ProbeResult {
            check_enabled: true,
            cloudflare_reachable: Some(false),
            google_reachable: Some(false),
        };
        let summary = tracker.summary(Some(unreachable), Utc::now());
        assert!(!summary.execution_summary.network_issue_detected);
    }

    #[test]
    fn test_network_flag_without_probe() {
        let tracker = HealthTracker::new(&zones(&["a.org"]));
        tracker.record_zone_answer(&timed_out("a.org"));
        let summary = tracker.summary(None, Utc::now());
        assert!(!summary.execution_summary.network_issue_detected);
    }

    #[test]
    fn test_summary_counts_ip_checks() {
        let tracker = HealthTracker::new(&zones(&["a.org"]));
        tracker.record_ip_check_start();
        tracker.record_ip_check_start();
        let summary = tracker.summary(None, Utc::now());
        assert_eq!(summary.execution_summary.total_ip_checks, 2);
        assert_eq!(summary.execution_summary.total_dnsbls, 1);
    }

    #[test]
    fn test_zone_reports_sorted() {
        let tracker = HealthTracker::new(&zones(&["z.org", "a.org", "m.org"]));
        let reports = tracker.zone_reports();
        let names: Vec<&str> = reports.iter().map(|r| r.zone.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_pruned_list_splits_and_sorts() {
        let tracker = HealthTracker::new(&zones(&["z.org", "a.org", "m.org"]));
        tracker.record_zone_answer(&timed_out("m.org"));
        tracker.record_zone_answer(&listed("a.org"));
        tracker.record_zone_answer(&listed("z.org"));

        let pruned = tracker.pruned_zone_list(Utc::now()).unwrap();
        assert_eq!(pruned.healthy, zones(&["a.org", "z.org"]));
        assert_eq!(pruned.removed, zones(&["m.org"]));
    }

    #[test]
    fn test_pruned_list_absent_when_all_broken() {
        let tracker = HealthTracker::new(&zones(&["a.org", "b.org"]));
        tracker.record_zone_answer(&timed_out("a.org"));
        tracker.record_zone_answer(&timed_out("b.org"));
        assert!(tracker.pruned_zone_list(Utc::now()).is_none());
    }
}
