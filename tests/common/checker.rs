//! Canned zone checker fake.
//!
//! Returns pre-seeded answers per IP and publishes them to the health
//! tracker the way the real checker does, so health aggregation and the
//! outage heuristic are exercised by scenario tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use dnsbl_monitor::dns::classify::{Classification, FailureKind, ZoneAnswer};
use dnsbl_monitor::dns::probe::ProbeResult;
use dnsbl_monitor::dns::checker::ZoneChecker;
use dnsbl_monitor::health::HealthTracker;

/// Cloneable canned checker.
#[derive(Clone)]
pub struct FakeChecker {
    answers: Arc<BTreeMap<String, BTreeMap<String, ZoneAnswer>>>,
    probe: ProbeResult,
}

impl FakeChecker {
    /// Build from (ip, answers) pairs and a canned probe outcome.
    pub fn new(seeded: Vec<(&str, Vec<ZoneAnswer>)>, probe: ProbeResult) -> Self {
        let mut answers = BTreeMap::new();
        for (ip, zone_answers) in seeded {
            let map: BTreeMap<String, ZoneAnswer> = zone_answers
                .into_iter()
                .map(|answer| (answer.zone.clone(), answer))
                .collect();
            answers.insert(ip.to_string(), map);
        }
        Self {
            answers: Arc::new(answers),
            probe,
        }
    }

    pub fn reachable_probe() -> ProbeResult {
        ProbeResult {
            check_enabled: true,
            cloudflare_reachable: Some(true),
            google_reachable: Some(true),
        }
    }

    pub fn unreachable_probe() -> ProbeResult {
        ProbeResult {
            check_enabled: true,
            cloudflare_reachable: Some(false),
            google_reachable: Some(false),
        }
    }
}

#[async_trait]
impl ZoneChecker for FakeChecker {
    async fn check_ip(
        &self,
        ip: &str,
        _zones: &[String],
        health: Arc<HealthTracker>,
    ) -> BTreeMap<String, ZoneAnswer> {
        let map = self.answers.get(ip).cloned().unwrap_or_default();
        for answer in map.values() {
            health.record_zone_answer(answer);
        }
        map
    }

    async fn probe_public_resolvers(&self) -> ProbeResult {
        self.probe
    }
}

/// A LISTED answer carrying the conventional 127.0.0.2 return code.
pub fn listed(zone: &str) -> ZoneAnswer {
    ZoneAnswer {
        zone: zone.to_string(),
        classification: Classification::Listed,
        detail: "127.0.0.2".to_string(),
    }
}

/// An authoritative NOT_LISTED answer.
pub fn not_listed(zone: &str) -> ZoneAnswer {
    ZoneAnswer {
        zone: zone.to_string(),
        classification: Classification::NotListed,
        detail: String::new(),
    }
}

/// An UNKNOWN answer of the given kind.
pub fn unknown(zone: &str, kind: FailureKind) -> ZoneAnswer {
    ZoneAnswer::unknown(zone, kind, kind.as_str())
}
