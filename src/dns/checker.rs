//! Bounded-parallel DNSBL fan-out.
//!
//! For one IP the checker queries every configured zone concurrently,
//! with the number of in-flight queries across the whole run bounded by a
//! single semaphore. Each query gets its own wall-clock deadline; one DNS
//! call per (IP, zone), never retried within a run. Every completion is
//! published to the health tracker before its semaphore slot is released.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::TokioResolver;
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::rr::{Name, RecordType};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::dns::classify::{self, FailureKind, ZoneAnswer};
use crate::dns::probe::{self, ProbeResult};
use crate::dns::query::dnsbl_query_name;
use crate::health::HealthTracker;

/// The orchestrator's DNS seam: per-IP zone classification plus the
/// supplemental public-resolver probe. Tests substitute canned answers.
#[async_trait]
pub trait ZoneChecker: Send + Sync {
    /// Classify `ip` against every zone in `zones`, publishing each
    /// completion to `health`. The result is keyed by zone.
    async fn check_ip(
        &self,
        ip: &str,
        zones: &[String],
        health: Arc<HealthTracker>,
    ) -> BTreeMap<String, ZoneAnswer>;

    /// Probe the public resolvers to separate a local resolver outage
    /// from a DNSBL-side problem.
    async fn probe_public_resolvers(&self) -> ProbeResult;
}

/// Production checker backed by the system resolver.
pub struct DnsblChecker {
    resolver: TokioResolver,
    query_timeout: Duration,
    permits: Arc<Semaphore>,
}

impl DnsblChecker {
    /// Create a checker with a run-wide concurrency bound.
    ///
    /// Tries the system resolver configuration first and falls back to
    /// the library defaults. Retries are disabled: the next scheduled run
    /// is the retry.
    pub fn new(query_timeout: Duration, concurrency: usize) -> Self {
        let mut builder = TokioResolver::builder_tokio().unwrap_or_else(|_| {
            TokioResolver::builder_with_config(
                ResolverConfig::default(),
                TokioConnectionProvider::default(),
            )
        });
        let opts = builder.options_mut();
        opts.timeout = query_timeout;
        opts.attempts = 1;

        Self {
            resolver: builder.build(),
            query_timeout,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }
}

#[async_trait]
impl ZoneChecker for DnsblChecker {
    async fn check_ip(
        &self,
        ip: &str,
        zones: &[String],
        health: Arc<HealthTracker>,
    ) -> BTreeMap<String, ZoneAnswer> {
        let mut tasks: JoinSet<ZoneAnswer> = JoinSet::new();

        for zone in zones {
            let zone = zone.clone();
            let ip = ip.to_string();
            let resolver = self.resolver.clone();
            let permits = Arc::clone(&self.permits);
            let health = Arc::clone(&health);
            let deadline = self.query_timeout;

            tasks.spawn(async move {
                let permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        // Semaphore closed: only possible during shutdown.
                        return ZoneAnswer::unknown(
                            &zone,
                            FailureKind::ResolverError,
                            "query slot unavailable",
                        );
                    }
                };
                let answer = query_zone(&resolver, &ip, &zone, deadline).await;
                health.record_zone_answer(&answer);
                drop(permit);
                answer
            });
        }

        let mut answers = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(answer) => {
                    answers.insert(answer.zone.clone(), answer);
                }
                Err(err) => warn!(ip = %ip, error = %err, "zone query task failed"),
            }
        }
        answers
    }

    async fn probe_public_resolvers(&self) -> ProbeResult {
        probe::probe_public_resolvers().await
    }
}

/// Run and classify a single zone query.
async fn query_zone(
    resolver: &TokioResolver,
    ip: &str,
    zone: &str,
    deadline: Duration,
) -> ZoneAnswer {
    let query_name = match dnsbl_query_name(ip, zone) {
        Ok(name) => name,
        Err(err) => {
            return ZoneAnswer::unknown(zone, FailureKind::ResolverError, err.to_string());
        }
    };
    let apex = match Name::from_ascii(format!("{zone}.")) {
        Ok(name) => name,
        Err(err) => {
            return ZoneAnswer::unknown(
                zone,
                FailureKind::ResolverError,
                format!("invalid zone name: {err}"),
            );
        }
    };

    debug!(query = %query_name, "checking DNSBL zone");

    let lookup = resolver.lookup(query_name, RecordType::A);
    match tokio::time::timeout(deadline, lookup).await {
        Ok(Ok(answers)) => {
            let addrs: Vec<_> = answers
                .iter()
                .filter_map(|rdata| rdata.as_a().map(|a| a.0))
                .collect();
            let (classification, detail) = classify::classify_records(&addrs);
            ZoneAnswer {
                zone: zone.to_string(),
                classification,
                detail,
            }
        }
        Ok(Err(err)) => {
            let (classification, detail) = classify::classify_error(&err, &apex);
            ZoneAnswer {
                zone: zone.to_string(),
                classification,
                detail,
            }
        }
        Err(_) => ZoneAnswer::unknown(zone, FailureKind::Timeout, "query deadline exceeded"),
    }
}
