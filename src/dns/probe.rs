//! Supplemental probes against public resolvers.
//!
//! When most zones fail in one run the cause is ambiguous: either the
//! blocklists are unreachable or our own resolver path is down. Two
//! independent A-record probes, one through Cloudflare and one through
//! Google, settle it: if both fail the problem is local.

use std::time::Duration;

use hickory_resolver::TokioResolver;
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use serde::Serialize;
use tracing::debug;

/// Well-known name that always resolves when the network is up.
const PROBE_NAME: &str = "google.com.";

/// Probe deadline, intentionally shorter than the zone-query deadline.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Outcome of the supplemental probes.
///
/// Reachability fields are `None` when the probe was disabled or skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub check_enabled: bool,
    pub cloudflare_reachable: Option<bool>,
    pub google_reachable: Option<bool>,
}

impl ProbeResult {
    /// The result reported when the probe is configured off.
    pub fn disabled() -> Self {
        Self {
            check_enabled: false,
            cloudflare_reachable: None,
            google_reachable: None,
        }
    }

    /// True when the probe ran and neither public resolver answered.
    pub fn both_unreachable(&self) -> bool {
        self.check_enabled
            && self.cloudflare_reachable == Some(false)
            && self.google_reachable == Some(false)
    }
}

/// Probe both public resolvers.
pub async fn probe_public_resolvers() -> ProbeResult {
    let cloudflare = probe_resolver("cloudflare", ResolverConfig::cloudflare()).await;
    let google = probe_resolver("google", ResolverConfig::google()).await;
    ProbeResult {
        check_enabled: true,
        cloudflare_reachable: Some(cloudflare),
        google_reachable: Some(google),
    }
}

/// A resolver is reachable iff it answers the probe query with at least
/// one address within the probe deadline.
async fn probe_resolver(label: &str, config: ResolverConfig) -> bool {
    let mut builder =
        TokioResolver::builder_with_config(config, TokioConnectionProvider::default());
    let opts = builder.options_mut();
    opts.timeout = PROBE_TIMEOUT;
    opts.attempts = 1;
    let resolver = builder.build();

    match tokio::time::timeout(PROBE_TIMEOUT, resolver.lookup_ip(PROBE_NAME)).await {
        Ok(Ok(lookup)) => {
            let reachable = lookup.iter().next().is_some();
            debug!(resolver = label, reachable, "supplemental probe answered");
            reachable
        }
        Ok(Err(err)) => {
            debug!(resolver = label, error = %err, "supplemental probe failed");
            false
        }
        Err(_) => {
            debug!(resolver = label, "supplemental probe timed out");
            false
        }
    }
}
