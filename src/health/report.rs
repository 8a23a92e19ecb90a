//! Health report artefacts.
//!
//! Two outputs are produced after the reconciliation loop: a JSON health
//! summary for machine consumption, and a copy-pasteable pruned zone list
//! for the operator. Both are deterministic for identical observations.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ZoneHealth;
use crate::dns::probe::ProbeResult;

/// Run-level rollup embedded in the health summary.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionSummary {
    pub timestamp: String,
    pub total_dnsbls: usize,
    pub broken_dnsbls: usize,
    pub network_issue_detected: bool,
    pub total_ip_checks: u64,
    pub execution_duration_ms: u64,
}

/// Per-zone section of the health summary.
#[derive(Debug, Clone, Serialize)]
pub struct ZoneReport {
    pub zone: String,
    pub status: &'static str,
    pub checks_performed: u64,
    pub successful_checks: u64,
    pub failed_checks: u64,
    pub failure_rate: f64,
    pub failure_types: BTreeMap<&'static str, u64>,
}

impl ZoneReport {
    pub fn new(zone: &str, health: &ZoneHealth) -> Self {
        Self {
            zone: zone.to_string(),
            status: health.status(),
            checks_performed: health.checks_performed,
            successful_checks: health.successful_checks,
            failed_checks: health.failed_checks,
            failure_rate: health.failure_rate(),
            failure_types: health.failure_types.clone(),
        }
    }
}

/// The complete health summary document.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub execution_summary: ExecutionSummary,
    pub dnsbl_health: Vec<ZoneReport>,
    pub network_connectivity: Option<ProbeResult>,
}

impl HealthSummary {
    /// Render as pretty-printed JSON with sorted keys.
    ///
    /// Going through `serde_json::Value` sorts object keys (its map is
    /// BTree-backed), which keeps the document byte-deterministic.
    pub fn render_json(&self) -> String {
        match serde_json::to_value(self) {
            Ok(value) => format!("{value:#}"),
            Err(_) => "{}".to_string(),
        }
    }
}

/// Suggested zone configuration with broken zones removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrunedZoneList {
    pub healthy: Vec<String>,
    pub removed: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

impl PrunedZoneList {
    /// Render the artefact: comment header naming the removed zones,
    /// then the healthy zones as a YAML list ready for the config.
    pub fn render(&self) -> String {
        let removed = if self.removed.is_empty() {
            "None".to_string()
        } else {
            self.removed.join(", ")
        };

        let mut out = String::new();
        out.push_str("# Suggested DNSBL configuration (broken zones removed)\n");
        out.push_str(&format!("# Generated: {}\n", self.generated_at.to_rfc3339()));
        out.push_str(&format!("# Removed: {removed}\n"));
        out.push_str("dnsbl_zones:\n");
        for zone in &self.healthy {
            out.push_str(&format!("- {zone}\n"));
        }
        out
    }
}
