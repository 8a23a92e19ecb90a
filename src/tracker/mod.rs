//! Issue-tracker reconciliation.
//!
//! Talks to a Jira-compatible REST v2 API. Deduplication is query-based:
//! the tracker itself is searched for an open issue mentioning the IP
//! before anything is created, so the job never needs a local mapping
//! and survives operators closing or renaming tickets between runs.
//! Closure is never performed here; that stays a human decision.

mod retry;

pub use retry::with_backoff;

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::health::report::ZoneReport;
use crate::transition::canonical_zones;

/// Issue-tracker errors.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("tracker authentication rejected (status {0})")]
    Auth(u16),
    #[error("tracker rate limited")]
    RateLimited,
    #[error("tracker server error {status}: {message}")]
    Server { status: u16, message: String },
    #[error("tracker request rejected {status}: {message}")]
    Request { status: u16, message: String },
    #[error("tracker transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl TrackerError {
    /// Whether a bounded backoff retry is worth attempting.
    ///
    /// Rate limits, 5xx responses, and network blips are transient;
    /// authentication failures and other 4xx rejections are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited | Self::Server { .. } => true,
            Self::Transport(err) => !err.is_decode(),
            Self::Auth(_) | Self::Request { .. } => false,
        }
    }
}

/// An open issue as seen by the find step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerIssue {
    pub key: String,
    pub summary: String,
    pub status: String,
    pub created: String,
}

/// The orchestrator's tracker seam. Tests substitute an in-memory fake.
#[async_trait]
pub trait TicketTracker: Send + Sync {
    /// Find the open issue for `ip`, if any. With several matches the
    /// most recently created wins.
    async fn find_open_issue(&self, ip: &str) -> Result<Option<TrackerIssue>, TrackerError>;

    /// Create the listing issue for `ip`; returns the new issue key.
    async fn create_listing_issue(
        &self,
        ip: &str,
        zones: &[String],
        description: &str,
    ) -> Result<String, TrackerError>;

    /// Add a comment to an existing issue.
    async fn add_comment(&self, issue_key: &str, body: &str) -> Result<(), TrackerError>;

    /// Create the per-calendar-day mass-DNS-failure alert unless one
    /// already exists for `day`. Returns the key when created.
    async fn ensure_dns_failure_issue(
        &self,
        day: NaiveDate,
        percent_broken: f64,
        description: &str,
    ) -> Result<Option<String>, TrackerError>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    issues: Vec<RawIssue>,
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    key: String,
    fields: RawFields,
}

#[derive(Debug, Deserialize)]
struct RawFields {
    #[serde(default)]
    summary: String,
    status: Option<RawStatus>,
    #[serde(default)]
    created: String,
}

#[derive(Debug, Deserialize)]
struct RawStatus {
    name: String,
}

#[derive(Debug, Deserialize)]
struct CreatedIssue {
    key: String,
}

/// Jira REST v2 client.
pub struct TrackerClient {
    http: reqwest::Client,
    base_url: String,
    user: String,
    token: String,
    project: String,
    issue_type: String,
    dns_failure_type: String,
    excluded_statuses: Vec<String>,
}

impl TrackerClient {
    /// Per-request timeout; retries are layered on top of this.
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// Cap on find-step matches fetched per search.
    const MAX_SEARCH_RESULTS: u32 = 10;

    pub fn new(config: &Config) -> Result<Self, TrackerError> {
        let http = reqwest::Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("dnsbl-monitor/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: config.tracker_url.trim_end_matches('/').to_string(),
            user: config.tracker_user.clone(),
            token: config.tracker_token.clone(),
            project: config.tracker_project.clone(),
            issue_type: config.tracker_issue_type.clone(),
            dns_failure_type: config.tracker_dns_failure_type.clone(),
            excluded_statuses: config.tracker_excluded_statuses.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// JQL for the find step: open issues in the project whose summary
    /// contains `needle`.
    fn find_jql(&self, needle: &str) -> String {
        let statuses = self
            .excluded_statuses
            .iter()
            .map(|s| format!("\"{s}\""))
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "project = \"{}\" AND status NOT IN ({statuses}) AND summary ~ \"{needle}\"",
            self.project
        )
    }

    async fn search_once(&self, needle: &str) -> Result<Option<TrackerIssue>, TrackerError> {
        let jql = self.find_jql(needle);
        debug!(jql = %jql, "tracker search");

        let max_results = Self::MAX_SEARCH_RESULTS.to_string();
        let response = self
            .http
            .get(self.url("/rest/api/2/search"))
            .basic_auth(&self.user, Some(&self.token))
            .query(&[
                ("jql", jql.as_str()),
                ("maxResults", max_results.as_str()),
                ("fields", "summary,status,created"),
            ])
            .send()
            .await?;
        let response = check_status(response).await?;
        let found: SearchResponse = response.json().await?;

        if found.issues.len() > 1 {
            warn!(
                needle,
                matches = found.issues.len(),
                "multiple open issues match; using most recently created"
            );
        }

        Ok(found
            .issues
            .into_iter()
            .max_by(|a, b| a.fields.created.cmp(&b.fields.created))
            .map(|issue| TrackerIssue {
                key: issue.key,
                summary: issue.fields.summary,
                status: issue.fields.status.map(|s| s.name).unwrap_or_default(),
                created: issue.fields.created,
            }))
    }

    async fn create_once(
        &self,
        summary: &str,
        description: &str,
        issue_type: &str,
        labels: &[&str],
    ) -> Result<String, TrackerError> {
        let mut fields = json!({
            "project": {"key": self.project},
            "summary": summary,
            "description": description,
            "issuetype": {"name": issue_type},
        });
        if !labels.is_empty() {
            fields["labels"] = json!(labels);
        }

        let response = self
            .http
            .post(self.url("/rest/api/2/issue"))
            .basic_auth(&self.user, Some(&self.token))
            .json(&json!({ "fields": fields }))
            .send()
            .await?;
        let response = check_status(response).await?;
        let created: CreatedIssue = response.json().await?;
        Ok(created.key)
    }

    async fn comment_once(&self, issue_key: &str, body: &str) -> Result<(), TrackerError> {
        let response = self
            .http
            .post(self.url(&format!("/rest/api/2/issue/{issue_key}/comment")))
            .basic_auth(&self.user, Some(&self.token))
            .json(&json!({ "body": body }))
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl TicketTracker for TrackerClient {
    async fn find_open_issue(&self, ip: &str) -> Result<Option<TrackerIssue>, TrackerError> {
        let needle = format!("IP {ip}");
        with_backoff("find_open_issue", || self.search_once(&needle)).await
    }

    async fn create_listing_issue(
        &self,
        ip: &str,
        zones: &[String],
        description: &str,
    ) -> Result<String, TrackerError> {
        let summary = listing_summary(ip, zones);
        let key = with_backoff("create_listing_issue", || {
            self.create_once(&summary, description, &self.issue_type, &[])
        })
        .await?;
        info!(issue = %key, ip, "tracker issue created");
        Ok(key)
    }

    async fn add_comment(&self, issue_key: &str, body: &str) -> Result<(), TrackerError> {
        with_backoff("add_comment", || self.comment_once(issue_key, body)).await?;
        info!(issue = %issue_key, "tracker comment added");
        Ok(())
    }

    async fn ensure_dns_failure_issue(
        &self,
        day: NaiveDate,
        percent_broken: f64,
        description: &str,
    ) -> Result<Option<String>, TrackerError> {
        let needle = dns_failure_needle(day);
        if let Some(existing) = with_backoff("find_dns_failure_issue", || {
            self.search_once(&needle)
        })
        .await?
        {
            debug!(issue = %existing.key, "mass-failure alert already filed today");
            return Ok(None);
        }

        let summary = dns_failure_summary(day, percent_broken);
        let key = with_backoff("create_dns_failure_issue", || {
            self.create_once(
                &summary,
                description,
                &self.dns_failure_type,
                &["MAJOR MALFUNCTION"],
            )
        })
        .await?;
        warn!(issue = %key, percent_broken, "mass-failure alert created");
        Ok(Some(key))
    }
}

/// Map a non-success response to the error taxonomy.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, TrackerError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = extract_error_message(&body);
    Err(match status.as_u16() {
        401 | 403 => TrackerError::Auth(status.as_u16()),
        429 => TrackerError::RateLimited,
        code if code >= 500 => TrackerError::Server {
            status: code,
            message,
        },
        code => TrackerError::Request {
            status: code,
            message,
        },
    })
}

/// Pull the first human-readable message out of a Jira error body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("errorMessages")
                .and_then(|msgs| msgs.get(0))
                .and_then(|msg| msg.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.chars().take(200).collect())
}

/// Canonical listing-issue summary: the find step matches on the
/// `IP <ip>` prefix of this exact shape.
pub fn listing_summary(ip: &str, zones: &[String]) -> String {
    format!("IP {ip} blacklisted by {}", canonical_zones(zones))
}

/// Listing-issue description: the full per-zone report.
pub fn listing_description(
    ip: &str,
    listed: &[String],
    not_listed: &[String],
    unknown: &[String],
) -> String {
    let mut out = format!(
        "IP {ip} has been listed on {} DNSBL zone(s):\n",
        listed.len()
    );
    for zone in listed {
        out.push_str(&format!("- {zone}\n"));
    }
    if !not_listed.is_empty() {
        out.push_str(&format!("\nNot listed on: {}\n", not_listed.join(", ")));
    }
    if !unknown.is_empty() {
        out.push_str(&format!(
            "\nNo definitive answer from: {}\n",
            unknown.join(", ")
        ));
    }
    out
}

/// Comment used when a new listing finds an already-open issue.
pub fn new_listing_comment(ip: &str, zones: &[String]) -> String {
    format!("IP {ip} listed again on: {}", canonical_zones(zones))
}

/// Comment describing a zone-set change.
pub fn zone_change_comment(added: &[String], removed: &[String], current: &[String]) -> String {
    let mut out = String::from("Zone membership changed:\n");
    if !added.is_empty() {
        out.push_str(&format!("Added: {}\n", added.join(", ")));
    }
    if !removed.is_empty() {
        out.push_str(&format!("Removed: {}\n", removed.join(", ")));
    }
    out.push_str(&format!("Currently listed on: {}", current.join(", ")));
    out
}

/// Comment added when an IP clears.
pub fn cleared_comment(ip: &str) -> String {
    format!("IP {ip} is now clean (no longer listed)")
}

/// Find-step needle for the per-day mass-failure dedup.
pub fn dns_failure_needle(day: NaiveDate) -> String {
    format!("DNS infrastructure failure {day}")
}

/// Mass-failure alert summary, keyed by calendar day.
pub fn dns_failure_summary(day: NaiveDate, percent_broken: f64) -> String {
    format!(
        "{} - {percent_broken:.1}% of DNSBL zones unreachable",
        dns_failure_needle(day)
    )
}

/// Mass-failure alert description from the broken-zone reports.
pub fn dns_failure_description(percent_broken: f64, broken: &[ZoneReport]) -> String {
    let mut out = format!(
        "MAJOR MALFUNCTION: {percent_broken:.1}% of DNSBL zones returned no definitive answer this run.\n\nFailed zones:\n"
    );
    for report in broken {
        let kinds = report
            .failure_types
            .iter()
            .map(|(kind, count)| format!("{kind}: {count}"))
            .collect::<Vec<_>>()
            .join(", ");
        if kinds.is_empty() {
            out.push_str(&format!("- {}\n", report.zone));
        } else {
            out.push_str(&format!("- {} ({kinds})\n", report.zone));
        }
    }
    out
}
