//! In-memory issue tracker fake.
//!
//! Issues live in a shared vector; the find step reproduces the
//! query-based deduplication (summary substring match against open
//! issues, most recently created wins).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;

use dnsbl_monitor::tracker::{
    TicketTracker, TrackerError, TrackerIssue, dns_failure_needle, dns_failure_summary,
    listing_summary,
};

/// One stored fake issue.
#[derive(Debug, Clone)]
pub struct FakeIssue {
    pub key: String,
    pub summary: String,
    pub description: String,
    pub issue_type: String,
    pub labels: Vec<String>,
    pub status: String,
    pub created: String,
    pub comments: Vec<String>,
}

#[derive(Default)]
struct Inner {
    issues: Mutex<Vec<FakeIssue>>,
    seq: AtomicU64,
    find_calls: AtomicU64,
    create_calls: AtomicU64,
    comment_calls: AtomicU64,
}

/// Cloneable handle to a shared fake tracker.
#[derive(Clone, Default)]
pub struct FakeTracker {
    inner: Arc<Inner>,
}

impl FakeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issues(&self) -> Vec<FakeIssue> {
        self.inner.issues.lock().unwrap().clone()
    }

    pub fn issue(&self, key: &str) -> FakeIssue {
        self.issues()
            .into_iter()
            .find(|issue| issue.key == key)
            .expect("issue exists")
    }

    pub fn find_calls(&self) -> u64 {
        self.inner.find_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> u64 {
        self.inner.create_calls.load(Ordering::SeqCst)
    }

    pub fn comment_calls(&self) -> u64 {
        self.inner.comment_calls.load(Ordering::SeqCst)
    }

    /// Total tracker traffic of any kind.
    pub fn total_calls(&self) -> u64 {
        self.find_calls() + self.create_calls() + self.comment_calls()
    }

    fn create(&self, summary: String, description: String, issue_type: String, labels: Vec<String>) -> String {
        let n = self.inner.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let key = format!("OPS-{n}");
        let issue = FakeIssue {
            key: key.clone(),
            summary,
            description,
            issue_type,
            labels,
            status: "Open".to_string(),
            created: format!("2026-01-01T00:00:{:02}.000+0000", n.min(59)),
            comments: Vec::new(),
        };
        self.inner.issues.lock().unwrap().push(issue);
        key
    }

    fn find(&self, needle: &str) -> Option<TrackerIssue> {
        let issues = self.inner.issues.lock().unwrap();
        issues
            .iter()
            .filter(|issue| issue.status == "Open" && issue.summary.contains(needle))
            .max_by(|a, b| a.created.cmp(&b.created))
            .map(|issue| TrackerIssue {
                key: issue.key.clone(),
                summary: issue.summary.clone(),
                status: issue.status.clone(),
                created: issue.created.clone(),
            })
    }
}

#[async_trait]
impl TicketTracker for FakeTracker {
    async fn find_open_issue(&self, ip: &str) -> Result<Option<TrackerIssue>, TrackerError> {
        self.inner.find_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.find(&format!("IP {ip}")))
    }

    async fn create_listing_issue(
        &self,
        ip: &str,
        zones: &[String],
        description: &str,
    ) -> Result<String, TrackerError> {
        self.inner.create_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.create(
            listing_summary(ip, zones),
            description.to_string(),
            "Incident".to_string(),
            Vec::new(),
        ))
    }

    async fn add_comment(&self, issue_key: &str, body: &str) -> Result<(), TrackerError> {
        self.inner.comment_calls.fetch_add(1, Ordering::SeqCst);
        let mut issues = self.inner.issues.lock().unwrap();
        let issue = issues
            .iter_mut()
            .find(|issue| issue.key == issue_key)
            .expect("comment target exists");
        issue.comments.push(body.to_string());
        Ok(())
    }

    async fn ensure_dns_failure_issue(
        &self,
        day: NaiveDate,
        percent_broken: f64,
        description: &str,
    ) -> Result<Option<String>, TrackerError> {
        self.inner.find_calls.fetch_add(1, Ordering::SeqCst);
        if self.find(&dns_failure_needle(day)).is_some() {
            return Ok(None);
        }
        self.inner.create_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(self.create(
            dns_failure_summary(day, percent_broken),
            description.to_string(),
            "Alert".to_string(),
            vec!["MAJOR MALFUNCTION".to_string()],
        )))
    }
}
