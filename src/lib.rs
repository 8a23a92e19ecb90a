//! dnsbl-monitor - DNSBL reconciliation for outbound mail IPs.
//!
//! A one-shot job that checks every outbound IPv4 address of a mail fleet
//! against a set of DNS blocklist zones and reflects listing changes into
//! two systems of record: the throttle table the mail server reads, and
//! the issue tracker the operations team works from. Between runs the job
//! holds no state; every decision is recomputed from the observed DNS
//! answers and the stored row.

pub mod config;
pub mod db;
pub mod dns;
pub mod error;
pub mod health;
pub mod job;
pub mod tracker;
pub mod transition;
