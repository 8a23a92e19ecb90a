//! DNS building blocks for DNSBL reconciliation.
//!
//! - [`query`]: reverse-octet query-name construction.
//! - [`classify`]: RFC 5782 response classification.
//! - [`checker`]: bounded-parallel per-IP fan-out over all zones.
//! - [`probe`]: supplemental probes against public resolvers.

pub mod checker;
pub mod classify;
pub mod probe;
pub mod query;

pub use checker::{DnsblChecker, ZoneChecker};
pub use classify::{Classification, FailureKind, ZoneAnswer};
pub use probe::ProbeResult;
