//! DNSBL response classification.
//!
//! A DNSBL answers an A-record query for the reversed-IP name with an
//! address inside `127.0.0.0/8` when the IP is listed, and NXDOMAIN when
//! it is not. Everything else is a failure of some kind and must never be
//! read as a listing change. Classification is total: every outcome of a
//! lookup maps to exactly one [`Classification`].

use std::net::Ipv4Addr;

use hickory_resolver::proto::ProtoErrorKind;
use hickory_resolver::proto::op::ResponseCode;
use hickory_resolver::proto::rr::Name;
use hickory_resolver::{ResolveError, ResolveErrorKind};

/// Why a zone answer is UNKNOWN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FailureKind {
    /// The query did not complete within its deadline.
    Timeout,
    /// The zone apex itself does not resolve.
    NxdomainZone,
    /// An A record outside `127.0.0.0/8` was returned.
    InvalidResponseRange,
    /// The answer carried no A record where one was expected.
    InvalidResponseType,
    /// SERVFAIL, unreachable nameservers, or any other resolver failure.
    ResolverError,
}

impl FailureKind {
    /// Static label used in health counters and structured records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::NxdomainZone => "nxdomain_zone",
            Self::InvalidResponseRange => "invalid_response_range",
            Self::InvalidResponseType => "invalid_response_type",
            Self::ResolverError => "resolver_error",
        }
    }
}

/// Classification of one zone query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// At least one A record, all within `127.0.0.0/8`.
    Listed,
    /// Authoritative name-does-not-exist.
    NotListed,
    /// No definitive answer; the kind says why.
    Unknown(FailureKind),
}

impl Classification {
    pub fn is_listed(&self) -> bool {
        matches!(self, Self::Listed)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown(_))
    }
}

/// One zone's answer for one IP.
///
/// `detail` carries the returned A record(s) for a listing, or a short
/// failure description for an UNKNOWN answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneAnswer {
    pub zone: String,
    pub classification: Classification,
    pub detail: String,
}

impl ZoneAnswer {
    pub fn unknown(zone: &str, kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            zone: zone.to_string(),
            classification: Classification::Unknown(kind),
            detail: detail.into(),
        }
    }
}

/// Classify a successful lookup from its A records.
pub fn classify_records(addrs: &[Ipv4Addr]) -> (Classification, String) {
    if addrs.is_empty() {
        return (
            Classification::Unknown(FailureKind::InvalidResponseType),
            "answer carried no A records".to_string(),
        );
    }
    if let Some(out_of_range) = addrs.iter().find(|addr| addr.octets()[0] != 127) {
        return (
            Classification::Unknown(FailureKind::InvalidResponseRange),
            format!("A record {out_of_range} outside 127.0.0.0/8"),
        );
    }
    let records = addrs
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    (Classification::Listed, records)
}

/// Classify a failed lookup.
///
/// `apex` is the zone being queried, used to tell a zone-level NXDOMAIN
/// (the blocklist itself is gone) apart from the ordinary name-level
/// NXDOMAIN that means "not listed".
pub fn classify_error(err: &ResolveError, apex: &Name) -> (Classification, String) {
    match err.kind() {
        ResolveErrorKind::Proto(proto) => match proto.kind() {
            ProtoErrorKind::NoRecordsFound {
                response_code, soa, ..
            } => classify_negative(*response_code, soa.as_ref().map(|r| r.name()), apex),
            ProtoErrorKind::Timeout => (
                Classification::Unknown(FailureKind::Timeout),
                "query timed out".to_string(),
            ),
            _ => (
                Classification::Unknown(FailureKind::ResolverError),
                err.to_string(),
            ),
        },
        _ => (
            Classification::Unknown(FailureKind::ResolverError),
            err.to_string(),
        ),
    }
}

/// Classify a negative response from its response code and SOA owner.
///
/// An NXDOMAIN whose SOA sits at or below the zone apex proves the zone
/// exists and the queried name does not: the IP is not listed. An SOA
/// strictly above the apex means the apex itself does not resolve.
pub(crate) fn classify_negative(
    response_code: ResponseCode,
    soa_name: Option<&Name>,
    apex: &Name,
) -> (Classification, String) {
    match response_code {
        ResponseCode::NXDomain => match soa_name {
            Some(soa) if soa.num_labels() < apex.num_labels() && soa.zone_of(apex) => (
                Classification::Unknown(FailureKind::NxdomainZone),
                format!("zone apex does not resolve (authority {soa})"),
            ),
            _ => (Classification::NotListed, String::new()),
        },
        ResponseCode::ServFail => (
            Classification::Unknown(FailureKind::ResolverError),
            "SERVFAIL".to_string(),
        ),
        // NOERROR with an empty answer section: the name exists but has
        // no A record (a CNAME chain with no A target, typically).
        ResponseCode::NoError => (
            Classification::Unknown(FailureKind::InvalidResponseType),
            "no A records in answer".to_string(),
        ),
        code => (
            Classification::Unknown(FailureKind::ResolverError),
            format!("unexpected response code {code}"),
        ),
    }
}
