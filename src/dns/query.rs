//! DNSBL query name construction.
//!
//! A DNSBL is queried by reversing the four octets of the IPv4 address
//! and appending the zone: `203.0.113.45` under `zen.example.org` is
//! looked up as `45.113.0.203.zen.example.org`.

use std::net::Ipv4Addr;

use thiserror::Error;

/// Errors constructing a DNSBL query name.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryNameError {
    #[error("invalid IPv4 address: {0}")]
    InvalidIp(String),
    #[error("DNSBL zone cannot be empty")]
    EmptyZone,
}

/// Reverse the octets of a dotted-quad IPv4 address.
///
/// Rejects anything that is not four decimal octets in 0..=255.
pub fn reverse_octets(ip: &str) -> Result<String, QueryNameError> {
    let addr: Ipv4Addr = ip
        .parse()
        .map_err(|_| QueryNameError::InvalidIp(ip.to_string()))?;
    let o = addr.octets();
    Ok(format!("{}.{}.{}.{}", o[3], o[2], o[1], o[0]))
}

/// Build the fully qualified DNSBL query name for `ip` under `zone`.
///
/// The result carries a trailing dot so resolvers never apply search
/// domain suffixes to it.
pub fn dnsbl_query_name(ip: &str, zone: &str) -> Result<String, QueryNameError> {
    if zone.is_empty() {
        return Err(QueryNameError::EmptyZone);
    }
    let reversed = reverse_octets(ip)?;
    Ok(format!("{reversed}.{zone}."))
}
