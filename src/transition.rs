//! State transition decisions for monitored IPs.
//!
//! Compares the zone set stored on a row against the zone set observed by
//! the DNS checker and decides the single idempotent write to apply. The
//! decision is a pure function of its two inputs: feeding the same
//! observation twice always yields [`Transition::NoOp`] the second time.

use std::collections::BTreeSet;

/// The write decided for one IP, derived from stored vs observed state.
///
/// `NewListing` and `ZoneChange` carry the observed zone set in canonical
/// (ascending, deduplicated) order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Stored and observed state agree; nothing to write.
    NoOp,
    /// A clean IP appeared on at least one zone.
    NewListing(Vec<String>),
    /// A listed IP is still listed, but on a different zone set.
    ZoneChange(Vec<String>),
    /// A listed IP is no longer listed anywhere.
    Cleared,
}

impl Transition {
    /// Static label for structured records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoOp => "no_op",
            Self::NewListing(_) => "new_listing",
            Self::ZoneChange(_) => "zone_change",
            Self::Cleared => "cleared",
        }
    }
}

/// Canonical form of a zone set: ascending-sorted, deduplicated,
/// comma-joined, no whitespace.
pub fn canonical_zones(zones: &[String]) -> String {
    sorted_unique(zones).join(",")
}

/// Tokenize a stored `blockingLists` value back into sorted zone names.
///
/// The empty string (the clean state) yields an empty vector.
pub fn tokenize_zones(stored: &str) -> Vec<String> {
    let zones: Vec<String> = stored
        .split(',')
        .map(str::trim)
        .filter(|z| !z.is_empty())
        .map(String::from)
        .collect();
    sorted_unique(&zones)
}

/// Decide the transition for one IP.
///
/// `stored` is the row's `blockingLists` value; `observed_listed` is the
/// set of zones the checker classified as LISTED, in any order. UNKNOWN
/// zones never reach this function: they cannot change state class on
/// their own.
pub fn decide(stored: &str, observed_listed: &[String]) -> Transition {
    let stored_list = tokenize_zones(stored);
    let observed_list = sorted_unique(observed_listed);

    match (stored_list.is_empty(), observed_list.is_empty()) {
        (true, true) => Transition::NoOp,
        (true, false) => Transition::NewListing(observed_list),
        (false, true) => Transition::Cleared,
        (false, false) if stored_list == observed_list => Transition::NoOp,
        (false, false) => Transition::ZoneChange(observed_list),
    }
}

/// Compute the (added, removed) zone delta between two zone sets.
///
/// Both outputs are sorted ascending.
pub fn zone_delta(stored: &[String], observed: &[String]) -> (Vec<String>, Vec<String>) {
    let stored_set: BTreeSet<&String> = stored.iter().collect();
    let observed_set: BTreeSet<&String> = observed.iter().collect();
    let added = observed_set
        .difference(&stored_set)
        .map(|z| z.to_string())
        .collect();
    let removed = stored_set
        .difference(&observed_set)
        .map(|z| z.to_string())
        .collect();
    (added, removed)
}

fn sorted_unique(zones: &[String]) -> Vec<String> {
    let set: BTreeSet<&String> = zones.iter().collect();
    set.into_iter().cloned().collect()
}
