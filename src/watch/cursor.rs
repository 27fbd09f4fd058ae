//! Cursor helpers: parsing the oldest available version out of expiry reasons.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::TransportError;

/// Cursor used by the priming request; the server answers it with an expiry that
/// names the oldest version still available.
pub(crate) const PRIMING_CURSOR: &str = "1";

/// Reason prefix of the expiry the priming request expects.
const EXPIRED_PREFIX: &str = "Expired:";

fn version_marker() -> Option<&'static Regex> {
    static MARKER: OnceLock<Option<Regex>> = OnceLock::new();
    MARKER
        .get_or_init(|| Regex::new(r"\(([0-9]+)\)").ok())
        .as_ref()
}

/// Extracts the parenthesized version from an expiry reason, e.g.
/// `"Expired: too old resource version: 1 (2045)"` yields `"2045"`.
pub(crate) fn parse_expired_version(reason: &str) -> Option<String> {
    version_marker()?
        .captures(reason)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// New cursor carried by an expiry reported during the priming request.
pub(crate) fn priming_cursor(err: &TransportError) -> Option<String> {
    if err.is_expired() && err.reason().starts_with(EXPIRED_PREFIX) {
        parse_expired_version(err.reason())
    } else {
        None
    }
}

/// New cursor carried by an expiry reported while streaming.
pub(crate) fn resync_cursor(err: &TransportError) -> Option<String> {
    if err.is_expired() {
        parse_expired_version(err.reason())
    } else {
        None
    }
}

/// Whether `observed` is ahead of `cursor`. A non-numeric cursor is always behind
/// a concrete observation.
pub(crate) fn is_behind(cursor: &str, observed: u64) -> bool {
    cursor.trim().parse::<u64>().map_or(true, |c| observed > c)
}
