//! Expiry markers stored beside cache entries.

use camino::Utf8Path;
use chrono::{DateTime, Utc};
use color_eyre::eyre::{Context, Result};
use std::time::Duration;

/// Reads the expiry recorded at `marker`.
///
/// Returns `None` when the marker is absent or does not hold an RFC 3339
/// timestamp.
pub(crate) fn read_expiry(marker: &Utf8Path) -> Option<DateTime<Utc>> {
    let raw = std::fs::read_to_string(marker).ok()?;
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|expiry| expiry.with_timezone(&Utc))
}

/// Returns `true` unless `marker` holds an expiry later than `now`.
pub(crate) fn is_expired(marker: &Utf8Path, now: DateTime<Utc>) -> bool {
    read_expiry(marker).is_none_or(|expiry| expiry <= now)
}

/// Records an expiry `ttl` from now at `marker`.
pub(crate) fn write_expiry(marker: &Utf8Path, ttl: Duration) -> Result<()> {
    let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
    let expiry = Utc::now().checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
    std::fs::write(marker, expiry.to_rfc3339())
        .with_context(|| format!("failed to write cache expiry marker: {marker}"))
}
