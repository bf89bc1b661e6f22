use std::time::Duration;

use crate::Instant;

/// Whether data last updated at `updated_at` is stale at `now`.
///
/// - An invalidated entry (`updated_at` is zero) is always stale.
/// - `None` means the data never goes stale on its own.
/// - Otherwise the data is stale once `now - updated_at >= stale_time`, so an entry exactly
///   `stale_time` old is already stale.
pub(crate) fn is_stale(updated_at: Instant, stale_time: Option<Duration>, now: Instant) -> bool {
    if updated_at.is_zero() {
        return true;
    }
    match stale_time {
        None => false,
        Some(stale_time) => now - updated_at >= stale_time,
    }
}
