use std::{
    ops::{Add, Sub},
    time::Duration,
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Instant that can be used in both wasm and non-wasm environments.
/// Contains Duration since Unix Epoch (Unix Timestamp).
///
/// [`Instant::ZERO`] is reserved: a query whose `updated_at` is zero has been invalidated
/// and must be refetched before it is considered fresh again.
#[derive(Copy, Clone, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Instant(pub Duration);

impl Instant {
    /// The invalidation sentinel.
    pub const ZERO: Instant = Instant(Duration::ZERO);

    /// Get the current wall clock time as a Unix Timestamp.
    pub fn now() -> Self {
        cfg_if::cfg_if! {
            if #[cfg(any(feature = "hydrate", feature = "csr"))] {
                let millis = js_sys::Date::now();
                Instant(Duration::from_millis(millis as u64))
            } else {
                let duration = std::time::SystemTime::now()
                    .duration_since(std::time::SystemTime::UNIX_EPOCH)
                    .unwrap_or_default();
                Instant(duration)
            }
        }
    }

    /// Creates an instant from milliseconds since the Unix Epoch.
    pub const fn from_millis(millis: u64) -> Self {
        Instant(Duration::from_millis(millis))
    }

    /// Milliseconds since the Unix Epoch.
    pub fn as_millis(&self) -> u64 {
        self.0.as_millis() as u64
    }

    /// Whether this is the invalidation sentinel.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Time elapsed between `earlier` and `self`, zero if `earlier` is later.
    pub fn saturating_duration_since(&self, earlier: Instant) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

impl Sub<Instant> for Instant {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: Instant) -> Self::Output {
        self.0.saturating_sub(rhs.0)
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;

    #[inline]
    fn add(self, rhs: Duration) -> Self::Output {
        Instant(self.0.saturating_add(rhs))
    }
}

impl std::fmt::Display for Instant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.as_millis())
    }
}

impl std::fmt::Debug for Instant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Instant").field(&self.0.as_millis()).finish()
    }
}

impl Serialize for Instant {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.as_millis())
    }
}

impl<'de> Deserialize<'de> for Instant {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u64::deserialize(deserializer).map(Instant::from_millis)
    }
}

/// Time source owned by a cache.
///
/// Natively the clock is anchored to the wall clock once and then advanced with tokio's
/// monotonic clock, so paused tokio time drives staleness and garbage collection together.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Clock {
    #[cfg(not(any(feature = "hydrate", feature = "csr")))]
    wall: Instant,
    #[cfg(not(any(feature = "hydrate", feature = "csr")))]
    mono: tokio::time::Instant,
}

impl Clock {
    pub(crate) fn new() -> Self {
        cfg_if::cfg_if! {
            if #[cfg(any(feature = "hydrate", feature = "csr"))] {
                Clock {}
            } else {
                Clock {
                    wall: Instant::now(),
                    mono: tokio::time::Instant::now(),
                }
            }
        }
    }

    pub(crate) fn now(&self) -> Instant {
        cfg_if::cfg_if! {
            if #[cfg(any(feature = "hydrate", feature = "csr"))] {
                Instant::now()
            } else {
                self.wall + tokio::time::Instant::now().saturating_duration_since(self.mono)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instant_serializes_as_millis() {
        let instant = Instant::from_millis(1_700_000_000_123);
        let json = serde_json::to_string(&instant).unwrap();
        assert_eq!(json, "1700000000123");
        let back: Instant = serde_json::from_str(&json).unwrap();
        assert_eq!(back, instant);
    }

    #[test]
    fn subtraction_saturates() {
        let early = Instant::from_millis(10);
        let late = Instant::from_millis(25);
        assert_eq!(late - early, Duration::from_millis(15));
        assert_eq!(early - late, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn clock_follows_paused_time() {
        let clock = Clock::new();
        let start = clock.now();
        tokio::time::advance(Duration::from_millis(3000)).await;
        assert_eq!(clock.now() - start, Duration::from_millis(3000));
    }
}
