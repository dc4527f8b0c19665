//! # Request Value Rules
//!
//! Client-side checks and conversions that run before any socket is touched:
//! key validation, expiration encoding, and counter deltas.
//!
//! ## Expiration Encoding
//!
//! ```text
//! ttl == 0            -> 0           (never expires)
//! 0 < ttl < 1s        -> error       (memcached has whole-second granularity)
//! 1s <= ttl <= 30d    -> ttl secs    (relative offset)
//! ttl > 30d           -> now + ttl   (absolute unix timestamp)
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{MemcError, MemcResult};

/// Longest key memcached accepts, in bytes.
pub const MAX_KEY_LEN: usize = 250;

/// Relative TTLs above this many seconds are read by memcached as timestamps.
pub const RELATIVE_EXPIRATION_LIMIT: u64 = 30 * 24 * 60 * 60;

/// Checks that `key` is 1..=250 bytes with no whitespace.
pub fn validate_key(key: &str) -> MemcResult<()> {
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(MemcError::KeyInvalid);
    }
    if key.chars().any(char::is_whitespace) {
        return Err(MemcError::KeyInvalid);
    }
    Ok(())
}

/// Source of wall-clock time for absolute expirations.
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> SystemTime;
}

/// Clock backed by `SystemTime::now`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Clock pinned to one instant, for tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub SystemTime);

impl FixedClock {
    /// Clock reporting `secs` seconds after the unix epoch.
    pub fn from_unix(secs: u64) -> Self {
        FixedClock(UNIX_EPOCH + Duration::from_secs(secs))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> SystemTime {
        self.0
    }
}

/// Converts a TTL into the `<exptime>` field of a storage command.
pub fn expiration_seconds(ttl: Duration, clock: &dyn Clock) -> MemcResult<u64> {
    if ttl.is_zero() {
        return Ok(0);
    }
    if ttl < Duration::from_secs(1) {
        return Err(MemcError::InvalidExpiration);
    }

    let secs = ttl.as_secs();
    if secs <= RELATIVE_EXPIRATION_LIMIT {
        return Ok(secs);
    }

    // A clock before the epoch is a broken host; treat it as the epoch.
    let now = clock
        .now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    Ok(now.saturating_add(secs))
}

/// Integer types usable as `incr`/`decr` deltas and results.
///
/// memcached counters are unsigned 64-bit; signed types are accepted for
/// convenience but must not be negative.
pub trait Countable: Copy {
    /// Converts to a wire delta, failing for negative values.
    fn to_delta(self) -> MemcResult<u64>;

    /// Converts a counter value read from the server.
    fn from_counter(value: u64) -> Option<Self>;
}

macro_rules! countable {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Countable for $ty {
                fn to_delta(self) -> MemcResult<u64> {
                    u64::try_from(self).map_err(|_| MemcError::NegativeDelta)
                }

                fn from_counter(value: u64) -> Option<Self> {
                    <$ty>::try_from(value).ok()
                }
            }
        )*
    };
}

countable!(u8, u16, u32, u64, usize, i32, i64, isize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_keys() {
        assert!(validate_key("mystring").is_ok());
        assert!(validate_key("user:1:profile").is_ok());
        assert!(validate_key(&"k".repeat(MAX_KEY_LEN)).is_ok());
    }

    #[test]
    fn rejects_bad_keys() {
        assert!(matches!(validate_key(""), Err(MemcError::KeyInvalid)));
        assert!(matches!(validate_key(&"k".repeat(MAX_KEY_LEN + 1)), Err(MemcError::KeyInvalid)));
        assert!(matches!(validate_key("has space"), Err(MemcError::KeyInvalid)));
        assert!(matches!(validate_key("tab\there"), Err(MemcError::KeyInvalid)));
        assert!(matches!(validate_key("line\r\nbreak"), Err(MemcError::KeyInvalid)));
    }

    #[test]
    fn zero_ttl_never_expires() {
        let clock = FixedClock::from_unix(1_000);
        assert_eq!(expiration_seconds(Duration::ZERO, &clock).unwrap(), 0);
    }

    #[test]
    fn sub_second_ttl_is_rejected() {
        let clock = FixedClock::from_unix(1_000);
        let err = expiration_seconds(Duration::from_millis(500), &clock).unwrap_err();
        assert!(matches!(err, MemcError::InvalidExpiration));
    }

    #[test]
    fn short_ttl_is_relative() {
        let clock = FixedClock::from_unix(1_000);
        assert_eq!(expiration_seconds(Duration::from_secs(3600), &clock).unwrap(), 3600);
        assert_eq!(expiration_seconds(Duration::from_millis(1500), &clock).unwrap(), 1);
        assert_eq!(
            expiration_seconds(Duration::from_secs(RELATIVE_EXPIRATION_LIMIT), &clock).unwrap(),
            RELATIVE_EXPIRATION_LIMIT
        );
    }

    #[test]
    fn long_ttl_is_absolute() {
        let clock = FixedClock::from_unix(1_700_000_000);
        let ttl = Duration::from_secs(90 * 24 * 60 * 60);
        assert_eq!(expiration_seconds(ttl, &clock).unwrap(), 1_700_000_000 + ttl.as_secs());
    }

    #[test]
    fn deltas_reject_negatives() {
        assert_eq!(2u8.to_delta().unwrap(), 2);
        assert_eq!(7i64.to_delta().unwrap(), 7);
        assert!(matches!((-1i32).to_delta(), Err(MemcError::NegativeDelta)));
        assert!(matches!((-5isize).to_delta(), Err(MemcError::NegativeDelta)));
    }

    #[test]
    fn counters_must_fit_target() {
        assert_eq!(u8::from_counter(255), Some(255));
        assert_eq!(u8::from_counter(256), None);
        assert_eq!(i64::from_counter(u64::MAX), None);
        assert_eq!(u64::from_counter(u64::MAX), Some(u64::MAX));
    }
}
