//! Timestamp field type
//!
//! Entities carry optional timestamps as whole seconds plus a nanosecond
//! remainder since the Unix epoch, the same split the remote wire format
//! uses, so values round-trip without rounding.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds + nanoseconds since Unix epoch
///
/// ## Invariants
///
/// - `nanos` is in `0..1_000_000_000` for values built by the constructors
/// - Ordering is chronological
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    /// Whole seconds since epoch (may be negative)
    pub seconds: i64,
    /// Nanosecond remainder
    pub nanos: i32,
}

impl Timestamp {
    /// Unix epoch
    pub const EPOCH: Timestamp = Timestamp {
        seconds: 0,
        nanos: 0,
    };

    /// Create a timestamp from its parts
    pub const fn new(seconds: i64, nanos: i32) -> Self {
        Self { seconds, nanos }
    }

    /// Current wall-clock time
    ///
    /// Returns epoch if the system clock is before the Unix epoch.
    pub fn now() -> Self {
        let since = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self::from_duration(since)
    }

    /// Timestamp `duration` after the epoch
    ///
    /// Saturates at `i64::MAX` seconds.
    pub fn from_duration(duration: Duration) -> Self {
        Self {
            seconds: i64::try_from(duration.as_secs()).unwrap_or(i64::MAX),
            nanos: duration.subsec_nanos() as i32,
        }
    }

    /// Duration since the epoch, `None` for pre-epoch values
    pub fn as_duration(&self) -> Option<Duration> {
        if self.seconds < 0 || self.nanos < 0 {
            return None;
        }
        Some(Duration::new(self.seconds as u64, self.nanos as u32))
    }
}
