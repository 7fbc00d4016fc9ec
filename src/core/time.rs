//! Wall-clock timestamps for revocation records.
//!
//! Revocation times are only used for retention decisions. They carry no
//! ordering guarantee for task execution.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    ms: u64,
}

impl Timestamp {
    /// Create a timestamp from milliseconds since the epoch.
    pub const fn from_millis(ms: u64) -> Self {
        Self { ms }
    }

    /// Create a timestamp from whole seconds since the epoch.
    pub const fn from_secs(secs: u64) -> Self {
        Self { ms: secs * 1000 }
    }

    /// Milliseconds since the epoch.
    pub const fn as_millis(self) -> u64 {
        self.ms
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// Convert a `SystemTime`, clamping pre-epoch values to zero.
    pub fn from_system_time(time: SystemTime) -> Self {
        Self {
            ms: duration_millis(time.duration_since(UNIX_EPOCH).unwrap_or_default()),
        }
    }

    /// Convert from fractional seconds, the unit used by sorted-set scores
    /// and the legacy snapshot files.
    ///
    /// Returns `None` for NaN, infinite or negative inputs.
    pub fn from_secs_f64(secs: f64) -> Option<Self> {
        if !secs.is_finite() || secs < 0.0 {
            return None;
        }
        Some(Self {
            ms: (secs * 1000.0).round() as u64,
        })
    }

    /// Fractional seconds since the epoch.
    pub fn as_secs_f64(self) -> f64 {
        self.ms as f64 / 1000.0
    }

    /// Subtract a duration, saturating at the epoch.
    pub fn saturating_sub(self, duration: Duration) -> Self {
        Self {
            ms: self.ms.saturating_sub(duration_millis(duration)),
        }
    }

    /// Add a duration.
    pub fn saturating_add(self, duration: Duration) -> Self {
        Self {
            ms: self.ms.saturating_add(duration_millis(duration)),
        }
    }

    /// Check if this timestamp is strictly before `cutoff`.
    pub const fn is_before(self, cutoff: Timestamp) -> bool {
        self.ms < cutoff.ms
    }

    /// RFC 3339 rendering for operator output.
    pub fn to_rfc3339(self) -> String {
        i64::try_from(self.ms)
            .ok()
            .and_then(chrono::DateTime::<chrono::Utc>::from_timestamp_millis)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| format!("{}ms", self.ms))
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_round_trip_keeps_millisecond_precision() {
        let ts = Timestamp::from_millis(1_700_000_000_123);
        assert_eq!(Timestamp::from_secs_f64(ts.as_secs_f64()), Some(ts));
    }

    #[test]
    fn rejects_non_finite_seconds() {
        assert_eq!(Timestamp::from_secs_f64(f64::NAN), None);
        assert_eq!(Timestamp::from_secs_f64(f64::INFINITY), None);
        assert_eq!(Timestamp::from_secs_f64(-1.0), None);
    }

    #[test]
    fn is_before_is_strict() {
        let cutoff = Timestamp::from_secs(100);
        assert!(!cutoff.is_before(cutoff));
        assert!(Timestamp::from_secs(99).is_before(cutoff));
    }

    #[test]
    fn saturating_sub_clamps_at_epoch() {
        let ts = Timestamp::from_secs(5);
        assert_eq!(ts.saturating_sub(Duration::from_secs(10)), Timestamp::from_millis(0));
    }

    #[test]
    fn out_of_range_durations_saturate() {
        let ts = Timestamp::from_secs(1_700_000_000);
        let huge = Duration::from_secs(18_446_744_073_709_552);
        assert_eq!(ts.saturating_sub(huge), Timestamp::from_millis(0));
        assert_eq!(ts.saturating_add(huge).as_millis(), u64::MAX);
        assert_eq!(ts.saturating_sub(Duration::MAX), Timestamp::from_millis(0));
    }
}
