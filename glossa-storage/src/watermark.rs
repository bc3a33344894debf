//! Refresh watermark.
//!
//! The watermark is the high-water mark of upstream data known to be durably
//! applied to a cache. It carries two clocks: `timestamp` follows the
//! content (upstream modification times) and is what incremental discovery
//! starts from, while `observed_at` is the wall-clock instant the refresh
//! that wrote it finished, used only for debouncing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use glossa_core::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
    /// Content clock: upstream changes up to here are applied.
    pub timestamp: Timestamp,
    /// When this watermark was written.
    pub observed_at: Timestamp,
}

impl Watermark {
    /// Create a watermark observed now.
    pub fn new(timestamp: Timestamp) -> Self {
        Self {
            timestamp,
            observed_at: Utc::now(),
        }
    }

    /// Create a watermark with an explicit observation time.
    pub fn with_observed_at(timestamp: Timestamp, observed_at: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            observed_at,
        }
    }

    /// Check if this watermark's content clock is at least `other`'s.
    pub fn is_at_least(&self, other: &Watermark) -> bool {
        self.timestamp >= other.timestamp
    }

    /// Whether the watermark was written within `window` of `now`.
    pub fn is_recent(&self, window: Duration, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(window) {
            Ok(window) => now.signed_duration_since(self.observed_at) < window,
            Err(_) => true,
        }
    }

    /// Move the content clock back, e.g. to re-scan a window of changes.
    pub fn rewound(&self, by: Duration) -> Self {
        let by = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
        Self {
            timestamp: self.timestamp - by,
            observed_at: self.observed_at,
        }
    }

    /// Advance to `candidate` without ever moving backwards.
    pub fn advanced_to(prior: Option<&Watermark>, candidate: Timestamp) -> Self {
        let timestamp = match prior {
            Some(prior) if prior.timestamp > candidate => prior.timestamp,
            _ => candidate,
        };
        Self::new(timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_recent_window_uses_observed_at() {
        let wm = Watermark::with_observed_at(at(0), at(10));
        let window = Duration::from_secs(60);
        assert!(wm.is_recent(window, at(10) + chrono::Duration::seconds(30)));
        assert!(!wm.is_recent(window, at(10) + chrono::Duration::seconds(61)));
    }

    #[test]
    fn test_advanced_to_is_monotone() {
        let prior = Watermark::with_observed_at(at(5), at(5));
        assert_eq!(Watermark::advanced_to(Some(&prior), at(3)).timestamp, at(5));
        assert_eq!(Watermark::advanced_to(Some(&prior), at(7)).timestamp, at(7));
        assert_eq!(Watermark::advanced_to(None, at(2)).timestamp, at(2));
    }

    #[test]
    fn test_rewound_keeps_observation() {
        let wm = Watermark::with_observed_at(at(5), at(6));
        let back = wm.rewound(Duration::from_secs(3600));
        assert_eq!(back.timestamp, at(4));
        assert_eq!(back.observed_at, at(6));
        assert!(wm.is_at_least(&back));
        assert!(!back.is_at_least(&wm));
    }
}
