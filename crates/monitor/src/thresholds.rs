//! Fixed detection thresholds and time windows.

use chrono::Duration;
use shiftwatch_core::AlertType;

/// Idle minutes that raise an `inactivity_10min` alert.
pub const INACTIVITY_WARNING_THRESHOLD: i64 = 10;
/// Idle minutes that raise an `inactivity_30min` alert.
pub const INACTIVITY_CRITICAL_THRESHOLD: i64 = 30;
/// Idle minutes that raise an `inactivity_60min` alert.
pub const INACTIVITY_SEVERE_THRESHOLD: i64 = 60;

/// A heartbeat older than this marks the employee offline.
pub const HEARTBEAT_TIMEOUT_MINUTES: i64 = 5;
/// How far back the deduplicator looks for unresolved alerts.
pub const ALERT_LOOKBACK_HOURS: i64 = 2;
/// Age after which closed spans are deleted and alerts auto-resolved.
pub const RETENTION_DAYS: i64 = 7;

pub fn heartbeat_timeout() -> Duration {
    Duration::minutes(HEARTBEAT_TIMEOUT_MINUTES)
}

pub fn alert_lookback() -> Duration {
    Duration::hours(ALERT_LOOKBACK_HOURS)
}

pub fn retention() -> Duration {
    Duration::days(RETENTION_DAYS)
}

/// Map whole idle minutes to an alert tier; first match from the top wins.
pub fn classify(idle_minutes: i64) -> Option<AlertType> {
    if idle_minutes >= INACTIVITY_SEVERE_THRESHOLD {
        Some(AlertType::Inactivity60Min)
    } else if idle_minutes >= INACTIVITY_CRITICAL_THRESHOLD {
        Some(AlertType::Inactivity30Min)
    } else if idle_minutes >= INACTIVITY_WARNING_THRESHOLD {
        Some(AlertType::Inactivity10Min)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_warning_never_alerts() {
        for d in [-3, 0, 1, 5, 9] {
            assert_eq!(classify(d), None, "idle {d}");
        }
    }

    #[test]
    fn tier_boundaries_are_inclusive_and_disjoint() {
        for d in 10..30 {
            assert_eq!(classify(d), Some(AlertType::Inactivity10Min), "idle {d}");
        }
        for d in 30..60 {
            assert_eq!(classify(d), Some(AlertType::Inactivity30Min), "idle {d}");
        }
        for d in [60, 61, 90, 600, 10_000] {
            assert_eq!(classify(d), Some(AlertType::Inactivity60Min), "idle {d}");
        }
    }

    #[test]
    fn classification_is_monotonic() {
        let mut last = None;
        for d in 0..200 {
            let tier = classify(d);
            assert!(tier >= last, "tier dropped at {d}");
            last = tier;
        }
    }
}
