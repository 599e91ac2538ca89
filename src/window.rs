//! Window accounting for counter records.
//!
//! Pure functions, no I/O: the limiters load a record, apply an attempt
//! through here, then persist the result.

use std::time::Duration;

use crate::store::RateLimitRecord;

/// Whether a record's window has elapsed at `now` (unix seconds).
///
/// Strict comparison: a record exactly `window` old is still live. The
/// subtraction saturates, so a `first_attempt` in the future (clock skew)
/// reads as zero elapsed time and never triggers a reset.
pub fn is_expired(record: &RateLimitRecord, now: u64, window: Duration) -> bool {
    now.saturating_sub(record.first_attempt) > window.as_secs()
}

/// Fold one attempt into a counter record.
///
/// Absent -> fresh record with `count = 1`. Expired -> replaced with a
/// fresh window, carrying `flagged_count` forward (offense history is not
/// in-window state). Live -> incremented in place.
pub fn apply_attempt(
    existing: Option<RateLimitRecord>,
    now: u64,
    window: Duration,
    amount: f64,
) -> RateLimitRecord {
    match existing {
        Some(record) if !is_expired(&record, now, window) => RateLimitRecord {
            count: record.count + 1,
            amount: record.amount + amount,
            first_attempt: record.first_attempt,
            last_attempt: now,
            flagged_count: record.flagged_count,
        },
        Some(record) => RateLimitRecord {
            count: 1,
            amount,
            first_attempt: now,
            last_attempt: now,
            flagged_count: record.flagged_count,
        },
        None => RateLimitRecord {
            count: 1,
            amount,
            first_attempt: now,
            last_attempt: now,
            flagged_count: 0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(3600);

    fn live_record() -> RateLimitRecord {
        RateLimitRecord {
            count: 4,
            amount: 400.0,
            first_attempt: 10_000,
            last_attempt: 10_030,
            flagged_count: 2,
        }
    }

    #[test]
    fn absent_record_starts_fresh() {
        let record = apply_attempt(None, 10_000, WINDOW, 250.0);
        assert_eq!(record.count, 1);
        assert_eq!(record.amount, 250.0);
        assert_eq!(record.first_attempt, 10_000);
        assert_eq!(record.flagged_count, 0);
    }

    #[test]
    fn live_record_increments_in_place() {
        let record = apply_attempt(Some(live_record()), 10_060, WINDOW, 100.0);
        assert_eq!(record.count, 5);
        assert_eq!(record.amount, 500.0);
        assert_eq!(record.first_attempt, 10_000);
        assert_eq!(record.last_attempt, 10_060);
    }

    #[test]
    fn expired_record_resets_counters() {
        let now = 10_000 + WINDOW.as_secs() + 1;
        let record = apply_attempt(Some(live_record()), now, WINDOW, 75.0);
        assert_eq!(record.count, 1);
        assert_eq!(record.amount, 75.0);
        assert_eq!(record.first_attempt, now);
    }

    #[test]
    fn reset_preserves_flagged_count() {
        let now = 10_000 + WINDOW.as_secs() + 1;
        let record = apply_attempt(Some(live_record()), now, WINDOW, 0.0);
        assert_eq!(record.flagged_count, 2);
    }

    #[test]
    fn window_boundary_is_still_live() {
        let record = live_record();
        assert!(!is_expired(&record, 10_000 + WINDOW.as_secs(), WINDOW));
        assert!(is_expired(&record, 10_000 + WINDOW.as_secs() + 1, WINDOW));
    }

    #[test]
    fn future_first_attempt_never_expires() {
        let mut record = live_record();
        record.first_attempt = 50_000;
        assert!(!is_expired(&record, 10_000, WINDOW));

        let applied = apply_attempt(Some(record), 10_000, WINDOW, 0.0);
        assert_eq!(applied.count, 5);
    }
}
