//! Cron scheduling for the worker loop.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

use crate::error::{MonitorError, Result};

/// Normalize a 5-field cron expression to 6-field by prepending "0 " for seconds.
///
/// The `cron` crate requires 6 fields: `sec min hour day-of-month month day-of-week`.
pub fn normalize_cron(expr: &str) -> String {
    let trimmed = expr.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    }
}

/// Check if a cron schedule is due at `now`.
///
/// Due when the first scheduled tick after `last_run` (or after one day ago
/// when there is no previous run) falls at or before `now`.
pub fn is_cron_due(schedule: &Schedule, now: DateTime<Utc>, last_run: Option<DateTime<Utc>>) -> bool {
    let check_from = last_run.unwrap_or(now - chrono::Duration::days(1));
    schedule
        .after(&check_from)
        .next()
        .is_some_and(|next| next <= now)
}

/// Parsed schedule plus the time of the last run it fired.
#[derive(Debug, Clone)]
pub struct MonitorSchedule {
    expression: String,
    schedule: Schedule,
    last_run: Option<DateTime<Utc>>,
}

impl MonitorSchedule {
    pub fn parse(expr: &str) -> Result<Self> {
        let normalized = normalize_cron(expr);
        let schedule = Schedule::from_str(&normalized).map_err(|e| MonitorError::InvalidSchedule {
            expr: expr.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            expression: normalized,
            schedule,
            last_run: None,
        })
    }

    /// Normalized 6-field expression.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Never ran: due at the first check, whatever the tick alignment.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        is_cron_due(&self.schedule, now, self.last_run)
    }

    pub fn mark_run(&mut self, at: DateTime<Utc>) {
        self.last_run = Some(at);
    }

    pub fn next_after(&self, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&at).next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, s).unwrap()
    }

    #[test]
    fn normalize_five_and_six_fields() {
        assert_eq!(normalize_cron("*/5 * * * *"), "0 */5 * * * *");
        assert_eq!(normalize_cron("  0 */5 * * * * "), "0 */5 * * * *");
    }

    #[test]
    fn invalid_expression_is_rejected() {
        match MonitorSchedule::parse("every five minutes") {
            Err(MonitorError::InvalidSchedule { expr, .. }) => {
                assert_eq!(expr, "every five minutes")
            }
            other => panic!("expected InvalidSchedule, got {other:?}"),
        }
    }

    #[test]
    fn due_once_per_five_minute_slot() {
        let mut sched = MonitorSchedule::parse("*/5 * * * *").unwrap();
        assert!(sched.is_due(at(10, 5, 0)));
        sched.mark_run(at(10, 5, 0));

        assert!(!sched.is_due(at(10, 5, 30)));
        assert!(!sched.is_due(at(10, 9, 59)));
        assert!(sched.is_due(at(10, 10, 0)));
    }

    #[test]
    fn first_check_fires_off_slot() {
        let sched = MonitorSchedule::parse("*/5 * * * *").unwrap();
        assert!(sched.is_due(at(10, 7, 0)));
        assert_eq!(sched.next_after(at(10, 7, 0)), Some(at(10, 10, 0)));
    }

    #[test]
    fn slow_misaligned_ticks_fire_every_slot() {
        let mut sched = MonitorSchedule::parse("*/5 * * * *").unwrap();
        let start = at(10, 7, 30);
        let tick = chrono::Duration::seconds(300);

        let mut fired = Vec::new();
        for i in 0..288 {
            let now = start + tick * i;
            if sched.is_due(now) {
                sched.mark_run(now);
                fired.push(now);
            }
        }

        assert_eq!(fired.first(), Some(&start));
        assert_eq!(fired.len(), 288);
    }

    #[test]
    fn hourly_schedule_with_ten_minute_ticks() {
        let mut sched = MonitorSchedule::parse("0 * * * *").unwrap();
        let start = at(10, 7, 30);
        let tick = chrono::Duration::seconds(600);

        let mut fired = 0;
        for i in 0..(6 * 24) {
            let now = start + tick * i;
            if sched.is_due(now) {
                sched.mark_run(now);
                fired += 1;
            }
        }
        // First check plus one per hour boundary crossed.
        assert_eq!(fired, 1 + 23);
    }
}
