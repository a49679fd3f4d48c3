//! Inactivity detection over the current-activity view.
//!
//! Each row is classified on its own; a row that cannot be read is skipped
//! and never aborts the pass. The result is the unfiltered candidate list.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use shiftwatch_core::{ActivityStatus, CurrentActivity, EmployeeId};

use crate::error::StoreError;
use crate::stages::AlertCandidate;
use crate::store::ActivityStateReader;
use crate::thresholds::{classify, HEARTBEAT_TIMEOUT_MINUTES, INACTIVITY_WARNING_THRESHOLD};

/// How a single view row was judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowVerdict {
    /// Row takes no part in detection.
    Skipped(SkipReason),
    /// Whole idle minutes, possibly zero.
    Idle(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Offline,
    OnBreak,
    NoHeartbeat,
    StaleHeartbeat,
    MissingMinutesActive,
}

/// Output of one detection pass.
#[derive(Debug, Default)]
pub struct Detection {
    pub candidates: Vec<AlertCandidate>,
    pub rows_seen: usize,
    pub rows_skipped: usize,
    /// Set when idle time for task-less rows could not be computed.
    pub degraded: Option<String>,
}

/// Judge one row. `last_span_end` is only consulted for rows without a status.
pub fn evaluate_row(
    row: &CurrentActivity,
    now: DateTime<Utc>,
    last_span_end: Option<DateTime<Utc>>,
) -> RowVerdict {
    match row.activity_status {
        Some(ActivityStatus::Offline) => return RowVerdict::Skipped(SkipReason::Offline),
        Some(ActivityStatus::Break) => return RowVerdict::Skipped(SkipReason::OnBreak),
        _ => {}
    }

    let Some(heartbeat_age) = row.heartbeat_age_minutes(now) else {
        return RowVerdict::Skipped(SkipReason::NoHeartbeat);
    };
    if heartbeat_age > HEARTBEAT_TIMEOUT_MINUTES as f64 {
        return RowVerdict::Skipped(SkipReason::StaleHeartbeat);
    }

    let minutes = match row.activity_status {
        Some(ActivityStatus::Idle) => match row.minutes_active {
            Some(m) => m,
            None => return RowVerdict::Skipped(SkipReason::MissingMinutesActive),
        },
        Some(ActivityStatus::Working) => match row.minutes_since_heartbeat {
            Some(m) if m != 0.0 => m,
            _ => 0.0,
        },
        // Connected without a task: time since the last closed span, surfaced
        // only once it reaches the warning threshold.
        None => match last_span_end {
            Some(ended) => {
                let since = now.signed_duration_since(ended).num_seconds() as f64 / 60.0;
                if since >= INACTIVITY_WARNING_THRESHOLD as f64 {
                    since
                } else {
                    0.0
                }
            }
            None => 0.0,
        },
        Some(ActivityStatus::Offline) | Some(ActivityStatus::Break) => 0.0,
    };

    RowVerdict::Idle(minutes.max(0.0).floor() as i64)
}

pub async fn detect_inactivity<R>(reader: &R, now: DateTime<Utc>) -> Result<Detection, StoreError>
where
    R: ActivityStateReader + ?Sized,
{
    let rows = reader.current_activity().await?;
    let mut detection = Detection {
        rows_seen: rows.len(),
        ..Detection::default()
    };

    let taskless: Vec<EmployeeId> = rows
        .iter()
        .filter(|r| r.activity_status.is_none())
        .map(|r| r.employee_id)
        .collect();

    let span_ends: HashMap<EmployeeId, DateTime<Utc>> = if taskless.is_empty() {
        HashMap::new()
    } else {
        match reader.last_span_ends(&taskless).await {
            Ok(ends) => ends,
            Err(e) => {
                warn!(error = %e, employees = taskless.len(), "Last-span lookup failed; treating task-less employees as active");
                detection.degraded = Some(format!("last span lookup failed: {e}"));
                HashMap::new()
            }
        }
    };

    for row in &rows {
        let verdict = evaluate_row(row, now, span_ends.get(&row.employee_id).copied());
        let idle = match verdict {
            RowVerdict::Skipped(reason) => {
                debug!(employee_id = %row.employee_id, ?reason, "Row skipped");
                detection.rows_skipped += 1;
                continue;
            }
            RowVerdict::Idle(minutes) => minutes,
        };

        if let Some(alert_type) = classify(idle) {
            detection.candidates.push(
                AlertCandidate::new(row.employee_id, row.display_name(), alert_type, idle)
                    .with_task(row.task_id)
                    .with_manager(row.manager_id),
            );
        }
    }

    info!(
        rows = detection.rows_seen,
        skipped = detection.rows_skipped,
        candidates = detection.candidates.len(),
        "Inactivity detection complete"
    );
    Ok(detection)
}
