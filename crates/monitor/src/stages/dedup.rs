//! Escalation-aware deduplication.
//!
//! A candidate survives only if its employee has no unresolved alert in the
//! lookback window, or if it escalates past the highest tier already raised.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use shiftwatch_core::{ActivityAlert, EmployeeId};

use crate::stages::AlertCandidate;
use crate::store::MonitorStore;
use crate::thresholds::alert_lookback;

#[derive(Debug, Default)]
pub struct DedupResult {
    pub kept: Vec<AlertCandidate>,
    pub dropped: usize,
    /// Set when existing alerts could not be read and all candidates passed.
    pub degraded: Option<String>,
}

/// Keep candidates that are new or strictly escalate over `existing`.
pub fn escalations(
    candidates: Vec<AlertCandidate>,
    existing: &[ActivityAlert],
) -> (Vec<AlertCandidate>, usize) {
    let mut highest: HashMap<EmployeeId, u8> = HashMap::new();
    for alert in existing {
        let tier = alert.alert_type.tier();
        highest
            .entry(alert.employee_id)
            .and_modify(|t| *t = (*t).max(tier))
            .or_insert(tier);
    }

    let total = candidates.len();
    let kept: Vec<AlertCandidate> = candidates
        .into_iter()
        .filter(|c| match highest.get(&c.employee_id) {
            None => true,
            Some(&tier) => {
                let escalates = c.alert_type.tier() > tier;
                if !escalates {
                    debug!(
                        employee_id = %c.employee_id,
                        alert_type = %c.alert_type,
                        existing_tier = tier,
                        "Suppressing non-escalating alert"
                    );
                }
                escalates
            }
        })
        .collect();
    let dropped = total - kept.len();
    (kept, dropped)
}

pub async fn filter_existing_alerts(
    store: &dyn MonitorStore,
    candidates: Vec<AlertCandidate>,
    now: DateTime<Utc>,
) -> DedupResult {
    if candidates.is_empty() {
        return DedupResult::default();
    }

    let ids: Vec<EmployeeId> = candidates.iter().map(|c| c.employee_id).collect();
    let existing = match store.recent_unresolved_alerts(&ids, now - alert_lookback()).await {
        Ok(existing) => existing,
        Err(e) => {
            warn!(error = %e, candidates = candidates.len(), "Existing-alert lookup failed; keeping all candidates");
            return DedupResult {
                kept: candidates,
                dropped: 0,
                degraded: Some(format!("existing alert lookup failed: {e}")),
            };
        }
    };

    let (kept, dropped) = escalations(candidates, &existing);
    info!(kept = kept.len(), dropped, "Alert deduplication complete");
    DedupResult {
        kept,
        dropped,
        degraded: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryOp, MemoryStore};
    use chrono::Duration;
    use shiftwatch_core::AlertType;
    use uuid::Uuid;

    fn existing(employee_id: EmployeeId, alert_type: AlertType, created_at: DateTime<Utc>) -> ActivityAlert {
        ActivityAlert {
            id: Uuid::new_v4(),
            employee_id,
            task_id: None,
            alert_type,
            severity: alert_type.severity(),
            message: String::new(),
            idle_duration_minutes: 0,
            notified_to_manager: true,
            notified_to_director: alert_type.notifies_director(),
            store_id: 1,
            is_resolved: false,
            created_at,
            resolved_at: None,
            resolved_by: None,
            resolution_note: None,
        }
    }

    #[test]
    fn only_strict_escalations_survive() {
        let now = Utc::now();
        let emp = Uuid::new_v4();
        let prior = [existing(emp, AlertType::Inactivity30Min, now)];

        for (t, keep) in [
            (AlertType::Inactivity10Min, false),
            (AlertType::Inactivity30Min, false),
            (AlertType::Inactivity60Min, true),
        ] {
            let (kept, dropped) = escalations(vec![AlertCandidate::new(emp, "Lou", t, 0)], &prior);
            assert_eq!(kept.len() == 1, keep, "{t}");
            assert_eq!(dropped == 1, !keep, "{t}");
        }
    }

    #[test]
    fn highest_existing_tier_is_the_bar() {
        let now = Utc::now();
        let emp = Uuid::new_v4();
        let prior = [
            existing(emp, AlertType::Inactivity10Min, now),
            existing(emp, AlertType::Inactivity60Min, now),
        ];
        let (kept, _) = escalations(
            vec![AlertCandidate::new(emp, "Lou", AlertType::Inactivity30Min, 40)],
            &prior,
        );
        assert!(kept.is_empty());
    }

    #[tokio::test]
    async fn alerts_outside_lookback_are_ignored() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let emp = Uuid::new_v4();
        store.seed_alert(existing(emp, AlertType::Inactivity10Min, now - Duration::hours(3)));

        let result = filter_existing_alerts(
            &store,
            vec![AlertCandidate::new(emp, "Lou", AlertType::Inactivity10Min, 11)],
            now,
        )
        .await;
        assert_eq!(result.kept.len(), 1);
    }

    #[tokio::test]
    async fn lookup_failure_fails_open() {
        let store = MemoryStore::new();
        store.fail(MemoryOp::RecentAlerts);
        let emp = Uuid::new_v4();

        let result = filter_existing_alerts(
            &store,
            vec![AlertCandidate::new(emp, "Lou", AlertType::Inactivity10Min, 11)],
            Utc::now(),
        )
        .await;
        assert_eq!(result.kept.len(), 1);
        assert!(result.degraded.is_some());
    }

    #[tokio::test]
    async fn empty_input_skips_store() {
        let store = MemoryStore::new();
        store.fail(MemoryOp::RecentAlerts);
        let result = filter_existing_alerts(&store, Vec::new(), Utc::now()).await;
        assert!(result.kept.is_empty());
        assert!(result.degraded.is_none());
    }
}
