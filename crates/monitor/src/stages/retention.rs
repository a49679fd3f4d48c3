//! Time-based retention for activity spans and alerts.

use chrono::{DateTime, Utc};
use tracing::info;

use shiftwatch_core::AUTO_RESOLUTION_NOTE;

use crate::error::StoreError;
use crate::store::{MonitorStore, RetentionSweep};
use crate::thresholds::retention;

pub async fn cleanup_old_activities(
    store: &dyn MonitorStore,
    now: DateTime<Utc>,
) -> Result<RetentionSweep, StoreError> {
    let sweep = store
        .sweep_retention(now - retention(), now, AUTO_RESOLUTION_NOTE)
        .await?;
    info!(
        spans_deleted = sweep.spans_deleted,
        alerts_resolved = sweep.alerts_resolved,
        "Retention sweep complete"
    );
    Ok(sweep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Duration;
    use shiftwatch_core::{ActivityAlert, AlertType};
    use uuid::Uuid;

    fn unresolved(created_at: DateTime<Utc>) -> ActivityAlert {
        ActivityAlert {
            id: Uuid::new_v4(),
            employee_id: Uuid::new_v4(),
            task_id: None,
            alert_type: AlertType::Inactivity10Min,
            severity: AlertType::Inactivity10Min.severity(),
            message: String::new(),
            idle_duration_minutes: 10,
            notified_to_manager: true,
            notified_to_director: false,
            store_id: 1,
            is_resolved: false,
            created_at,
            resolved_at: None,
            resolved_by: None,
            resolution_note: None,
        }
    }

    #[tokio::test]
    async fn old_closed_spans_go_and_open_spans_stay() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let emp = Uuid::new_v4();
        store.add_closed_span(emp, None, now - Duration::days(9), now - Duration::days(8));
        let recent = store.add_closed_span(emp, None, now - Duration::days(2), now - Duration::days(1));
        let open = store.open_span(emp, None, now - Duration::days(10));

        let sweep = cleanup_old_activities(&store, now).await.unwrap();
        assert_eq!(sweep.spans_deleted, 1);

        let ids: Vec<i64> = store.spans().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![recent, open]);
    }

    #[tokio::test]
    async fn old_alerts_are_auto_resolved() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.seed_alert(unresolved(now - Duration::days(8)));
        store.seed_alert(unresolved(now - Duration::days(6)));

        let sweep = cleanup_old_activities(&store, now).await.unwrap();
        assert_eq!(sweep.alerts_resolved, 1);

        let alerts = store.alerts();
        assert!(alerts[0].is_resolved);
        assert_eq!(alerts[0].resolved_at, Some(now));
        assert_eq!(alerts[0].resolution_note.as_deref(), Some("Auto-résolu après 7 jours"));
        assert!(!alerts[1].is_resolved);
    }
}
