//! Alert persistence: store resolution, message rendering, batch insert.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use shiftwatch_core::{ActivityAlert, EmployeeId, NewActivityAlert, StoreId};
use shiftwatch_notify::templating::TemplateRenderer;

use crate::error::MonitorError;
use crate::message::render_alert_message;
use crate::stages::AlertCandidate;
use crate::store::MonitorStore;

#[derive(Debug, Default)]
pub struct Persisted {
    pub alerts: Vec<ActivityAlert>,
    /// Alerts that fell back to the default store.
    pub defaulted_store: usize,
    /// Set when the roster lookup failed and every alert used the default store.
    pub degraded: Option<String>,
}

pub async fn create_alerts(
    store: &dyn MonitorStore,
    renderer: &TemplateRenderer,
    candidates: &[AlertCandidate],
    default_store_id: StoreId,
    now: DateTime<Utc>,
) -> Result<Persisted, MonitorError> {
    if candidates.is_empty() {
        debug!("No alerts to persist");
        return Ok(Persisted::default());
    }

    let mut persisted = Persisted::default();
    let ids: Vec<EmployeeId> = candidates.iter().map(|c| c.employee_id).collect();
    let stores = match store.employee_stores(&ids).await {
        Ok(stores) => stores,
        Err(e) => {
            warn!(error = %e, "Roster store lookup failed; using default store for all alerts");
            persisted.degraded = Some(format!("store lookup failed: {e}"));
            Default::default()
        }
    };

    let mut rows = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let store_id = match stores.get(&candidate.employee_id) {
            Some(&id) => id,
            None => {
                warn!(
                    employee_id = %candidate.employee_id,
                    default_store_id,
                    "Employee has no store mapping; using default store"
                );
                persisted.defaulted_store += 1;
                default_store_id
            }
        };

        rows.push(NewActivityAlert {
            employee_id: candidate.employee_id,
            task_id: candidate.task_id,
            alert_type: candidate.alert_type,
            severity: candidate.severity,
            message: render_alert_message(renderer, candidate)?,
            idle_duration_minutes: i32::try_from(candidate.idle_minutes).unwrap_or(i32::MAX),
            notified_to_manager: candidate.notify_manager,
            notified_to_director: candidate.notify_director,
            store_id,
        });
    }

    persisted.alerts = store.insert_alerts(&rows, now).await?;
    info!(created = persisted.alerts.len(), "Alerts persisted");
    Ok(persisted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryOp, MemoryStore, RosterEntry};
    use shiftwatch_core::AlertType;
    use uuid::Uuid;

    #[tokio::test]
    async fn resolves_store_and_renders_message() {
        let store = MemoryStore::new();
        let renderer = TemplateRenderer::new();
        let now = Utc::now();
        let mapped = Uuid::new_v4();
        let unmapped = Uuid::new_v4();
        store.add_employee(RosterEntry::new(mapped, "Lou", Some(7)));
        store.add_employee(RosterEntry::new(unmapped, "Noa", None));

        let candidates = vec![
            AlertCandidate::new(mapped, "Lou", AlertType::Inactivity10Min, 12),
            AlertCandidate::new(unmapped, "Noa", AlertType::Inactivity60Min, 61),
        ];
        let persisted = create_alerts(&store, &renderer, &candidates, 1, now).await.unwrap();

        assert_eq!(persisted.alerts.len(), 2);
        assert_eq!(persisted.defaulted_store, 1);
        let lou = persisted.alerts.iter().find(|a| a.employee_id == mapped).unwrap();
        assert_eq!(lou.store_id, 7);
        assert_eq!(lou.message, "Lou est inactif depuis 12 minutes sans tâche assignée");
        assert!(!lou.is_resolved);
        assert_eq!(lou.created_at, now);
        let noa = persisted.alerts.iter().find(|a| a.employee_id == unmapped).unwrap();
        assert_eq!(noa.store_id, 1);
        assert!(noa.notified_to_director);
    }

    #[tokio::test]
    async fn insert_failure_writes_nothing() {
        let store = MemoryStore::new();
        store.fail(MemoryOp::InsertAlerts);
        let candidates = vec![AlertCandidate::new(Uuid::new_v4(), "Lou", AlertType::Inactivity10Min, 12)];

        let result = create_alerts(&store, &TemplateRenderer::new(), &candidates, 1, Utc::now()).await;
        assert!(result.is_err());
        assert!(store.alerts().is_empty());
    }

    #[tokio::test]
    async fn roster_failure_falls_back_to_default_store() {
        let store = MemoryStore::new();
        store.fail(MemoryOp::EmployeeStores);
        let candidates = vec![AlertCandidate::new(Uuid::new_v4(), "Lou", AlertType::Inactivity10Min, 12)];

        let persisted = create_alerts(&store, &TemplateRenderer::new(), &candidates, 3, Utc::now())
            .await
            .unwrap();
        assert!(persisted.degraded.is_some());
        assert_eq!(persisted.alerts[0].store_id, 3);
    }
}
