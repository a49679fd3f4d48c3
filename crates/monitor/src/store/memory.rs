//! In-memory [`MonitorStore`] for tests and local dry runs.
//!
//! Holds the roster, heartbeats, activity spans, alerts and leases behind a
//! single mutex. The current-activity view is seeded explicitly with
//! [`MemoryStore::set_activity`]; `mark_offline` flips seeded rows to
//! `offline` the way the database view would after a roster update.
//! Individual operations can be made to fail or stall to exercise the
//! pipeline's failure policy.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use shiftwatch_core::{
    ActivityAlert, ActivitySpan, ActivityStatus, CurrentActivity, EmployeeHeartbeat, EmployeeId,
    NewActivityAlert, StoreId, TaskId,
};

use super::{ActivityStateReader, MonitorStore, OfflineSweep, RetentionSweep};
use crate::error::StoreError;
use crate::stages::heartbeat::auto_close_marker;

/// Store operations that can be failed or delayed on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryOp {
    CurrentActivity,
    LastSpanEnds,
    StaleHeartbeats,
    MarkOffline,
    RecentAlerts,
    EmployeeStores,
    InsertAlerts,
    SweepRetention,
    ResolveAlert,
    UnresolvedAlerts,
    Lease,
}

/// Roster record: the subset of the employee table the monitor touches.
#[derive(Debug, Clone, PartialEq)]
pub struct RosterEntry {
    pub id: EmployeeId,
    pub name: String,
    pub store_id: Option<StoreId>,
    pub status: String,
}

impl RosterEntry {
    pub fn new(id: EmployeeId, name: impl Into<String>, store_id: Option<StoreId>) -> Self {
        Self {
            id,
            name: name.into(),
            store_id,
            status: "active".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct Lease {
    holder: Option<Uuid>,
    expires_at: DateTime<Utc>,
    last_run_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct MemoryState {
    roster: HashMap<EmployeeId, RosterEntry>,
    heartbeats: HashMap<EmployeeId, DateTime<Utc>>,
    spans: Vec<ActivitySpan>,
    next_span_id: i64,
    activity: HashMap<EmployeeId, CurrentActivity>,
    alerts: Vec<ActivityAlert>,
    leases: HashMap<String, Lease>,
    failing: HashSet<MemoryOp>,
    delays: HashMap<MemoryOp, Duration>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply injected delay/failure for `op` before touching state.
    async fn enter(&self, op: MemoryOp) -> Result<(), StoreError> {
        let (delay, failing) = {
            let state = self.lock();
            (state.delays.get(&op).copied(), state.failing.contains(&op))
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if failing {
            return Err(StoreError::Unavailable(format!("{op:?} unavailable")));
        }
        Ok(())
    }

    // ── Fault injection ───────────────────────────────────────

    pub fn fail(&self, op: MemoryOp) {
        self.lock().failing.insert(op);
    }

    pub fn recover(&self, op: MemoryOp) {
        self.lock().failing.remove(&op);
    }

    pub fn set_delay(&self, op: MemoryOp, delay: Duration) {
        self.lock().delays.insert(op, delay);
    }

    // ── Seeding ───────────────────────────────────────────────

    pub fn add_employee(&self, entry: RosterEntry) {
        self.lock().roster.insert(entry.id, entry);
    }

    pub fn record_heartbeat(&self, employee_id: EmployeeId, at: DateTime<Utc>) {
        self.lock().heartbeats.insert(employee_id, at);
    }

    /// Open a span for an employee. Returns the span id.
    pub fn open_span(
        &self,
        employee_id: EmployeeId,
        task_id: Option<TaskId>,
        started_at: DateTime<Utc>,
    ) -> i64 {
        self.push_span(employee_id, task_id, started_at, None)
    }

    /// Insert an already-closed span. Returns the span id.
    pub fn add_closed_span(
        &self,
        employee_id: EmployeeId,
        task_id: Option<TaskId>,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    ) -> i64 {
        self.push_span(employee_id, task_id, started_at, Some(ended_at))
    }

    fn push_span(
        &self,
        employee_id: EmployeeId,
        task_id: Option<TaskId>,
        started_at: DateTime<Utc>,
        ended_at: Option<DateTime<Utc>>,
    ) -> i64 {
        let mut state = self.lock();
        state.next_span_id += 1;
        let id = state.next_span_id;
        state.spans.push(ActivitySpan {
            id,
            employee_id,
            task_id,
            started_at,
            ended_at,
            activity_data: serde_json::json!({}),
        });
        id
    }

    /// Set (or replace) the employee's row in the current-activity view.
    pub fn set_activity(&self, row: CurrentActivity) {
        self.lock().activity.insert(row.employee_id, row);
    }

    /// Insert a fully-formed alert, e.g. one created by an earlier run.
    pub fn seed_alert(&self, alert: ActivityAlert) {
        self.lock().alerts.push(alert);
    }

    // ── Snapshots ─────────────────────────────────────────────

    /// All alerts, oldest first.
    pub fn alerts(&self) -> Vec<ActivityAlert> {
        let mut alerts = self.lock().alerts.clone();
        alerts.sort_by_key(|a| a.created_at);
        alerts
    }

    pub fn spans(&self) -> Vec<ActivitySpan> {
        self.lock().spans.clone()
    }

    pub fn roster_entry(&self, employee_id: EmployeeId) -> Option<RosterEntry> {
        self.lock().roster.get(&employee_id).cloned()
    }

    pub fn activity(&self, employee_id: EmployeeId) -> Option<CurrentActivity> {
        self.lock().activity.get(&employee_id).cloned()
    }

    pub fn last_run_at(&self, lease: &str) -> Option<DateTime<Utc>> {
        self.lock().leases.get(lease).and_then(|l| l.last_run_at)
    }
}

#[async_trait]
impl ActivityStateReader for MemoryStore {
    async fn current_activity(&self) -> Result<Vec<CurrentActivity>, StoreError> {
        self.enter(MemoryOp::CurrentActivity).await?;
        let state = self.lock();
        let mut rows: Vec<CurrentActivity> = state
            .activity
            .values()
            .filter(|r| r.activity_status != Some(ActivityStatus::Offline))
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.employee_id);
        Ok(rows)
    }

    async fn last_span_ends(
        &self,
        employee_ids: &[EmployeeId],
    ) -> Result<HashMap<EmployeeId, DateTime<Utc>>, StoreError> {
        self.enter(MemoryOp::LastSpanEnds).await?;
        let wanted: HashSet<&EmployeeId> = employee_ids.iter().collect();
        let state = self.lock();
        let mut ends: HashMap<EmployeeId, DateTime<Utc>> = HashMap::new();
        for span in state.spans.iter().filter(|s| wanted.contains(&s.employee_id)) {
            if let Some(ended) = span.ended_at {
                let entry = ends.entry(span.employee_id).or_insert(ended);
                if ended > *entry {
                    *entry = ended;
                }
            }
        }
        Ok(ends)
    }
}

#[async_trait]
impl MonitorStore for MemoryStore {
    async fn stale_heartbeats(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<EmployeeHeartbeat>, StoreError> {
        self.enter(MemoryOp::StaleHeartbeats).await?;
        let state = self.lock();
        let mut stale: Vec<EmployeeHeartbeat> = state
            .heartbeats
            .iter()
            .filter(|(_, at)| **at < cutoff)
            .map(|(id, at)| EmployeeHeartbeat {
                employee_id: *id,
                last_heartbeat: *at,
            })
            .collect();
        stale.sort_by_key(|h| h.employee_id);
        Ok(stale)
    }

    async fn mark_offline(
        &self,
        employee_ids: &[EmployeeId],
        now: DateTime<Utc>,
    ) -> Result<OfflineSweep, StoreError> {
        self.enter(MemoryOp::MarkOffline).await?;
        let wanted: HashSet<&EmployeeId> = employee_ids.iter().collect();
        let mut state = self.lock();
        let mut sweep = OfflineSweep::default();

        for entry in state.roster.values_mut().filter(|e| wanted.contains(&e.id)) {
            if entry.status != "offline" {
                entry.status = "offline".to_string();
                sweep.employees_marked += 1;
            }
        }

        for span in state
            .spans
            .iter_mut()
            .filter(|s| s.is_open() && wanted.contains(&s.employee_id))
        {
            span.ended_at = Some(now);
            if let (Some(data), serde_json::Value::Object(marker)) =
                (span.activity_data.as_object_mut(), auto_close_marker())
            {
                data.extend(marker);
            } else {
                span.activity_data = auto_close_marker();
            }
            sweep.spans_closed += 1;
        }

        for row in state
            .activity
            .values_mut()
            .filter(|r| wanted.contains(&r.employee_id))
        {
            row.activity_status = Some(ActivityStatus::Offline);
        }

        Ok(sweep)
    }

    async fn recent_unresolved_alerts(
        &self,
        employee_ids: &[EmployeeId],
        since: DateTime<Utc>,
    ) -> Result<Vec<ActivityAlert>, StoreError> {
        self.enter(MemoryOp::RecentAlerts).await?;
        let wanted: HashSet<&EmployeeId> = employee_ids.iter().collect();
        let state = self.lock();
        Ok(state
            .alerts
            .iter()
            .filter(|a| !a.is_resolved && a.created_at >= since && wanted.contains(&a.employee_id))
            .cloned()
            .collect())
    }

    async fn employee_stores(
        &self,
        employee_ids: &[EmployeeId],
    ) -> Result<HashMap<EmployeeId, StoreId>, StoreError> {
        self.enter(MemoryOp::EmployeeStores).await?;
        let state = self.lock();
        Ok(employee_ids
            .iter()
            .filter_map(|id| {
                state
                    .roster
                    .get(id)
                    .and_then(|e| e.store_id)
                    .map(|store| (*id, store))
            })
            .collect())
    }

    async fn insert_alerts(
        &self,
        alerts: &[NewActivityAlert],
        now: DateTime<Utc>,
    ) -> Result<Vec<ActivityAlert>, StoreError> {
        self.enter(MemoryOp::InsertAlerts).await?;
        let created: Vec<ActivityAlert> = alerts
            .iter()
            .map(|a| ActivityAlert {
                id: Uuid::new_v4(),
                employee_id: a.employee_id,
                task_id: a.task_id,
                alert_type: a.alert_type,
                severity: a.severity,
                message: a.message.clone(),
                idle_duration_minutes: a.idle_duration_minutes,
                notified_to_manager: a.notified_to_manager,
                notified_to_director: a.notified_to_director,
                store_id: a.store_id,
                is_resolved: false,
                created_at: now,
                resolved_at: None,
                resolved_by: None,
                resolution_note: None,
            })
            .collect();
        self.lock().alerts.extend(created.iter().cloned());
        Ok(created)
    }

    async fn sweep_retention(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
        note: &str,
    ) -> Result<RetentionSweep, StoreError> {
        self.enter(MemoryOp::SweepRetention).await?;
        let mut state = self.lock();

        let before = state.spans.len();
        state
            .spans
            .retain(|s| !matches!(s.ended_at, Some(ended) if ended < cutoff));
        let spans_deleted = (before - state.spans.len()) as u64;

        let mut alerts_resolved = 0;
        for alert in state
            .alerts
            .iter_mut()
            .filter(|a| !a.is_resolved && a.created_at < cutoff)
        {
            alert.is_resolved = true;
            alert.resolved_at = Some(now);
            alert.resolution_note = Some(note.to_string());
            alerts_resolved += 1;
        }

        Ok(RetentionSweep {
            spans_deleted,
            alerts_resolved,
        })
    }

    async fn resolve_alert(
        &self,
        alert_id: Uuid,
        resolved_by: EmployeeId,
        note: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.enter(MemoryOp::ResolveAlert).await?;
        let mut state = self.lock();
        match state
            .alerts
            .iter_mut()
            .find(|a| a.id == alert_id && !a.is_resolved)
        {
            Some(alert) => {
                alert.is_resolved = true;
                alert.resolved_at = Some(now);
                alert.resolved_by = Some(resolved_by);
                alert.resolution_note = Some(note.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn unresolved_alerts(
        &self,
        store_id: Option<StoreId>,
        limit: i64,
    ) -> Result<Vec<ActivityAlert>, StoreError> {
        self.enter(MemoryOp::UnresolvedAlerts).await?;
        let state = self.lock();
        let mut alerts: Vec<ActivityAlert> = state
            .alerts
            .iter()
            .filter(|a| !a.is_resolved && store_id.map_or(true, |s| a.store_id == s))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        alerts.truncate(limit.max(0) as usize);
        Ok(alerts)
    }

    async fn try_acquire_lease(
        &self,
        name: &str,
        holder: Uuid,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.enter(MemoryOp::Lease).await?;
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| StoreError::Unavailable(format!("invalid lease ttl: {e}")))?;
        let mut state = self.lock();
        let lease = state.leases.entry(name.to_string()).or_insert(Lease {
            holder: None,
            expires_at: now,
            last_run_at: None,
        });
        let free = lease.holder.is_none() || lease.expires_at <= now;
        if free {
            lease.holder = Some(holder);
            lease.expires_at = now + ttl;
        }
        Ok(free)
    }

    async fn release_lease(
        &self,
        name: &str,
        holder: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.enter(MemoryOp::Lease).await?;
        let mut state = self.lock();
        if let Some(lease) = state.leases.get_mut(name) {
            if lease.holder == Some(holder) {
                lease.holder = None;
                lease.expires_at = now;
                lease.last_run_at = Some(now);
            }
        }
        Ok(())
    }
}
