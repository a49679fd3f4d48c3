//! Store abstraction for the activity monitor.
//!
//! All monitor state lives in the store; the pipeline keeps nothing in
//! memory between runs. [`ActivityStateReader`] covers the read-only derived
//! view, [`MonitorStore`] adds the tables the monitor writes.

mod memory;
mod pg;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use shiftwatch_core::{
    ActivityAlert, CurrentActivity, EmployeeHeartbeat, EmployeeId, NewActivityAlert, StoreId,
};

use crate::error::StoreError;

pub use self::memory::{MemoryOp, MemoryStore, RosterEntry};
pub use self::pg::PgStore;

/// Name of the lease guarding the monitor pipeline.
pub const PIPELINE_LEASE: &str = "activity_monitor";

/// Outcome of marking stale employees offline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OfflineSweep {
    /// Roster rows switched to `offline` (already-offline rows not counted).
    pub employees_marked: u64,
    /// Open activity spans force-closed.
    pub spans_closed: u64,
}

/// Outcome of the retention sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetentionSweep {
    pub spans_deleted: u64,
    pub alerts_resolved: u64,
}

/// Read access to the derived current-activity view.
#[async_trait]
pub trait ActivityStateReader: Send + Sync {
    /// Rows of `employee_current_activity` whose status is not `offline`.
    async fn current_activity(&self) -> Result<Vec<CurrentActivity>, StoreError>;

    /// End of the most recent closed activity span, per employee.
    /// Employees without any closed span are absent from the map.
    async fn last_span_ends(
        &self,
        employee_ids: &[EmployeeId],
    ) -> Result<HashMap<EmployeeId, DateTime<Utc>>, StoreError>;
}

/// Everything the monitor reads and writes beyond the derived view.
#[async_trait]
pub trait MonitorStore: ActivityStateReader {
    /// Heartbeats with `last_heartbeat < cutoff`.
    async fn stale_heartbeats(&self, cutoff: DateTime<Utc>)
        -> Result<Vec<EmployeeHeartbeat>, StoreError>;

    /// Mark employees offline and force-close their open spans at `now`,
    /// tagging each closed span as auto-closed by heartbeat timeout.
    /// Runs as one transaction.
    async fn mark_offline(
        &self,
        employee_ids: &[EmployeeId],
        now: DateTime<Utc>,
    ) -> Result<OfflineSweep, StoreError>;

    /// Unresolved alerts for the given employees created at or after `since`.
    async fn recent_unresolved_alerts(
        &self,
        employee_ids: &[EmployeeId],
        since: DateTime<Utc>,
    ) -> Result<Vec<ActivityAlert>, StoreError>;

    /// Store mapping from the roster; unmapped employees are absent.
    async fn employee_stores(
        &self,
        employee_ids: &[EmployeeId],
    ) -> Result<HashMap<EmployeeId, StoreId>, StoreError>;

    /// Insert all alerts in one transaction and return the stored rows.
    async fn insert_alerts(
        &self,
        alerts: &[NewActivityAlert],
        now: DateTime<Utc>,
    ) -> Result<Vec<ActivityAlert>, StoreError>;

    /// Delete closed spans that ended before `cutoff` and auto-resolve
    /// unresolved alerts created before `cutoff`. Runs as one transaction.
    async fn sweep_retention(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
        note: &str,
    ) -> Result<RetentionSweep, StoreError>;

    /// Resolve one alert. Returns `false` when no unresolved alert has that id.
    async fn resolve_alert(
        &self,
        alert_id: Uuid,
        resolved_by: EmployeeId,
        note: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Unresolved alerts, newest first, optionally limited to one store.
    async fn unresolved_alerts(
        &self,
        store_id: Option<StoreId>,
        limit: i64,
    ) -> Result<Vec<ActivityAlert>, StoreError>;

    /// Take the named lease for `holder` unless another holder has an unexpired one.
    async fn try_acquire_lease(
        &self,
        name: &str,
        holder: Uuid,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Release the lease if `holder` still owns it and record `now` as the last run.
    async fn release_lease(
        &self,
        name: &str,
        holder: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}
