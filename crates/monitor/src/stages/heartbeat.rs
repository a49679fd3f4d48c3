//! Heartbeat stage: mark stale employees offline and close their open spans.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use shiftwatch_core::EmployeeId;

use crate::error::StoreError;
use crate::store::{MonitorStore, OfflineSweep};
use crate::thresholds::heartbeat_timeout;

/// Metadata merged into `activity_data` of spans closed by a heartbeat timeout.
pub fn auto_close_marker() -> serde_json::Value {
    serde_json::json!({
        "auto_closed": true,
        "reason": "heartbeat_timeout",
    })
}

pub async fn check_heartbeats(
    store: &dyn MonitorStore,
    now: DateTime<Utc>,
) -> Result<OfflineSweep, StoreError> {
    let cutoff = now - heartbeat_timeout();
    let stale = store.stale_heartbeats(cutoff).await?;
    if stale.is_empty() {
        debug!("No stale heartbeats");
        return Ok(OfflineSweep::default());
    }

    let ids: Vec<EmployeeId> = stale.iter().map(|h| h.employee_id).collect();
    let sweep = store.mark_offline(&ids, now).await?;

    info!(
        stale = ids.len(),
        marked_offline = sweep.employees_marked,
        spans_closed = sweep.spans_closed,
        "Heartbeat check complete"
    );
    Ok(sweep)
}
