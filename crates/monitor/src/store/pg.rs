//! PostgreSQL-backed [`MonitorStore`].

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use shiftwatch_core::config::PostgresConfig;
use shiftwatch_core::{
    ActivityAlert, ActivityStatus, CurrentActivity, EmployeeHeartbeat, EmployeeId,
    NewActivityAlert, StoreId, TaskId,
};

use super::{ActivityStateReader, MonitorStore, OfflineSweep, RetentionSweep};
use crate::error::StoreError;
use crate::stages::heartbeat::auto_close_marker;

const ALERT_COLUMNS: &str = "id, employee_id, task_id, alert_type, severity, message,
    idle_duration_minutes, notified_to_manager, notified_to_director, store_id,
    is_resolved, created_at, resolved_at, resolved_by, resolution_note";

// ── Row types ─────────────────────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
struct CurrentActivityRow {
    employee_id: Uuid,
    employee_name: Option<String>,
    employee_section: Option<String>,
    manager_id: Option<Uuid>,
    manager_name: Option<String>,
    task_id: Option<Uuid>,
    task_title: Option<String>,
    activity_status: Option<String>,
    started_at: Option<DateTime<Utc>>,
    minutes_active: Option<f64>,
    last_heartbeat: Option<DateTime<Utc>>,
    minutes_since_heartbeat: Option<f64>,
    store_id: Option<i64>,
}

impl TryFrom<CurrentActivityRow> for CurrentActivity {
    type Error = StoreError;

    fn try_from(row: CurrentActivityRow) -> Result<Self, Self::Error> {
        let activity_status = row
            .activity_status
            .as_deref()
            .map(str::parse::<ActivityStatus>)
            .transpose()
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(CurrentActivity {
            employee_id: row.employee_id,
            employee_name: row.employee_name,
            employee_section: row.employee_section,
            manager_id: row.manager_id,
            manager_name: row.manager_name,
            task_id: row.task_id,
            task_title: row.task_title,
            activity_status,
            started_at: row.started_at,
            minutes_active: row.minutes_active,
            last_heartbeat: row.last_heartbeat,
            minutes_since_heartbeat: row.minutes_since_heartbeat,
            store_id: row.store_id,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AlertRow {
    id: Uuid,
    employee_id: Uuid,
    task_id: Option<TaskId>,
    alert_type: String,
    severity: String,
    message: String,
    idle_duration_minutes: i32,
    notified_to_manager: bool,
    notified_to_director: bool,
    store_id: i64,
    is_resolved: bool,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    resolved_by: Option<Uuid>,
    resolution_note: Option<String>,
}

impl TryFrom<AlertRow> for ActivityAlert {
    type Error = StoreError;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        Ok(ActivityAlert {
            id: row.id,
            employee_id: row.employee_id,
            task_id: row.task_id,
            alert_type: row
                .alert_type
                .parse()
                .map_err(|e: shiftwatch_core::CoreError| StoreError::Decode(e.to_string()))?,
            severity: row
                .severity
                .parse()
                .map_err(|e: shiftwatch_core::CoreError| StoreError::Decode(e.to_string()))?,
            message: row.message,
            idle_duration_minutes: row.idle_duration_minutes,
            notified_to_manager: row.notified_to_manager,
            notified_to_director: row.notified_to_director,
            store_id: row.store_id,
            is_resolved: row.is_resolved,
            created_at: row.created_at,
            resolved_at: row.resolved_at,
            resolved_by: row.resolved_by,
            resolution_note: row.resolution_note,
        })
    }
}

fn decode_alerts(rows: Vec<AlertRow>) -> Result<Vec<ActivityAlert>, StoreError> {
    rows.into_iter().map(ActivityAlert::try_from).collect()
}

// ── Store ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to PostgreSQL and apply pending migrations.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.connection_string())
            .await?;
        info!("PostgreSQL connected: {}", config.host);

        sqlx::migrate!("../../migrations").run(&pool).await?;
        info!("Database migrations applied successfully");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ActivityStateReader for PgStore {
    async fn current_activity(&self) -> Result<Vec<CurrentActivity>, StoreError> {
        let rows = sqlx::query_as::<_, CurrentActivityRow>(
            "SELECT employee_id, employee_name, employee_section, manager_id, manager_name,
                    task_id, task_title, activity_status, started_at, minutes_active,
                    last_heartbeat, minutes_since_heartbeat, store_id
             FROM employee_current_activity
             WHERE activity_status IS DISTINCT FROM 'offline'
             ORDER BY employee_id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let employee_id = row.employee_id;
            match CurrentActivity::try_from(row) {
                Ok(activity) => out.push(activity),
                Err(e) => warn!(%employee_id, error = %e, "skipping unreadable activity row"),
            }
        }
        Ok(out)
    }

    async fn last_span_ends(
        &self,
        employee_ids: &[EmployeeId],
    ) -> Result<HashMap<EmployeeId, DateTime<Utc>>, StoreError> {
        if employee_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<(Uuid, DateTime<Utc>)> = sqlx::query_as(
            "SELECT employee_id, MAX(ended_at)
             FROM employee_activity_logs
             WHERE employee_id = ANY($1) AND ended_at IS NOT NULL
             GROUP BY employee_id",
        )
        .bind(employee_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }
}

#[async_trait]
impl MonitorStore for PgStore {
    async fn stale_heartbeats(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<EmployeeHeartbeat>, StoreError> {
        let rows: Vec<(Uuid, DateTime<Utc>)> = sqlx::query_as(
            "SELECT employee_id, last_heartbeat
             FROM employee_heartbeats
             WHERE last_heartbeat < $1
             ORDER BY employee_id",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(employee_id, last_heartbeat)| EmployeeHeartbeat {
                employee_id,
                last_heartbeat,
            })
            .collect())
    }

    async fn mark_offline(
        &self,
        employee_ids: &[EmployeeId],
        now: DateTime<Utc>,
    ) -> Result<OfflineSweep, StoreError> {
        if employee_ids.is_empty() {
            return Ok(OfflineSweep::default());
        }
        let mut tx = self.pool.begin().await?;

        let marked = sqlx::query(
            "UPDATE employees SET status = 'offline'
             WHERE id = ANY($1) AND status IS DISTINCT FROM 'offline'",
        )
        .bind(employee_ids)
        .execute(&mut *tx)
        .await?;

        let closed = sqlx::query(
            "UPDATE employee_activity_logs
             SET ended_at = $2,
                 activity_data = COALESCE(activity_data, '{}'::jsonb) || $3
             WHERE employee_id = ANY($1) AND ended_at IS NULL",
        )
        .bind(employee_ids)
        .bind(now)
        .bind(auto_close_marker())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(OfflineSweep {
            employees_marked: marked.rows_affected(),
            spans_closed: closed.rows_affected(),
        })
    }

    async fn recent_unresolved_alerts(
        &self,
        employee_ids: &[EmployeeId],
        since: DateTime<Utc>,
    ) -> Result<Vec<ActivityAlert>, StoreError> {
        if employee_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, AlertRow>(&format!(
            "SELECT {ALERT_COLUMNS}
             FROM activity_alerts
             WHERE employee_id = ANY($1) AND created_at >= $2 AND NOT is_resolved"
        ))
        .bind(employee_ids)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        decode_alerts(rows)
    }

    async fn employee_stores(
        &self,
        employee_ids: &[EmployeeId],
    ) -> Result<HashMap<EmployeeId, StoreId>, StoreError> {
        if employee_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<(Uuid, i64)> = sqlx::query_as(
            "SELECT id, store_id FROM employees
             WHERE id = ANY($1) AND store_id IS NOT NULL",
        )
        .bind(employee_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    async fn insert_alerts(
        &self,
        alerts: &[NewActivityAlert],
        now: DateTime<Utc>,
    ) -> Result<Vec<ActivityAlert>, StoreError> {
        if alerts.is_empty() {
            return Ok(Vec::new());
        }
        let mut tx = self.pool.begin().await?;
        let mut created = Vec::with_capacity(alerts.len());

        for alert in alerts {
            let row = sqlx::query_as::<_, AlertRow>(&format!(
                "INSERT INTO activity_alerts
                    (id, employee_id, task_id, alert_type, severity, message,
                     idle_duration_minutes, notified_to_manager, notified_to_director,
                     store_id, is_resolved, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, FALSE, $11)
                 RETURNING {ALERT_COLUMNS}"
            ))
            .bind(Uuid::new_v4())
            .bind(alert.employee_id)
            .bind(alert.task_id)
            .bind(alert.alert_type.as_str())
            .bind(alert.severity.as_str())
            .bind(&alert.message)
            .bind(alert.idle_duration_minutes)
            .bind(alert.notified_to_manager)
            .bind(alert.notified_to_director)
            .bind(alert.store_id)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;
            created.push(ActivityAlert::try_from(row)?);
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn sweep_retention(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
        note: &str,
    ) -> Result<RetentionSweep, StoreError> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query(
            "DELETE FROM employee_activity_logs
             WHERE ended_at IS NOT NULL AND ended_at < $1",
        )
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;

        let resolved = sqlx::query(
            "UPDATE activity_alerts
             SET is_resolved = TRUE, resolved_at = $2, resolution_note = $3
             WHERE NOT is_resolved AND created_at < $1",
        )
        .bind(cutoff)
        .bind(now)
        .bind(note)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(RetentionSweep {
            spans_deleted: deleted.rows_affected(),
            alerts_resolved: resolved.rows_affected(),
        })
    }

    async fn resolve_alert(
        &self,
        alert_id: Uuid,
        resolved_by: EmployeeId,
        note: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE activity_alerts
             SET is_resolved = TRUE, resolved_at = $2, resolved_by = $3, resolution_note = $4
             WHERE id = $1 AND NOT is_resolved",
        )
        .bind(alert_id)
        .bind(now)
        .bind(resolved_by)
        .bind(note)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn unresolved_alerts(
        &self,
        store_id: Option<StoreId>,
        limit: i64,
    ) -> Result<Vec<ActivityAlert>, StoreError> {
        let rows = sqlx::query_as::<_, AlertRow>(&format!(
            "SELECT {ALERT_COLUMNS}
             FROM activity_alerts
             WHERE NOT is_resolved AND ($1::bigint IS NULL OR store_id = $1)
             ORDER BY created_at DESC
             LIMIT $2"
        ))
        .bind(store_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        decode_alerts(rows)
    }

    async fn try_acquire_lease(
        &self,
        name: &str,
        holder: Uuid,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| StoreError::Unavailable(format!("invalid lease ttl: {e}")))?;
        let acquired: Option<(Uuid,)> = sqlx::query_as(
            "INSERT INTO monitor_leases (name, holder, acquired_at, expires_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (name) DO UPDATE
                SET holder = EXCLUDED.holder,
                    acquired_at = EXCLUDED.acquired_at,
                    expires_at = EXCLUDED.expires_at
                WHERE monitor_leases.holder IS NULL
                   OR monitor_leases.expires_at <= EXCLUDED.acquired_at
             RETURNING holder",
        )
        .bind(name)
        .bind(holder)
        .bind(now)
        .bind(now + ttl)
        .fetch_optional(&self.pool)
        .await?;
        Ok(acquired.is_some_and(|(h,)| h == holder))
    }

    async fn release_lease(
        &self,
        name: &str,
        holder: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE monitor_leases
             SET holder = NULL, expires_at = $3, last_run_at = $3
             WHERE name = $1 AND holder = $2",
        )
        .bind(name)
        .bind(holder)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
