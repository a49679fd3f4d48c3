use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

pub type EmployeeId = Uuid;
pub type TaskId = Uuid;
pub type StoreId = i64;

/// What an employee is doing according to the current-activity view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Working,
    Idle,
    Break,
    Offline,
}

impl ActivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityStatus::Working => "working",
            ActivityStatus::Idle => "idle",
            ActivityStatus::Break => "break",
            ActivityStatus::Offline => "offline",
        }
    }
}

impl std::fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "working" => Ok(ActivityStatus::Working),
            "idle" => Ok(ActivityStatus::Idle),
            "break" => Ok(ActivityStatus::Break),
            "offline" => Ok(ActivityStatus::Offline),
            other => Err(CoreError::UnknownActivityStatus(other.to_string())),
        }
    }
}

/// Liveness record upserted by the client app, one per employee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeHeartbeat {
    pub employee_id: EmployeeId,
    pub last_heartbeat: DateTime<Utc>,
}

impl EmployeeHeartbeat {
    /// Whether the heartbeat is older than `cutoff`.
    pub fn is_stale(&self, cutoff: DateTime<Utc>) -> bool {
        self.last_heartbeat < cutoff
    }
}

/// A row of `employee_activity_logs`. `ended_at == None` means the span is still open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySpan {
    pub id: i64,
    pub employee_id: EmployeeId,
    pub task_id: Option<TaskId>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub activity_data: serde_json::Value,
}

impl ActivitySpan {
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// One row of the `employee_current_activity` view.
///
/// The view is maintained by the database; every column except the
/// employee id may be missing for employees without a live session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentActivity {
    pub employee_id: EmployeeId,
    pub employee_name: Option<String>,
    pub employee_section: Option<String>,
    pub manager_id: Option<EmployeeId>,
    pub manager_name: Option<String>,
    pub task_id: Option<TaskId>,
    pub task_title: Option<String>,
    pub activity_status: Option<ActivityStatus>,
    pub started_at: Option<DateTime<Utc>>,
    pub minutes_active: Option<f64>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub minutes_since_heartbeat: Option<f64>,
    pub store_id: Option<StoreId>,
}

impl CurrentActivity {
    /// Empty row for an employee, used as a starting point by builders and tests.
    pub fn new(employee_id: EmployeeId) -> Self {
        Self {
            employee_id,
            employee_name: None,
            employee_section: None,
            manager_id: None,
            manager_name: None,
            task_id: None,
            task_title: None,
            activity_status: None,
            started_at: None,
            minutes_active: None,
            last_heartbeat: None,
            minutes_since_heartbeat: None,
            store_id: None,
        }
    }

    /// Minutes elapsed since the last heartbeat.
    ///
    /// Prefers the absolute `last_heartbeat` timestamp and falls back to the
    /// view's precomputed `minutes_since_heartbeat`. `None` when the row
    /// carries no heartbeat information at all.
    pub fn heartbeat_age_minutes(&self, now: DateTime<Utc>) -> Option<f64> {
        match self.last_heartbeat {
            Some(at) => Some(now.signed_duration_since(at).num_seconds() as f64 / 60.0),
            None => self.minutes_since_heartbeat,
        }
    }

    /// Display name, falling back to the id when the roster has no name.
    pub fn display_name(&self) -> String {
        self.employee_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| self.employee_id.to_string())
    }
}
