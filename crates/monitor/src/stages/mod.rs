//! The six pipeline stages, in run order.
//!
//! Each stage is a free function over the store (and, for the later
//! stages, the renderer or dispatcher). They return plain results; the
//! [`pipeline`](crate::pipeline) decides what a failure means for the
//! rest of the run.

pub mod dedup;
pub mod detector;
pub mod dispatch;
pub mod heartbeat;
pub mod persister;
pub mod retention;

use serde::{Deserialize, Serialize};

use shiftwatch_core::{AlertType, EmployeeId, Severity, TaskId};

/// Pipeline stage identifiers, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Heartbeat,
    Detection,
    Dedup,
    Persist,
    Notify,
    Retention,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Heartbeat,
        Stage::Detection,
        Stage::Dedup,
        Stage::Persist,
        Stage::Notify,
        Stage::Retention,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Heartbeat => "heartbeat",
            Stage::Detection => "detection",
            Stage::Dedup => "dedup",
            Stage::Persist => "persist",
            Stage::Notify => "notify",
            Stage::Retention => "retention",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An alert the detector wants to raise, before dedup and persistence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertCandidate {
    pub employee_id: EmployeeId,
    pub employee_name: String,
    pub manager_id: Option<EmployeeId>,
    pub task_id: Option<TaskId>,
    pub alert_type: AlertType,
    pub severity: Severity,
    /// Whole idle minutes (floored).
    pub idle_minutes: i64,
    pub notify_manager: bool,
    pub notify_director: bool,
}

impl AlertCandidate {
    pub fn new(
        employee_id: EmployeeId,
        employee_name: impl Into<String>,
        alert_type: AlertType,
        idle_minutes: i64,
    ) -> Self {
        Self {
            employee_id,
            employee_name: employee_name.into(),
            manager_id: None,
            task_id: None,
            alert_type,
            severity: alert_type.severity(),
            idle_minutes,
            notify_manager: true,
            notify_director: alert_type.notifies_director(),
        }
    }

    pub fn with_task(mut self, task_id: Option<TaskId>) -> Self {
        self.task_id = task_id;
        self
    }

    pub fn with_manager(mut self, manager_id: Option<EmployeeId>) -> Self {
        self.manager_id = manager_id;
        self
    }
}
