use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::activity::{EmployeeId, StoreId, TaskId};
use crate::error::CoreError;

/// Note written on alerts closed by the retention sweep.
pub const AUTO_RESOLUTION_NOTE: &str = "Auto-résolu après 7 jours";

/// Default note for manual resolution when the caller gives none.
pub const MANUAL_RESOLUTION_NOTE: &str = "Résolu manuellement";

/// Escalation tier of an inactivity alert.
///
/// Variants are declared in escalation order, so the derived `Ord`
/// matches [`AlertType::tier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AlertType {
    #[serde(rename = "inactivity_10min")]
    Inactivity10Min,
    #[serde(rename = "inactivity_30min")]
    Inactivity30Min,
    #[serde(rename = "inactivity_60min")]
    Inactivity60Min,
}

impl AlertType {
    pub const ALL: [AlertType; 3] = [
        AlertType::Inactivity10Min,
        AlertType::Inactivity30Min,
        AlertType::Inactivity60Min,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Inactivity10Min => "inactivity_10min",
            AlertType::Inactivity30Min => "inactivity_30min",
            AlertType::Inactivity60Min => "inactivity_60min",
        }
    }

    /// Ordinal escalation level: 0, 1, 2.
    pub fn tier(&self) -> u8 {
        match self {
            AlertType::Inactivity10Min => 0,
            AlertType::Inactivity30Min => 1,
            AlertType::Inactivity60Min => 2,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            AlertType::Inactivity10Min => Severity::Info,
            AlertType::Inactivity30Min => Severity::Warning,
            AlertType::Inactivity60Min => Severity::Critical,
        }
    }

    /// The 10-minute tier stays with the manager; higher tiers also reach the director.
    pub fn notifies_director(&self) -> bool {
        !matches!(self, AlertType::Inactivity10Min)
    }
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AlertType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CoreError::UnknownAlertType(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            other => Err(CoreError::UnknownSeverity(other.to_string())),
        }
    }
}

/// A persisted row of `activity_alerts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityAlert {
    pub id: Uuid,
    pub employee_id: EmployeeId,
    pub task_id: Option<TaskId>,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub message: String,
    pub idle_duration_minutes: i32,
    pub notified_to_manager: bool,
    pub notified_to_director: bool,
    pub store_id: StoreId,
    pub is_resolved: bool,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<EmployeeId>,
    pub resolution_note: Option<String>,
}

/// Insert payload for `activity_alerts`; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewActivityAlert {
    pub employee_id: EmployeeId,
    pub task_id: Option<TaskId>,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub message: String,
    pub idle_duration_minutes: i32,
    pub notified_to_manager: bool,
    pub notified_to_director: bool,
    pub store_id: StoreId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_type_round_trips_through_str() {
        for t in AlertType::ALL {
            assert_eq!(t.as_str().parse::<AlertType>().unwrap(), t);
        }
        assert!("inactivity_5min".parse::<AlertType>().is_err());
    }

    #[test]
    fn tiers_follow_declaration_order() {
        assert!(AlertType::Inactivity10Min < AlertType::Inactivity30Min);
        assert!(AlertType::Inactivity30Min < AlertType::Inactivity60Min);
        let tiers: Vec<u8> = AlertType::ALL.iter().map(AlertType::tier).collect();
        assert_eq!(tiers, vec![0, 1, 2]);
    }

    #[test]
    fn severity_and_audience_by_type() {
        assert_eq!(AlertType::Inactivity10Min.severity(), Severity::Info);
        assert_eq!(AlertType::Inactivity30Min.severity(), Severity::Warning);
        assert_eq!(AlertType::Inactivity60Min.severity(), Severity::Critical);
        assert!(!AlertType::Inactivity10Min.notifies_director());
        assert!(AlertType::Inactivity30Min.notifies_director());
        assert!(AlertType::Inactivity60Min.notifies_director());
    }

    #[test]
    fn serde_uses_store_spelling() {
        let json = serde_json::to_string(&AlertType::Inactivity30Min).unwrap();
        assert_eq!(json, "\"inactivity_30min\"");
        let sev: Severity = serde_json::from_str("\"critical\"").unwrap();
        assert_eq!(sev, Severity::Critical);
    }
}
