//! Notifier trait definition and shared error types.

use std::collections::HashMap;

/// Errors that can occur during notification delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Template rendering failed: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Delivery rejected: {0}")]
    Rejected(String),
}

/// Who a notification is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    Manager,
    Director,
}

impl Audience {
    pub fn as_str(&self) -> &'static str {
        match self {
            Audience::Manager => "manager",
            Audience::Director => "director",
        }
    }
}

impl std::fmt::Display for Audience {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Audience {
    type Err = NotifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "manager" => Ok(Audience::Manager),
            "director" => Ok(Audience::Director),
            other => Err(NotifyError::Config(format!("unknown audience: {other}"))),
        }
    }
}

/// A rendered notification ready for delivery.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Notification {
    pub audience: Audience,
    /// Employee the notification is about.
    pub employee_id: String,
    /// Short title, e.g. `[warning] Inactivité employé`.
    pub subject: String,
    /// Human-readable alert message.
    pub body: String,
    pub severity: String,
    /// Additional metadata (alert type, store, idle minutes).
    pub metadata: HashMap<String, String>,
}

/// Trait for notification channel implementations.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification through this channel.
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;

    /// Test connectivity with a sample notification.
    async fn test(&self) -> Result<(), NotifyError> {
        let test_notification = Notification {
            audience: Audience::Manager,
            employee_id: "test-employee".to_string(),
            subject: "[TEST] Inactivity monitor".to_string(),
            body: "This is a test notification from the shiftwatch activity monitor.".to_string(),
            severity: "info".to_string(),
            metadata: HashMap::from([("alert_type".to_string(), "test".to_string())]),
        };
        self.send(&test_notification).await
    }

    /// Human-readable name for this channel (e.g., "webhook", "log").
    fn channel_name(&self) -> &str;
}

/// Result of dispatching a notification to a single channel.
#[derive(Debug)]
pub struct DispatchResult {
    pub channel: String,
    pub audience: Audience,
    pub success: bool,
    pub error: Option<String>,
}
