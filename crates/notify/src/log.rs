//! Notifier that writes notifications to the tracing log.
//!
//! Used when no webhook is configured for an audience, so alerts still
//! leave an operational trace.

use crate::traits::{Notification, Notifier, NotifyError};

#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            audience = %notification.audience,
            employee_id = %notification.employee_id,
            severity = %notification.severity,
            subject = %notification.subject,
            "{}",
            notification.body
        );
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "log"
    }
}
