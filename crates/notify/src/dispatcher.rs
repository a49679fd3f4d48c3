//! Routes notifications to the channels configured per audience.
//!
//! Managers and directors each get their own channel list. Individual
//! channel failures don't block other channels.

use std::collections::HashMap;

use crate::traits::{Audience, DispatchResult, Notification, Notifier, NotifyError};

/// Dispatches notifications to multiple channels, organized per audience.
pub struct Dispatcher {
    /// Audience → list of notifier channels for that audience.
    audience_channels: HashMap<Audience, Vec<Box<dyn Notifier>>>,
    /// Fallback channels used when an audience has no channels of its own.
    default_channels: Vec<Box<dyn Notifier>>,
}

impl Dispatcher {
    /// Create an empty dispatcher.
    pub fn empty() -> Self {
        Self {
            audience_channels: HashMap::new(),
            default_channels: Vec::new(),
        }
    }

    /// Create a simple dispatcher with channels shared by every audience.
    pub fn with_defaults(channels: Vec<Box<dyn Notifier>>) -> Self {
        Self {
            audience_channels: HashMap::new(),
            default_channels: channels,
        }
    }

    /// Replace all channels for an audience.
    pub fn set_audience_channels(&mut self, audience: Audience, channels: Vec<Box<dyn Notifier>>) {
        self.audience_channels.insert(audience, channels);
    }

    fn channels_for(&self, audience: Audience) -> &[Box<dyn Notifier>] {
        self.audience_channels
            .get(&audience)
            .filter(|c| !c.is_empty())
            .unwrap_or(&self.default_channels)
    }

    /// Build and dispatch a notification about one employee.
    ///
    /// This is the contract the activity monitor depends on:
    /// `notify(target, employee_id, message, severity)`.
    pub async fn notify(
        &self,
        audience: Audience,
        employee_id: &str,
        message: &str,
        severity: &str,
        metadata: HashMap<String, String>,
    ) -> Vec<DispatchResult> {
        let notification = Notification {
            audience,
            employee_id: employee_id.to_string(),
            subject: format!("[{severity}] Inactivité employé"),
            body: message.to_string(),
            severity: severity.to_string(),
            metadata,
        };
        self.dispatch(&notification).await
    }

    /// Dispatch a notification to all channels of its audience.
    ///
    /// Returns results for each channel delivery. Individual failures
    /// don't block other channels.
    pub async fn dispatch(&self, notification: &Notification) -> Vec<DispatchResult> {
        let audience = notification.audience;
        let channels = self.channels_for(audience);

        if channels.is_empty() {
            tracing::debug!(%audience, "No notification channels configured");
            return Vec::new();
        }

        let mut results = Vec::with_capacity(channels.len());

        for channel in channels {
            let start = std::time::Instant::now();
            let result = channel.send(notification).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let (success, error) = match result {
                Ok(()) => {
                    tracing::info!(
                        %audience,
                        employee_id = %notification.employee_id,
                        channel = channel.channel_name(),
                        duration_ms,
                        "Notification delivered"
                    );
                    (true, None)
                }
                Err(e) => {
                    tracing::warn!(
                        %audience,
                        employee_id = %notification.employee_id,
                        channel = channel.channel_name(),
                        error = %e,
                        duration_ms,
                        "Notification delivery failed"
                    );
                    (false, Some(e.to_string()))
                }
            };

            results.push(DispatchResult {
                channel: channel.channel_name().to_string(),
                audience,
                success,
                error,
            });
        }

        results
    }

    /// Send a test notification through one channel of an audience, by index.
    pub async fn test_notify(
        &self,
        audience: Audience,
        channel_index: usize,
    ) -> Result<(), NotifyError> {
        let channels = self.channels_for(audience);
        if channels.is_empty() {
            return Err(NotifyError::Config(format!("No channels for audience '{audience}'")));
        }

        let channel = channels
            .get(channel_index)
            .ok_or_else(|| NotifyError::Config(format!("Channel index {channel_index} out of range")))?;

        channel.test().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct MockNotifier {
        name: String,
        send_count: Arc<AtomicUsize>,
        should_fail: bool,
    }

    #[async_trait::async_trait]
    impl Notifier for MockNotifier {
        async fn send(&self, _notification: &Notification) -> Result<(), NotifyError> {
            self.send_count.fetch_add(1, Ordering::SeqCst);
            if self.should_fail {
                Err(NotifyError::Config("mock failure".to_string()))
            } else {
                Ok(())
            }
        }
        fn channel_name(&self) -> &str {
            &self.name
        }
    }

    fn mock(name: &str, count: &Arc<AtomicUsize>, should_fail: bool) -> Box<dyn Notifier> {
        Box::new(MockNotifier {
            name: name.to_string(),
            send_count: count.clone(),
            should_fail,
        })
    }

    #[tokio::test]
    async fn notify_routes_by_audience() {
        let managers = Arc::new(AtomicUsize::new(0));
        let directors = Arc::new(AtomicUsize::new(0));

        let mut dispatcher = Dispatcher::empty();
        dispatcher.set_audience_channels(Audience::Manager, vec![mock("m", &managers, false)]);
        dispatcher.set_audience_channels(Audience::Director, vec![mock("d", &directors, false)]);

        let results = dispatcher
            .notify(Audience::Director, "emp-1", "msg", "critical", HashMap::new())
            .await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].audience, Audience::Director);
        assert!(results[0].success);
        assert_eq!(directors.load(Ordering::SeqCst), 1);
        assert_eq!(managers.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn partial_failure_doesnt_block() {
        let count = Arc::new(AtomicUsize::new(0));
        let unused = Arc::new(AtomicUsize::new(0));

        let mut dispatcher = Dispatcher::empty();
        dispatcher.set_audience_channels(
            Audience::Manager,
            vec![mock("fail", &unused, true), mock("ok", &count, false)],
        );

        let results = dispatcher
            .notify(Audience::Manager, "emp-1", "msg", "info", HashMap::new())
            .await;
        assert_eq!(results.len(), 2);
        assert!(!results[0].success);
        assert_eq!(results[0].channel, "fail");
        assert!(results[0].error.as_deref().unwrap().contains("mock failure"));
        assert!(results[1].success);
        assert!(results[1].error.is_none());
        assert_eq!(count.load(Ordering::SeqCst), 1); // second channel still sent
    }

    #[tokio::test]
    async fn falls_back_to_default_channels() {
        let count = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::with_defaults(vec![mock("log", &count, false)]);

        let results = dispatcher
            .notify(Audience::Director, "emp-1", "msg", "warning", HashMap::new())
            .await;
        assert_eq!(results.len(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_channels_returns_empty() {
        let dispatcher = Dispatcher::empty();
        let results = dispatcher
            .notify(Audience::Manager, "emp-1", "msg", "info", HashMap::new())
            .await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn notify_builds_subject_from_severity() {
        struct Capture(std::sync::Mutex<Vec<Notification>>);

        #[async_trait::async_trait]
        impl Notifier for Arc<Capture> {
            async fn send(&self, n: &Notification) -> Result<(), NotifyError> {
                self.0.lock().unwrap().push(n.clone());
                Ok(())
            }
            fn channel_name(&self) -> &str {
                "capture"
            }
        }

        let capture = Arc::new(Capture(std::sync::Mutex::new(Vec::new())));
        let dispatcher = Dispatcher::with_defaults(vec![Box::new(capture.clone())]);
        dispatcher
            .notify(Audience::Manager, "emp-9", "Lou est inactif", "warning", HashMap::new())
            .await;

        let sent = capture.0.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "[warning] Inactivité employé");
        assert_eq!(sent[0].body, "Lou est inactif");
        assert_eq!(sent[0].employee_id, "emp-9");
    }

    #[tokio::test]
    async fn test_notify_out_of_range() {
        let count = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::with_defaults(vec![mock("log", &count, false)]);
        assert!(dispatcher.test_notify(Audience::Manager, 0).await.is_ok());
        assert!(dispatcher.test_notify(Audience::Manager, 3).await.is_err());
        assert!(Dispatcher::empty().test_notify(Audience::Manager, 0).await.is_err());
    }
}
