//! Notification fan-out for persisted alerts.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use shiftwatch_core::config::NotifyConfig;
use shiftwatch_core::ActivityAlert;
use shiftwatch_notify::log::LogNotifier;
use shiftwatch_notify::templating::TemplateRenderer;
use shiftwatch_notify::webhook::WebhookNotifier;
use shiftwatch_notify::{Audience, Dispatcher, Notifier, NotifyError};

/// Build the dispatcher from config: one webhook per configured audience,
/// with the tracing log notifier as the fallback channel.
pub fn dispatcher_from_config(
    config: &NotifyConfig,
    renderer: Arc<TemplateRenderer>,
) -> Result<Dispatcher, NotifyError> {
    let fallback: Vec<Box<dyn Notifier>> = vec![Box::new(LogNotifier)];
    let mut dispatcher = Dispatcher::with_defaults(fallback);

    for (audience, url) in [
        (Audience::Manager, &config.manager_webhook_url),
        (Audience::Director, &config.director_webhook_url),
    ] {
        if let Some(url) = url {
            let webhook = webhook_channel(config, url, renderer.clone())?;
            let channels: Vec<Box<dyn Notifier>> = vec![Box::new(webhook)];
            dispatcher.set_audience_channels(audience, channels);
            info!(%audience, "Webhook channel configured");
        }
    }

    Ok(dispatcher)
}

/// One webhook channel with the shared method, headers and body template.
pub fn webhook_channel(
    config: &NotifyConfig,
    url: &str,
    renderer: Arc<TemplateRenderer>,
) -> Result<WebhookNotifier, NotifyError> {
    let headers = config
        .parsed_webhook_headers()
        .map_err(|e| NotifyError::Config(e.to_string()))?;
    WebhookNotifier::from_config(
        url.to_string(),
        config.webhook_method.clone(),
        headers,
        config.webhook_body_template.clone(),
        renderer,
    )
}

/// Delivery counts for one notification pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    /// Notifications with at least one successful channel delivery.
    pub sent: u64,
    /// Notifications that no channel delivered.
    pub failed: u64,
    /// Per-channel errors of the undelivered notifications.
    pub errors: Vec<String>,
}

/// Audiences for an alert, director first.
pub fn audiences_for(alert: &ActivityAlert) -> Vec<Audience> {
    let mut audiences = Vec::with_capacity(2);
    if alert.notified_to_director {
        audiences.push(Audience::Director);
    }
    if alert.notified_to_manager {
        audiences.push(Audience::Manager);
    }
    audiences
}

fn metadata_for(alert: &ActivityAlert) -> HashMap<String, String> {
    let mut metadata = HashMap::from([
        ("alert_id".to_string(), alert.id.to_string()),
        ("alert_type".to_string(), alert.alert_type.to_string()),
        ("store_id".to_string(), alert.store_id.to_string()),
        ("idle_minutes".to_string(), alert.idle_duration_minutes.to_string()),
    ]);
    if let Some(task_id) = alert.task_id {
        metadata.insert("task_id".to_string(), task_id.to_string());
    }
    metadata
}

pub async fn send_notifications(dispatcher: &Dispatcher, alerts: &[ActivityAlert]) -> DispatchSummary {
    let mut summary = DispatchSummary::default();

    for alert in alerts {
        for audience in audiences_for(alert) {
            let results = dispatcher
                .notify(
                    audience,
                    &alert.employee_id.to_string(),
                    &alert.message,
                    alert.severity.as_str(),
                    metadata_for(alert),
                )
                .await;

            if results.iter().any(|r| r.success) {
                summary.sent += 1;
                continue;
            }

            warn!(
                %audience,
                employee_id = %alert.employee_id,
                alert_type = %alert.alert_type,
                channels = results.len(),
                "Notification not delivered"
            );
            summary.failed += 1;
            if results.is_empty() {
                summary.errors.push(format!("{audience}: no channel configured"));
            }
            for result in results {
                let error = result.error.unwrap_or_else(|| "unknown error".to_string());
                summary
                    .errors
                    .push(format!("{} via {}: {error}", result.audience, result.channel));
            }
        }
    }

    info!(sent = summary.sent, failed = summary.failed, "Notifications dispatched");
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shiftwatch_core::AlertType;
    use shiftwatch_notify::Notification;
    use std::sync::Mutex;
    use uuid::Uuid;

    struct Recorder {
        seen: Arc<Mutex<Vec<Notification>>>,
    }

    #[async_trait::async_trait]
    impl Notifier for Recorder {
        async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
            self.seen.lock().unwrap().push(notification.clone());
            Ok(())
        }
        fn channel_name(&self) -> &str {
            "recorder"
        }
    }

    fn alert(alert_type: AlertType) -> ActivityAlert {
        ActivityAlert {
            id: Uuid::new_v4(),
            employee_id: Uuid::new_v4(),
            task_id: None,
            alert_type,
            severity: alert_type.severity(),
            message: "msg".into(),
            idle_duration_minutes: 31,
            notified_to_manager: true,
            notified_to_director: alert_type.notifies_director(),
            store_id: 4,
            is_resolved: false,
            created_at: Utc::now(),
            resolved_at: None,
            resolved_by: None,
            resolution_note: None,
        }
    }

    #[test]
    fn director_goes_first() {
        assert_eq!(
            audiences_for(&alert(AlertType::Inactivity30Min)),
            vec![Audience::Director, Audience::Manager]
        );
        assert_eq!(audiences_for(&alert(AlertType::Inactivity10Min)), vec![Audience::Manager]);
    }

    #[tokio::test]
    async fn notifications_carry_severity_and_metadata() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let channels: Vec<Box<dyn Notifier>> = vec![Box::new(Recorder { seen: seen.clone() })];
        let dispatcher = Dispatcher::with_defaults(channels);

        let summary = send_notifications(&dispatcher, &[alert(AlertType::Inactivity30Min)]).await;
        assert_eq!(summary.sent, 2);
        assert_eq!(summary.failed, 0);
        assert!(summary.errors.is_empty());

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].audience, Audience::Director);
        assert_eq!(seen[1].audience, Audience::Manager);
        assert_eq!(seen[0].severity, "warning");
        assert_eq!(seen[0].body, "msg");
        assert_eq!(seen[0].metadata["store_id"], "4");
        assert_eq!(seen[0].metadata["alert_type"], "inactivity_30min");
    }

    #[tokio::test]
    async fn no_channels_counts_as_failed() {
        let summary = send_notifications(&Dispatcher::empty(), &[alert(AlertType::Inactivity10Min)]).await;
        assert_eq!(summary.sent, 0);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.errors, vec!["manager: no channel configured".to_string()]);
    }

    #[tokio::test]
    async fn channel_errors_are_collected() {
        struct Down;

        #[async_trait::async_trait]
        impl Notifier for Down {
            async fn send(&self, _notification: &Notification) -> Result<(), NotifyError> {
                Err(NotifyError::Rejected("503 from provider".into()))
            }
            fn channel_name(&self) -> &str {
                "webhook"
            }
        }

        let channels: Vec<Box<dyn Notifier>> = vec![Box::new(Down)];
        let dispatcher = Dispatcher::with_defaults(channels);
        let summary = send_notifications(&dispatcher, &[alert(AlertType::Inactivity60Min)]).await;
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.errors.len(), 2);
        assert!(summary.errors[0].starts_with("director via webhook:"));
        assert!(summary.errors[0].contains("503 from provider"));
        assert!(summary.errors[1].starts_with("manager via webhook:"));
    }

    #[tokio::test]
    async fn config_without_webhooks_uses_log_fallback() {
        let dispatcher =
            dispatcher_from_config(&NotifyConfig::default(), Arc::new(TemplateRenderer::new())).unwrap();
        assert!(dispatcher.test_notify(Audience::Manager, 0).await.is_ok());
        assert!(dispatcher.test_notify(Audience::Director, 0).await.is_ok());
    }

    #[test]
    fn invalid_body_template_is_rejected() {
        let config = NotifyConfig {
            manager_webhook_url: Some("https://example.com/hook".into()),
            director_webhook_url: None,
            webhook_body_template: Some("{{ broken".into()),
            ..NotifyConfig::default()
        };
        assert!(dispatcher_from_config(&config, Arc::new(TemplateRenderer::new())).is_err());
    }

    #[test]
    fn webhook_takes_method_and_headers_from_config() {
        std::env::set_var("SW_DISPATCH_HOOK_TOKEN", "tok-123");
        let config = NotifyConfig {
            manager_webhook_url: Some("https://example.com/hook".into()),
            webhook_method: Some("put".into()),
            webhook_headers: Some(r#"{"Authorization": "Bearer ${SW_DISPATCH_HOOK_TOKEN}"}"#.into()),
            ..NotifyConfig::default()
        };
        let webhook =
            webhook_channel(&config, "https://example.com/hook", Arc::new(TemplateRenderer::new())).unwrap();
        assert_eq!(webhook.method().as_str(), "PUT");
        assert_eq!(webhook.headers()["Authorization"], "Bearer tok-123");
        assert!(dispatcher_from_config(&config, Arc::new(TemplateRenderer::new())).is_ok());
        std::env::remove_var("SW_DISPATCH_HOOK_TOKEN");
    }

    #[test]
    fn malformed_headers_or_method_are_rejected() {
        let renderer = Arc::new(TemplateRenderer::new());
        let bad_headers = NotifyConfig {
            manager_webhook_url: Some("https://example.com/hook".into()),
            webhook_headers: Some("not json".into()),
            ..NotifyConfig::default()
        };
        match dispatcher_from_config(&bad_headers, renderer.clone()) {
            Err(NotifyError::Config(msg)) => assert!(msg.contains("NOTIFY_WEBHOOK_HEADERS")),
            other => panic!("expected Config error, got {:?}", other.err()),
        }

        let bad_method = NotifyConfig {
            director_webhook_url: Some("https://example.com/hook".into()),
            webhook_method: Some("SEND IT".into()),
            ..NotifyConfig::default()
        };
        assert!(dispatcher_from_config(&bad_method, renderer).is_err());
    }
}
