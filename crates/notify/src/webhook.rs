//! Generic HTTP webhook notifier.
//!
//! Delivers notifications as JSON payloads to a configured URL, with
//! optional custom headers and a request body template.

use std::collections::HashMap;
use std::sync::Arc;

use crate::templating::{NotificationContext, TemplateRenderer};
use crate::traits::{Notification, Notifier, NotifyError};

/// Delivers notifications over HTTP to a configured endpoint.
///
/// Environment variable references (`${VAR_NAME}`) in the URL and header
/// values are resolved at construction time.
#[derive(Debug)]
pub struct WebhookNotifier {
    /// Target URL (env vars already resolved).
    url: String,
    /// HTTP method (defaults to POST).
    method: reqwest::Method,
    /// Custom headers to include on every request.
    headers: HashMap<String, String>,
    /// Optional minijinja body template. When unset, the notification is
    /// serialized as JSON directly.
    body_template: Option<String>,
    renderer: Arc<TemplateRenderer>,
    /// Shared HTTP client (connection pooling).
    client: reqwest::Client,
}

impl WebhookNotifier {
    /// Create a new webhook notifier.
    ///
    /// Missing env vars referenced by `url` or headers produce a
    /// [`NotifyError::Config`] error. `method` defaults to `POST`.
    pub fn new(
        url: String,
        method: Option<reqwest::Method>,
        headers: HashMap<String, String>,
        body_template: Option<String>,
        renderer: Arc<TemplateRenderer>,
    ) -> Result<Self, NotifyError> {
        let resolved_url = resolve_env_vars(&url)?;

        let mut resolved_headers = HashMap::with_capacity(headers.len());
        for (key, value) in &headers {
            resolved_headers.insert(key.clone(), resolve_env_vars(value)?);
        }

        // Validate body template syntax at construction time.
        if let Some(ref tmpl) = body_template {
            renderer
                .validate(tmpl)
                .map_err(|e| NotifyError::Config(format!("invalid body template: {e}")))?;
        }

        Ok(Self {
            url: resolved_url,
            method: method.unwrap_or(reqwest::Method::POST),
            headers: resolved_headers,
            body_template,
            renderer,
            client: reqwest::Client::new(),
        })
    }

    /// Construct a [`WebhookNotifier`] from config-level primitives.
    ///
    /// `method` is parsed from a string (e.g. `"POST"`, `"PUT"`).
    pub fn from_config(
        url: String,
        method: Option<String>,
        headers: Option<HashMap<String, String>>,
        body_template: Option<String>,
        renderer: Arc<TemplateRenderer>,
    ) -> Result<Self, NotifyError> {
        let parsed_method = match method {
            Some(m) => {
                let upper = m.to_uppercase();
                upper
                    .parse::<reqwest::Method>()
                    .map(Some)
                    .map_err(|_| NotifyError::Config(format!("invalid HTTP method: {m}")))?
            }
            None => None,
        };

        Self::new(
            url,
            parsed_method,
            headers.unwrap_or_default(),
            body_template,
            renderer,
        )
    }

    pub fn method(&self) -> &reqwest::Method {
        &self.method
    }

    /// Headers sent on every request, env references already resolved.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Build the request body for a notification.
    fn render_body(&self, notification: &Notification) -> Result<String, NotifyError> {
        match &self.body_template {
            Some(tmpl) => {
                let ctx = NotificationContext {
                    notification,
                    now: chrono::Utc::now().to_rfc3339(),
                };
                self.renderer.render(tmpl, &ctx)
            }
            None => serde_json::to_string(notification).map_err(|e| {
                NotifyError::Config(format!("failed to serialize notification: {e}"))
            }),
        }
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let body = self.render_body(notification)?;

        let mut request = self
            .client
            .request(self.method.clone(), &self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);

        for (key, value) in &self.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            tracing::warn!(
                url = %self.url,
                %status,
                body = %body_text,
                "webhook returned non-2xx status"
            );
            return Err(NotifyError::Rejected(format!(
                "webhook returned {status}: {body_text}"
            )));
        }

        tracing::debug!(
            url = %self.url,
            method = %self.method,
            status = %status,
            "webhook notification delivered"
        );

        Ok(())
    }

    fn channel_name(&self) -> &str {
        "webhook"
    }
}

/// Resolve `${VAR_NAME}` patterns in a string using `std::env::var`.
///
/// Returns an error if a referenced variable is not set.
fn resolve_env_vars(input: &str) -> Result<String, NotifyError> {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
                var_name.push(c);
            }
            if !closed {
                return Err(NotifyError::Config(format!(
                    "unclosed env var reference in: {input}"
                )));
            }
            let value = std::env::var(&var_name).map_err(|_| {
                NotifyError::Config(format!("env var not found: {var_name}"))
            })?;
            result.push_str(&value);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}
