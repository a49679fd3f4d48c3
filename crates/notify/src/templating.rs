//! Minijinja template rendering for notification messages.
//!
//! Templates are arbitrary strings (not pre-registered), so a fresh
//! [`minijinja::Environment`] is created per render call. Any
//! `serde::Serialize` value can serve as the render context.

use serde::Serialize;

use crate::traits::{Notification, NotifyError};

/// Context exposed to webhook body templates.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationContext<'a> {
    pub notification: &'a Notification,
    /// Current timestamp in ISO 8601 format.
    pub now: String,
}

/// Renders templates using minijinja.
#[derive(Debug)]
pub struct TemplateRenderer {
    _private: (),
}

impl TemplateRenderer {
    /// Create a new template renderer.
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Build a configured minijinja environment with custom filters and globals.
    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();

        // `lower` and `upper` are built-in with the "builtins" feature,
        // but we register explicit versions to guarantee availability.
        env.add_filter("lower", lower_filter);
        env.add_filter("upper", upper_filter);
        env.add_filter("json", json_filter);

        // Register global `env()` function for environment variable access
        env.add_function("env", env_function);

        env
    }

    /// Render a template string with the given context.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Template`] if the template is invalid or
    /// rendering fails.
    pub fn render<S: Serialize>(&self, template_str: &str, ctx: &S) -> Result<String, NotifyError> {
        let env = Self::build_env();
        env.render_str(template_str, ctx)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }

    /// Validate that a template string parses without errors.
    ///
    /// This does not evaluate the template; it only checks syntax.
    pub fn validate(&self, template_str: &str) -> Result<(), NotifyError> {
        let env = Self::build_env();
        env.template_from_str(template_str)
            .map_err(|e| NotifyError::Template(e.to_string()))?;
        Ok(())
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn lower_filter(value: String) -> String {
    value.to_lowercase()
}

fn upper_filter(value: String) -> String {
    value.to_uppercase()
}

/// Quote a string as a JSON literal, for hand-written JSON body templates.
fn json_filter(value: String) -> String {
    serde_json::Value::String(value).to_string()
}

/// Global function: read an environment variable by name.
///
/// Returns the variable value, or an empty string if not found
/// (with a warning logged via tracing).
fn env_function(name: String) -> String {
    match std::env::var(&name) {
        Ok(val) => val,
        Err(_) => {
            tracing::warn!(var = %name, "Environment variable not found, returning empty string");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Audience;
    use std::collections::HashMap;

    fn sample_notification() -> Notification {
        Notification {
            audience: Audience::Director,
            employee_id: "emp-42".to_string(),
            subject: "[critical] Inactivité employé".to_string(),
            body: "🚨 CRITIQUE: Lou est inactif depuis 75 minutes".to_string(),
            severity: "critical".to_string(),
            metadata: HashMap::from([("store_id".to_string(), "3".to_string())]),
        }
    }

    #[test]
    fn render_notification_fields() {
        let renderer = TemplateRenderer::new();
        let n = sample_notification();
        let ctx = NotificationContext {
            notification: &n,
            now: "2026-02-16T12:00:00Z".to_string(),
        };

        let template = "{{ notification.audience }}/{{ notification.employee_id }} @ {{ now }}";
        let result = renderer.render(template, &ctx).unwrap();
        assert_eq!(result, "director/emp-42 @ 2026-02-16T12:00:00Z");
    }

    #[test]
    fn render_metadata_and_upper() {
        let renderer = TemplateRenderer::new();
        let n = sample_notification();
        let ctx = NotificationContext { notification: &n, now: String::new() };

        let template = "{{ notification.severity | upper }} store={{ notification.metadata.store_id }}";
        assert_eq!(renderer.render(template, &ctx).unwrap(), "CRITICAL store=3");
    }

    #[test]
    fn json_filter_escapes_quotes() {
        let renderer = TemplateRenderer::new();
        let ctx = serde_json::json!({ "text": "say \"hi\"" });
        let result = renderer.render("{\"text\": {{ text | json }}}", &ctx).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&result).unwrap();
        assert_eq!(parsed["text"], "say \"hi\"");
    }

    #[test]
    fn render_env_missing_returns_empty() {
        let renderer = TemplateRenderer::new();
        let ctx = serde_json::json!({});
        let result = renderer.render("Env: [{{ env('DEFINITELY_NOT_SET_XYZ') }}]", &ctx).unwrap();
        assert_eq!(result, "Env: []");
    }

    #[test]
    fn invalid_template_produces_error() {
        let renderer = TemplateRenderer::new();
        let ctx = serde_json::json!({});
        match renderer.render("{{ unclosed", &ctx) {
            Err(NotifyError::Template(msg)) => assert!(!msg.is_empty()),
            other => panic!("Expected Template error, got: {:?}", other),
        }
    }

    #[test]
    fn validate_checks_syntax_only() {
        let renderer = TemplateRenderer::new();
        assert!(renderer.validate("Hello {{ notification.body }}").is_ok());
        assert!(renderer.validate("{{ unclosed").is_err());
    }
}
