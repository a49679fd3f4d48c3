use std::collections::HashMap;
use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::activity::StoreId;
use crate::error::CoreError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_parse<T: std::str::FromStr>(profile: &str, key: &str, default: T) -> T {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub postgres: PostgresConfig,
    pub monitor: MonitorConfig,
    pub notify: NotifyConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `SHIFTWATCH_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("SHIFTWATCH_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            postgres: PostgresConfig::from_env_profiled(p),
            monitor: MonitorConfig::from_env_profiled(p),
            notify: NotifyConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  postgres:    host={}, db={}", self.postgres.host, self.postgres.database);
        tracing::info!(
            "  monitor:     cron={}, stage_timeout={}s, lease_ttl={}s, default_store={}",
            self.monitor.cron,
            self.monitor.stage_timeout_secs,
            self.monitor.lease_ttl_secs,
            self.monitor.default_store_id,
        );
        tracing::info!(
            "  notify:      manager_webhook={}, director_webhook={}, method={}, headers={}",
            self.notify.manager_webhook_url.is_some(),
            self.notify.director_webhook_url.is_some(),
            self.notify.webhook_method.as_deref().unwrap_or("POST"),
            self.notify.webhook_headers.is_some(),
        );
    }

    /// Return a redacted view safe for printing (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "postgres": {
                "host": self.postgres.host,
                "port": self.postgres.port,
                "database": self.postgres.database,
                "configured": self.postgres.is_configured(),
            },
            "monitor": {
                "cron": self.monitor.cron,
                "stage_timeout_secs": self.monitor.stage_timeout_secs,
                "lease_ttl_secs": self.monitor.lease_ttl_secs,
                "default_store_id": self.monitor.default_store_id,
            },
            "notify": {
                "manager_webhook": self.notify.manager_webhook_url.is_some(),
                "director_webhook": self.notify.director_webhook_url.is_some(),
                "body_template": self.notify.webhook_body_template.is_some(),
                "method": self.notify.webhook_method.as_deref().unwrap_or("POST"),
                "headers": self.notify.webhook_headers.is_some(),
            },
        })
    }
}

// ── PostgreSQL ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl_mode: String,
    pub max_connections: u32,
}

impl PostgresConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "PG_HOST", "localhost"),
            port: profiled_env_parse(p, "PG_PORT", 5432),
            database: profiled_env_or(p, "PG_DATABASE", "shiftwatch"),
            username: profiled_env_opt(p, "PG_USERNAME"),
            password: profiled_env_opt(p, "PG_PASSWORD"),
            ssl_mode: profiled_env_or(p, "PG_SSL_MODE", "prefer"),
            max_connections: profiled_env_parse(p, "PG_MAX_CONNECTIONS", 5),
        }
    }

    pub fn connection_string(&self) -> String {
        let user = self.username.as_deref().unwrap_or("postgres");
        let pass = self.password.as_deref().unwrap_or("");
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            user, pass, self.host, self.port, self.database, self.ssl_mode
        )
    }

    pub fn is_configured(&self) -> bool {
        self.username.is_some()
    }
}

// ── Monitor ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// 5- or 6-field cron expression driving the worker loop.
    pub cron: String,
    /// Upper bound on each stage's store calls.
    pub stage_timeout_secs: u64,
    /// How long a run lease stays valid if the holder dies mid-run.
    pub lease_ttl_secs: u64,
    /// Store assigned to alerts whose employee has no store mapping.
    pub default_store_id: StoreId,
}

impl MonitorConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            cron: profiled_env_or(p, "MONITOR_CRON", "*/5 * * * *"),
            stage_timeout_secs: profiled_env_parse(p, "MONITOR_STAGE_TIMEOUT_SECS", 30),
            lease_ttl_secs: profiled_env_parse(p, "MONITOR_LEASE_TTL_SECS", 600),
            default_store_id: profiled_env_parse(p, "MONITOR_DEFAULT_STORE_ID", 1),
        }
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }

    /// Reject settings under which a run could outlive its own lease.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.cron.trim().is_empty() {
            return Err(CoreError::Config("MONITOR_CRON is empty".into()));
        }
        if self.stage_timeout_secs == 0 {
            return Err(CoreError::Config(
                "MONITOR_STAGE_TIMEOUT_SECS must be at least 1".into(),
            ));
        }
        let worst_case_run = self.stage_timeout_secs.saturating_mul(STAGE_COUNT);
        if self.lease_ttl_secs < worst_case_run {
            return Err(CoreError::Config(format!(
                "MONITOR_LEASE_TTL_SECS ({}) must cover {} stages of {}s",
                self.lease_ttl_secs, STAGE_COUNT, self.stage_timeout_secs
            )));
        }
        Ok(())
    }
}

/// Stages per monitor run, each bounded by the stage timeout.
const STAGE_COUNT: u64 = 6;

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            cron: "*/5 * * * *".to_string(),
            stage_timeout_secs: 30,
            lease_ttl_secs: 600,
            default_store_id: 1,
        }
    }
}

// ── Notifications ─────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub manager_webhook_url: Option<String>,
    pub director_webhook_url: Option<String>,
    /// Optional minijinja template for the webhook request body.
    pub webhook_body_template: Option<String>,
    /// HTTP method for webhook requests; POST when unset.
    pub webhook_method: Option<String>,
    /// Raw JSON object of extra webhook headers. Values may reference
    /// `${VAR}` so tokens stay out of the config itself.
    pub webhook_headers: Option<String>,
}

impl NotifyConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            manager_webhook_url: profiled_env_opt(p, "NOTIFY_MANAGER_WEBHOOK_URL"),
            director_webhook_url: profiled_env_opt(p, "NOTIFY_DIRECTOR_WEBHOOK_URL"),
            webhook_body_template: profiled_env_opt(p, "NOTIFY_WEBHOOK_BODY_TEMPLATE"),
            webhook_method: profiled_env_opt(p, "NOTIFY_WEBHOOK_METHOD"),
            webhook_headers: profiled_env_opt(p, "NOTIFY_WEBHOOK_HEADERS"),
        }
    }

    /// Parse `NOTIFY_WEBHOOK_HEADERS`, e.g. `{"Authorization": "Bearer ${HOOK_TOKEN}"}`.
    pub fn parsed_webhook_headers(&self) -> Result<Option<HashMap<String, String>>, CoreError> {
        match self.webhook_headers.as_deref() {
            None => Ok(None),
            Some(raw) => serde_json::from_str(raw).map(Some).map_err(|e| {
                CoreError::Config(format!("NOTIFY_WEBHOOK_HEADERS must be a JSON object of strings: {e}"))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_prefix_wins_over_plain_key() {
        std::env::set_var("SWTEST_PG_HOST", "db.prod.internal");
        std::env::set_var("PG_DATABASE", "plain_db");
        let cfg = Config::for_profile("swtest");
        assert_eq!(cfg.profile, "SWTEST");
        assert_eq!(cfg.postgres.host, "db.prod.internal");
        assert_eq!(cfg.postgres.database, "plain_db");
        std::env::remove_var("SWTEST_PG_HOST");
        std::env::remove_var("PG_DATABASE");
    }

    #[test]
    fn monitor_defaults() {
        let cfg = MonitorConfig::default();
        assert_eq!(cfg.cron, "*/5 * * * *");
        assert_eq!(cfg.stage_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.lease_ttl(), Duration::from_secs(600));
        assert_eq!(cfg.default_store_id, 1);
    }

    #[test]
    fn validate_rejects_short_lease() {
        assert!(MonitorConfig::default().validate().is_ok());

        let cfg = MonitorConfig {
            stage_timeout_secs: 120,
            lease_ttl_secs: 600,
            ..MonitorConfig::default()
        };
        match cfg.validate() {
            Err(CoreError::Config(msg)) => assert!(msg.contains("MONITOR_LEASE_TTL_SECS")),
            other => panic!("expected Config error, got {other:?}"),
        }

        let cfg = MonitorConfig {
            stage_timeout_secs: 0,
            ..MonitorConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn unparseable_number_uses_default() {
        std::env::set_var("SWBAD_MONITOR_STAGE_TIMEOUT_SECS", "soon");
        let cfg = Config::for_profile("swbad");
        assert_eq!(cfg.monitor.stage_timeout_secs, 30);
        std::env::remove_var("SWBAD_MONITOR_STAGE_TIMEOUT_SECS");
    }

    #[test]
    fn connection_string_defaults_user() {
        let pg = PostgresConfig {
            host: "localhost".into(),
            port: 5432,
            database: "shiftwatch".into(),
            username: None,
            password: None,
            ssl_mode: "disable".into(),
            max_connections: 5,
        };
        assert_eq!(
            pg.connection_string(),
            "postgres://postgres:@localhost:5432/shiftwatch?sslmode=disable"
        );
        assert!(!pg.is_configured());
    }

    #[test]
    fn webhook_headers_parse_from_json() {
        let cfg = NotifyConfig {
            webhook_headers: Some(r#"{"Authorization": "Bearer ${HOOK_TOKEN}"}"#.into()),
            ..NotifyConfig::default()
        };
        let headers = cfg.parsed_webhook_headers().unwrap().unwrap();
        assert_eq!(headers["Authorization"], "Bearer ${HOOK_TOKEN}");

        assert!(NotifyConfig::default().parsed_webhook_headers().unwrap().is_none());

        let bad = NotifyConfig {
            webhook_headers: Some("Authorization: Bearer x".into()),
            ..NotifyConfig::default()
        };
        match bad.parsed_webhook_headers() {
            Err(CoreError::Config(msg)) => assert!(msg.contains("NOTIFY_WEBHOOK_HEADERS")),
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn redacted_summary_hides_secrets() {
        let mut cfg = Config::for_profile("swredact");
        cfg.postgres.password = Some("hunter2".into());
        cfg.notify.webhook_headers = Some(r#"{"X-Token": "s3cret"}"#.into());
        let json = cfg.redacted_summary().to_string();
        assert!(!json.contains("hunter2"));
        assert!(!json.contains("s3cret"));
        assert!(json.contains("\"profile\":\"SWREDACT\""));
    }
}
