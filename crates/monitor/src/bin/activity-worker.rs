//! activity-worker: runs the activity monitor on a cron schedule.
//!
//! Subcommands:
//! - `run`: evaluate the cron schedule every tick and run the pipeline when due
//! - `once`: run the pipeline a single time and print the report
//! - `resolve`: manually resolve one alert
//! - `alerts`: list unresolved alerts
//! - `config`: print the redacted configuration
//! - `test-notify`: send a test notification through one channel

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use uuid::Uuid;

use shiftwatch_core::config::{load_dotenv, Config};
use shiftwatch_monitor::schedule::MonitorSchedule;
use shiftwatch_monitor::stages::dispatch::dispatcher_from_config;
use shiftwatch_monitor::store::PgStore;
use shiftwatch_monitor::{ActivityMonitor, RunReport};
use shiftwatch_notify::templating::TemplateRenderer;
use shiftwatch_notify::Audience;

// ── CLI ─────────────────────────────────────────────────────────────

/// Activity monitor worker: heartbeat sweep, inactivity alerts, retention.
#[derive(Parser, Debug)]
#[command(name = "activity-worker", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline whenever the cron schedule is due, until Ctrl-C.
    Run {
        /// Cron expression (5 or 6 fields); overrides MONITOR_CRON.
        #[arg(long)]
        cron: Option<String>,

        /// Seconds between schedule checks.
        #[arg(long, env = "MONITOR_TICK_SECS", default_value_t = 15)]
        tick_secs: u64,
    },

    /// Run the pipeline once and print the run report.
    Once {
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Manually resolve an alert.
    Resolve {
        /// Alert id.
        alert_id: Uuid,

        /// Id of the manager or director resolving the alert.
        #[arg(long = "by")]
        resolved_by: Uuid,

        /// Resolution note (defaults to "Résolu manuellement").
        #[arg(long)]
        note: Option<String>,
    },

    /// List unresolved alerts, newest first.
    Alerts {
        /// Only alerts for this store.
        #[arg(long)]
        store: Option<i64>,

        #[arg(long, default_value_t = 50)]
        limit: i64,
    },

    /// Print the effective configuration with secrets redacted.
    Config,

    /// Send a test notification to one audience.
    TestNotify {
        /// manager or director
        audience: Audience,

        /// Channel index within the audience.
        #[arg(long, default_value_t = 0)]
        channel: usize,
    },
}

// ── Helpers ─────────────────────────────────────────────────────────

async fn build_monitor(config: &Config) -> Result<ActivityMonitor> {
    config
        .monitor
        .validate()
        .context("invalid monitor configuration")?;
    if !config.postgres.is_configured() {
        warn!("PG_USERNAME not set; connecting with defaults");
    }
    let store = PgStore::connect(&config.postgres)
        .await
        .context("failed to connect to PostgreSQL")?;

    let renderer = Arc::new(TemplateRenderer::new());
    let dispatcher = dispatcher_from_config(&config.notify, renderer.clone())
        .context("failed to build notification channels")?;

    Ok(ActivityMonitor::new(
        Arc::new(store),
        Arc::new(dispatcher),
        renderer,
        config.monitor.clone(),
    ))
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    if report.skipped {
        println!("run {} skipped: pipeline lease held", report.run_id);
        return Ok(());
    }
    println!("run {}", report.run_id);
    for stage in &report.stages {
        println!(
            "  {:<10} {:>6}ms  {}",
            stage.stage.as_str(),
            stage.duration_ms,
            serde_json::to_string(&stage.outcome)?
        );
    }
    println!(
        "  alerts created: {}, notifications sent: {}, failed: {}",
        report.alerts_created, report.notifications_sent, report.notifications_failed
    );
    Ok(())
}

async fn run_loop(monitor: ActivityMonitor, cron: &str, tick: Duration) -> Result<()> {
    let mut schedule = MonitorSchedule::parse(cron)?;
    info!(cron = %schedule.expression(), tick_secs = tick.as_secs(), "activity-worker scheduling");

    let mut interval = tokio::time::interval(tick);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = Utc::now();
                if !schedule.is_due(now) {
                    continue;
                }
                schedule.mark_run(now);
                let report = monitor.check_all_activity_at(now).await;
                if let Some(next) = schedule.next_after(now) {
                    info!(run_id = %report.run_id, next_run = %next, "Next activity check scheduled");
                }
            }
            _ = &mut shutdown => {
                info!("Ctrl-C received, shutting down");
                break;
            }
        }
    }
    Ok(())
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config.redacted_summary())?);
        }
        Command::TestNotify { audience, channel } => {
            let dispatcher =
                dispatcher_from_config(&config.notify, Arc::new(TemplateRenderer::new()))
                    .context("failed to build notification channels")?;
            dispatcher
                .test_notify(audience, channel)
                .await
                .with_context(|| format!("test notification to {audience} failed"))?;
            println!("test notification sent to {audience} (channel {channel})");
        }
        Command::Run { cron, tick_secs } => {
            config.log_summary();
            let cron = cron.unwrap_or_else(|| config.monitor.cron.clone());
            let monitor = build_monitor(&config).await?;
            info!("activity-worker starting");
            run_loop(monitor, &cron, Duration::from_secs(tick_secs.max(1))).await?;
            info!("activity-worker exited cleanly");
        }
        Command::Once { json } => {
            config.log_summary();
            let monitor = build_monitor(&config).await?;
            let report = monitor.check_all_activity().await;
            print_report(&report, json)?;
        }
        Command::Resolve {
            alert_id,
            resolved_by,
            note,
        } => {
            let monitor = build_monitor(&config).await?;
            monitor
                .resolve_alert(alert_id, resolved_by, note.as_deref())
                .await
                .with_context(|| format!("failed to resolve alert {alert_id}"))?;
            println!("alert {alert_id} resolved");
        }
        Command::Alerts { store, limit } => {
            let monitor = build_monitor(&config).await?;
            let alerts = monitor
                .unresolved_alerts(store, limit)
                .await
                .context("failed to list alerts")?;
            if alerts.is_empty() {
                println!("no unresolved alerts");
            }
            for alert in alerts {
                println!(
                    "{}  {}  store={}  {:<16}  {}",
                    alert.id,
                    alert.created_at.format("%Y-%m-%d %H:%M"),
                    alert.store_id,
                    alert.alert_type.as_str(),
                    alert.message
                );
            }
        }
    }

    Ok(())
}
