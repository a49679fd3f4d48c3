//! [`ActivityMonitor`]: runs the six stages in order and reports per stage.
//!
//! A run takes the pipeline lease, then executes heartbeat, detection,
//! dedup, persistence, notification and retention. Every stage is bounded
//! by the configured timeout. Failures are recorded in the [`RunReport`]
//! and never abort the run; the only dependency rule is that stages which
//! consume an earlier stage's output are skipped when it failed. Retention
//! always runs.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shiftwatch_core::config::MonitorConfig;
use shiftwatch_core::{ActivityAlert, EmployeeId, StoreId, MANUAL_RESOLUTION_NOTE};
use shiftwatch_notify::templating::TemplateRenderer;
use shiftwatch_notify::Dispatcher;

use crate::error::{MonitorError, Result};
use crate::stages::dedup::{self, DedupResult};
use crate::stages::detector::{self, Detection};
use crate::stages::dispatch::{self, DispatchSummary};
use crate::stages::persister::{self, Persisted};
use crate::stages::{heartbeat, retention, AlertCandidate, Stage};
use crate::store::{MonitorStore, OfflineSweep, RetentionSweep, PIPELINE_LEASE};

// ── Reports ───────────────────────────────────────────────────

/// Status of a single stage within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome {
    /// Stage finished; `affected` is the stage's row/notification count.
    Completed { affected: u64 },
    /// Stage finished with a partial failure it worked around.
    Degraded { affected: u64, error: String },
    /// Stage aborted.
    Failed { error: String },
    /// Stage did not run.
    Skipped { reason: String },
}

impl StageOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, StageOutcome::Failed { .. })
    }

    pub fn affected(&self) -> u64 {
        match self {
            StageOutcome::Completed { affected } | StageOutcome::Degraded { affected, .. } => *affected,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    #[serde(flatten)]
    pub outcome: StageOutcome,
    pub duration_ms: u64,
}

/// Summary of one `check_all_activity` invocation.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// True when another run held the lease and nothing was executed.
    pub skipped: bool,
    pub stages: Vec<StageReport>,
    pub alerts_created: u64,
    pub notifications_sent: u64,
    pub notifications_failed: u64,
}

impl RunReport {
    fn new(run_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            started_at,
            finished_at: started_at,
            skipped: false,
            stages: Vec::with_capacity(Stage::ALL.len()),
            alerts_created: 0,
            notifications_sent: 0,
            notifications_failed: 0,
        }
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|r| r.stage == stage)
    }

    pub fn outcome(&self, stage: Stage) -> Option<&StageOutcome> {
        self.stage(stage).map(|r| &r.outcome)
    }

    pub fn failed_stages(&self) -> Vec<Stage> {
        self.stages
            .iter()
            .filter(|r| r.outcome.is_failed())
            .map(|r| r.stage)
            .collect()
    }

    fn record(&mut self, stage: Stage, started: Instant, outcome: StageOutcome) {
        match &outcome {
            StageOutcome::Completed { affected } => debug!(%stage, affected, "Stage completed"),
            StageOutcome::Degraded { affected, error } => {
                warn!(%stage, affected, %error, "Stage degraded")
            }
            StageOutcome::Failed { error } => warn!(%stage, %error, "Stage failed"),
            StageOutcome::Skipped { reason } => info!(%stage, %reason, "Stage skipped"),
        }
        self.stages.push(StageReport {
            stage,
            outcome,
            duration_ms: started.elapsed().as_millis() as u64,
        });
    }
}

fn completed_or_degraded(affected: usize, degraded: Option<String>) -> StageOutcome {
    let affected = affected as u64;
    match degraded {
        Some(error) => StageOutcome::Degraded { affected, error },
        None => StageOutcome::Completed { affected },
    }
}

fn skipped(reason: &str) -> StageOutcome {
    StageOutcome::Skipped {
        reason: reason.to_string(),
    }
}

// ── Monitor ───────────────────────────────────────────────────

/// The activity monitor: built once at start-up and driven by the worker loop.
pub struct ActivityMonitor {
    store: Arc<dyn MonitorStore>,
    dispatcher: Arc<Dispatcher>,
    renderer: Arc<TemplateRenderer>,
    config: MonitorConfig,
}

impl ActivityMonitor {
    pub fn new(
        store: Arc<dyn MonitorStore>,
        dispatcher: Arc<Dispatcher>,
        renderer: Arc<TemplateRenderer>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            renderer,
            config,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    async fn bounded<T, F>(&self, stage: Stage, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let after = self.config.stage_timeout();
        tokio::time::timeout(after, fut)
            .await
            .map_err(|_| MonitorError::Timeout { stage, after })?
    }

    // ── Stages ────────────────────────────────────────────────

    pub async fn check_heartbeats(&self, now: DateTime<Utc>) -> Result<OfflineSweep> {
        self.bounded(Stage::Heartbeat, async {
            Ok(heartbeat::check_heartbeats(self.store.as_ref(), now).await?)
        })
        .await
    }

    pub async fn detect_inactivity(&self, now: DateTime<Utc>) -> Result<Detection> {
        self.bounded(Stage::Detection, async {
            Ok(detector::detect_inactivity(self.store.as_ref(), now).await?)
        })
        .await
    }

    /// Deduplicate candidates. A timeout fails open like a read error.
    pub async fn filter_existing_alerts(
        &self,
        candidates: Vec<AlertCandidate>,
        now: DateTime<Utc>,
    ) -> DedupResult {
        let fallback = candidates.clone();
        let result = self
            .bounded(Stage::Dedup, async {
                Ok(dedup::filter_existing_alerts(self.store.as_ref(), candidates, now).await)
            })
            .await;
        match result {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Deduplication did not finish; keeping all candidates");
                DedupResult {
                    kept: fallback,
                    dropped: 0,
                    degraded: Some(e.to_string()),
                }
            }
        }
    }

    pub async fn create_alerts(
        &self,
        candidates: &[AlertCandidate],
        now: DateTime<Utc>,
    ) -> Result<Persisted> {
        self.bounded(
            Stage::Persist,
            persister::create_alerts(
                self.store.as_ref(),
                &self.renderer,
                candidates,
                self.config.default_store_id,
                now,
            ),
        )
        .await
    }

    pub async fn send_notifications(&self, alerts: &[ActivityAlert]) -> Result<DispatchSummary> {
        self.bounded(Stage::Notify, async {
            Ok(dispatch::send_notifications(&self.dispatcher, alerts).await)
        })
        .await
    }

    pub async fn cleanup_old_activities(&self, now: DateTime<Utc>) -> Result<RetentionSweep> {
        self.bounded(Stage::Retention, async {
            Ok(retention::cleanup_old_activities(self.store.as_ref(), now).await?)
        })
        .await
    }

    /// Manually resolve an alert. `note` defaults to the manual-resolution note.
    pub async fn resolve_alert(
        &self,
        alert_id: Uuid,
        resolved_by: EmployeeId,
        note: Option<&str>,
    ) -> Result<()> {
        let note = note.unwrap_or(MANUAL_RESOLUTION_NOTE);
        let resolved = self
            .store
            .resolve_alert(alert_id, resolved_by, note, Utc::now())
            .await?;
        if !resolved {
            return Err(MonitorError::AlertNotFound(alert_id));
        }
        info!(%alert_id, %resolved_by, "Alert resolved manually");
        Ok(())
    }

    pub async fn unresolved_alerts(
        &self,
        store_id: Option<StoreId>,
        limit: i64,
    ) -> Result<Vec<ActivityAlert>> {
        Ok(self.store.unresolved_alerts(store_id, limit).await?)
    }

    // ── Orchestration ─────────────────────────────────────────

    /// Scheduler entry point.
    pub async fn check_all_activity(&self) -> RunReport {
        self.check_all_activity_at(Utc::now()).await
    }

    /// Run the full pipeline as of `now`.
    ///
    /// The run lease is taken before any stage. If it cannot be taken,
    /// whether held by another run, a store error or a timeout, the whole
    /// run is skipped on purpose, heartbeat and retention included; the
    /// next scheduled run repeats every stage. Once the lease is held, a
    /// store failure aborts only the stage it hits.
    pub async fn check_all_activity_at(&self, now: DateTime<Utc>) -> RunReport {
        let run_id = Uuid::new_v4();
        let mut report = RunReport::new(run_id, now);

        let lease = tokio::time::timeout(
            self.config.stage_timeout(),
            self.store
                .try_acquire_lease(PIPELINE_LEASE, run_id, now, self.config.lease_ttl()),
        )
        .await;
        let blocked = match lease {
            Ok(Ok(true)) => None,
            Ok(Ok(false)) => Some("another run holds the pipeline lease".to_string()),
            Ok(Err(e)) => Some(format!("could not acquire pipeline lease: {e}")),
            Err(_) => Some("timed out acquiring pipeline lease".to_string()),
        };
        if let Some(reason) = blocked {
            warn!(%run_id, %reason, "Activity check skipped");
            report.skipped = true;
            report.finished_at = Utc::now();
            return report;
        }
        debug!(%run_id, "Pipeline lease acquired");

        info!(%run_id, "Activity check started");
        self.run_stages(now, &mut report).await;

        if let Err(e) = self.store.release_lease(PIPELINE_LEASE, run_id, now).await {
            warn!(%run_id, error = %e, "Failed to release pipeline lease");
        }

        report.finished_at = Utc::now();
        info!(
            %run_id,
            alerts_created = report.alerts_created,
            notifications_sent = report.notifications_sent,
            notifications_failed = report.notifications_failed,
            failed_stages = ?report.failed_stages(),
            "Activity check finished"
        );
        report
    }

    async fn run_stages(&self, now: DateTime<Utc>, report: &mut RunReport) {
        // Heartbeat
        let started = Instant::now();
        let outcome = match self.check_heartbeats(now).await {
            Ok(sweep) => StageOutcome::Completed {
                affected: sweep.employees_marked,
            },
            Err(e) => StageOutcome::Failed { error: e.to_string() },
        };
        report.record(Stage::Heartbeat, started, outcome);

        // Detection
        let started = Instant::now();
        let candidates = match self.detect_inactivity(now).await {
            Ok(detection) => {
                let outcome = completed_or_degraded(detection.candidates.len(), detection.degraded);
                report.record(Stage::Detection, started, outcome);
                Some(detection.candidates)
            }
            Err(e) => {
                report.record(Stage::Detection, started, StageOutcome::Failed { error: e.to_string() });
                None
            }
        };

        let alerts = match candidates {
            None => {
                for stage in [Stage::Dedup, Stage::Persist, Stage::Notify] {
                    report.record(stage, Instant::now(), skipped("detection failed"));
                }
                None
            }
            Some(candidates) => {
                // Dedup
                let started = Instant::now();
                let dedup = self.filter_existing_alerts(candidates, now).await;
                report.record(
                    Stage::Dedup,
                    started,
                    completed_or_degraded(dedup.kept.len(), dedup.degraded),
                );

                // Persist
                let started = Instant::now();
                match self.create_alerts(&dedup.kept, now).await {
                    Ok(persisted) => {
                        report.alerts_created = persisted.alerts.len() as u64;
                        report.record(
                            Stage::Persist,
                            started,
                            completed_or_degraded(persisted.alerts.len(), persisted.degraded),
                        );
                        Some(persisted.alerts)
                    }
                    Err(e) => {
                        report.record(Stage::Persist, started, StageOutcome::Failed { error: e.to_string() });
                        report.record(Stage::Notify, Instant::now(), skipped("persistence failed"));
                        None
                    }
                }
            }
        };

        // Notify
        if let Some(alerts) = alerts {
            let started = Instant::now();
            let outcome = match self.send_notifications(&alerts).await {
                Ok(summary) => {
                    report.notifications_sent = summary.sent;
                    report.notifications_failed = summary.failed;
                    if summary.failed == 0 {
                        StageOutcome::Completed { affected: summary.sent }
                    } else {
                        StageOutcome::Degraded {
                            affected: summary.sent,
                            error: format!(
                                "{} notification(s) not delivered: {}",
                                summary.failed,
                                summary.errors.join("; ")
                            ),
                        }
                    }
                }
                Err(e) => StageOutcome::Failed { error: e.to_string() },
            };
            report.record(Stage::Notify, started, outcome);
        }

        // Retention
        let started = Instant::now();
        let outcome = match self.cleanup_old_activities(now).await {
            Ok(sweep) => StageOutcome::Completed {
                affected: sweep.spans_deleted + sweep.alerts_resolved,
            },
            Err(e) => StageOutcome::Failed { error: e.to_string() },
        };
        report.record(Stage::Retention, started, outcome);
    }
}
