//! Error types for store access and pipeline stages.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::stages::Stage;

/// Errors raised by [`MonitorStore`](crate::store::MonitorStore) implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A row could not be mapped onto the domain model.
    #[error("decode error: {0}")]
    Decode(String),

    /// The backing store is unreachable or refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by the activity monitor.
///
/// Inside a pipeline run these are captured per stage in the
/// [`RunReport`](crate::pipeline::RunReport) and never escape.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("notification error: {0}")]
    Notify(#[from] shiftwatch_notify::NotifyError),

    #[error("stage {stage} timed out after {}s", after.as_secs())]
    Timeout { stage: Stage, after: Duration },

    #[error("no unresolved alert with id {0}")]
    AlertNotFound(Uuid),

    #[error("invalid cron expression '{expr}': {reason}")]
    InvalidSchedule { expr: String, reason: String },
}

pub type Result<T> = std::result::Result<T, MonitorError>;
