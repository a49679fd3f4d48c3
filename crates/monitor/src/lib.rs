//! Activity monitor for retail-operations staff.
//!
//! A periodic job that watches employee heartbeats and task activity,
//! infers idle time and raises escalating alerts to managers and directors.
//!
//! This crate provides:
//! - `ActivityStateReader` / `MonitorStore` traits over the shared store
//! - PostgreSQL (`sqlx`) and in-memory store implementations
//! - The six pipeline stages (heartbeat, detection, dedup, persistence,
//!   notification, retention) and the `ActivityMonitor` orchestrator
//! - Cron helpers for the `activity-worker` loop

pub mod error;
pub mod message;
pub mod pipeline;
pub mod schedule;
pub mod stages;
pub mod store;
pub mod thresholds;

pub use error::{MonitorError, StoreError};
pub use pipeline::{ActivityMonitor, RunReport, StageOutcome, StageReport};
pub use stages::{AlertCandidate, Stage};
pub use store::{ActivityStateReader, MonitorStore};
