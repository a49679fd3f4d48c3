//! Notification fan-out for inactivity alerts.
//!
//! This crate provides:
//! - `Notifier` trait for pluggable notification channels
//! - Webhook and tracing-log notifier implementations
//! - Minijinja template rendering for messages and webhook bodies
//! - Dispatcher that routes notifications to the manager or director audience

pub mod dispatcher;
pub mod log;
pub mod templating;
pub mod traits;
pub mod webhook;

pub use dispatcher::Dispatcher;
pub use traits::{Audience, Notification, Notifier, NotifyError};
