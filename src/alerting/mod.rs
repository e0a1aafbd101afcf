//! Security alerts: generation, triage and notification
//!
//! The generator turns scored attempts into alerts (deduplicating repeats),
//! the lifecycle manager moves alerts through their triage states, and the
//! dispatcher pushes new alerts to Slack, Discord and generic webhooks.

pub mod dispatcher;
pub mod generator;
pub mod lifecycle;

pub use dispatcher::{AlertDispatcher, AlertQueue};
pub use generator::{AlertGenerator, AlertOutcome};
pub use lifecycle::AlertLifecycle;

use thiserror::Error;

use crate::models::AlertStatus;
use crate::persistence::StorageError;

/// Errors that can occur while generating or dispatching alerts
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Alert channel closed")]
    ChannelClosed,

    #[error("Alert queue full")]
    QueueFull,
}

/// Errors returned to admin callers changing an alert's status
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Cannot move alert from {from} to {to}")]
    InvalidTransition { from: AlertStatus, to: AlertStatus },

    #[error("Alert {0} not found")]
    NotFound(i64),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
