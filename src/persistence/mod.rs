//! Persistence module for attempts and alerts
//!
//! This module defines the storage interface the recorder, the alert
//! generator and the lifecycle manager share, plus the admin query
//! filters exposed to tooling.

pub mod sqlite_store;

#[cfg(test)]
pub(crate) mod flaky_store;

pub use sqlite_store::SqliteSecurityStore;

use crate::models::{
    AccountRef, AlertSeverity, AlertStatus, AlertType, Evidence, LoginAttempt, RiskFactor,
    SecurityAlert, UnknownVariant,
};
use chrono::{DateTime, Utc};
use std::net::IpAddr;
use thiserror::Error;

/// Errors that can occur during persistence operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON column error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid data in database: {0}")]
    InvalidData(String),

    #[error("Database connection lock poisoned")]
    LockPoisoned,
}

impl From<UnknownVariant> for StorageError {
    fn from(e: UnknownVariant) -> Self {
        StorageError::InvalidData(e.to_string())
    }
}

/// Admin filter over login attempts; unset fields match everything
#[derive(Debug, Clone, Default)]
pub struct AttemptQuery {
    pub email: Option<String>,
    pub ip_address: Option<IpAddr>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub min_risk_score: Option<u8>,
    pub limit: Option<usize>,
}

/// Admin filter over security alerts; unset fields match everything
#[derive(Debug, Clone, Default)]
pub struct AlertQuery {
    pub status: Option<AlertStatus>,
    pub severity: Option<AlertSeverity>,
    pub alert_type: Option<AlertType>,
    pub email: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Fields written by a single lifecycle transition
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub status: AlertStatus,
    pub resolved_by: Option<AccountRef>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Trait for security state persistence backends
///
/// Attempts are append-only apart from their risk fields. Alerts change
/// in two narrow ways: deduplication refreshes their evidence, and the
/// lifecycle manager moves their status.
pub trait SecurityStore: Send + Sync {
    // =====================
    // Login Attempts
    // =====================

    /// Insert an attempt and return its id
    fn insert_attempt(&self, attempt: &LoginAttempt) -> Result<i64, StorageError>;

    /// Write the scorer's output onto a stored attempt
    fn update_attempt_risk(
        &self,
        id: i64,
        risk_score: u8,
        risk_factors: &[RiskFactor],
        updated_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    fn get_attempt(&self, id: i64) -> Result<Option<LoginAttempt>, StorageError>;

    /// Attempts for an email with `start <= created_at <= end`, oldest first
    fn email_attempts_between(
        &self,
        email: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LoginAttempt>, StorageError>;

    /// Attempts from an IP with `start <= created_at <= end`, oldest first
    fn ip_attempts_between(
        &self,
        ip: &IpAddr,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LoginAttempt>, StorageError>;

    /// The newest `limit` successful logins for an email at or before
    /// `before`, returned oldest first
    fn recent_successful_logins(
        &self,
        email: &str,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<LoginAttempt>, StorageError>;

    /// Admin query, newest first
    fn query_attempts(&self, query: &AttemptQuery) -> Result<Vec<LoginAttempt>, StorageError>;

    // =====================
    // Security Alerts
    // =====================

    /// Insert an alert and return its id
    fn insert_alert(&self, alert: &SecurityAlert) -> Result<i64, StorageError>;

    fn get_alert(&self, id: i64) -> Result<Option<SecurityAlert>, StorageError>;

    /// Newest open or investigating alert for `email` and `alert_type`
    /// created at or after `since`
    fn find_active_alert(
        &self,
        email: &str,
        alert_type: AlertType,
        since: DateTime<Utc>,
    ) -> Result<Option<SecurityAlert>, StorageError>;

    /// Replace an alert's evidence and point it at a newer attempt
    fn refresh_alert_evidence(
        &self,
        id: i64,
        details: &[Evidence],
        login_attempt_id: i64,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Apply a status change only if the alert is still in `expected`.
    ///
    /// Returns `false` when the alert is missing or its status moved.
    fn update_alert_status(
        &self,
        id: i64,
        expected: AlertStatus,
        change: &StatusChange,
    ) -> Result<bool, StorageError>;

    /// Admin query, newest first
    fn query_alerts(&self, query: &AlertQuery) -> Result<Vec<SecurityAlert>, StorageError>;

    // =====================
    // Maintenance
    // =====================

    /// Remove attempts and closed alerts created before the cutoff
    fn prune_old_data(&self, before: DateTime<Utc>) -> Result<usize, StorageError>;

    /// Clear all data (useful for testing)
    fn clear_all(&self) -> Result<(), StorageError>;
}
