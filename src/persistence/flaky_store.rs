//! In-memory store with injectable failures for recorder and monitor tests

use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{AlertQuery, AttemptQuery, SecurityStore, SqliteSecurityStore, StatusChange, StorageError};
use crate::models::{AlertStatus, AlertType, Evidence, LoginAttempt, RiskFactor, SecurityAlert};

/// Delegates to an in-memory SQLite store unless told to misbehave
pub(crate) struct FlakyStore {
    inner: SqliteSecurityStore,
    insert_failures: AtomicUsize,
    history_broken: bool,
    history_delay: Duration,
    alerts_broken: bool,
}

impl FlakyStore {
    pub(crate) fn new() -> Self {
        FlakyStore {
            inner: SqliteSecurityStore::in_memory().unwrap(),
            insert_failures: AtomicUsize::new(0),
            history_broken: false,
            history_delay: Duration::ZERO,
            alerts_broken: false,
        }
    }

    /// Fail the next `n` attempt inserts
    pub(crate) fn failing_inserts(self, n: usize) -> Self {
        self.insert_failures.store(n, Ordering::SeqCst);
        self
    }

    pub(crate) fn broken_history(mut self) -> Self {
        self.history_broken = true;
        self
    }

    /// Sleep before answering each history read
    pub(crate) fn slow_history(mut self, delay: Duration) -> Self {
        self.history_delay = delay;
        self
    }

    /// Fail every alert lookup and write
    pub(crate) fn broken_alerts(mut self) -> Self {
        self.alerts_broken = true;
        self
    }

    fn history(&self) -> Result<(), StorageError> {
        if !self.history_delay.is_zero() {
            thread::sleep(self.history_delay);
        }
        if self.history_broken {
            return Err(StorageError::InvalidData("injected read failure".to_string()));
        }
        Ok(())
    }

    fn alerts(&self) -> Result<(), StorageError> {
        if self.alerts_broken {
            return Err(StorageError::InvalidData("injected alert failure".to_string()));
        }
        Ok(())
    }
}

impl SecurityStore for FlakyStore {
    fn insert_attempt(&self, attempt: &LoginAttempt) -> Result<i64, StorageError> {
        let remaining = self.insert_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.insert_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StorageError::LockPoisoned);
        }
        self.inner.insert_attempt(attempt)
    }

    fn update_attempt_risk(
        &self,
        id: i64,
        score: u8,
        factors: &[RiskFactor],
        updated_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.inner.update_attempt_risk(id, score, factors, updated_at)
    }

    fn get_attempt(&self, id: i64) -> Result<Option<LoginAttempt>, StorageError> {
        self.inner.get_attempt(id)
    }

    fn email_attempts_between(
        &self,
        email: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LoginAttempt>, StorageError> {
        self.history()?;
        self.inner.email_attempts_between(email, start, end)
    }

    fn ip_attempts_between(
        &self,
        ip: &IpAddr,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LoginAttempt>, StorageError> {
        self.history()?;
        self.inner.ip_attempts_between(ip, start, end)
    }

    fn recent_successful_logins(
        &self,
        email: &str,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<LoginAttempt>, StorageError> {
        self.history()?;
        self.inner.recent_successful_logins(email, before, limit)
    }

    fn query_attempts(&self, query: &AttemptQuery) -> Result<Vec<LoginAttempt>, StorageError> {
        self.inner.query_attempts(query)
    }

    fn insert_alert(&self, alert: &SecurityAlert) -> Result<i64, StorageError> {
        self.alerts()?;
        self.inner.insert_alert(alert)
    }

    fn get_alert(&self, id: i64) -> Result<Option<SecurityAlert>, StorageError> {
        self.inner.get_alert(id)
    }

    fn find_active_alert(
        &self,
        email: &str,
        alert_type: AlertType,
        since: DateTime<Utc>,
    ) -> Result<Option<SecurityAlert>, StorageError> {
        self.alerts()?;
        self.inner.find_active_alert(email, alert_type, since)
    }

    fn refresh_alert_evidence(
        &self,
        id: i64,
        details: &[Evidence],
        attempt_id: i64,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.alerts()?;
        self.inner.refresh_alert_evidence(id, details, attempt_id, updated_at)
    }

    fn update_alert_status(
        &self,
        id: i64,
        expected: AlertStatus,
        change: &StatusChange,
    ) -> Result<bool, StorageError> {
        self.inner.update_alert_status(id, expected, change)
    }

    fn query_alerts(&self, query: &AlertQuery) -> Result<Vec<SecurityAlert>, StorageError> {
        self.inner.query_alerts(query)
    }

    fn prune_old_data(&self, before: DateTime<Utc>) -> Result<usize, StorageError> {
        self.inner.prune_old_data(before)
    }

    fn clear_all(&self) -> Result<(), StorageError> {
        self.inner.clear_all()
    }
}
