//! SQLite implementation of the SecurityStore trait

use super::{AlertQuery, AttemptQuery, SecurityStore, StatusChange, StorageError};
use crate::models::{
    AccountRef, AlertStatus, AlertType, Evidence, LoginAttempt, RiskFactor, SecurityAlert,
};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(2);

const ATTEMPT_COLUMNS: &str = "id, email, user_type, user_id, success, ip_address, user_agent, \
     location, failure_reason, risk_score, risk_factors, blocked, metadata, created_at, updated_at";

const ALERT_COLUMNS: &str = "id, alert_type, severity, email, user_type, user_id, ip_address, \
     description, details, login_attempt_id, status, resolved_by, resolved_at, notes, \
     created_at, updated_at";

/// SQLite-based security store
///
/// A single connection guarded by a mutex. The busy timeout bounds how
/// long a statement waits on a locked database file, so lock contention
/// surfaces as a `StorageError` instead of stalling the caller.
pub struct SqliteSecurityStore {
    conn: Mutex<Connection>,
}

impl SqliteSecurityStore {
    /// Open (or create) a store at the specified path
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StorageError> {
        Self::with_busy_timeout(db_path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Open a store with an explicit lock wait budget
    pub fn with_busy_timeout<P: AsRef<Path>>(
        db_path: P,
        busy_timeout: Duration,
    ) -> Result<Self, StorageError> {
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(busy_timeout)?;
        Self::from_connection(conn)
    }

    /// Create an in-memory SQLite database (useful for testing)
    pub fn in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(SqliteSecurityStore {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn load_attempts(
        &self,
        sql: &str,
        values: Vec<Value>,
    ) -> Result<Vec<LoginAttempt>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), AttemptRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(AttemptRow::into_attempt).collect()
    }

    fn load_alerts(&self, sql: &str, values: Vec<Value>) -> Result<Vec<SecurityAlert>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), AlertRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(AlertRow::into_alert).collect()
    }
}

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, StorageError> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| StorageError::InvalidData(format!("Invalid timestamp: {}", ms)))
}

fn parse_ip(ip_str: &str) -> Result<IpAddr, StorageError> {
    IpAddr::from_str(ip_str)
        .map_err(|_| StorageError::InvalidData(format!("Invalid IP address: {}", ip_str)))
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, StorageError> {
    Ok(serde_json::to_string(value)?)
}

fn from_json<T: DeserializeOwned>(text: &str) -> Result<T, StorageError> {
    Ok(serde_json::from_str(text)?)
}

fn optional_json<T: DeserializeOwned>(text: Option<String>) -> Result<Option<T>, StorageError> {
    text.as_deref().map(from_json).transpose()
}

fn account_json(account: &Option<AccountRef>) -> Result<Option<String>, StorageError> {
    account.as_ref().map(to_json).transpose()
}

/// Column values of a login_attempts row before decoding
struct AttemptRow {
    id: i64,
    email: String,
    user_type: String,
    user_id: Option<String>,
    success: bool,
    ip_address: String,
    user_agent: Option<String>,
    location: Option<String>,
    failure_reason: Option<String>,
    risk_score: i64,
    risk_factors: String,
    blocked: bool,
    metadata: String,
    created_at: i64,
    updated_at: i64,
}

impl AttemptRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(AttemptRow {
            id: row.get(0)?,
            email: row.get(1)?,
            user_type: row.get(2)?,
            user_id: row.get(3)?,
            success: row.get(4)?,
            ip_address: row.get(5)?,
            user_agent: row.get(6)?,
            location: row.get(7)?,
            failure_reason: row.get(8)?,
            risk_score: row.get(9)?,
            risk_factors: row.get(10)?,
            blocked: row.get(11)?,
            metadata: row.get(12)?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
        })
    }

    fn into_attempt(self) -> Result<LoginAttempt, StorageError> {
        let risk_score = u8::try_from(self.risk_score)
            .ok()
            .filter(|s| *s <= 100)
            .ok_or_else(|| StorageError::InvalidData(format!("Invalid risk score: {}", self.risk_score)))?;

        Ok(LoginAttempt {
            id: self.id,
            email: self.email,
            user_type: self.user_type.parse()?,
            user_id: optional_json(self.user_id)?,
            success: self.success,
            ip_address: parse_ip(&self.ip_address)?,
            user_agent: self.user_agent,
            location: optional_json(self.location)?,
            failure_reason: self.failure_reason.as_deref().map(str::parse).transpose()?,
            risk_score,
            risk_factors: from_json(&self.risk_factors)?,
            blocked: self.blocked,
            metadata: from_json(&self.metadata)?,
            created_at: from_millis(self.created_at)?,
            updated_at: from_millis(self.updated_at)?,
        })
    }
}

/// Column values of a security_alerts row before decoding
struct AlertRow {
    id: i64,
    alert_type: String,
    severity: String,
    email: String,
    user_type: String,
    user_id: Option<String>,
    ip_address: String,
    description: String,
    details: String,
    login_attempt_id: i64,
    status: String,
    resolved_by: Option<String>,
    resolved_at: Option<i64>,
    notes: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl AlertRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(AlertRow {
            id: row.get(0)?,
            alert_type: row.get(1)?,
            severity: row.get(2)?,
            email: row.get(3)?,
            user_type: row.get(4)?,
            user_id: row.get(5)?,
            ip_address: row.get(6)?,
            description: row.get(7)?,
            details: row.get(8)?,
            login_attempt_id: row.get(9)?,
            status: row.get(10)?,
            resolved_by: row.get(11)?,
            resolved_at: row.get(12)?,
            notes: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }

    fn into_alert(self) -> Result<SecurityAlert, StorageError> {
        Ok(SecurityAlert {
            id: self.id,
            alert_type: self.alert_type.parse()?,
            severity: self.severity.parse()?,
            email: self.email,
            user_type: self.user_type.parse()?,
            user_id: optional_json(self.user_id)?,
            ip_address: parse_ip(&self.ip_address)?,
            description: self.description,
            details: from_json(&self.details)?,
            login_attempt_id: self.login_attempt_id,
            status: self.status.parse()?,
            resolved_by: optional_json(self.resolved_by)?,
            resolved_at: self.resolved_at.map(from_millis).transpose()?,
            notes: self.notes,
            created_at: from_millis(self.created_at)?,
            updated_at: from_millis(self.updated_at)?,
        })
    }
}

/// Appends `clause` and its bound value to a filter being assembled
fn push_filter(sql: &mut String, values: &mut Vec<Value>, clause: &str, value: Value) {
    sql.push_str(" AND ");
    sql.push_str(clause);
    values.push(value);
}

impl SecurityStore for SqliteSecurityStore {
    fn insert_attempt(&self, attempt: &LoginAttempt) -> Result<i64, StorageError> {
        let user_id = account_json(&attempt.user_id)?;
        let location = attempt.location.as_ref().map(to_json).transpose()?;
        let risk_factors = to_json(&attempt.risk_factors)?;
        let metadata = to_json(&attempt.metadata)?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO login_attempts
             (email, user_type, user_id, success, ip_address, user_agent, location,
              failure_reason, risk_score, risk_factors, blocked, metadata, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                attempt.email,
                attempt.user_type.as_str(),
                user_id,
                attempt.success,
                attempt.ip_address.to_string(),
                attempt.user_agent,
                location,
                attempt.failure_reason.map(|r| r.as_str()),
                attempt.risk_score,
                risk_factors,
                attempt.blocked,
                metadata,
                to_millis(attempt.created_at),
                to_millis(attempt.updated_at),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn update_attempt_risk(
        &self,
        id: i64,
        risk_score: u8,
        risk_factors: &[RiskFactor],
        updated_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let factors = to_json(risk_factors)?;
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE login_attempts SET risk_score = ?, risk_factors = ?, updated_at = ?
             WHERE id = ?",
            params![risk_score.min(100), factors, to_millis(updated_at), id],
        )?;
        if changed == 0 {
            return Err(StorageError::InvalidData(format!("No login attempt with id {}", id)));
        }
        Ok(())
    }

    fn get_attempt(&self, id: i64) -> Result<Option<LoginAttempt>, StorageError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM login_attempts WHERE id = ?", ATTEMPT_COLUMNS),
                params![id],
                AttemptRow::from_row,
            )
            .optional()?;
        row.map(AttemptRow::into_attempt).transpose()
    }

    fn email_attempts_between(
        &self,
        email: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LoginAttempt>, StorageError> {
        self.load_attempts(
            &format!(
                "SELECT {} FROM login_attempts
                 WHERE email = ? AND created_at >= ? AND created_at <= ?
                 ORDER BY created_at ASC, id ASC",
                ATTEMPT_COLUMNS
            ),
            vec![
                Value::Text(email.to_string()),
                Value::Integer(to_millis(start)),
                Value::Integer(to_millis(end)),
            ],
        )
    }

    fn ip_attempts_between(
        &self,
        ip: &IpAddr,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LoginAttempt>, StorageError> {
        self.load_attempts(
            &format!(
                "SELECT {} FROM login_attempts
                 WHERE ip_address = ? AND created_at >= ? AND created_at <= ?
                 ORDER BY created_at ASC, id ASC",
                ATTEMPT_COLUMNS
            ),
            vec![
                Value::Text(ip.to_string()),
                Value::Integer(to_millis(start)),
                Value::Integer(to_millis(end)),
            ],
        )
    }

    fn recent_successful_logins(
        &self,
        email: &str,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<LoginAttempt>, StorageError> {
        let mut logins = self.load_attempts(
            &format!(
                "SELECT {} FROM login_attempts
                 WHERE email = ? AND success = 1 AND created_at <= ?
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?",
                ATTEMPT_COLUMNS
            ),
            vec![
                Value::Text(email.to_string()),
                Value::Integer(to_millis(before)),
                Value::Integer(limit as i64),
            ],
        )?;
        logins.reverse();
        Ok(logins)
    }

    fn query_attempts(&self, query: &AttemptQuery) -> Result<Vec<LoginAttempt>, StorageError> {
        let mut sql = format!("SELECT {} FROM login_attempts WHERE 1 = 1", ATTEMPT_COLUMNS);
        let mut values = Vec::new();

        if let Some(ref email) = query.email {
            push_filter(&mut sql, &mut values, "email = ?", Value::Text(email.clone()));
        }
        if let Some(ip) = query.ip_address {
            push_filter(&mut sql, &mut values, "ip_address = ?", Value::Text(ip.to_string()));
        }
        if let Some(since) = query.since {
            push_filter(&mut sql, &mut values, "created_at >= ?", Value::Integer(to_millis(since)));
        }
        if let Some(until) = query.until {
            push_filter(&mut sql, &mut values, "created_at <= ?", Value::Integer(to_millis(until)));
        }
        if let Some(min) = query.min_risk_score {
            push_filter(&mut sql, &mut values, "risk_score >= ?", Value::Integer(i64::from(min)));
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC");
        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(limit as i64));
        }

        self.load_attempts(&sql, values)
    }

    fn insert_alert(&self, alert: &SecurityAlert) -> Result<i64, StorageError> {
        let user_id = account_json(&alert.user_id)?;
        let resolved_by = account_json(&alert.resolved_by)?;
        let details = to_json(&alert.details)?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO security_alerts
             (alert_type, severity, email, user_type, user_id, ip_address, description, details,
              login_attempt_id, status, resolved_by, resolved_at, notes, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                alert.alert_type.as_str(),
                alert.severity.as_str(),
                alert.email,
                alert.user_type.as_str(),
                user_id,
                alert.ip_address.to_string(),
                alert.description,
                details,
                alert.login_attempt_id,
                alert.status.as_str(),
                resolved_by,
                alert.resolved_at.map(to_millis),
                alert.notes,
                to_millis(alert.created_at),
                to_millis(alert.updated_at),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn get_alert(&self, id: i64) -> Result<Option<SecurityAlert>, StorageError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM security_alerts WHERE id = ?", ALERT_COLUMNS),
                params![id],
                AlertRow::from_row,
            )
            .optional()?;
        row.map(AlertRow::into_alert).transpose()
    }

    fn find_active_alert(
        &self,
        email: &str,
        alert_type: AlertType,
        since: DateTime<Utc>,
    ) -> Result<Option<SecurityAlert>, StorageError> {
        let mut alerts = self.load_alerts(
            &format!(
                "SELECT {} FROM security_alerts
                 WHERE email = ? AND alert_type = ? AND created_at >= ?
                   AND status IN ('open', 'investigating')
                 ORDER BY created_at DESC, id DESC
                 LIMIT 1",
                ALERT_COLUMNS
            ),
            vec![
                Value::Text(email.to_string()),
                Value::Text(alert_type.as_str().to_string()),
                Value::Integer(to_millis(since)),
            ],
        )?;
        Ok(alerts.pop())
    }

    fn refresh_alert_evidence(
        &self,
        id: i64,
        details: &[Evidence],
        login_attempt_id: i64,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let details = to_json(details)?;
        let conn = self.conn()?;
        conn.execute(
            "UPDATE security_alerts SET details = ?, login_attempt_id = ?, updated_at = ?
             WHERE id = ?",
            params![details, login_attempt_id, to_millis(updated_at), id],
        )?;
        Ok(())
    }

    fn update_alert_status(
        &self,
        id: i64,
        expected: AlertStatus,
        change: &StatusChange,
    ) -> Result<bool, StorageError> {
        let resolved_by = account_json(&change.resolved_by)?;
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE security_alerts
             SET status = ?, resolved_by = ?, resolved_at = ?, notes = ?, updated_at = ?
             WHERE id = ? AND status = ?",
            params![
                change.status.as_str(),
                resolved_by,
                change.resolved_at.map(to_millis),
                change.notes,
                to_millis(change.updated_at),
                id,
                expected.as_str(),
            ],
        )?;
        Ok(changed == 1)
    }

    fn query_alerts(&self, query: &AlertQuery) -> Result<Vec<SecurityAlert>, StorageError> {
        let mut sql = format!("SELECT {} FROM security_alerts WHERE 1 = 1", ALERT_COLUMNS);
        let mut values = Vec::new();

        if let Some(status) = query.status {
            push_filter(&mut sql, &mut values, "status = ?", Value::Text(status.as_str().to_string()));
        }
        if let Some(severity) = query.severity {
            push_filter(
                &mut sql,
                &mut values,
                "severity = ?",
                Value::Text(severity.as_str().to_string()),
            );
        }
        if let Some(alert_type) = query.alert_type {
            push_filter(
                &mut sql,
                &mut values,
                "alert_type = ?",
                Value::Text(alert_type.as_str().to_string()),
            );
        }
        if let Some(ref email) = query.email {
            push_filter(&mut sql, &mut values, "email = ?", Value::Text(email.clone()));
        }
        if let Some(since) = query.since {
            push_filter(&mut sql, &mut values, "created_at >= ?", Value::Integer(to_millis(since)));
        }
        if let Some(until) = query.until {
            push_filter(&mut sql, &mut values, "created_at <= ?", Value::Integer(to_millis(until)));
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC");
        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(limit as i64));
        }

        self.load_alerts(&sql, values)
    }

    fn prune_old_data(&self, before: DateTime<Utc>) -> Result<usize, StorageError> {
        let conn = self.conn()?;
        let cutoff = to_millis(before);

        let mut total_deleted = conn.execute(
            "DELETE FROM login_attempts WHERE created_at < ?",
            params![cutoff],
        )?;

        // Open and investigating alerts stay until someone closes them
        total_deleted += conn.execute(
            "DELETE FROM security_alerts
             WHERE created_at < ? AND status IN ('resolved', 'false_positive')",
            params![cutoff],
        )?;

        Ok(total_deleted)
    }

    fn clear_all(&self) -> Result<(), StorageError> {
        let conn = self.conn()?;
        conn.execute_batch(
            "DELETE FROM login_attempts;
             DELETE FROM security_alerts;",
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AlertSeverity, AttemptInput, FailureReason, Location, MetadataEntry, RiskFactorKind,
        RiskSeverity, UserType,
    };
    use chrono::{Duration, TimeZone};

    fn create_test_store() -> SqliteSecurityStore {
        SqliteSecurityStore::in_memory().expect("Failed to create in-memory store")
    }

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn failed(email: &str, ip: &str, offset_secs: i64) -> LoginAttempt {
        LoginAttempt::pending(AttemptInput::failure(
            email,
            UserType::Seller,
            FailureReason::InvalidPassword,
            ip.parse().unwrap(),
            base_time() + Duration::seconds(offset_secs),
        ))
    }

    fn succeeded(email: &str, ip: &str, offset_secs: i64) -> LoginAttempt {
        LoginAttempt::pending(AttemptInput::success(
            email,
            UserType::Seller,
            ip.parse().unwrap(),
            base_time() + Duration::seconds(offset_secs),
        ))
    }

    fn sample_alert(email: &str, alert_type: AlertType, attempt_id: i64, offset_secs: i64) -> SecurityAlert {
        let at = base_time() + Duration::seconds(offset_secs);
        SecurityAlert {
            id: 0,
            alert_type,
            severity: AlertSeverity::High,
            email: email.to_string(),
            user_type: UserType::Seller,
            user_id: None,
            ip_address: "1.1.1.1".parse().unwrap(),
            description: "test alert".to_string(),
            details: vec![Evidence::RiskScore(45)],
            login_attempt_id: attempt_id,
            status: AlertStatus::Open,
            resolved_by: None,
            resolved_at: None,
            notes: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_attempt_roundtrip() {
        let store = create_test_store();
        let mut attempt = LoginAttempt::pending(
            AttemptInput::success("a@x.com", UserType::Buyer, "2001:db8::1".parse().unwrap(), base_time())
                .with_user_id("b-9")
                .with_user_agent("Mozilla/5.0")
                .with_location(Location {
                    country: Some("FR".to_string()),
                    city: Some("Paris".to_string()),
                    coordinates: None,
                })
                .with_metadata(MetadataEntry::SessionId("s-1".to_string())),
        );
        attempt.id = store.insert_attempt(&attempt).unwrap();

        let stored = store.get_attempt(attempt.id).unwrap().unwrap();
        assert_eq!(stored, attempt);
    }

    #[test]
    fn test_update_attempt_risk() {
        let store = create_test_store();
        let id = store.insert_attempt(&failed("a@x.com", "1.1.1.1", 0)).unwrap();
        let factors = vec![RiskFactor::new(
            RiskFactorKind::Velocity,
            RiskSeverity::High,
            40,
            "5 consecutive failures",
        )
        .with_evidence(Evidence::FailureStreak(5))];

        store
            .update_attempt_risk(id, 40, &factors, base_time() + Duration::seconds(1))
            .unwrap();

        let stored = store.get_attempt(id).unwrap().unwrap();
        assert_eq!(stored.risk_score, 40);
        assert_eq!(stored.risk_factors, factors);
        assert_eq!(stored.created_at, base_time());
        assert_eq!(stored.updated_at, base_time() + Duration::seconds(1));

        assert!(store.update_attempt_risk(999, 10, &[], base_time()).is_err());
    }

    #[test]
    fn test_failure_reason_constraint() {
        let store = create_test_store();
        let mut attempt = succeeded("a@x.com", "1.1.1.1", 0);
        attempt.failure_reason = Some(FailureReason::Other);
        assert!(matches!(store.insert_attempt(&attempt), Err(StorageError::Database(_))));
    }

    #[test]
    fn test_window_queries() {
        let store = create_test_store();
        store.insert_attempt(&failed("a@x.com", "1.1.1.1", 0)).unwrap();
        store.insert_attempt(&failed("a@x.com", "1.1.1.1", 100)).unwrap();
        store.insert_attempt(&failed("b@x.com", "1.1.1.1", 150)).unwrap();
        store.insert_attempt(&failed("a@x.com", "2.2.2.2", 200)).unwrap();

        let start = base_time() + Duration::seconds(50);
        let end = base_time() + Duration::seconds(200);

        let by_email = store.email_attempts_between("a@x.com", start, end).unwrap();
        assert_eq!(by_email.len(), 2);
        assert!(by_email[0].created_at < by_email[1].created_at);

        let ip: IpAddr = "1.1.1.1".parse().unwrap();
        let by_ip = store.ip_attempts_between(&ip, start, end).unwrap();
        assert_eq!(by_ip.len(), 2);
        assert_eq!(by_ip[1].email, "b@x.com");
    }

    #[test]
    fn test_recent_successful_logins() {
        let store = create_test_store();
        for i in 0..5 {
            store.insert_attempt(&succeeded("a@x.com", "1.1.1.1", i * 60)).unwrap();
        }
        store.insert_attempt(&failed("a@x.com", "1.1.1.1", 400)).unwrap();
        store.insert_attempt(&succeeded("a@x.com", "1.1.1.1", 1000)).unwrap();

        let logins = store
            .recent_successful_logins("a@x.com", base_time() + Duration::seconds(500), 3)
            .unwrap();
        assert_eq!(logins.len(), 3);
        assert!(logins.iter().all(|l| l.success));
        assert_eq!(logins[0].created_at, base_time() + Duration::seconds(120));
        assert_eq!(logins[2].created_at, base_time() + Duration::seconds(240));
    }

    #[test]
    fn test_query_attempts_filters() {
        let store = create_test_store();
        let id = store.insert_attempt(&failed("a@x.com", "1.1.1.1", 0)).unwrap();
        store.insert_attempt(&failed("a@x.com", "1.1.1.1", 10)).unwrap();
        store.insert_attempt(&succeeded("c@x.com", "3.3.3.3", 20)).unwrap();
        store.update_attempt_risk(id, 60, &[], base_time()).unwrap();

        let all = store.query_attempts(&AttemptQuery::default()).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].email, "c@x.com");

        let risky = store
            .query_attempts(&AttemptQuery { min_risk_score: Some(50), ..Default::default() })
            .unwrap();
        assert_eq!(risky.len(), 1);
        assert_eq!(risky[0].id, id);

        let limited = store
            .query_attempts(&AttemptQuery {
                email: Some("a@x.com".to_string()),
                limit: Some(1),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].created_at, base_time() + Duration::seconds(10));
    }

    #[test]
    fn test_alert_roundtrip_and_active_lookup() {
        let store = create_test_store();
        let mut alert = sample_alert("a@x.com", AlertType::BruteForceDetected, 1, 0);
        alert.id = store.insert_alert(&alert).unwrap();

        assert_eq!(store.get_alert(alert.id).unwrap().unwrap(), alert);

        let found = store
            .find_active_alert("a@x.com", AlertType::BruteForceDetected, base_time())
            .unwrap();
        assert_eq!(found.map(|a| a.id), Some(alert.id));

        // Outside the window or of another type
        assert!(store
            .find_active_alert("a@x.com", AlertType::BruteForceDetected, base_time() + Duration::seconds(1))
            .unwrap()
            .is_none());
        assert!(store
            .find_active_alert("a@x.com", AlertType::NewDevice, base_time())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_status_update_is_conditional() {
        let store = create_test_store();
        let id = store
            .insert_alert(&sample_alert("a@x.com", AlertType::NewDevice, 1, 0))
            .unwrap();
        let admin = AccountRef::new(UserType::Admin, "7");
        let change = StatusChange {
            status: AlertStatus::Resolved,
            resolved_by: Some(admin.clone()),
            resolved_at: Some(base_time()),
            notes: Some("known travel".to_string()),
            updated_at: base_time(),
        };

        assert!(store.update_alert_status(id, AlertStatus::Open, &change).unwrap());
        // Status already moved, so the same expectation no longer matches
        assert!(!store.update_alert_status(id, AlertStatus::Open, &change).unwrap());

        let stored = store.get_alert(id).unwrap().unwrap();
        assert_eq!(stored.status, AlertStatus::Resolved);
        assert_eq!(stored.resolved_by, Some(admin));
        assert_eq!(stored.notes.as_deref(), Some("known travel"));

        assert!(store
            .find_active_alert("a@x.com", AlertType::NewDevice, base_time())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_refresh_alert_evidence() {
        let store = create_test_store();
        let id = store
            .insert_alert(&sample_alert("a@x.com", AlertType::BruteForceDetected, 1, 0))
            .unwrap();
        let details = vec![Evidence::RiskScore(60), Evidence::RepeatCount(2)];

        store
            .refresh_alert_evidence(id, &details, 2, base_time() + Duration::seconds(30))
            .unwrap();

        let stored = store.get_alert(id).unwrap().unwrap();
        assert_eq!(stored.details, details);
        assert_eq!(stored.login_attempt_id, 2);
        assert_eq!(stored.repeat_count(), 2);
        assert_eq!(stored.created_at, base_time());
    }

    #[test]
    fn test_query_alerts_filters() {
        let store = create_test_store();
        store.insert_alert(&sample_alert("a@x.com", AlertType::NewDevice, 1, 0)).unwrap();
        let mut low = sample_alert("b@x.com", AlertType::UnusualTime, 2, 10);
        low.severity = AlertSeverity::Low;
        store.insert_alert(&low).unwrap();

        let high = store
            .query_alerts(&AlertQuery { severity: Some(AlertSeverity::High), ..Default::default() })
            .unwrap();
        assert_eq!(high.len(), 1);
        assert_eq!(high[0].alert_type, AlertType::NewDevice);

        let open = store
            .query_alerts(&AlertQuery { status: Some(AlertStatus::Open), ..Default::default() })
            .unwrap();
        assert_eq!(open.len(), 2);
        assert_eq!(open[0].email, "b@x.com");
    }

    #[test]
    fn test_prune_old_data() {
        let store = create_test_store();
        store.insert_attempt(&failed("a@x.com", "1.1.1.1", 0)).unwrap();
        store.insert_attempt(&failed("a@x.com", "1.1.1.1", 5000)).unwrap();

        let open_id = store
            .insert_alert(&sample_alert("a@x.com", AlertType::BruteForceDetected, 1, 0))
            .unwrap();
        let mut closed = sample_alert("a@x.com", AlertType::NewDevice, 1, 0);
        closed.status = AlertStatus::FalsePositive;
        closed.resolved_by = Some(AccountRef::new(UserType::Admin, "1"));
        closed.resolved_at = Some(base_time());
        store.insert_alert(&closed).unwrap();

        let deleted = store.prune_old_data(base_time() + Duration::seconds(3000)).unwrap();
        assert_eq!(deleted, 2);

        let attempts = store.query_attempts(&AttemptQuery::default()).unwrap();
        assert_eq!(attempts.len(), 1);
        let alerts = store.query_alerts(&AlertQuery::default()).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].id, open_id);
    }

    #[test]
    fn test_clear_all() {
        let store = create_test_store();
        store.insert_attempt(&failed("a@x.com", "1.1.1.1", 0)).unwrap();
        store.insert_alert(&sample_alert("a@x.com", AlertType::NewDevice, 1, 0)).unwrap();

        store.clear_all().unwrap();

        assert!(store.query_attempts(&AttemptQuery::default()).unwrap().is_empty());
        assert!(store.query_alerts(&AlertQuery::default()).unwrap().is_empty());
    }

    #[test]
    fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sentry.db");

        let id = {
            let store = SqliteSecurityStore::new(&path).unwrap();
            store.insert_attempt(&failed("a@x.com", "1.1.1.1", 0)).unwrap()
        };

        let reopened = SqliteSecurityStore::new(&path).unwrap();
        assert!(reopened.get_attempt(id).unwrap().is_some());
    }
}
