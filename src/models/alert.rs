//! Security alert records and their lifecycle states.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccountRef, Evidence, UserType};

/// Kind of suspicious pattern an alert reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    MultipleFailedAttempts,
    SuspiciousLocation,
    UnusualTime,
    NewDevice,
    BruteForceDetected,
    AccountTakeoverAttempt,
    HighRiskLogin,
}

named_enum!(AlertType, "alert type", {
    MultipleFailedAttempts => "multiple_failed_attempts",
    SuspiciousLocation => "suspicious_location",
    UnusualTime => "unusual_time",
    NewDevice => "new_device",
    BruteForceDetected => "brute_force_detected",
    AccountTakeoverAttempt => "account_takeover_attempt",
    HighRiskLogin => "high_risk_login",
});

/// Alert severity, ordered from least to most urgent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

named_enum!(AlertSeverity, "alert severity", {
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

impl AlertSeverity {
    /// Map a 0-100 risk score onto a severity band
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=39 => AlertSeverity::Low,
            40..=69 => AlertSeverity::Medium,
            70..=89 => AlertSeverity::High,
            _ => AlertSeverity::Critical,
        }
    }
}

/// Triage state of an alert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    #[default]
    Open,
    Investigating,
    Resolved,
    FalsePositive,
}

named_enum!(AlertStatus, "alert status", {
    Open => "open",
    Investigating => "investigating",
    Resolved => "resolved",
    FalsePositive => "false_positive",
});

impl AlertStatus {
    /// Resolved and false-positive alerts never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, AlertStatus::Resolved | AlertStatus::FalsePositive)
    }

    /// Open and investigating alerts absorb repeated signals
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Statuses only move forward: open -> investigating -> terminal
    pub fn can_transition_to(&self, next: AlertStatus) -> bool {
        matches!(
            (self, next),
            (AlertStatus::Open, AlertStatus::Investigating)
                | (AlertStatus::Open, AlertStatus::Resolved)
                | (AlertStatus::Open, AlertStatus::FalsePositive)
                | (AlertStatus::Investigating, AlertStatus::Resolved)
                | (AlertStatus::Investigating, AlertStatus::FalsePositive)
        )
    }
}

/// A persisted security alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityAlert {
    pub id: i64,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub email: String,
    pub user_type: UserType,
    pub user_id: Option<AccountRef>,
    pub ip_address: IpAddr,
    pub description: String,
    pub details: Vec<Evidence>,
    pub login_attempt_id: i64,
    pub status: AlertStatus,
    pub resolved_by: Option<AccountRef>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SecurityAlert {
    /// How many qualifying attempts this alert has absorbed, itself included
    pub fn repeat_count(&self) -> u32 {
        self.details
            .iter()
            .find_map(|d| match d {
                Evidence::RepeatCount(n) => Some(*n),
                _ => None,
            })
            .unwrap_or(1)
    }
}
