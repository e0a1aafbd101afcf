//! Turns scored attempts into security alerts

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::config::AlertPolicyConfig;
use crate::models::{
    AlertSeverity, AlertStatus, AlertType, Evidence, LoginAttempt, RiskFactor, RiskFactorKind,
    RiskSeverity, SecurityAlert,
};
use crate::persistence::SecurityStore;

use super::AlertError;

/// What `evaluate` did with a qualifying attempt
#[derive(Debug, Clone, PartialEq)]
pub enum AlertOutcome {
    /// A new alert was stored
    Created(SecurityAlert),
    /// An active alert for the same account and type absorbed the attempt
    Updated(SecurityAlert),
}

impl AlertOutcome {
    pub fn alert(&self) -> &SecurityAlert {
        match self {
            AlertOutcome::Created(alert) | AlertOutcome::Updated(alert) => alert,
        }
    }

    pub fn into_alert(self) -> SecurityAlert {
        match self {
            AlertOutcome::Created(alert) | AlertOutcome::Updated(alert) => alert,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, AlertOutcome::Created(_))
    }
}

/// Decides whether an attempt warrants an alert and stores it
pub struct AlertGenerator {
    store: Arc<dyn SecurityStore>,
    policy: AlertPolicyConfig,
}

impl AlertGenerator {
    pub fn new(store: Arc<dyn SecurityStore>, policy: AlertPolicyConfig) -> Self {
        AlertGenerator { store, policy }
    }

    /// Pick the alert type for a scored attempt; first matching rule wins
    ///
    /// Degraded-scoring notes never count as evidence.
    pub fn classify(&self, attempt: &LoginAttempt) -> Option<AlertType> {
        let factors: Vec<&RiskFactor> = attempt
            .risk_factors
            .iter()
            .filter(|f| f.factor != RiskFactorKind::DegradedScoring)
            .collect();
        let has = |kind: RiskFactorKind| factors.iter().any(|f| f.factor == kind);

        if let Some(velocity) = factors.iter().find(|f| f.factor == RiskFactorKind::Velocity) {
            if attempt.success {
                return Some(AlertType::AccountTakeoverAttempt);
            }
            if velocity.severity == RiskSeverity::High {
                return Some(AlertType::BruteForceDetected);
            }
        }

        if attempt.success {
            if has(RiskFactorKind::NewLocation) || has(RiskFactorKind::ImpossibleTravel) {
                return Some(AlertType::SuspiciousLocation);
            }
            if has(RiskFactorKind::NewDevice) {
                return Some(AlertType::NewDevice);
            }
        }

        if factors.len() == 1 && has(RiskFactorKind::UnusualTime) {
            return Some(AlertType::UnusualTime);
        }

        if attempt.risk_score >= self.policy.high_risk_threshold {
            return Some(AlertType::HighRiskLogin);
        }

        if factors.len() >= 2 && attempt.risk_score >= self.policy.medium_risk_threshold {
            return Some(AlertType::MultipleFailedAttempts);
        }

        None
    }

    /// Store or refresh an alert for a scored attempt
    ///
    /// Returns `None` when the attempt does not qualify. A qualifying
    /// attempt costs exactly one write: an insert, or an evidence refresh
    /// of the active alert for the same email and type inside the dedup
    /// window.
    pub fn evaluate(&self, attempt: &LoginAttempt) -> Result<Option<AlertOutcome>, AlertError> {
        let alert_type = match self.classify(attempt) {
            Some(alert_type) => alert_type,
            None => return Ok(None),
        };

        let since = attempt.created_at - Duration::seconds(self.policy.dedup_window_seconds);
        let active = self
            .store
            .find_active_alert(&attempt.email, alert_type, since)?
            .filter(|alert| alert.status.is_active());
        if let Some(existing) = active {
            let details = alert_details(attempt, existing.repeat_count() + 1);
            let now = Utc::now().max(attempt.created_at);
            self.store
                .refresh_alert_evidence(existing.id, &details, attempt.id, now)?;

            log::info!(
                "Alert {} ({}) for '{}' absorbed attempt {}",
                existing.id,
                alert_type,
                attempt.email,
                attempt.id
            );

            return Ok(Some(AlertOutcome::Updated(SecurityAlert {
                details,
                login_attempt_id: attempt.id,
                updated_at: now,
                ..existing
            })));
        }

        let mut severity = AlertSeverity::from_score(attempt.risk_score);
        if alert_type == AlertType::AccountTakeoverAttempt {
            severity = severity.max(AlertSeverity::High);
        }

        let mut alert = SecurityAlert {
            id: 0,
            alert_type,
            severity,
            email: attempt.email.clone(),
            user_type: attempt.user_type,
            user_id: attempt.user_id.clone(),
            ip_address: attempt.ip_address,
            description: describe(alert_type, attempt),
            details: alert_details(attempt, 1),
            login_attempt_id: attempt.id,
            status: AlertStatus::Open,
            resolved_by: None,
            resolved_at: None,
            notes: None,
            created_at: attempt.created_at,
            updated_at: attempt.created_at,
        };
        alert.id = self.store.insert_alert(&alert)?;

        log::warn!(
            "New {} alert {} ({}) for '{}' from {}",
            alert.severity,
            alert.id,
            alert.alert_type,
            alert.email,
            alert.ip_address
        );

        Ok(Some(AlertOutcome::Created(alert)))
    }
}

/// Score, contributing factors, each factor's evidence and the repeat count
fn alert_details(attempt: &LoginAttempt, repeat_count: u32) -> Vec<Evidence> {
    let factors: Vec<&RiskFactor> = attempt
        .risk_factors
        .iter()
        .filter(|f| f.factor != RiskFactorKind::DegradedScoring)
        .collect();

    let mut details = vec![
        Evidence::RiskScore(attempt.risk_score),
        Evidence::Factors(factors.iter().map(|f| f.factor).collect()),
    ];
    details.extend(factors.iter().filter_map(|f| f.evidence.clone()));
    details.push(Evidence::RepeatCount(repeat_count));
    details
}

fn describe(alert_type: AlertType, attempt: &LoginAttempt) -> String {
    let headline = match alert_type {
        AlertType::AccountTakeoverAttempt => format!(
            "Successful login for {} from {} right after repeated failures",
            attempt.email, attempt.ip_address
        ),
        AlertType::BruteForceDetected => format!(
            "Brute force against {} from {}",
            attempt.email, attempt.ip_address
        ),
        AlertType::SuspiciousLocation => format!(
            "Login for {} from {}",
            attempt.email,
            attempt
                .location
                .as_ref()
                .map(|l| l.display())
                .unwrap_or_else(|| attempt.ip_address.to_string())
        ),
        AlertType::NewDevice => format!(
            "Login for {} from a new device at {}",
            attempt.email, attempt.ip_address
        ),
        AlertType::UnusualTime => format!("Login for {} at an unusual hour", attempt.email),
        AlertType::HighRiskLogin => format!(
            "High risk login attempt for {} (score {})",
            attempt.email, attempt.risk_score
        ),
        AlertType::MultipleFailedAttempts => format!(
            "Multiple risk signals for {} (score {})",
            attempt.email, attempt.risk_score
        ),
    };

    let reasons: Vec<&str> = attempt
        .risk_factors
        .iter()
        .filter(|f| f.factor != RiskFactorKind::DegradedScoring)
        .map(|f| f.description.as_str())
        .collect();

    if reasons.is_empty() {
        headline
    } else {
        format!("{}: {}", headline, reasons.join("; "))
    }
}
