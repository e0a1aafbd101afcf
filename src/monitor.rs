//! Entry point for the authentication flow
//!
//! [`LoginMonitor`] wires the recorder, the alert generator and the
//! notification queue together behind two calls: `observe` after every
//! authentication attempt and `should_block` before one.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::alerting::{AlertGenerator, AlertLifecycle, AlertOutcome, AlertQueue};
use crate::config::{AlertPolicyConfig, Config};
use crate::detection::RiskScorer;
use crate::geolocation::GeoResolver;
use crate::models::{AlertType, AttemptInput, LoginAttempt};
use crate::persistence::SecurityStore;
use crate::recorder::AttemptRecorder;

/// Result of observing one authentication attempt
#[derive(Debug, Clone)]
pub struct Observation {
    pub attempt: LoginAttempt,
    pub alert: Option<AlertOutcome>,
}

pub struct LoginMonitor {
    store: Arc<dyn SecurityStore>,
    recorder: AttemptRecorder,
    generator: AlertGenerator,
    lifecycle: AlertLifecycle,
    policy: AlertPolicyConfig,
    window_seconds: i64,
    queue: Option<AlertQueue>,
}

impl LoginMonitor {
    pub fn new(store: Arc<dyn SecurityStore>, config: &Config) -> Self {
        let recorder = AttemptRecorder::new(store.clone(), RiskScorer::new(config.scoring.clone()))
            .with_retry_backoff(std::time::Duration::from_millis(config.storage.retry_backoff_ms));

        LoginMonitor {
            recorder,
            generator: AlertGenerator::new(store.clone(), config.alerting.clone()),
            lifecycle: AlertLifecycle::new(store.clone()),
            policy: config.alerting.clone(),
            window_seconds: config.scoring.window_seconds,
            queue: None,
            store,
        }
    }

    pub fn with_geo_resolver(mut self, geo: Arc<dyn GeoResolver>) -> Self {
        self.recorder = self.recorder.with_geo_resolver(geo);
        self
    }

    /// Send newly created alerts to the notification dispatcher
    pub fn with_alert_queue(mut self, queue: AlertQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn recorder(&self) -> &AttemptRecorder {
        &self.recorder
    }

    pub fn lifecycle(&self) -> &AlertLifecycle {
        &self.lifecycle
    }

    /// Record an attempt and raise or refresh an alert for it
    ///
    /// Never fails the caller. Attempts that cannot be recorded are
    /// logged and yield `None`; a failing alert write still returns the
    /// recorded attempt.
    pub fn observe(&self, input: AttemptInput) -> Option<Observation> {
        let attempt = match self.recorder.record(input) {
            Ok(attempt) => attempt,
            Err(e) => {
                log::warn!("Login attempt not recorded: {}", e);
                return None;
            }
        };

        let alert = match self.generator.evaluate(&attempt) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("Alert evaluation for attempt {} failed: {}", attempt.id, e);
                None
            }
        };

        if let (Some(queue), Some(AlertOutcome::Created(created))) = (&self.queue, &alert) {
            if queue.queue_alert(created.clone()).is_err() {
                log::debug!("Notification for alert {} not queued", created.id);
            }
        }

        Some(Observation { attempt, alert })
    }

    /// Pre-authentication check: should this login be refused outright
    ///
    /// True once the account's failure streak in the scoring window reaches
    /// `block_after_failures`, or while a brute-force or takeover alert for
    /// it is active. Storage problems answer `false`.
    pub fn should_block(&self, email: &str, now: DateTime<Utc>) -> bool {
        let email = email.trim().to_lowercase();

        let window_start = now - Duration::seconds(self.window_seconds);
        let streak = match self.store.email_attempts_between(&email, window_start, now) {
            Ok(attempts) => attempts.iter().rev().take_while(|a| !a.success).count() as u32,
            Err(e) => {
                log::warn!("Block check for '{}' skipped: {}", email, e);
                return false;
            }
        };
        if streak >= self.policy.block_after_failures {
            log::info!("Blocking '{}' after {} consecutive failures", email, streak);
            return true;
        }

        let since = now - Duration::seconds(self.policy.dedup_window_seconds);
        for alert_type in [AlertType::BruteForceDetected, AlertType::AccountTakeoverAttempt] {
            match self.store.find_active_alert(&email, alert_type, since) {
                Ok(Some(alert)) => {
                    log::info!("Blocking '{}': alert {} ({}) is active", email, alert.id, alert_type);
                    return true;
                }
                Ok(None) => {}
                Err(e) => {
                    log::warn!("Block check for '{}' skipped: {}", email, e);
                    return false;
                }
            }
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::AlertDispatcher;
    use crate::models::{
        AccountRef, AlertStatus, FailureReason, RiskFactorKind, RiskSeverity, UserType,
    };
    use crate::persistence::flaky_store::FlakyStore;
    use crate::persistence::SqliteSecurityStore;
    use chrono::TimeZone;

    fn at(offset_secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::seconds(offset_secs)
    }

    fn failed(email: &str, offset_secs: i64) -> AttemptInput {
        AttemptInput::failure(
            email,
            UserType::Buyer,
            FailureReason::InvalidPassword,
            "6.6.6.6".parse().unwrap(),
            at(offset_secs),
        )
    }

    fn monitor(config: &Config) -> LoginMonitor {
        let store = Arc::new(SqliteSecurityStore::in_memory().unwrap());
        LoginMonitor::new(store, config)
    }

    #[test]
    fn test_observe_invalid_input() {
        let monitor = monitor(&Config::default());
        let mut input = failed("a@x.com", 0);
        input.failure_reason = None;
        assert!(monitor.observe(input).is_none());
    }

    #[test]
    fn test_observe_queues_new_alerts_only() {
        let (tx, mut rx) = AlertDispatcher::create_channel();
        let monitor = monitor(&Config::default()).with_alert_queue(AlertQueue::new(tx));

        let mut outcomes = Vec::new();
        for i in 0..7 {
            let observation = monitor.observe(failed("a@x.com", i * 10)).unwrap();
            outcomes.extend(observation.alert);
        }

        // Failures 5, 6 and 7 qualify as brute force; one alert absorbs them
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].is_created());
        assert!(outcomes[1..].iter().all(|o| !o.is_created()));

        let queued = rx.try_recv().unwrap();
        assert_eq!(queued.alert_type, AlertType::BruteForceDetected);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_block_after_failure_streak() {
        let config = Config {
            alerting: AlertPolicyConfig {
                block_after_failures: 3,
                ..AlertPolicyConfig::default()
            },
            ..Config::default()
        };
        let monitor = monitor(&config);

        monitor.observe(failed("a@x.com", 0)).unwrap();
        monitor.observe(failed("a@x.com", 10)).unwrap();
        assert!(!monitor.should_block("a@x.com", at(20)));

        monitor.observe(failed("a@x.com", 20)).unwrap();
        assert!(monitor.should_block("A@X.com", at(30)));
        assert!(!monitor.should_block("b@x.com", at(30)));

        // Outside the scoring window the streak no longer counts
        assert!(!monitor.should_block("a@x.com", at(20 + 1801)));
    }

    #[test]
    fn test_block_on_active_brute_force() {
        let monitor = monitor(&Config::default());

        let mut alert_id = None;
        for i in 0..5 {
            let observation = monitor.observe(failed("a@x.com", i * 10)).unwrap();
            if let Some(outcome) = observation.alert {
                alert_id = Some(outcome.alert().id);
            }
        }
        let alert_id = alert_id.expect("brute force alert");
        assert!(monitor.should_block("a@x.com", at(60)));

        monitor
            .lifecycle()
            .transition(alert_id, AlertStatus::Resolved, &AccountRef::new(UserType::Admin, "1"), None)
            .unwrap();
        assert!(!monitor.should_block("a@x.com", at(60 + 1801)));
    }

    #[test]
    fn test_block_check_fails_open() {
        let store = Arc::new(FlakyStore::new().broken_history());
        let monitor = LoginMonitor::new(store, &Config::default());
        assert!(!monitor.should_block("a@x.com", at(0)));
    }

    #[test]
    fn test_alert_failure_keeps_attempt() {
        let store = Arc::new(FlakyStore::new().broken_alerts());
        let monitor = LoginMonitor::new(store.clone(), &Config::default());

        let mut last = None;
        for i in 0..5 {
            let observation = monitor.observe(failed("a@x.com", i * 10)).unwrap();
            assert!(observation.alert.is_none());
            last = Some(observation.attempt);
        }
        let fifth = last.unwrap();

        let velocity = fifth.factor(RiskFactorKind::Velocity).expect("velocity factor");
        assert_eq!(velocity.severity, RiskSeverity::High);
        assert!(fifth.risk_score >= 40);
        assert_eq!(store.get_attempt(fifth.id).unwrap().unwrap().risk_score, fifth.risk_score);
    }
}
