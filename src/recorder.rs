//! Attempt recording
//!
//! Every authentication call hands its outcome to [`AttemptRecorder::record`],
//! which validates it, stores it, scores it against recent history and writes
//! the score back before returning. Only validation and a repeated insert
//! failure surface as errors; scoring problems degrade to a zero score.

use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use regex::Regex;
use thiserror::Error;

use crate::detection::{AttemptHistory, RiskScorer, ScoringOutcome};
use crate::geolocation::GeoResolver;
use crate::models::{AttemptInput, LoginAttempt};
use crate::persistence::{SecurityStore, StorageError};

const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(50);

static EMAIL_PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

/// Errors returned from recording an attempt
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Invalid attempt: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Normalize the email, check the success/failure_reason pairing and drop
/// out-of-range coordinates
pub fn validate(mut input: AttemptInput) -> Result<AttemptInput, RecordError> {
    input.email = input.email.trim().to_lowercase();
    if input.email.is_empty() {
        return Err(RecordError::Validation("email is empty".to_string()));
    }

    let pattern = EMAIL_PATTERN
        .get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+$"))
        .as_ref()
        .map_err(|e| RecordError::Validation(format!("email pattern: {}", e)))?;
    if !pattern.is_match(&input.email) {
        return Err(RecordError::Validation(format!(
            "'{}' is not an email address",
            input.email
        )));
    }

    match (input.success, input.failure_reason) {
        (true, Some(reason)) => Err(RecordError::Validation(format!(
            "successful attempt carries failure reason '{}'",
            reason
        ))),
        (false, None) => Err(RecordError::Validation(
            "failed attempt has no failure reason".to_string(),
        )),
        _ => {
            if let Some(location) = input.location.as_mut() {
                location.discard_invalid_coordinates();
            }
            Ok(input)
        }
    }
}

/// Persists attempts and annotates them with a risk score
pub struct AttemptRecorder {
    store: Arc<dyn SecurityStore>,
    scorer: RiskScorer,
    geo: Option<Arc<dyn GeoResolver>>,
    retry_backoff: Duration,
}

impl AttemptRecorder {
    pub fn new(store: Arc<dyn SecurityStore>, scorer: RiskScorer) -> Self {
        AttemptRecorder {
            store,
            scorer,
            geo: None,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    /// Resolve locations for attempts that arrive without one
    pub fn with_geo_resolver(mut self, geo: Arc<dyn GeoResolver>) -> Self {
        self.geo = Some(geo);
        self
    }

    /// Pause before the single insert retry
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Record one authentication attempt and return it with its risk fields
    pub fn record(&self, input: AttemptInput) -> Result<LoginAttempt, RecordError> {
        let input = validate(input)?;
        let mut attempt = LoginAttempt::pending(input);

        if attempt.location.is_none() {
            if let Some(geo) = &self.geo {
                attempt.location = geo.resolve(&attempt.ip_address).map(|mut location| {
                    location.discard_invalid_coordinates();
                    location
                });
            }
        }

        attempt.id = self.insert_with_retry(&attempt)?;

        let assessment = self.assess(&attempt).into_assessment();
        let now = Utc::now().max(attempt.created_at);

        if let Err(e) =
            self.store
                .update_attempt_risk(attempt.id, assessment.score, &assessment.factors, now)
        {
            log::error!(
                "Failed to store risk score for attempt {}: {}",
                attempt.id,
                e
            );
        }

        attempt.risk_score = assessment.score;
        attempt.risk_factors = assessment.factors;
        attempt.updated_at = now;

        if attempt.risk_score > 0 {
            log::info!(
                "Attempt {} for '{}' from {} scored {}",
                attempt.id,
                attempt.email,
                attempt.ip_address,
                attempt.risk_score
            );
        }

        Ok(attempt)
    }

    fn insert_with_retry(&self, attempt: &LoginAttempt) -> Result<i64, StorageError> {
        match self.store.insert_attempt(attempt) {
            Ok(id) => Ok(id),
            Err(e) => {
                log::warn!(
                    "Insert of attempt for '{}' failed ({}), retrying in {:?}",
                    attempt.email,
                    e,
                    self.retry_backoff
                );
                thread::sleep(self.retry_backoff);
                self.store.insert_attempt(attempt)
            }
        }
    }

    /// Load history and score, falling back to a degraded result when the
    /// lookup fails or runs past the configured budget
    pub fn assess(&self, attempt: &LoginAttempt) -> ScoringOutcome {
        let budget = Duration::from_millis(self.scorer.config().history_budget_ms);
        let started = Instant::now();

        let history = match self.history_for(attempt) {
            Ok(history) => history,
            Err(e) => {
                log::warn!("History lookup for attempt {} failed: {}", attempt.id, e);
                return ScoringOutcome::Degraded {
                    reason: format!("history lookup failed: {}", e),
                };
            }
        };

        let elapsed = started.elapsed();
        if elapsed > budget {
            log::warn!(
                "History lookup for attempt {} took {:?} (budget {:?})",
                attempt.id,
                elapsed,
                budget
            );
            return ScoringOutcome::Degraded {
                reason: format!(
                    "history lookup took {} ms, over the {} ms budget",
                    elapsed.as_millis(),
                    budget.as_millis()
                ),
            };
        }

        ScoringOutcome::Scored(self.scorer.score(attempt, &history))
    }

    /// Windowed history and baseline for an attempt, excluding the attempt
    pub fn history_for(&self, attempt: &LoginAttempt) -> Result<AttemptHistory, StorageError> {
        let config = self.scorer.config();
        let end = attempt.created_at;
        let start = end - chrono::Duration::seconds(config.window_seconds);

        let email_window = self.store.email_attempts_between(&attempt.email, start, end)?;
        let ip_window = self.store.ip_attempts_between(&attempt.ip_address, start, end)?;
        // One extra so the baseline stays full once the attempt itself is dropped
        let baseline =
            self.store
                .recent_successful_logins(&attempt.email, end, config.baseline_size + 1)?;

        let mut history =
            AttemptHistory::new(email_window, ip_window, baseline).excluding(attempt.id);
        let excess = history.baseline.len().saturating_sub(config.baseline_size);
        history.baseline.drain(..excess);

        Ok(history)
    }
}
