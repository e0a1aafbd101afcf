//! Risk scoring for login attempts
//!
//! Each heuristic is a pure function over the attempt and its recent
//! history. The scorer runs them in order, keeps every factor that fired
//! and sums their points into a score clamped to 0-100.

pub mod rule_account_state;
pub mod rule_cross_account;
pub mod rule_geo_velocity;
pub mod rule_new_device;
pub mod rule_new_location;
pub mod rule_unusual_time;
pub mod rule_velocity;

#[cfg(test)]
pub(crate) mod fixtures;

pub use rule_geo_velocity::haversine_distance;
pub use rule_velocity::failure_streak;

use serde::{Deserialize, Serialize};

use crate::config::ScoringConfig;
use crate::models::{LoginAttempt, RiskFactor, RiskFactorKind, RiskSeverity};

/// Recent attempts the heuristics look at
///
/// All three sequences are oldest first and never contain the attempt
/// being scored.
#[derive(Debug, Clone, Default)]
pub struct AttemptHistory {
    /// Same email, inside the trailing window
    pub email_window: Vec<LoginAttempt>,
    /// Same IP, inside the trailing window
    pub ip_window: Vec<LoginAttempt>,
    /// The account's most recent successful logins, any age
    pub baseline: Vec<LoginAttempt>,
}

impl AttemptHistory {
    pub fn new(
        email_window: Vec<LoginAttempt>,
        ip_window: Vec<LoginAttempt>,
        baseline: Vec<LoginAttempt>,
    ) -> Self {
        AttemptHistory {
            email_window,
            ip_window,
            baseline,
        }
    }

    /// Drop the attempt with `id` from every sequence
    pub fn excluding(mut self, id: i64) -> Self {
        self.email_window.retain(|a| a.id != id);
        self.ip_window.retain(|a| a.id != id);
        self.baseline.retain(|a| a.id != id);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.email_window.is_empty() && self.ip_window.is_empty() && self.baseline.is_empty()
    }
}

/// A single heuristic: returns a factor when its pattern is present
pub type Heuristic = fn(&LoginAttempt, &AttemptHistory, &ScoringConfig) -> Option<RiskFactor>;

/// The heuristic set applied by default, in reporting order
pub fn default_heuristics() -> Vec<Heuristic> {
    vec![
        rule_velocity::check_velocity as Heuristic,
        rule_new_device::check_new_device,
        rule_new_location::check_new_location,
        rule_geo_velocity::check_impossible_travel,
        rule_unusual_time::check_unusual_time,
        rule_cross_account::check_cross_account,
        rule_account_state::check_account_state,
    ]
}

/// Scorer output for one attempt
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub score: u8,
    pub factors: Vec<RiskFactor>,
}

impl RiskAssessment {
    /// Zero score with a note that history was unavailable
    pub fn degraded(reason: &str) -> Self {
        RiskAssessment {
            score: 0,
            factors: vec![RiskFactor::new(
                RiskFactorKind::DegradedScoring,
                RiskSeverity::Low,
                0,
                format!("Risk scoring skipped: {}", reason),
            )],
        }
    }
}

/// Result of trying to score an attempt on the recording path
#[derive(Debug, Clone, PartialEq)]
pub enum ScoringOutcome {
    Scored(RiskAssessment),
    /// History could not be read in time; the attempt keeps score 0
    Degraded { reason: String },
}

impl ScoringOutcome {
    pub fn into_assessment(self) -> RiskAssessment {
        match self {
            ScoringOutcome::Scored(assessment) => assessment,
            ScoringOutcome::Degraded { reason } => RiskAssessment::degraded(&reason),
        }
    }
}

/// Combines the heuristics into a single risk score
pub struct RiskScorer {
    config: ScoringConfig,
    heuristics: Vec<Heuristic>,
}

impl RiskScorer {
    /// Create a scorer running the default heuristics
    pub fn new(config: ScoringConfig) -> Self {
        Self::with_heuristics(config, default_heuristics())
    }

    /// Create a scorer running a custom heuristic list
    pub fn with_heuristics(config: ScoringConfig, heuristics: Vec<Heuristic>) -> Self {
        RiskScorer { config, heuristics }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score an attempt against its recent history
    ///
    /// Deterministic: "now" is the attempt's own timestamp, so the same
    /// attempt and history always give the same result. An attempt with
    /// no history at all scores 0 with no factors.
    pub fn score(&self, attempt: &LoginAttempt, history: &AttemptHistory) -> RiskAssessment {
        if history.is_empty() {
            return RiskAssessment::default();
        }

        let factors: Vec<RiskFactor> = self
            .heuristics
            .iter()
            .filter_map(|heuristic| heuristic(attempt, history, &self.config))
            .collect();

        let total: u32 = factors.iter().map(|f| u32::from(f.points)).sum();
        let score = total.min(100) as u8;

        log::debug!(
            "Scored attempt for '{}' from {}: {} ({} factor(s))",
            attempt.email,
            attempt.ip_address,
            score,
            factors.len()
        );

        RiskAssessment { score, factors }
    }
}

impl Default for RiskScorer {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}
