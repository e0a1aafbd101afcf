//! Repeated failures against one account

use crate::config::ScoringConfig;
use crate::models::{Evidence, LoginAttempt, RiskFactor, RiskFactorKind};

use super::AttemptHistory;

/// Consecutive failures for the account ending at `attempt`
///
/// Counts backwards through the email window until the first success,
/// then adds the attempt itself when it failed.
pub fn failure_streak(attempt: &LoginAttempt, history: &AttemptHistory) -> u32 {
    let prior = history
        .email_window
        .iter()
        .rev()
        .take_while(|a| !a.success)
        .count() as u32;
    prior + u32::from(!attempt.success)
}

/// Fire at the highest configured tier the failure streak reaches
///
/// A success right after a streak still fires; the alert generator reads
/// that combination as a likely takeover.
pub fn check_velocity(
    attempt: &LoginAttempt,
    history: &AttemptHistory,
    config: &ScoringConfig,
) -> Option<RiskFactor> {
    let streak = failure_streak(attempt, history);
    let tier = config
        .velocity_tiers
        .iter()
        .filter(|tier| streak >= tier.failures)
        .max_by_key(|tier| tier.failures)?;

    let description = if attempt.success {
        format!("Successful login after {} consecutive failed attempts", streak)
    } else {
        format!(
            "{} consecutive failed attempts within {} minutes",
            streak,
            config.window_seconds / 60
        )
    };

    Some(
        RiskFactor::new(RiskFactorKind::Velocity, tier.severity, tier.points, description)
            .with_evidence(Evidence::FailureStreak(streak)),
    )
}
