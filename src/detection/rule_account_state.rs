//! Attempts against accounts that cannot log in

use crate::config::ScoringConfig;
use crate::models::{FailureReason, LoginAttempt, RiskFactor, RiskFactorKind, RiskSeverity};

use super::AttemptHistory;

pub fn check_account_state(
    attempt: &LoginAttempt,
    _history: &AttemptHistory,
    config: &ScoringConfig,
) -> Option<RiskFactor> {
    let state = match attempt.failure_reason? {
        FailureReason::AccountSuspended => "suspended",
        FailureReason::AccountPending => "pending approval",
        _ => return None,
    };

    Some(RiskFactor::new(
        RiskFactorKind::AccountState,
        RiskSeverity::Low,
        config.account_state_points,
        format!("Login attempted on a {} account", state),
    ))
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;

    #[test]
    fn test_suspended_and_pending() {
        let config = ScoringConfig::default();
        let h = AttemptHistory::default();

        let suspended = failure_with("a@x.com", "1.1.1.1", 0, FailureReason::AccountSuspended);
        let factor = check_account_state(&suspended, &h, &config).unwrap();
        assert_eq!(factor.points, config.account_state_points);
        assert!(factor.description.contains("suspended"));

        let pending = failure_with("a@x.com", "1.1.1.1", 0, FailureReason::AccountPending);
        assert!(check_account_state(&pending, &h, &config).is_some());
    }

    #[test]
    fn test_other_outcomes() {
        let config = ScoringConfig::default();
        let h = AttemptHistory::default();
        assert!(check_account_state(&failure("a@x.com", "1.1.1.1", 0), &h, &config).is_none());
        assert!(check_account_state(&success("a@x.com", "1.1.1.1", 0), &h, &config).is_none());
    }
}
