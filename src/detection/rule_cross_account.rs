//! One IP trying many accounts (credential stuffing)

use std::collections::BTreeSet;

use crate::config::ScoringConfig;
use crate::models::{Evidence, LoginAttempt, RiskFactor, RiskFactorKind, RiskSeverity};

use super::AttemptHistory;

pub fn check_cross_account(
    attempt: &LoginAttempt,
    history: &AttemptHistory,
    config: &ScoringConfig,
) -> Option<RiskFactor> {
    let mut emails: BTreeSet<&str> = history.ip_window.iter().map(|a| a.email.as_str()).collect();
    emails.insert(attempt.email.as_str());

    let distinct = emails.len();
    if distinct < config.distinct_email_threshold {
        return None;
    }

    Some(
        RiskFactor::new(
            RiskFactorKind::CrossAccount,
            RiskSeverity::High,
            config.cross_account_points,
            format!(
                "IP {} attempted {} distinct accounts within {} minutes",
                attempt.ip_address,
                distinct,
                config.window_seconds / 60
            ),
        )
        .with_evidence(Evidence::DistinctEmails(distinct as u32)),
    )
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;

    #[test]
    fn test_same_account_repeated() {
        let config = ScoringConfig::default();
        let window: Vec<_> = (0..6).map(|i| failure("a@x.com", "9.9.9.9", i)).collect();
        let h = AttemptHistory::new(Vec::new(), window, Vec::new());
        assert!(check_cross_account(&failure("a@x.com", "9.9.9.9", 10), &h, &config).is_none());
    }

    #[test]
    fn test_threshold_counts_current_attempt() {
        let config = ScoringConfig::default();
        let window = vec![failure("a@x.com", "9.9.9.9", 0), failure("b@x.com", "9.9.9.9", 5)];
        let h = AttemptHistory::new(Vec::new(), window, Vec::new());

        let factor = check_cross_account(&failure("c@x.com", "9.9.9.9", 10), &h, &config).unwrap();
        assert_eq!(factor.severity, RiskSeverity::High);
        assert_eq!(factor.evidence, Some(Evidence::DistinctEmails(3)));

        assert!(check_cross_account(&failure("a@x.com", "9.9.9.9", 10), &h, &config).is_none());
    }
}
