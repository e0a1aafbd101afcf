//! Logins from a country the account has not logged in from

use std::collections::BTreeSet;

use crate::config::ScoringConfig;
use crate::models::{Evidence, LoginAttempt, RiskFactor, RiskFactorKind, RiskSeverity};

use super::AttemptHistory;

pub fn check_new_location(
    attempt: &LoginAttempt,
    history: &AttemptHistory,
    config: &ScoringConfig,
) -> Option<RiskFactor> {
    let country = attempt.country()?.to_uppercase();

    let known: BTreeSet<String> = history
        .baseline
        .iter()
        .filter_map(|l| l.country())
        .map(str::to_uppercase)
        .collect();

    // No located baseline means nothing to compare with
    if known.is_empty() || known.contains(&country) {
        return None;
    }

    let place = attempt
        .location
        .as_ref()
        .map(|l| l.display())
        .unwrap_or_else(|| country.clone());

    Some(
        RiskFactor::new(
            RiskFactorKind::NewLocation,
            RiskSeverity::Medium,
            config.new_location_points,
            format!("Login from {}, outside previously seen countries", place),
        )
        .with_evidence(Evidence::KnownCountries(known.into_iter().collect())),
    )
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;

    fn baseline(countries: &[&str]) -> AttemptHistory {
        let logins = countries
            .iter()
            .enumerate()
            .map(|(i, c)| located(success("a@x.com", "1.1.1.1", i as i64 * 60), c, 0.0, 0.0))
            .collect();
        AttemptHistory::new(Vec::new(), Vec::new(), logins)
    }

    #[test]
    fn test_known_country_case_insensitive() {
        let config = ScoringConfig::default();
        let attempt = located(success("a@x.com", "2.2.2.2", 600), "de", 0.0, 0.0);
        assert!(check_new_location(&attempt, &baseline(&["DE", "FR"]), &config).is_none());
    }

    #[test]
    fn test_new_country() {
        let config = ScoringConfig::default();
        let attempt = located(success("a@x.com", "2.2.2.2", 600), "BR", 0.0, 0.0);

        let factor = check_new_location(&attempt, &baseline(&["FR", "DE", "FR"]), &config).unwrap();
        assert_eq!(factor.points, config.new_location_points);
        assert!(factor.description.contains("BR"));
        assert_eq!(
            factor.evidence,
            Some(Evidence::KnownCountries(vec!["DE".to_string(), "FR".to_string()]))
        );
    }

    #[test]
    fn test_unlocated_attempt_or_baseline() {
        let config = ScoringConfig::default();
        let unlocated = success("a@x.com", "2.2.2.2", 600);
        assert!(check_new_location(&unlocated, &baseline(&["DE"]), &config).is_none());

        let attempt = located(success("a@x.com", "2.2.2.2", 600), "BR", 0.0, 0.0);
        let h = AttemptHistory::new(Vec::new(), Vec::new(), vec![success("a@x.com", "1.1.1.1", 0)]);
        assert!(check_new_location(&attempt, &h, &config).is_none());
    }
}
