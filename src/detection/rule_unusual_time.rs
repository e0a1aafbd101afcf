//! Logins at an hour the account rarely uses

use chrono::Timelike;

use crate::config::ScoringConfig;
use crate::models::{Evidence, LoginAttempt, RiskFactor, RiskFactorKind, RiskSeverity};

use super::AttemptHistory;

/// Distance between two hours of the day, wrapping at midnight
fn hour_distance(a: u32, b: u32) -> u32 {
    let d = a.abs_diff(b);
    d.min(24 - d)
}

/// Hours are taken in UTC
pub fn check_unusual_time(
    attempt: &LoginAttempt,
    history: &AttemptHistory,
    config: &ScoringConfig,
) -> Option<RiskFactor> {
    let baseline = &history.baseline;
    if baseline.len() < config.min_baseline_logins {
        return None;
    }

    let hour = attempt.created_at.hour();
    let nearby = baseline
        .iter()
        .filter(|l| hour_distance(l.created_at.hour(), hour) <= 1)
        .count();

    let ratio = nearby as f64 / baseline.len() as f64;
    if ratio >= config.rare_hour_ratio {
        return None;
    }

    Some(
        RiskFactor::new(
            RiskFactorKind::UnusualTime,
            RiskSeverity::Low,
            config.unusual_time_points,
            format!(
                "Login at {:02}:00 UTC; {} of the last {} logins were within an hour of it",
                hour,
                nearby,
                baseline.len()
            ),
        )
        .with_evidence(Evidence::LoginHour(hour)),
    )
}
