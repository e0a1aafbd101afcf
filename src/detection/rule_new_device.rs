//! Logins from an IP or user agent the account has not used before

use std::collections::BTreeSet;

use crate::config::ScoringConfig;
use crate::models::{Evidence, LoginAttempt, RiskFactor, RiskFactorKind, RiskSeverity};

use super::AttemptHistory;

/// Known IPs listed in the evidence, at most
const MAX_KNOWN_IPS: usize = 10;

/// Flag an IP, or user agent when one is given, missing from the baseline
///
/// Accounts without successful logins have nothing to compare against and
/// are left alone.
pub fn check_new_device(
    attempt: &LoginAttempt,
    history: &AttemptHistory,
    config: &ScoringConfig,
) -> Option<RiskFactor> {
    let baseline = &history.baseline;
    if baseline.is_empty() {
        return None;
    }

    let ip_known = baseline.iter().any(|l| l.ip_address == attempt.ip_address);

    let seen_agents: Vec<&str> = baseline.iter().filter_map(|l| l.user_agent.as_deref()).collect();
    let agent_known = match attempt.user_agent.as_deref() {
        Some(agent) => seen_agents.is_empty() || seen_agents.contains(&agent),
        None => true,
    };

    if ip_known && agent_known {
        return None;
    }

    let description = if !ip_known {
        format!(
            "IP {} not seen in the last {} successful logins",
            attempt.ip_address,
            baseline.len()
        )
    } else {
        format!(
            "User agent not seen in the last {} successful logins",
            baseline.len()
        )
    };

    let known_ips: Vec<String> = baseline
        .iter()
        .map(|l| l.ip_address.to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .take(MAX_KNOWN_IPS)
        .collect();

    Some(
        RiskFactor::new(
            RiskFactorKind::NewDevice,
            RiskSeverity::Medium,
            config.new_device_points,
            description,
        )
        .with_evidence(Evidence::KnownIps(known_ips)),
    )
}
