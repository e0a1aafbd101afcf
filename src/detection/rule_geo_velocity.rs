//! Impossible travel: two logins too far apart for the time between them

use crate::config::ScoringConfig;
use crate::models::{Coordinates, Evidence, LoginAttempt, RiskFactor, RiskFactorKind, RiskSeverity};

use super::AttemptHistory;

/// Below this gap two logins count as simultaneous
const SIMULTANEOUS_HOURS: f64 = 0.001;

/// Simultaneous logins further apart than this are flagged
const SIMULTANEOUS_DISTANCE_KM: f64 = 100.0;

/// Check the attempt against the account's last located successful login
///
/// Needs coordinates on both sides; attempts without them never fire.
pub fn check_impossible_travel(
    attempt: &LoginAttempt,
    history: &AttemptHistory,
    config: &ScoringConfig,
) -> Option<RiskFactor> {
    let current = attempt.coordinates()?;
    let (previous, last_location) = history
        .baseline
        .iter()
        .rev()
        .find_map(|login| login.coordinates().map(|c| (login, c)))?;

    let time_diff_hours =
        (attempt.created_at - previous.created_at).num_milliseconds() as f64 / 3_600_000.0;
    let distance_km = haversine_distance(last_location, current);

    // Near-simultaneous logins would divide by ~zero
    if time_diff_hours < SIMULTANEOUS_HOURS {
        if distance_km <= SIMULTANEOUS_DISTANCE_KM {
            return None;
        }
        let speed = distance_km / SIMULTANEOUS_HOURS;
        return Some(
            RiskFactor::new(
                RiskFactorKind::ImpossibleTravel,
                RiskSeverity::High,
                config.impossible_travel_points,
                format!(
                    "Logins from two locations {:.1} km apart within seconds: \
                     ({:.4}, {:.4}) and ({:.4}, {:.4})",
                    distance_km,
                    last_location.latitude,
                    last_location.longitude,
                    current.latitude,
                    current.longitude
                ),
            )
            .with_evidence(Evidence::TravelSpeedKmh(speed)),
        );
    }

    let velocity_kmh = distance_km / time_diff_hours;
    if velocity_kmh <= config.max_velocity_kmh {
        return None;
    }

    Some(
        RiskFactor::new(
            RiskFactorKind::ImpossibleTravel,
            RiskSeverity::High,
            config.impossible_travel_points,
            format!(
                "Traveled {:.1} km in {:.2} hours ({:.0} km/h, max plausible {:.0} km/h) \
                 from ({:.4}, {:.4}) to ({:.4}, {:.4})",
                distance_km,
                time_diff_hours,
                velocity_kmh,
                config.max_velocity_kmh,
                last_location.latitude,
                last_location.longitude,
                current.latitude,
                current.longitude
            ),
        )
        .with_evidence(Evidence::TravelSpeedKmh(velocity_kmh)),
    )
}

/// Calculate the great-circle distance between two points using the Haversine formula
/// Returns distance in kilometers
pub fn haversine_distance(loc1: Coordinates, loc2: Coordinates) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;

    let lat1_rad = loc1.latitude.to_radians();
    let lat2_rad = loc2.latitude.to_radians();
    let delta_lat = (loc2.latitude - loc1.latitude).to_radians();
    let delta_lon = (loc2.longitude - loc1.longitude).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}
