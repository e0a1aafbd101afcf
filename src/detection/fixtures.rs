//! Attempt builders shared by the detection tests

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::models::{AttemptInput, Coordinates, FailureReason, Location, LoginAttempt, UserType};

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

pub fn failure(email: &str, ip: &str, offset_secs: i64) -> LoginAttempt {
    failure_with(email, ip, offset_secs, FailureReason::InvalidPassword)
}

pub fn failure_with(email: &str, ip: &str, offset_secs: i64, reason: FailureReason) -> LoginAttempt {
    LoginAttempt::pending(AttemptInput::failure(
        email,
        UserType::Seller,
        reason,
        ip.parse().unwrap(),
        base_time() + Duration::seconds(offset_secs),
    ))
}

pub fn success(email: &str, ip: &str, offset_secs: i64) -> LoginAttempt {
    LoginAttempt::pending(AttemptInput::success(
        email,
        UserType::Seller,
        ip.parse().unwrap(),
        base_time() + Duration::seconds(offset_secs),
    ))
}

pub fn located(mut attempt: LoginAttempt, country: &str, latitude: f64, longitude: f64) -> LoginAttempt {
    attempt.location = Some(Location {
        country: Some(country.to_string()),
        city: None,
        coordinates: Some(Coordinates { latitude, longitude }),
    });
    attempt
}
