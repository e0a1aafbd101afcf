//! Domain records for login attempts and security alerts.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Returned when a stored or user-supplied name matches no enum variant
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Generates `as_str`, `Display` and `FromStr` for fieldless enums whose
/// wire names are the snake_case strings used in storage and JSON.
macro_rules! named_enum {
    ($ty:ident, $kind:literal, { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name),+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = $crate::models::UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($name => Ok($ty::$variant),)+
                    _ => Err($crate::models::UnknownVariant {
                        kind: $kind,
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

pub mod alert;
pub mod attempt;

pub use alert::{AlertSeverity, AlertStatus, AlertType, SecurityAlert};
pub use attempt::{
    AccountRef, AttemptInput, Coordinates, FailureReason, Location, LoginAttempt,
    MetadataEntry, RiskFactor, RiskFactorKind, RiskSeverity, UserType,
};

/// Typed evidence attached to risk factors and alert details.
///
/// Known evidence gets its own variant; anything else goes through
/// `Opaque` so producers can extend it without a schema change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Evidence {
    RiskScore(u8),
    FailureStreak(u32),
    DistinctEmails(u32),
    KnownIps(Vec<String>),
    KnownCountries(Vec<String>),
    LoginHour(u32),
    TravelSpeedKmh(f64),
    RepeatCount(u32),
    Factors(Vec<RiskFactorKind>),
    Opaque { key: String, value: serde_json::Value },
}
