//! Login attempt records and the input handed over by the authentication flow.

use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Evidence;

/// Account class an attempt was made against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    Admin,
    Seller,
    Buyer,
    Employee,
}

named_enum!(UserType, "user type", {
    Admin => "admin",
    Seller => "seller",
    Buyer => "buyer",
    Employee => "employee",
});

/// Reference to an account, tagged with the account class it lives in.
///
/// Lookups dispatch on `kind`; `id` is opaque to this crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountRef {
    pub kind: UserType,
    pub id: String,
}

impl AccountRef {
    pub fn new(kind: UserType, id: impl Into<String>) -> Self {
        AccountRef { kind, id: id.into() }
    }
}

impl fmt::Display for AccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Why a failed attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    InvalidPassword,
    UserNotFound,
    AccountSuspended,
    AccountPending,
    Other,
}

named_enum!(FailureReason, "failure reason", {
    InvalidPassword => "invalid_password",
    UserNotFound => "user_not_found",
    AccountSuspended => "account_suspended",
    AccountPending => "account_pending",
    Other => "other",
});

/// Geographic coordinates for IP location
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Finite and within ±90 latitude, ±180 longitude
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Coarse geolocation of an IP address; every part may be missing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
}

impl Location {
    /// Human-readable form used in alert descriptions
    pub fn display(&self) -> String {
        match (&self.city, &self.country, &self.coordinates) {
            (Some(city), Some(country), _) => format!("{}, {}", city, country),
            (None, Some(country), _) => country.clone(),
            (Some(city), None, _) => city.clone(),
            (None, None, Some(c)) => format!("({:.4}, {:.4})", c.latitude, c.longitude),
            (None, None, None) => "unknown location".to_string(),
        }
    }

    /// Drop coordinates that cannot exist, keeping country and city
    pub fn discard_invalid_coordinates(&mut self) {
        if self.coordinates.is_some_and(|c| !c.is_valid()) {
            self.coordinates = None;
        }
    }
}

/// Severity of a single risk finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskSeverity {
    Low,
    Medium,
    High,
}

named_enum!(RiskSeverity, "risk severity", {
    Low => "low",
    Medium => "medium",
    High => "high",
});

/// Which heuristic produced a risk factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFactorKind {
    Velocity,
    NewDevice,
    NewLocation,
    ImpossibleTravel,
    UnusualTime,
    CrossAccount,
    AccountState,
    DegradedScoring,
}

named_enum!(RiskFactorKind, "risk factor", {
    Velocity => "velocity",
    NewDevice => "new_device",
    NewLocation => "new_location",
    ImpossibleTravel => "impossible_travel",
    UnusualTime => "unusual_time",
    CrossAccount => "cross_account",
    AccountState => "account_state",
    DegradedScoring => "degraded_scoring",
});

/// One heuristic finding explaining part of a risk score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub factor: RiskFactorKind,
    pub severity: RiskSeverity,
    pub points: u8,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Evidence>,
}

impl RiskFactor {
    pub fn new(
        factor: RiskFactorKind,
        severity: RiskSeverity,
        points: u8,
        description: impl Into<String>,
    ) -> Self {
        RiskFactor {
            factor,
            severity,
            points,
            description: description.into(),
            evidence: None,
        }
    }

    pub fn with_evidence(mut self, evidence: Evidence) -> Self {
        self.evidence = Some(evidence);
        self
    }
}

/// Known extension fields carried alongside an attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum MetadataEntry {
    DeviceId(String),
    SessionId(String),
    ClientVersion(String),
    Referrer(String),
    Opaque { key: String, value: serde_json::Value },
}

/// What the authentication flow knows about a single attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptInput {
    pub email: String,
    pub user_type: UserType,
    #[serde(default)]
    pub user_id: Option<AccountRef>,
    pub success: bool,
    #[serde(default)]
    pub failure_reason: Option<FailureReason>,
    pub ip_address: IpAddr,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub blocked: bool,
    #[serde(default)]
    pub metadata: Vec<MetadataEntry>,
    #[serde(default = "Utc::now")]
    pub attempted_at: DateTime<Utc>,
}

impl AttemptInput {
    /// Input for a successful login
    pub fn success(
        email: impl Into<String>,
        user_type: UserType,
        ip_address: IpAddr,
        attempted_at: DateTime<Utc>,
    ) -> Self {
        AttemptInput {
            email: email.into(),
            user_type,
            user_id: None,
            success: true,
            failure_reason: None,
            ip_address,
            user_agent: None,
            location: None,
            blocked: false,
            metadata: Vec::new(),
            attempted_at,
        }
    }

    /// Input for a failed login
    pub fn failure(
        email: impl Into<String>,
        user_type: UserType,
        reason: FailureReason,
        ip_address: IpAddr,
        attempted_at: DateTime<Utc>,
    ) -> Self {
        AttemptInput {
            success: false,
            failure_reason: Some(reason),
            ..Self::success(email, user_type, ip_address, attempted_at)
        }
    }

    pub fn with_user_id(mut self, id: impl Into<String>) -> Self {
        self.user_id = Some(AccountRef::new(self.user_type, id));
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_metadata(mut self, entry: MetadataEntry) -> Self {
        self.metadata.push(entry);
        self
    }

    pub fn blocked(mut self) -> Self {
        self.blocked = true;
        self
    }
}

/// A persisted authentication attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginAttempt {
    pub id: i64,
    pub email: String,
    pub user_type: UserType,
    pub user_id: Option<AccountRef>,
    pub success: bool,
    pub ip_address: IpAddr,
    pub user_agent: Option<String>,
    pub location: Option<Location>,
    pub failure_reason: Option<FailureReason>,
    pub risk_score: u8,
    pub risk_factors: Vec<RiskFactor>,
    pub blocked: bool,
    pub metadata: Vec<MetadataEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LoginAttempt {
    /// Build an unsaved attempt with placeholder risk fields
    pub fn pending(input: AttemptInput) -> Self {
        LoginAttempt {
            id: 0,
            email: input.email,
            user_type: input.user_type,
            user_id: input.user_id,
            success: input.success,
            ip_address: input.ip_address,
            user_agent: input.user_agent,
            location: input.location,
            failure_reason: input.failure_reason,
            risk_score: 0,
            risk_factors: Vec::new(),
            blocked: input.blocked,
            metadata: input.metadata,
            created_at: input.attempted_at,
            updated_at: input.attempted_at,
        }
    }

    pub fn country(&self) -> Option<&str> {
        self.location.as_ref().and_then(|l| l.country.as_deref())
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        self.location.as_ref().and_then(|l| l.coordinates)
    }

    /// First factor of the given kind, if the scorer produced one
    pub fn factor(&self, kind: RiskFactorKind) -> Option<&RiskFactor> {
        self.risk_factors.iter().find(|f| f.factor == kind)
    }

    pub fn has_factor(&self, kind: RiskFactorKind) -> bool {
        self.factor(kind).is_some()
    }
}
