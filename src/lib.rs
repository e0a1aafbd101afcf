pub mod alerting;
pub mod config;
pub mod detection;
pub mod geolocation;
pub mod input;
pub mod models;
pub mod monitor;
pub mod output;
pub mod persistence;
pub mod recorder;

// Re-export commonly used types
pub use alerting::{AlertDispatcher, AlertGenerator, AlertLifecycle, AlertOutcome, AlertQueue};
pub use config::Config;
pub use detection::{AttemptHistory, RiskAssessment, RiskScorer};
pub use geolocation::{GeoIpService, GeoResolver};
pub use models::{AttemptInput, LoginAttempt, SecurityAlert};
pub use monitor::{LoginMonitor, Observation};
pub use persistence::{SecurityStore, SqliteSecurityStore};
pub use recorder::{AttemptRecorder, RecordError};
