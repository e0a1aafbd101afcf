use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Duration, Utc};
use structopt::StructOpt;

use login_sentry::config::Config;
use login_sentry::models::{
    AccountRef, AlertSeverity, AlertStatus, AlertType, AttemptInput, FailureReason, UserType,
};
use login_sentry::monitor::LoginMonitor;
use login_sentry::output::{OutputFormat, OutputHandler};
use login_sentry::persistence::{AlertQuery, AttemptQuery, SecurityStore, SqliteSecurityStore};

/// Login sentry administration tool
#[derive(StructOpt, Debug)]
#[structopt(name = "sentry", about = "Login risk scoring and security alert administration")]
pub enum Cli {
    /// Generate a default configuration file
    Config {
        /// Output path for the configuration file
        #[structopt(short, long, default_value = "config.toml")]
        output: PathBuf,
    },
    /// Record a login attempt by hand and show its score
    Record {
        #[structopt(short, long, default_value = "config.toml")]
        config: PathBuf,
        #[structopt(long)]
        email: String,
        /// admin, seller, buyer or employee
        #[structopt(long)]
        user_type: UserType,
        #[structopt(long)]
        ip: IpAddr,
        /// Failure reason; omit for a successful login
        #[structopt(long)]
        failure: Option<FailureReason>,
        #[structopt(long)]
        user_agent: Option<String>,
    },
    /// Ask whether a login for this account should be refused now
    Check {
        #[structopt(short, long, default_value = "config.toml")]
        config: PathBuf,
        #[structopt(long)]
        email: String,
    },
    /// List recorded login attempts, newest first
    Attempts {
        #[structopt(short, long, default_value = "config.toml")]
        config: PathBuf,
        #[structopt(long)]
        email: Option<String>,
        #[structopt(long)]
        ip: Option<IpAddr>,
        #[structopt(long)]
        min_score: Option<u8>,
        /// Only attempts from the last N hours
        #[structopt(long)]
        since_hours: Option<i64>,
        #[structopt(short, long, default_value = "20")]
        limit: usize,
        /// json, jsonl or console
        #[structopt(short, long, default_value = "console")]
        format: String,
    },
    /// List security alerts, newest first
    Alerts {
        #[structopt(short, long, default_value = "config.toml")]
        config: PathBuf,
        #[structopt(long)]
        status: Option<AlertStatus>,
        #[structopt(long)]
        severity: Option<AlertSeverity>,
        #[structopt(long)]
        alert_type: Option<AlertType>,
        #[structopt(long)]
        email: Option<String>,
        #[structopt(long)]
        since_hours: Option<i64>,
        #[structopt(short, long, default_value = "20")]
        limit: usize,
        #[structopt(short, long, default_value = "console")]
        format: String,
    },
    /// Move an alert to a new status
    Transition {
        #[structopt(short, long, default_value = "config.toml")]
        config: PathBuf,
        /// Alert id
        id: i64,
        /// investigating, resolved or false_positive
        status: AlertStatus,
        /// Class of the acting account
        #[structopt(long, default_value = "admin")]
        actor_type: UserType,
        /// Id of the acting account
        #[structopt(long)]
        actor: String,
        #[structopt(long)]
        notes: Option<String>,
    },
    /// Delete attempts and closed alerts past the retention period
    Prune {
        #[structopt(short, long, default_value = "config.toml")]
        config: PathBuf,
        /// Override the configured retention
        #[structopt(long)]
        days: Option<i64>,
    },
}

fn open_store(config_path: &Path) -> Result<(Config, Arc<SqliteSecurityStore>), Box<dyn std::error::Error>> {
    let config = Config::load_or_default(config_path)?;
    let store = SqliteSecurityStore::with_busy_timeout(
        &config.storage.db_path,
        std::time::Duration::from_millis(config.storage.busy_timeout_ms),
    )?;
    Ok((config, Arc::new(store)))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .parse_default_env()
        .init();

    let cli = Cli::from_args();

    match cli {
        Cli::Config { output } => {
            let config = Config::default();
            config.to_file(&output)?;
            println!("Default configuration written to: {:?}", output);
        }
        Cli::Record {
            config,
            email,
            user_type,
            ip,
            failure,
            user_agent,
        } => {
            let (config, store) = open_store(&config)?;
            let monitor = LoginMonitor::new(store, &config);

            let now = Utc::now();
            let mut input = match failure {
                Some(reason) => AttemptInput::failure(email, user_type, reason, ip, now),
                None => AttemptInput::success(email, user_type, ip, now),
            };
            if let Some(agent) = user_agent {
                input = input.with_user_agent(agent);
            }
            if monitor.should_block(&input.email, now) {
                input = input.blocked();
            }

            let observation = monitor.observe(input).ok_or("attempt was not recorded")?;
            let mut output = OutputHandler::new(OutputFormat::Console, None)?;
            output.write_attempt(&observation.attempt)?;
            for factor in &observation.attempt.risk_factors {
                println!("  +{:>3} {} ({}): {}", factor.points, factor.factor, factor.severity, factor.description);
            }
            if let Some(outcome) = observation.alert {
                if !outcome.is_created() {
                    println!("Existing alert updated:");
                }
                output.write_alert(outcome.alert())?;
            }
        }
        Cli::Check { config, email } => {
            let (config, store) = open_store(&config)?;
            let monitor = LoginMonitor::new(store, &config);
            if monitor.should_block(&email, Utc::now()) {
                println!("BLOCK {}", email);
                std::process::exit(2);
            }
            println!("ALLOW {}", email);
        }
        Cli::Attempts {
            config,
            email,
            ip,
            min_score,
            since_hours,
            limit,
            format,
        } => {
            let (_, store) = open_store(&config)?;
            let query = AttemptQuery {
                email: email.map(|e| e.trim().to_lowercase()),
                ip_address: ip,
                since: since_hours.map(|h| Utc::now() - Duration::hours(h)),
                until: None,
                min_risk_score: min_score,
                limit: Some(limit),
            };

            let attempts = store.query_attempts(&query)?;
            let mut output = OutputHandler::new(OutputFormat::from_name(&format), None)?;
            for attempt in &attempts {
                output.write_attempt(attempt)?;
            }
            eprintln!("{} attempt(s)", attempts.len());
        }
        Cli::Alerts {
            config,
            status,
            severity,
            alert_type,
            email,
            since_hours,
            limit,
            format,
        } => {
            let (_, store) = open_store(&config)?;
            let query = AlertQuery {
                status,
                severity,
                alert_type,
                email: email.map(|e| e.trim().to_lowercase()),
                since: since_hours.map(|h| Utc::now() - Duration::hours(h)),
                until: None,
                limit: Some(limit),
            };

            let alerts = store.query_alerts(&query)?;
            let mut output = OutputHandler::new(OutputFormat::from_name(&format), None)?;
            for alert in &alerts {
                output.write_alert(alert)?;
            }
            eprintln!("{} alert(s)", alerts.len());
        }
        Cli::Transition {
            config,
            id,
            status,
            actor_type,
            actor,
            notes,
        } => {
            let (config, store) = open_store(&config)?;
            let monitor = LoginMonitor::new(store, &config);
            let actor = AccountRef::new(actor_type, actor);

            match monitor.lifecycle().transition(id, status, &actor, notes) {
                Ok(alert) => {
                    let mut output = OutputHandler::new(OutputFormat::Console, None)?;
                    output.write_alert(&alert)?;
                }
                Err(e) => {
                    eprintln!("{}", e);
                    std::process::exit(1);
                }
            }
        }
        Cli::Prune { config, days } => {
            let (config, store) = open_store(&config)?;
            let days = days.unwrap_or(config.storage.retention_days);
            let removed = store.prune_old_data(Utc::now() - Duration::days(days))?;
            println!("Removed {} record(s) older than {} day(s)", removed, days);
        }
    }

    Ok(())
}
