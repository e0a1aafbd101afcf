use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use login_sentry::alerting::{AlertDispatcher, AlertQueue};
use login_sentry::config::Config;
use login_sentry::geolocation::{GeoIpService, GeoResolver};
use login_sentry::input::FileTailer;
use login_sentry::monitor::LoginMonitor;
use login_sentry::output::{OutputFormat, OutputHandler};
use login_sentry::persistence::{SecurityStore, SqliteSecurityStore};

const PRUNE_INTERVAL: Duration = Duration::from_secs(3600);

/// Tails the auth service's attempt log, scores each attempt and raises alerts
fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    log::info!("Starting login sentry daemon...");

    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));
    let config = Config::load_or_default(&config_path)?;

    // Setup graceful shutdown signal handling
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal, gracefully stopping...");
        r.store(false, Ordering::SeqCst);
    })?;

    let store: Arc<dyn SecurityStore> = Arc::new(SqliteSecurityStore::with_busy_timeout(
        &config.storage.db_path,
        Duration::from_millis(config.storage.busy_timeout_ms),
    )?);
    log::info!("Using database {:?}", config.storage.db_path);

    let mut monitor = LoginMonitor::new(store.clone(), &config);

    if let Some(ref path) = config.geoip.database_path {
        match GeoIpService::new(path) {
            Ok(service) => {
                let resolver: Arc<dyn GeoResolver> = Arc::new(service);
                monitor = monitor.with_geo_resolver(resolver);
                log::info!("GeoIP database loaded from {:?}", path);
            }
            Err(e) => log::warn!("GeoIP disabled: {}", e),
        }
    }

    // Notifications run on their own runtime so the tail loop stays sync
    let runtime = tokio::runtime::Runtime::new()?;
    let dispatcher_handle = if config.notify.enabled {
        let (tx, rx) = AlertDispatcher::create_channel();
        let dispatcher = AlertDispatcher::new(config.notify.clone());
        monitor = monitor.with_alert_queue(AlertQueue::new(tx));
        Some(runtime.spawn(dispatcher.run(rx)))
    } else {
        None
    };

    let mut output_handler = OutputHandler::new(
        OutputFormat::from_name(&config.output.format),
        config.output.file_path.clone(),
    )?;

    let mut tailer = FileTailer::new(config.input.file_path.clone())
        .from_beginning(config.input.from_beginning);
    log::info!("Monitoring attempt log: {:?}", config.input.file_path);

    let poll_interval = Duration::from_millis(config.input.poll_interval_ms);
    let retention = chrono::Duration::days(config.storage.retention_days);
    let mut last_prune: Option<Instant> = None;

    log::info!("Daemon running. Press Ctrl+C to stop.");

    while running.load(Ordering::SeqCst) {
        if last_prune.map_or(true, |t| t.elapsed() >= PRUNE_INTERVAL) {
            match store.prune_old_data(chrono::Utc::now() - retention) {
                Ok(0) => {}
                Ok(n) => log::info!("Pruned {} old record(s)", n),
                Err(e) => log::error!("Pruning failed: {}", e),
            }
            last_prune = Some(Instant::now());
        }

        let attempts = if tailer.is_valid() {
            match tailer.read_attempts() {
                Ok(attempts) => attempts,
                Err(e) => {
                    log::error!("Error reading attempt log: {}", e);
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        for input in attempts {
            if let Some(observation) = monitor.observe(input) {
                if let Some(outcome) = observation.alert {
                    if let Err(e) = output_handler.write_alert(outcome.alert()) {
                        log::error!("Failed to write alert: {}", e);
                    }
                }
            }
        }

        std::thread::sleep(poll_interval);
    }

    output_handler.flush()?;

    // Closing the queue lets the dispatcher drain and exit
    drop(monitor);
    if let Some(handle) = dispatcher_handle {
        let drained = runtime.block_on(async {
            tokio::time::timeout(Duration::from_secs(5), handle).await
        });
        if drained.is_err() {
            log::warn!("Alert dispatcher did not finish in time");
        }
    }

    log::info!("Login sentry daemon stopped");
    Ok(())
}
