//! Webhook notifications for new alerts
//!
//! Recording runs on the authentication path and never waits on the
//! network. New alerts go into a bounded channel through [`AlertQueue`];
//! an [`AlertDispatcher`] task drains it and posts to Slack, Discord and
//! generic webhooks.

use reqwest::Client;
use tokio::sync::mpsc;

use crate::config::{DiscordConfig, NotifyConfig, SlackConfig, WebhookConfig};
use crate::models::{AlertSeverity, SecurityAlert};

use super::AlertError;

/// Alerts buffered between the recording path and the dispatcher
pub const QUEUE_CAPACITY: usize = 100;

/// Async alert dispatcher
///
/// This dispatcher runs as an async task and sends alerts to configured
/// notification channels (Slack, Discord, webhooks).
pub struct AlertDispatcher {
    config: NotifyConfig,
    client: Client,
}

impl AlertDispatcher {
    pub fn new(config: NotifyConfig) -> Self {
        AlertDispatcher {
            config,
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Create the channel feeding the dispatcher
    pub fn create_channel() -> (mpsc::Sender<SecurityAlert>, mpsc::Receiver<SecurityAlert>) {
        mpsc::channel(QUEUE_CAPACITY)
    }

    /// Whether an alert passes the enabled flag and severity floor
    pub fn should_notify(&self, alert: &SecurityAlert) -> bool {
        self.config.enabled && alert.severity >= self.config.min_severity
    }

    /// Run the alert dispatch loop until every sender is dropped
    pub async fn run(self, mut rx: mpsc::Receiver<SecurityAlert>) {
        log::info!("Alert dispatcher started");

        while let Some(alert) = rx.recv().await {
            if !self.should_notify(&alert) {
                log::debug!(
                    "Skipping notification for alert {} (severity {}, min {})",
                    alert.id,
                    alert.severity,
                    self.config.min_severity
                );
                continue;
            }

            log::info!(
                "Dispatching alert {}: {} ({})",
                alert.id,
                alert.alert_type,
                alert.severity
            );

            if let Err(e) = self.dispatch_alert(&alert).await {
                log::error!("Failed to dispatch alert {}: {}", alert.id, e);
            }
        }

        log::info!("Alert dispatcher stopped");
    }

    /// Dispatch an alert to all configured channels
    async fn dispatch_alert(&self, alert: &SecurityAlert) -> Result<(), AlertError> {
        let mut errors = Vec::new();

        if let Some(ref slack) = self.config.slack {
            if let Err(e) = self.send_slack_alert(slack, alert).await {
                log::error!("Slack alert failed: {}", e);
                errors.push(e);
            }
        }

        if let Some(ref discord) = self.config.discord {
            if let Err(e) = self.send_discord_alert(discord, alert).await {
                log::error!("Discord alert failed: {}", e);
                errors.push(e);
            }
        }

        for webhook in &self.config.webhooks {
            if let Err(e) = self.send_generic_webhook(webhook, alert).await {
                log::error!("Webhook {} failed: {}", webhook.name, e);
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.remove(0))
        }
    }

    async fn send_slack_alert(
        &self,
        config: &SlackConfig,
        alert: &SecurityAlert,
    ) -> Result<(), AlertError> {
        let payload = slack_payload(config, alert);

        let response = self
            .client
            .post(&config.webhook_url)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            log::warn!("Slack returned non-success status: {}", response.status());
        }

        Ok(())
    }

    async fn send_discord_alert(
        &self,
        config: &DiscordConfig,
        alert: &SecurityAlert,
    ) -> Result<(), AlertError> {
        let payload = discord_payload(config, alert);

        let response = self
            .client
            .post(&config.webhook_url)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            log::warn!("Discord returned non-success status: {}", response.status());
        }

        Ok(())
    }

    /// Generic webhooks receive the alert record itself as JSON
    async fn send_generic_webhook(
        &self,
        config: &WebhookConfig,
        alert: &SecurityAlert,
    ) -> Result<(), AlertError> {
        let method = config.method.as_deref().unwrap_or("POST");

        let mut request = match method.to_uppercase().as_str() {
            "PUT" => self.client.put(&config.url),
            _ => self.client.post(&config.url),
        };

        if let Some(ref headers) = config.headers {
            for (key, value) in headers {
                request = request.header(key, value);
            }
        }

        let response = request.json(alert).send().await?;

        if !response.status().is_success() {
            log::warn!(
                "Webhook {} returned non-success status: {}",
                config.name,
                response.status()
            );
        }

        Ok(())
    }
}

fn slack_payload(config: &SlackConfig, alert: &SecurityAlert) -> serde_json::Value {
    let (emoji, color) = match alert.severity {
        AlertSeverity::Critical => (":rotating_light:", "danger"),
        AlertSeverity::High => (":warning:", "danger"),
        AlertSeverity::Medium => (":exclamation:", "warning"),
        AlertSeverity::Low => (":information_source:", "good"),
    };

    serde_json::json!({
        "channel": config.channel,
        "username": config.username.as_deref().unwrap_or("Login Sentry"),
        "icon_emoji": ":shield:",
        "attachments": [{
            "color": color,
            "title": format!("{} {}", emoji, alert.alert_type),
            "fields": [
                { "title": "Account", "value": format!("{} ({})", alert.email, alert.user_type), "short": true },
                { "title": "Severity", "value": alert.severity.as_str(), "short": true },
                { "title": "IP", "value": alert.ip_address.to_string(), "short": true },
                { "title": "Alert", "value": format!("#{}", alert.id), "short": true },
            ],
            "text": &alert.description,
            "ts": alert.created_at.timestamp(),
        }]
    })
}

fn discord_payload(config: &DiscordConfig, alert: &SecurityAlert) -> serde_json::Value {
    let color = match alert.severity {
        AlertSeverity::Critical => 0xFF0000,
        AlertSeverity::High => 0xFF6600,
        AlertSeverity::Medium => 0xFFCC00,
        AlertSeverity::Low => 0x00CCFF,
    };

    serde_json::json!({
        "username": config.username.as_deref().unwrap_or("Login Sentry"),
        "embeds": [{
            "title": format!(":shield: {}", alert.alert_type),
            "description": &alert.description,
            "color": color,
            "fields": [
                { "name": "Account", "value": format!("{} ({})", alert.email, alert.user_type), "inline": true },
                { "name": "Severity", "value": alert.severity.as_str(), "inline": true },
                { "name": "IP", "value": alert.ip_address.to_string(), "inline": true },
            ],
            "timestamp": alert.created_at.to_rfc3339(),
            "footer": {
                "text": "Login Sentry"
            }
        }]
    })
}

/// Synchronous alert queue for use in sync code
///
/// Wraps the dispatcher's sender so the recording path can hand off
/// alerts without awaiting.
#[derive(Clone)]
pub struct AlertQueue {
    tx: mpsc::Sender<SecurityAlert>,
}

impl AlertQueue {
    pub fn new(tx: mpsc::Sender<SecurityAlert>) -> Self {
        AlertQueue { tx }
    }

    /// Queue an alert for dispatch (non-blocking)
    ///
    /// A full or closed queue drops the alert with a warning.
    pub fn queue_alert(&self, alert: SecurityAlert) -> Result<(), AlertError> {
        self.tx.try_send(alert).map_err(|e| match e {
            mpsc::error::TrySendError::Full(alert) => {
                log::warn!("Alert queue full, dropping notification for alert {}", alert.id);
                AlertError::QueueFull
            }
            mpsc::error::TrySendError::Closed(alert) => {
                log::warn!("Alert queue closed, dropping notification for alert {}", alert.id);
                AlertError::ChannelClosed
            }
        })
    }

    /// Queue an alert (async version)
    pub async fn queue_alert_async(&self, alert: SecurityAlert) -> Result<(), AlertError> {
        self.tx
            .send(alert)
            .await
            .map_err(|_| AlertError::ChannelClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
