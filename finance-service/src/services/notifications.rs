//! Push notifications. Delivery is best-effort: callers go through
//! [`Notifications::dispatch`], which logs failures and never returns them.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::metrics;
use crate::config::FcmConfig;
use crate::models::{NotificationData, PushTarget};

const FCM_API_URL: &str = "https://fcm.googleapis.com/v1/projects";

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("Provider not enabled: {0}")]
    NotEnabled(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Send failed: {0}")]
    SendFailed(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, target: &PushTarget, data: &NotificationData) -> Result<(), NotifierError>;

    fn name(&self) -> &'static str;
}

pub struct FcmNotifier {
    config: FcmConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
struct FcmRequest {
    message: FcmMessage,
}

#[derive(Debug, Serialize)]
struct FcmMessage {
    topic: String,
    notification: FcmNotification,
    data: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct FcmNotification {
    title: String,
    body: String,
}

#[derive(Debug, Deserialize)]
struct FcmResponse {
    name: Option<String>,
    #[serde(default)]
    error: Option<FcmError>,
}

#[derive(Debug, Deserialize)]
struct FcmError {
    message: String,
    status: String,
}

impl FcmNotifier {
    pub fn new(config: FcmConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for FcmNotifier {
    async fn send(&self, target: &PushTarget, data: &NotificationData) -> Result<(), NotifierError> {
        if !self.config.enabled {
            return Err(NotifierError::NotEnabled(
                "FCM push provider is not enabled".to_string(),
            ));
        }
        if self.config.project_id.is_empty() {
            return Err(NotifierError::Configuration(
                "FCM project_id is not configured".to_string(),
            ));
        }

        let request = FcmRequest {
            message: FcmMessage {
                topic: target.topic(),
                notification: FcmNotification {
                    title: data.title(),
                    body: data.body(),
                },
                data: data.to_data_map(),
            },
        };

        let url = format!("{}/{}/messages:send", FCM_API_URL, self.config.project_id);

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.access_token.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| NotifierError::Connection(format!("Failed to connect to FCM: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifierError::SendFailed(format!(
                "FCM API returned error status {}: {}",
                status, body
            )));
        }

        let fcm_response: FcmResponse = response.json().await.map_err(|e| {
            NotifierError::SendFailed(format!("Failed to parse FCM response: {}", e))
        })?;

        if let Some(error) = fcm_response.error {
            return Err(NotifierError::SendFailed(format!(
                "FCM error ({}): {}",
                error.status, error.message
            )));
        }

        tracing::info!(
            topic = %target.topic(),
            message_id = ?fcm_response.name,
            "Push notification sent via FCM"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "fcm"
    }
}

/// Logs instead of sending. Used when FCM is disabled and in tests, which
/// read back what would have been sent.
#[derive(Default)]
pub struct LogNotifier {
    sent_count: AtomicU64,
    sent: Mutex<Vec<(PushTarget, NotificationData)>>,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent_count(&self) -> u64 {
        self.sent_count.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<(PushTarget, NotificationData)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, target: &PushTarget, data: &NotificationData) -> Result<(), NotifierError> {
        self.sent_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((target.clone(), data.clone()));
        }
        tracing::info!(
            topic = %target.topic(),
            kind = data.kind(),
            "Push notification (log only)"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

#[derive(Clone)]
pub struct Notifications {
    notifier: Arc<dyn Notifier>,
}

impl Notifications {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Send and forget: failures are logged and counted, never propagated.
    pub async fn dispatch(&self, target: PushTarget, data: NotificationData) {
        match self.notifier.send(&target, &data).await {
            Ok(()) => metrics::record_notification(data.kind(), "sent"),
            Err(e) => {
                metrics::record_notification(data.kind(), "failed");
                tracing::warn!(
                    provider = self.notifier.name(),
                    topic = %target.topic(),
                    kind = data.kind(),
                    error = %e,
                    "Failed to send notification"
                );
            }
        }
    }
}
