use async_trait::async_trait;
use serde::Serialize;

use crate::error::AppResult;

/// Value of `data.type` for every status-change push.
pub const APPLICATION_STATUS_TYPE: &str = "application_status";

/// Visible part of a push message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushNotification {
    pub title: String,
    pub body: String,
}

/// Key/value data delivered to the app alongside the notification.
/// All values are strings, as required by FCM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushData {
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    pub job_id: String,
    pub application_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushPayload {
    pub notification: PushNotification,
    pub data: PushData,
}

/// Delivery channel for push messages addressed to a single device.
#[async_trait]
pub trait PushSender: Send + Sync + 'static {
    async fn send(&self, device_token: &str, payload: &PushPayload) -> AppResult<()>;
}

/// Shortened token for log lines.
pub fn redact_token(token: &str) -> String {
    let prefix: String = token.chars().take(8).collect();
    if prefix.len() < token.len() {
        format!("{}…", prefix)
    } else {
        prefix
    }
}

/// Sender used when no push provider is configured: logs instead of delivering.
#[derive(Debug, Default, Clone)]
pub struct LogPushSender;

#[async_trait]
impl PushSender for LogPushSender {
    async fn send(&self, device_token: &str, payload: &PushPayload) -> AppResult<()> {
        tracing::info!(
            "Push delivery disabled, would send to token {}: title={:?}, body={:?}, data={}",
            redact_token(device_token),
            payload.notification.title,
            payload.notification.body,
            serde_json::to_string(&payload.data).unwrap_or_default()
        );
        Ok(())
    }
}
