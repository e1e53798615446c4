use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::PushConfig;
use crate::error::{AppError, AppResult};
use crate::services::push::{redact_token, PushData, PushNotification, PushPayload, PushSender};

const FCM_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

// ============================================================================
// Credential Types
// ============================================================================

/// Subset of a Google service-account key file.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Clone)]
pub enum FcmCredentials {
    /// Access token issued elsewhere (metadata server, CI secret, ...).
    StaticToken(String),
    ServiceAccount(ServiceAccountKey),
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedAccessToken {
    token: String,
    expires_at: chrono::DateTime<Utc>,
}

// ============================================================================
// Message Types
// ============================================================================

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    message: Message<'a>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    token: &'a str,
    notification: &'a PushNotification,
    data: &'a PushData,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    name: String,
}

// ============================================================================
// Service
// ============================================================================

/// Firebase Cloud Messaging HTTP v1 client.
#[derive(Debug, Clone)]
pub struct FcmService {
    client: Client,
    api_base_url: String,
    project_id: String,
    credentials: FcmCredentials,
    access_token: Arc<RwLock<Option<CachedAccessToken>>>,
}

impl FcmService {
    pub fn new(config: &PushConfig) -> AppResult<Self> {
        let project_id = config
            .fcm_project_id
            .clone()
            .ok_or_else(|| AppError::Config("FCM_PROJECT_ID is not set".to_string()))?;

        let credentials = if let Some(token) = &config.fcm_access_token {
            FcmCredentials::StaticToken(token.clone())
        } else if let Some(path) = &config.fcm_service_account_file {
            FcmCredentials::ServiceAccount(Self::load_service_account(path)?)
        } else {
            return Err(AppError::Config(
                "FCM credentials are not configured".to_string(),
            ));
        };

        let client = Client::builder()
            .timeout(StdDuration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| AppError::Internal(e.into()))?;

        Ok(Self::with_credentials(
            client,
            &config.fcm_api_base_url,
            &project_id,
            credentials,
        ))
    }

    pub fn with_credentials(
        client: Client,
        api_base_url: &str,
        project_id: &str,
        credentials: FcmCredentials,
    ) -> Self {
        Self {
            client,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            project_id: project_id.to_string(),
            credentials,
            access_token: Arc::new(RwLock::new(None)),
        }
    }

    fn load_service_account(path: &str) -> AppResult<ServiceAccountKey> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read service account {}: {}", path, e))
        })?;
        serde_json::from_str(&raw)
            .map_err(|e| AppError::Config(format!("Invalid service account {}: {}", path, e)))
    }

    /// Get a valid access token, minting a new one if it would expire soon.
    async fn get_valid_access_token(&self) -> AppResult<String> {
        const REFRESH_MARGIN_SECS: i64 = 60;

        let key = match &self.credentials {
            FcmCredentials::StaticToken(token) => return Ok(token.clone()),
            FcmCredentials::ServiceAccount(key) => key,
        };

        {
            let guard = self.access_token.read().await;
            if let Some(cached) = guard.as_ref() {
                if cached.expires_at - Duration::seconds(REFRESH_MARGIN_SECS) > Utc::now() {
                    return Ok(cached.token.clone());
                }
            }
        }

        let mut guard = self.access_token.write().await;
        // Another task may have refreshed while we waited for the write lock.
        if let Some(cached) = guard.as_ref() {
            if cached.expires_at - Duration::seconds(REFRESH_MARGIN_SECS) > Utc::now() {
                return Ok(cached.token.clone());
            }
        }

        let fresh = self.exchange_assertion(key).await?;
        let token = fresh.token.clone();
        tracing::info!("Refreshed FCM access token; expires at {}", fresh.expires_at);
        *guard = Some(fresh);
        Ok(token)
    }

    fn sign_assertion(key: &ServiceAccountKey) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &key.client_email,
            scope: FCM_SCOPE,
            aud: &key.token_uri,
            iat: now,
            exp: now + 3600,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = key.private_key_id.clone();

        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
        Ok(jsonwebtoken::encode(&header, &claims, &encoding_key)?)
    }

    async fn exchange_assertion(&self, key: &ServiceAccountKey) -> AppResult<CachedAccessToken> {
        let assertion = Self::sign_assertion(key)?;

        let response = self
            .client
            .post(&key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Push(format!(
                "Failed to get FCM access token ({}): {}",
                status.as_u16(),
                error_text
            )));
        }

        let token_response: AccessTokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::Push(format!("Failed to parse token response: {}", e)))?;

        Ok(CachedAccessToken {
            token: token_response.access_token,
            expires_at: Utc::now() + Duration::seconds(token_response.expires_in),
        })
    }

    fn send_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/messages:send",
            self.api_base_url, self.project_id
        )
    }
}

#[async_trait]
impl PushSender for FcmService {
    async fn send(&self, device_token: &str, payload: &PushPayload) -> AppResult<()> {
        let access_token = self.get_valid_access_token().await?;

        let request = SendRequest {
            message: Message {
                token: device_token,
                notification: &payload.notification,
                data: &payload.data,
            },
        };

        let response = self
            .client
            .post(self.send_url())
            .bearer_auth(access_token)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Push(format!(
                "FCM API error ({}): {}",
                status.as_u16(),
                error_text
            )));
        }

        let sent: SendResponse = response
            .json()
            .await
            .map_err(|e| AppError::Push(format!("Failed to parse FCM response: {}", e)))?;

        tracing::debug!(
            "FCM accepted message {} for token {}",
            sent.name,
            redact_token(device_token)
        );
        Ok(())
    }
}
