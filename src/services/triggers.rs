use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{AppError, AppResult};
use crate::services::dispatcher::{DocumentChange, PathParams, UserIdSource};

type HmacSha256 = Hmac<Sha256>;

pub const TRIGGER_SIGNATURE_HEADER: &str = "x-trigger-signature";
pub const TRIGGER_EVENT_ID_HEADER: &str = "x-trigger-event-id";

/// Document field holding the applicant's id under `jobs/{jobId}/applications`.
const APPLICATION_USER_ID_FIELD: &str = "userId";

/// The two document locations that feed the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerBinding {
    /// `jobs/{jobId}/applications/{applicationId}`
    JobApplications,
    /// `Users/{userId}/appliedjobs/{jobId}`
    UserAppliedJobs,
}

impl TriggerBinding {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerBinding::JobApplications => "jobs_applications_update",
            TriggerBinding::UserAppliedJobs => "users_applied_jobs_update",
        }
    }

    pub fn user_id_source(&self, params: &PathParams) -> UserIdSource {
        match self {
            TriggerBinding::JobApplications => {
                UserIdSource::Field(APPLICATION_USER_ID_FIELD.to_string())
            }
            TriggerBinding::UserAppliedJobs => {
                UserIdSource::Path(params.user_id.clone().unwrap_or_default())
            }
        }
    }
}

pub struct TriggerService;

impl TriggerService {
    /// Verify `x-trigger-signature: sha256=<hex>` over the raw body.
    /// Nothing is checked when no secret is configured.
    pub fn verify_signature(
        secret: Option<&str>,
        headers: &HeaderMap,
        body: &[u8],
    ) -> AppResult<()> {
        let secret = match secret {
            Some(s) => s,
            None => return Ok(()),
        };

        let signature = headers
            .get(TRIGGER_SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                tracing::debug!("Missing {} header", TRIGGER_SIGNATURE_HEADER);
                AppError::Unauthorized
            })?;

        let expected_sig = match signature.strip_prefix("sha256=") {
            Some(hex_sig) => hex::decode(hex_sig)
                .map_err(|_| AppError::BadRequest("Invalid signature format".to_string()))?,
            None => return Err(AppError::BadRequest("Invalid signature format".to_string())),
        };

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Failed to create HMAC")))?;
        mac.update(body);

        mac.verify_slice(&expected_sig)
            .map_err(|_| AppError::Unauthorized)
    }

    pub fn event_id(headers: &HeaderMap) -> Option<String> {
        headers
            .get(TRIGGER_EVENT_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    }

    pub fn parse_change(body: &[u8]) -> AppResult<DocumentChange> {
        serde_json::from_slice(body)
            .map_err(|e| AppError::BadRequest(format!("Invalid payload: {}", e)))
    }

    #[cfg(test)]
    pub fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("any key size");
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }
}
