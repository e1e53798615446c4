use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::{UserProfile, UserProfileRepository};
use crate::error::{AppError, AppResult};
use crate::routes::auth::AuthUser;
use crate::services::push::redact_token;
use crate::AppState;

/// Router for the caller's own profile and push registration
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/me", get(get_me))
        .route(
            "/me/device-token",
            put(register_device_token).delete(clear_device_token),
        )
}

#[derive(Debug, Deserialize)]
pub struct DeviceTokenRequest {
    pub device_token: String,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user_id: String,
    pub has_device_token: bool,
    pub updated_at: String,
}

impl From<UserProfile> for ProfileResponse {
    fn from(p: UserProfile) -> Self {
        Self {
            has_device_token: p.push_token().is_some(),
            updated_at: p.updated_at.and_utc().to_rfc3339(),
            user_id: p.user_id,
        }
    }
}

async fn get_me(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<ProfileResponse>> {
    let profile = UserProfileRepository::find_by_id(&state.db, &user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Profile not found".to_string()))?;

    Ok(Json(profile.into()))
}

/// Register the FCM token of the device the app is running on.
/// A later registration replaces the previous token.
async fn register_device_token(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<DeviceTokenRequest>,
) -> AppResult<Json<ProfileResponse>> {
    let token = req.device_token.trim();
    if token.is_empty() {
        return Err(AppError::Validation(
            "device_token must not be empty".to_string(),
        ));
    }

    let profile = UserProfileRepository::upsert_device_token(&state.db, &user_id, token).await?;
    tracing::info!(
        "Registered device token {} for user {}",
        redact_token(token),
        user_id
    );

    Ok(Json(profile.into()))
}

async fn clear_device_token(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> AppResult<StatusCode> {
    if !UserProfileRepository::clear_device_token(&state.db, &user_id).await? {
        return Err(AppError::NotFound("Profile not found".to_string()));
    }

    tracing::info!("Cleared device token for user {}", user_id);
    Ok(StatusCode::NO_CONTENT)
}
