use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Push destination registered for an app user.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    /// FCM registration token of the user's current app install, if any.
    pub device_token: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl UserProfile {
    /// The stored device token, unless it is missing or blank.
    /// The value is returned as stored; registration already trims it.
    pub fn push_token(&self) -> Option<&str> {
        self.device_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
    }
}
