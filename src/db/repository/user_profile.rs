use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

// ============================================================================
// User Profile Repository
// ============================================================================

pub struct UserProfileRepository;

impl UserProfileRepository {
    pub async fn find_by_id(pool: &SqlitePool, user_id: &str) -> AppResult<Option<UserProfile>> {
        sqlx::query_as::<_, UserProfile>(
            r#"
            SELECT user_id, device_token, created_at, updated_at
            FROM user_profiles
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Register (or replace) the device token for a user, creating the profile if needed.
    pub async fn upsert_device_token(
        pool: &SqlitePool,
        user_id: &str,
        device_token: &str,
    ) -> AppResult<UserProfile> {
        let now = Utc::now().naive_utc();
        sqlx::query(
            r#"
            INSERT INTO user_profiles (user_id, device_token, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                device_token = excluded.device_token,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(device_token)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Self::find_by_id(pool, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User profile {}", user_id)))
    }

    /// Forget the device token (e.g. on logout). Returns false if the profile does not exist.
    pub async fn clear_device_token(pool: &SqlitePool, user_id: &str) -> AppResult<bool> {
        let now = Utc::now().naive_utc();
        let result = sqlx::query(
            r#"
            UPDATE user_profiles
            SET device_token = NULL, updated_at = ?
            WHERE user_id = ?
            "#,
        )
        .bind(now)
        .bind(user_id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }
}
