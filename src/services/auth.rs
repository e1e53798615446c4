use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Session token claims issued to the mobile app. `sub` is the app's user id.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
}

pub struct AuthService;

impl AuthService {
    /// Decode and validate a session JWT, returning the claims
    pub fn decode_jwt(secret: &str, token: &str) -> AppResult<Claims> {
        if secret.is_empty() {
            tracing::warn!("JWT_SECRET is empty; rejecting session token");
            return Err(AppError::Unauthorized);
        }

        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;

        if token_data.claims.sub.trim().is_empty() {
            return Err(AppError::Unauthorized);
        }
        Ok(token_data.claims)
    }

    /// Create a signed session JWT, as the app's auth backend does.
    #[cfg(test)]
    pub fn create_jwt(secret: &str, user_id: &str, ttl: chrono::Duration) -> String {
        use jsonwebtoken::{encode, EncodingKey, Header};

        let now = chrono::Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp() as usize,
            exp: (now + ttl).timestamp() as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("HS256 encoding")
    }
}
