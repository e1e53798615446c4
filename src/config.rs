use std::env;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub push: PushConfig,
    pub trigger: TriggerConfig,
    pub jwt: JwtConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Emit logs as JSON lines instead of the human-readable format.
    /// Read from env var `LOG_FORMAT` (`json` enables it).
    pub json_logs: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushProvider {
    /// Firebase Cloud Messaging HTTP v1
    Fcm,
    /// Log the composed payload instead of delivering it
    Log,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    pub provider: PushProvider,
    pub fcm_project_id: Option<String>,
    /// Path to a Google service-account key (JSON) used to mint access tokens.
    pub fcm_service_account_file: Option<String>,
    /// Pre-issued OAuth access token. Takes precedence over the service account.
    pub fcm_access_token: Option<String>,
    pub fcm_api_base_url: String,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TriggerConfig {
    /// Shared secret for `x-trigger-signature`. Signatures are not checked when unset.
    pub secret: Option<String>,
}

/// Verification of the app's session tokens (HS256, `sub` = user id).
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Allowed requests per second (per IP) for trigger endpoints
    pub trigger_per_second: u32,
    /// Burst size for trigger endpoints
    pub trigger_burst: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let provider = match env::var("PUSH_PROVIDER") {
            Ok(v) => match v.to_lowercase().as_str() {
                "fcm" => PushProvider::Fcm,
                "log" => PushProvider::Log,
                _ => return Err(ConfigError::InvalidValue("PUSH_PROVIDER".to_string())),
            },
            Err(_) => PushProvider::Log,
        };

        let config = Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
                json_logs: matches!(
                    env::var("LOG_FORMAT").map(|v| v.to_lowercase()).as_deref(),
                    Ok("json")
                ),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/app.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            push: PushConfig {
                provider,
                fcm_project_id: non_empty_var("FCM_PROJECT_ID"),
                fcm_service_account_file: non_empty_var("FCM_SERVICE_ACCOUNT_FILE"),
                fcm_access_token: non_empty_var("FCM_ACCESS_TOKEN"),
                fcm_api_base_url: env::var("FCM_API_BASE_URL")
                    .unwrap_or_else(|_| "https://fcm.googleapis.com".to_string()),
                request_timeout_seconds: env::var("PUSH_REQUEST_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10u64),
            },
            trigger: TriggerConfig {
                secret: non_empty_var("TRIGGER_SECRET"),
            },
            jwt: JwtConfig {
                secret: env::var("JWT_SECRET")
                    .map_err(|_| ConfigError::MissingEnv("JWT_SECRET".to_string()))?,
            },
            rate_limit: RateLimitConfig {
                trigger_per_second: env::var("RATE_LIMIT_TRIGGERS_PER_SECOND")
                    .unwrap_or_else(|_| "20".to_string())
                    .parse()
                    .unwrap_or(20),
                trigger_burst: env::var("RATE_LIMIT_TRIGGERS_BURST")
                    .unwrap_or_else(|_| "100".to_string())
                    .parse()
                    .unwrap_or(100),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// FCM needs a project and some way to authenticate.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.push.provider == PushProvider::Fcm {
            if self.push.fcm_project_id.is_none() {
                return Err(ConfigError::MissingEnv("FCM_PROJECT_ID".to_string()));
            }
            if self.push.fcm_access_token.is_none() && self.push.fcm_service_account_file.is_none()
            {
                return Err(ConfigError::MissingEnv(
                    "FCM_SERVICE_ACCOUNT_FILE or FCM_ACCESS_TOKEN".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                json_logs: false,
            },
            database: DatabaseConfig {
                url: "sqlite://data/app.db".to_string(),
                max_connections: 5,
            },
            push: PushConfig {
                provider: PushProvider::Log,
                fcm_project_id: None,
                fcm_service_account_file: None,
                fcm_access_token: None,
                fcm_api_base_url: "https://fcm.googleapis.com".to_string(),
                request_timeout_seconds: 10,
            },
            trigger: TriggerConfig { secret: None },
            jwt: JwtConfig {
                secret: String::new(),
            },
            rate_limit: RateLimitConfig {
                trigger_per_second: 20,
                trigger_burst: 100,
            },
        }
    }
}
