//! Initialization helpers for the application:
//! - database connection + migrations
//! - push delivery client
//! - the status-change dispatcher wired to both
//!
//! Everything here runs once at process start; the results are shared through `AppState`.

use std::{path::Path, sync::Arc};

use anyhow::Result;

use crate::config::{Config, PushProvider};
use crate::services::dispatcher::StatusChangeDispatcher;
use crate::services::fcm::FcmService;
use crate::services::profiles::SqliteProfileStore;
use crate::services::push::{LogPushSender, PushSender};

/// Redact potentially sensitive information from a database URL before logging.
///
/// Attempts to parse the URL and remove userinfo (username:password) components.
/// Falls back to removing everything before '@' or returning "(redacted)".
pub fn redact_db_url(db_url: &str) -> String {
    if let Ok(url) = url::Url::parse(db_url) {
        let scheme = url.scheme();
        let host = url.host_str().unwrap_or("");
        let port_part = url.port().map(|p| format!(":{}", p)).unwrap_or_default();
        let path = url.path();
        format!("{}://{}{}{}", scheme, host, port_part, path)
    } else {
        if let Some(at_pos) = db_url.find('@') {
            let without_creds = &db_url[at_pos + 1..];
            return format!("(redacted){}", without_creds);
        }
        "(redacted)".to_string()
    }
}

/// Initialize SQLite database connection and run migrations.
///
/// Creates the parent directory for the database file (if applicable),
/// opens a connection pool using `create_if_missing(true)` and runs migrations.
pub async fn init_db(config: &Config) -> Result<sqlx::SqlitePool> {
    let db_url = &config.database.url;
    tracing::info!("Connecting to database: {}", redact_db_url(db_url));

    let db_path = db_url.strip_prefix("sqlite://").unwrap_or(db_url);
    let db_file_path = Path::new(db_path);

    if let Some(parent) = db_file_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                anyhow::anyhow!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                )
            })?;
        }
    }

    let connect_options = sqlx::sqlite::SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true);

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect_with(connect_options)
        .await?;

    tracing::info!("Running database migrations");
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Build the push sender selected by `PUSH_PROVIDER`.
pub fn init_push_sender(config: &Config) -> Result<Arc<dyn PushSender>> {
    match config.push.provider {
        PushProvider::Fcm => {
            let fcm = FcmService::new(&config.push)
                .map_err(|e| anyhow::anyhow!("Failed to initialize FCM client: {}", e))?;
            tracing::info!(
                "Push delivery via FCM (project {})",
                config.push.fcm_project_id.as_deref().unwrap_or_default()
            );
            Ok(Arc::new(fcm))
        }
        PushProvider::Log => {
            tracing::warn!("PUSH_PROVIDER=log: notifications will be logged, not delivered");
            Ok(Arc::new(LogPushSender))
        }
    }
}

/// Wire the dispatcher to the profile table and the configured push sender.
pub fn init_dispatcher(
    pool: &sqlx::SqlitePool,
    push: Arc<dyn PushSender>,
) -> StatusChangeDispatcher {
    let profiles = Arc::new(SqliteProfileStore::new(pool.clone()));
    StatusChangeDispatcher::new(profiles, push)
}
