//! Per-client rate limiting for the public trigger endpoints.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::JoinHandle;
use std::time::Duration;

use axum::body::Body;
use governor::middleware::NoOpMiddleware;
use http::{HeaderValue, StatusCode};
use tower_governor::governor::{GovernorConfig, GovernorConfigBuilder};
use tower_governor::key_extractor::SmartIpKeyExtractor;
use tower_governor::{GovernorError, GovernorLayer};

use crate::config::RateLimitConfig;

/// Limiter keyed by the client IP, read from `X-Forwarded-For`, `X-Real-IP` or
/// `Forwarded` before falling back to the socket peer address.
pub type TriggerGovernorConfig = GovernorConfig<SmartIpKeyExtractor, NoOpMiddleware>;

pub fn trigger_governor_config(
    config: &RateLimitConfig,
) -> anyhow::Result<Arc<TriggerGovernorConfig>> {
    // The limiter replenishes one request per period.
    let period_ms = (1000 / config.trigger_per_second.max(1)).max(1);

    let mut builder = GovernorConfigBuilder::default().key_extractor(SmartIpKeyExtractor);
    builder.per_millisecond(period_ms.into());
    builder.burst_size(config.trigger_burst);
    builder.error_handler(rate_limit_error);

    let conf = builder
        .finish()
        .ok_or_else(|| anyhow::anyhow!("Failed to build trigger governor config"))?;
    Ok(Arc::new(conf))
}

pub fn trigger_rate_layer(
    config: &Arc<TriggerGovernorConfig>,
) -> GovernorLayer<SmartIpKeyExtractor, NoOpMiddleware> {
    GovernorLayer {
        config: config.clone(),
    }
}

/// Periodically drop stale limiter keys until `shutdown` is set.
pub fn spawn_cleanup(
    config: &Arc<TriggerGovernorConfig>,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    let limiter = config.limiter().clone();
    let interval = Duration::from_secs(60);
    std::thread::spawn(move || {
        // Use smaller sleep granularity to allow quick shutdown.
        let tick = Duration::from_secs(1);
        loop {
            for _ in 0..interval.as_secs() {
                if shutdown.load(Ordering::SeqCst) {
                    tracing::info!("Trigger rate limiter cleanup thread exiting");
                    return;
                }
                std::thread::sleep(tick);
            }
            tracing::debug!("trigger rate limiter size: {}", limiter.len());
            limiter.retain_recent();
        }
    })
}

fn json_response(status: StatusCode, body: serde_json::Value) -> http::Response<Body> {
    let mut resp = http::Response::new(Body::from(body.to_string()));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        http::header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    resp
}

/// Map limiter rejections onto the same error shape as `AppError`.
fn rate_limit_error(error: GovernorError) -> http::Response<Body> {
    match error {
        GovernorError::TooManyRequests { wait_time, headers } => {
            // `wait_time` is provided as seconds
            let mut resp = json_response(
                StatusCode::TOO_MANY_REQUESTS,
                serde_json::json!({
                    "error": {
                        "code": "RATE_LIMITED",
                        "message": "Rate limit exceeded",
                        "details": { "retry_after_seconds": wait_time }
                    }
                }),
            );

            if let Some(hmap) = headers {
                for (name, value) in hmap.iter() {
                    resp.headers_mut().append(name.clone(), value.clone());
                }
            }
            resp.headers_mut()
                .insert(http::header::RETRY_AFTER, HeaderValue::from(wait_time));

            resp
        }
        GovernorError::UnableToExtractKey => json_response(
            StatusCode::BAD_REQUEST,
            serde_json::json!({
                "error": {
                    "code": "INVALID_REQUEST",
                    "message": "Unable to determine client IP for rate limiting"
                }
            }),
        ),
        GovernorError::Other { code, msg, headers } => {
            let body = msg.unwrap_or_else(|| "Rate limiting error".to_string());
            let mut resp = http::Response::new(Body::from(body));
            *resp.status_mut() =
                StatusCode::from_u16(code.as_u16()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            if let Some(hmap) = headers {
                for (name, value) in hmap.iter() {
                    resp.headers_mut().append(name.clone(), value.clone());
                }
            }
            resp
        }
    }
}
