use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod db;
mod error;
mod middleware;
mod routes;
mod services;

use config::Config;
use middleware::rate_limit;
use services::{dispatcher::StatusChangeDispatcher, init};

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Config,
    pub dispatcher: StatusChangeDispatcher,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "application_status_notifier=debug,tower_http=debug".into());
    let (json_layer, text_layer) = if config.server.json_logs {
        (Some(tracing_subscriber::fmt::layer().json()), None)
    } else {
        (None, Some(tracing_subscriber::fmt::layer()))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();

    tracing::info!("Starting application status notifier");

    // Initialize database and push delivery
    let pool = init::init_db(&config).await?;
    let push = init::init_push_sender(&config)?;
    let dispatcher = init::init_dispatcher(&pool, push);

    let app_state = Arc::new(AppState {
        db: pool,
        config: config.clone(),
        dispatcher,
    });

    let thread_shutdown = Arc::new(AtomicBool::new(false));

    // Trigger endpoints are public; limit them per client IP.
    let trigger_gov_conf = rate_limit::trigger_governor_config(&config.rate_limit)?;
    let trigger_cleaner = rate_limit::spawn_cleanup(&trigger_gov_conf, thread_shutdown.clone());
    let trigger_rate_layer = rate_limit::trigger_rate_layer(&trigger_gov_conf);

    // Build router
    let app = Router::new()
        // Health check
        .route("/health", get(routes::health::health_check))
        // Document-change triggers (apply rate limiting)
        .nest(
            "/triggers",
            routes::triggers::router().layer(trigger_rate_layer),
        )
        // Profile and device token registration
        .nest("/api/users", routes::users::router())
        // Add shared state
        .with_state(app_state.clone())
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let server_fut = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(thread_shutdown.clone()));

    if let Err(e) = server_fut.await {
        tracing::error!("Server error: {}", e);
    }

    // Make sure the cleanup thread sees the flag even if the server stopped on its own.
    thread_shutdown.store(true, Ordering::SeqCst);
    if let Err(e) = trigger_cleaner.join() {
        tracing::warn!("Trigger cleanup thread join failed: {:?}", e);
    }

    app_state.db.close().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM. In-flight trigger requests finish before the server exits.
async fn shutdown_signal(thread_shutdown: Arc<AtomicBool>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to bind SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining in-flight requests");
    thread_shutdown.store(true, Ordering::SeqCst);
}
