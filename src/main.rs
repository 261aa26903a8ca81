use axum::{Router, http::header, routing::get};
use splitledger::{
    api::{handlers::api_routes, openapi::ApiDoc},
    config::CONFIG,
    core::{rate_limit::SlidingWindowRateLimiter, services::LedgerService},
    infrastructure::{
        logging::in_memory::InMemoryLogging,
        notify::in_memory::InMemoryNotifier,
        storage::{in_memory::InMemoryStorage, timeout::TimedStorage},
    },
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&CONFIG.log_level)))
        .init();
    info!(config = ?*CONFIG, "starting");

    // Initialize storage, logging and notifications
    let storage = TimedStorage::new(InMemoryStorage::new(), CONFIG.storage_timeout());
    let logging = InMemoryLogging::new();
    let notifier = InMemoryNotifier::new();
    let limiter = SlidingWindowRateLimiter::new(
        CONFIG.webhook_rate_limit,
        chrono::Duration::seconds(CONFIG.webhook_rate_window_secs),
    );
    let service = Arc::new(LedgerService::new(
        storage,
        logging,
        notifier,
        CONFIG.jwt_secret.clone(),
        CONFIG.ledger_settings(),
        limiter,
    ));

    if CONFIG.reminder_sweep_secs > 0 {
        let sweeper = service.clone();
        let period = Duration::from_secs(CONFIG.reminder_sweep_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if let Err(err) = sweeper.run_reminder_sweep(chrono::Utc::now()).await {
                    warn!(error = %err, retryable = err.is_retryable(), "reminder sweep failed");
                }
            }
        });
    }

    let app = Router::new()
        .route("/", get(|| async { "OK" }))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/api", api_routes(service))
        .layer(CompressionLayer::new()) // Gzip compression
        .layer(TimeoutLayer::new(Duration::from_secs(30))) // 30-second timeout
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([http::Method::GET, http::Method::POST, http::Method::PUT, http::Method::DELETE])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
        )
        .layer(TraceLayer::new_for_http()); // Request tracing

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], CONFIG.port));
    info!("Server running at http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
