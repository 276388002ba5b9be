pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod providers;
pub mod queries;
pub mod services;
pub mod state;
pub mod workers;

pub use config::Config;
pub use database::{DbConn, DbPool};
pub use error::{Error, Result};
pub use state::AppState;

/// Load configuration from environment variables
pub fn load_config() -> Result<Config> {
    Ok(Config::load()?)
}

/// Initialize tracing subscriber with environment filter
///
/// Reads the RUST_LOG environment variable to set the log level.
/// If RUST_LOG is not set, it defaults to "info" level.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();
}

use axum::{
    Router,
    extract::Request,
    http::HeaderName,
    middleware as axum_middleware,
    middleware::Next,
    response::Response,
    routing::{delete, get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::handlers::{
    chats::list_chats,
    health::health_check,
    indexing::{cancel_job, get_job, submit_indexing},
    query::{query_answer, query_timeline},
    timelines::{get_timeline, list_timelines},
};
use crate::middleware::tenant::tenant_middleware;
use crate::providers::{openai::OpenAiClient, telegram::BridgeClient};
use crate::services::{
    indexing::{IndexerContext, JobRegistry},
    rate_limit::RateLimiter,
};
use crate::workers::{indexing_worker, orphan_cleanup_worker};

/// Middleware to add request ID to response headers
async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| {
            let id = Uuid::now_v7().to_string();
            if let Ok(value) = id.parse() {
                req.headers_mut()
                    .insert(HeaderName::from_static("x-request-id"), value);
            }
            id
        });

    let mut response = next.run(req).await;
    if let Ok(value) = request_id.parse() {
        response
            .headers_mut()
            .insert(HeaderName::from_static("x-request-id"), value);
    }

    response
}

/// Create API v1 routes
///
/// The health endpoint is open; every other route is tenant-scoped and runs
/// behind the tenant middleware (identity + per-tenant rate limiting).
pub fn create_api_router(state: AppState) -> Router<AppState> {
    Router::new().route("/health", get(health_check)).merge(
        Router::new()
            .route("/chats", get(list_chats))
            .route("/index", post(submit_indexing))
            .route("/jobs/{id}", get(get_job))
            .route("/jobs/{id}", delete(cancel_job))
            .route("/query/answer", post(query_answer))
            .route("/query/timeline", post(query_timeline))
            .route("/timelines", get(list_timelines))
            .route("/timelines/{id}", get(get_timeline))
            .route_layer(axum_middleware::from_fn_with_state(
                state.clone(),
                tenant_middleware,
            )),
    )
}

/// Start the Axum API server
///
/// Connects the database pool, runs migrations, wires provider clients and
/// background workers, and serves the API until a shutdown signal.
pub async fn run_api_server(config: Config) -> Result<()> {
    use secrecy::ExposeSecret;

    let config = Arc::new(config);

    // Create database connection pool
    let pool = DbPool::connect(config.database.connection_string().expose_secret())
        .await
        .map_err(|e| Error::Internal(format!("Failed to connect to database: {}", e)))?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| Error::Internal(format!("Failed to run migrations: {}", e)))?;

    // Provider clients are shared across tenants; concurrency limits live in
    // the components that call them.
    let telegram = Arc::new(
        BridgeClient::new(&config.telegram)
            .map_err(|e| Error::Internal(format!("Failed to build telegram client: {}", e)))?,
    );
    let ai_client = Arc::new(
        OpenAiClient::new(&config.ai)
            .map_err(|e| Error::Internal(format!("Failed to build AI client: {}", e)))?,
    );

    let rate_limiter = Arc::new(RateLimiter::new(
        config.query.rate_limit_per_minute_per_tenant,
    ));
    let registry = JobRegistry::new();

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let (job_tx, job_rx) = tokio::sync::mpsc::channel(64);

    // Spawn the indexing worker pool
    let indexer_ctx = IndexerContext {
        pool: pool.clone(),
        config: Arc::clone(&config),
        telegram: telegram.clone(),
        embedder: ai_client.clone(),
        registry: registry.clone(),
    };
    let indexer_shutdown = shutdown_tx.subscribe();
    tokio::spawn(async move {
        indexing_worker(indexer_ctx, job_rx, indexer_shutdown).await;
    });

    // Spawn the orphaned-message garbage collector
    let cleanup_pool = pool.clone();
    let cleanup_shutdown = shutdown_tx.subscribe();
    tokio::spawn(async move {
        orphan_cleanup_worker(cleanup_pool, cleanup_shutdown).await;
    });

    // Periodically drop stale rate-limit windows
    let limiter = Arc::clone(&rate_limiter);
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(std::time::Duration::from_secs(600));
        loop {
            tick.tick().await;
            limiter.evict_stale(chrono::Utc::now());
        }
    });

    let app_state = AppState::new(
        pool,
        Arc::clone(&config),
        telegram,
        ai_client.clone(),
        ai_client,
        rate_limiter,
        registry,
        job_tx,
    );

    let api_routes = create_api_router(app_state.clone());

    let app = Router::new()
        .nest("/api/v1", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(axum_middleware::from_fn(request_id_middleware))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(|request: &Request<_>| {
                            let request_id = request
                                .headers()
                                .get("x-request-id")
                                .and_then(|v| v.to_str().ok())
                                .unwrap_or("unknown");

                            tracing::info_span!(
                                "http_request",
                                method = %request.method(),
                                path = %request.uri().path(),
                                request_id = %request_id,
                            )
                        })
                        .on_request(
                            tower_http::trace::DefaultOnRequest::new()
                                .level(tracing::Level::DEBUG),
                        )
                        .on_response(
                            tower_http::trace::DefaultOnResponse::new()
                                .level(tracing::Level::DEBUG),
                        ),
                )
                .layer(SetResponseHeaderLayer::if_not_present(
                    axum::http::header::X_CONTENT_TYPE_OPTIONS,
                    axum::http::HeaderValue::from_static("nosniff"),
                ))
                .layer(SetResponseHeaderLayer::if_not_present(
                    axum::http::header::X_FRAME_OPTIONS,
                    axum::http::HeaderValue::from_static("DENY"),
                ))
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                )
                .layer(CompressionLayer::new()),
        )
        .with_state(app_state);

    // Bind to address
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!(
        "API server listening on http://{} (version: {})",
        addr,
        env!("CARGO_PKG_VERSION")
    );

    // Setup shutdown handler
    let shutdown_signal = async move {
        if tokio::signal::ctrl_c().await.is_err() {
            tracing::error!("failed to install CTRL+C handler");
            return;
        }
        tracing::info!("Shutdown signal received");
        shutdown_tx.send(()).ok();
    };

    // Start server with shutdown signal
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    Ok(())
}
