//! DentForge API Gateway
//!
//! The entry point for all chart, ledger and schedule requests.
//! Handles:
//! - Authentication and organization scoping
//! - Rate limiting and concurrency limits
//! - Request routing
//! - Observability (logging, metrics)

mod handlers;
mod middleware;

use axum::{
    extract::{FromRef, Request},
    middleware::{from_fn, Next},
    routing::{get, patch, post},
    Router,
};
use dentforge_common::{
    auth::JwtManager,
    config::AppConfig,
    db::{DbPool, Repository},
    dental::ChartService,
    errors::AppError,
    metrics::{self, LATENCY_BUCKETS, RECONCILE_BUCKETS},
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DbPool,
    pub charts: ChartService<Repository>,
    pub jwt: Arc<JwtManager>,
}

impl FromRef<AppState> for Arc<JwtManager> {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Arc::new(AppConfig::load()?);

    init_tracing(&config);
    info!("Starting DentForge API Gateway v{}", dentforge_common::VERSION);

    // Initialize metrics
    install_metrics_exporter(&config)?;
    metrics::register_metrics();

    // Initialize database connection
    let db = DbPool::new(&config.database).await?;

    let secret = config.auth.jwt_secret.as_deref().ok_or_else(|| AppError::Configuration {
        message: "auth.jwt_secret must be set".to_string(),
    })?;
    let jwt = Arc::new(JwtManager::new(secret, config.auth.jwt_expiration_secs));

    // Code catalog is read-only for the life of the process
    let catalog = Repository::new(db.clone()).load_catalog().await?;
    if catalog.disable_code().is_none() {
        warn!("Procedure code catalog has no DISABLED code; run migrations");
    }
    info!(codes = catalog.len(), "Procedure code catalog loaded");

    let charts = ChartService::new(
        Arc::new(Repository::new(db.clone())),
        Arc::new(catalog),
        config.dental.audit_retention,
    );

    // Create app state
    let state = AppState {
        config: config.clone(),
        db,
        charts,
        jwt,
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize the tracing subscriber from observability config
fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if config.observability.json_logging {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
}

/// Serve Prometheus metrics on the dedicated metrics port
fn install_metrics_exporter(config: &AppConfig) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_request_duration_seconds", metrics::METRICS_PREFIX)),
            LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_chart_reconcile_duration_seconds", metrics::METRICS_PREFIX)),
            RECONCILE_BUCKETS,
        )?
        .install()?;

    info!(%addr, "Prometheus exporter listening");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // API routes
    let api_routes = Router::new()
        // Health endpoints (no auth)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))

        // Code catalog
        .route("/codes", get(handlers::codes::list_codes))

        // Patient endpoints
        .route("/patients", post(handlers::patients::create_patient))
        .route("/patients/{id}", get(handlers::patients::get_patient))

        // Dental chart endpoints
        .route(
            "/patients/{id}/dental",
            get(handlers::dental::get_dental).post(handlers::dental::save_dental),
        )
        .route(
            "/patients/{id}/teeth/{tooth}/disable",
            post(handlers::dental::disable_tooth).delete(handlers::dental::enable_tooth),
        )

        // Procedure ledger endpoints
        .route(
            "/patients/{id}/procedures",
            get(handlers::procedures::list_procedures).post(handlers::procedures::create_procedure),
        )
        .route(
            "/procedures/{id}",
            patch(handlers::procedures::update_procedure).delete(handlers::procedures::delete_procedure),
        )
        .route("/procedures/{id}/audit", get(handlers::procedures::get_audit))
        .route("/procedures/{id}/undo", post(handlers::procedures::undo_procedure))

        // Schedule endpoints
        .route("/schedules", post(handlers::schedules::create_schedule))
        .route("/schedules/{id}/overrides", get(handlers::schedules::list_overrides))
        .route(
            "/schedules/{id}/overrides/weekday",
            post(handlers::schedules::expand_weekday_overrides),
        )
        .route_layer(from_fn(middleware::metrics::track_metrics));

    let mut app = Router::new().nest("/v1", api_routes);

    if state.config.rate_limit.enabled {
        let per_second = state.config.rate_limit.requests_per_second;
        let limiter = middleware::rate_limit::create_rate_limiter(per_second, state.config.rate_limit.burst);
        app = app.layer(from_fn(move |request: Request, next: Next| {
            middleware::rate_limit::rate_limit_middleware(request, next, limiter.clone(), per_second)
        }));
    }

    // Compose the app
    app.layer(TimeoutLayer::new(state.config.request_timeout()))
        .layer(ConcurrencyLimitLayer::new(state.config.server.max_concurrent_requests))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
