//! Foodgram API Gateway
//!
//! The HTTP entry point for the recipe service.
//! Handles:
//! - Authentication
//! - Rate limiting
//! - Request routing
//! - Observability (logging, metrics)

mod handlers;
mod middleware;

use anyhow::Context;
use axum::{
    extract::FromRef,
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use foodgram_common::{
    auth::JwtManager,
    config::AppConfig,
    db::DbPool,
    metrics,
    shopping_list::{DocumentRenderer, PdfRenderer},
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
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
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone, FromRef)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DbPool,
    pub jwt: Arc<JwtManager>,
    pub renderer: Arc<dyn DocumentRenderer>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;
    let config = Arc::new(config);

    init_tracing(&config);

    info!("Starting Foodgram API Gateway v{}", foodgram_common::VERSION);

    // Initialize metrics
    let prometheus = if config.observability.metrics_enabled {
        Some(install_prometheus()?)
    } else {
        None
    };
    metrics::register_metrics();

    let jwt_secret = config
        .auth
        .jwt_secret
        .as_deref()
        .filter(|s| !s.is_empty())
        .context("auth.jwt_secret must be set (APP__AUTH__JWT_SECRET)")?;
    let jwt = Arc::new(JwtManager::new(jwt_secret, config.auth.jwt_expiration_secs));

    // Initialize database connection
    let db = DbPool::new(&config.database)
        .await
        .context("Failed to connect to database")?;

    if config.database.run_migrations {
        db.migrate().await.context("Failed to apply migrations")?;
    }

    let renderer: Arc<dyn DocumentRenderer> =
        Arc::new(PdfRenderer::from_config(&config.shopping_list));

    // Create app state
    let state = AppState {
        config: config.clone(),
        db,
        jwt,
        renderer,
    };

    // Build the router
    let app = create_router(state, prometheus);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server.host / server.port")?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.observability.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn install_prometheus() -> anyhow::Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_request_duration_seconds", metrics::METRICS_PREFIX)),
            metrics::LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(format!(
                "{}_shopping_list_render_duration_seconds",
                metrics::METRICS_PREFIX
            )),
            metrics::RENDER_BUCKETS,
        )?
        .install_recorder()
        .context("Failed to install Prometheus recorder")
}

/// Create the main application router
fn create_router(state: AppState, prometheus: Option<PrometheusHandle>) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let limiter = middleware::rate_limit::RateLimitState::from_config(&state.config.rate_limit);

    let api_routes = Router::new()
        // Users & auth
        .route(
            "/users",
            get(handlers::users::list_users).post(handlers::users::register),
        )
        .route("/auth/token/login", post(handlers::users::login))
        .route("/users/me", get(handlers::users::me))
        .route("/users/set_password", post(handlers::users::set_password))
        .route("/users/subscriptions", get(handlers::subscriptions::list_subscriptions))
        .route("/users/{id}", get(handlers::users::get_user))
        .route(
            "/users/{id}/subscribe",
            post(handlers::subscriptions::subscribe).delete(handlers::subscriptions::unsubscribe),
        )
        // Reference data
        .route("/tags", get(handlers::tags::list_tags))
        .route("/tags/{id}", get(handlers::tags::get_tag))
        .route("/ingredients", get(handlers::ingredients::list_ingredients))
        .route("/ingredients/{id}", get(handlers::ingredients::get_ingredient))
        // Reference data management (superusers only)
        .route("/only-for-admins/tags", post(handlers::admin::create_tag))
        .route("/only-for-admins/tags/{id}", delete(handlers::admin::delete_tag))
        .route(
            "/only-for-admins/ingredients",
            post(handlers::admin::create_ingredient),
        )
        .route(
            "/only-for-admins/ingredients/{id}",
            delete(handlers::admin::delete_ingredient),
        )
        // Recipes
        .route(
            "/recipes",
            get(handlers::recipes::list_recipes).post(handlers::recipes::create_recipe),
        )
        .route(
            "/recipes/download_shopping_cart",
            get(handlers::shopping_cart::download_shopping_cart),
        )
        .route(
            "/recipes/{id}",
            get(handlers::recipes::get_recipe)
                .patch(handlers::recipes::update_recipe)
                .delete(handlers::recipes::delete_recipe),
        )
        .route(
            "/recipes/{id}/favorite",
            post(handlers::recipes::add_favorite).delete(handlers::recipes::remove_favorite),
        )
        .route(
            "/recipes/{id}/shopping_cart",
            post(handlers::shopping_cart::add_to_cart)
                .delete(handlers::shopping_cart::remove_from_cart),
        )
        .route_layer(axum_middleware::from_fn(middleware::metrics::track_metrics));

    let mut app = Router::new()
        // Health endpoints (no auth)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .nest("/api", api_routes);

    if let Some(handle) = prometheus {
        app = app.route("/metrics", get(move || std::future::ready(handle.render())));
    }

    let mut app = app.with_state(state.clone());

    if let Some(limiter) = limiter {
        app = app.layer(axum_middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit::rate_limit_middleware,
        ));
    }

    // Compose the app
    app.layer(ConcurrencyLimitLayer::new(state.config.server.max_concurrent_requests))
        .layer(TimeoutLayer::new(state.config.request_timeout()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
