use axum::{
    extract::State,
    http::{HeaderName, StatusCode},
    middleware,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::{
    config::Settings,
    context::Context,
    error::{RateLimitError, Result},
    limiter::RateLimiter,
    metrics::Metrics,
    middleware::{rate_limit_middleware, RateLimitState},
};

/// Shared handles for the HTTP application
#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<RateLimiter>,
    pub metrics: Arc<Metrics>,
    pub request_timeout: Duration,
}

/// Build the application router.
///
/// `/` and `/test` sit behind the rate limiter; `/health` and `/metrics`
/// do not.
pub fn build_router(state: AppState, settings: &Settings) -> Result<Router> {
    let token_header = HeaderName::from_bytes(settings.token_header.as_bytes())
        .map_err(|e| RateLimitError::Config(format!("invalid token header: {}", e)))?;

    let limit_state = RateLimitState {
        limiter: state.limiter.clone(),
        metrics: state.metrics.clone(),
        token_header,
        request_timeout: state.request_timeout,
    };

    let limited = Router::new()
        .route("/", get(index))
        .route("/test", post(test_endpoint))
        .layer(middleware::from_fn_with_state(
            limit_state,
            rate_limit_middleware,
        ));

    let open = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler));

    Ok(limited.merge(open).with_state(state))
}

/// Serve `router` on `addr` until `shutdown` resolves
pub async fn serve<F>(router: Router, addr: SocketAddr, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

async fn index() -> Json<Value> {
    Json(json!({
        "message": "Rate Limiter API",
        "status": "running",
    }))
}

async fn test_endpoint() -> Json<Value> {
    Json(json!({
        "message": "Request processed successfully",
        "time": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn health_check(State(state): State<AppState>) -> std::result::Result<Json<Value>, StatusCode> {
    let ctx = Context::with_timeout(state.request_timeout);
    match state.limiter.health_check(&ctx).await {
        Ok(()) => Ok(Json(json!({
            "status": "healthy",
            "time": chrono::Utc::now().to_rfc3339(),
        }))),
        Err(e) => {
            warn!("Health check failed: {}", e);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

async fn metrics_handler(State(state): State<AppState>) -> std::result::Result<String, StatusCode> {
    state
        .metrics
        .encode()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
