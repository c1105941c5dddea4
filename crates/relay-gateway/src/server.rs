//! Gateway HTTP server - Axum-based JSON endpoints

use std::any::Any;
use std::net::SocketAddr;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use relay_core::{ChatRequest, FailoverRouter, HealthChecker, Registry, RouteError, seed_catalog};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};

use crate::protocol::{
    CheckReport, ERR_INTERNAL, ERR_INVALID_REQUEST, ERR_METHOD_NOT_ALLOWED, ERR_NOT_FOUND,
    ErrorBody, ModelCounts, ModelList, SeedReport, StatusReport,
};

/// Shared state for all handlers
#[derive(Clone)]
pub struct GatewayState {
    pub router: FailoverRouter,
    pub checker: HealthChecker,
    pub registry: Registry,
    pub start_time: Instant,
    pub started_at: DateTime<Utc>,
}

impl GatewayState {
    pub fn new(router: FailoverRouter, checker: HealthChecker) -> Self {
        Self {
            registry: router.registry().clone(),
            router,
            checker,
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }
}

/// The gateway server
pub struct GatewayServer {
    state: GatewayState,
    bind: SocketAddr,
}

impl GatewayServer {
    pub fn new(bind: SocketAddr, state: GatewayState) -> Self {
        Self { state, bind }
    }

    /// Build the Axum router
    pub fn router(&self) -> Router {
        Router::new()
            .route(
                "/api/ai",
                post(ai_handler)
                    .options(preflight_handler)
                    .fallback(method_not_allowed),
            )
            .route(
                "/api/cron",
                get(cron_handler).post(cron_handler).fallback(method_not_allowed),
            )
            .route("/api/seed", post(seed_handler).fallback(method_not_allowed))
            .route("/api/models", get(models_handler))
            .route("/api/status", get(status_handler))
            .fallback(not_found)
            .layer(CatchPanicLayer::custom(handle_panic))
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Bind and serve until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(self.bind)
            .await
            .with_context(|| format!("Failed to bind gateway to {}", self.bind))?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` is cancelled
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let addr = listener.local_addr()?;
        info!("Gateway listening on {}", addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .context("Gateway server error")?;

        info!("Gateway stopped");
        Ok(())
    }

    /// Start the server in the background, returning a handle
    pub fn spawn(self, shutdown: CancellationToken) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run(shutdown).await })
    }
}

fn json_error(status: StatusCode, body: ErrorBody) -> Response {
    (status, Json(body)).into_response()
}

// ── Chat endpoint ──

async fn ai_handler(
    State(state): State<GatewayState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!("Rejected AI request: {}", rejection.body_text());
            return json_error(
                StatusCode::BAD_REQUEST,
                ErrorBody::new(ERR_INVALID_REQUEST).with_detail(rejection.body_text()),
            );
        }
    };

    if let Err(detail) = request.validate() {
        warn!("Rejected AI request: {}", detail);
        return json_error(
            StatusCode::BAD_REQUEST,
            ErrorBody::new(ERR_INVALID_REQUEST).with_detail(detail),
        );
    }

    debug!(
        "AI request: feature={}, messages={}, tools={}",
        request.feature,
        request.messages.len(),
        request.tools.as_ref().map_or(0, |t| t.len())
    );

    match state.router.route(&request).await {
        Ok(completion) => Json(completion).into_response(),
        Err(e @ RouteError::NoProviders) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, ErrorBody::new(e.to_string()))
        }
        Err(e) => {
            error!("AI request failed: {} (last error: {:?})", e, e.last_error_message());
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new(e.to_string())
                    .with_last_error(e.last_error_message().map(String::from)),
            )
        }
    }
}

async fn preflight_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [
            (
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static("POST, OPTIONS"),
            ),
            (
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static("Content-Type, Authorization"),
            ),
        ],
    )
}

async fn method_not_allowed() -> Response {
    json_error(StatusCode::METHOD_NOT_ALLOWED, ErrorBody::new(ERR_METHOD_NOT_ALLOWED))
}

async fn not_found() -> Response {
    json_error(StatusCode::NOT_FOUND, ErrorBody::new(ERR_NOT_FOUND))
}

// ── Operations ──

async fn cron_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    info!("Running health check via HTTP trigger");
    let results = state.checker.run_once().await;
    Json(CheckReport {
        success: true,
        results,
    })
}

async fn seed_handler(State(state): State<GatewayState>) -> Response {
    let catalog = seed_catalog();
    match state.registry.replace_all(&catalog).await {
        Ok(()) => {
            info!("Seeded {} model entries into {}", catalog.len(), state.registry.backend_name());
            Json(SeedReport {
                success: true,
                count: catalog.len(),
            })
            .into_response()
        }
        Err(e) => {
            error!("Seeding failed: {:#}", e);
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new(format!("{:#}", e)),
            )
        }
    }
}

async fn models_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    let models = state.registry.list().await.iter().map(|e| e.masked()).collect();
    Json(ModelList {
        backend: state.registry.backend_name().to_string(),
        models,
    })
}

async fn status_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    let entries = state.registry.list().await;
    Json(StatusReport {
        status: "ok".to_string(),
        backend: state.registry.backend_name().to_string(),
        started_at: state.started_at.to_rfc3339(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        models: ModelCounts::tally(&entries),
    })
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Unknown panic".to_string()
    };
    error!("Handler panicked: {}", detail);
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        ErrorBody::new(ERR_INTERNAL).with_detail(detail),
    )
}
