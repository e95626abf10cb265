//! REST endpoints under `/api/v1`.

use crate::auth::{
    AuthGate, Claims, INVALID_TOKEN_MESSAGE, TokenIssuer, auth_middleware, message_response,
};
use crate::db::{ConnectionManager, ConnectionMode, QueryExecutor};
use crate::error::DbError;
use crate::models::{ExecuteOptions, Params};
use axum::{
    Extension, Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

pub const API_PREFIX: &str = "/api/v1";

/// Statement used to probe connected targets.
const PING_SQL: &str = "SELECT 1";

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub executor: QueryExecutor,
    pub gate: AuthGate,
    pub tokens: Arc<TokenIssuer>,
    started: Instant,
}

impl AppState {
    pub fn new(executor: QueryExecutor, tokens: TokenIssuer) -> Self {
        let gate = AuthGate::new(Arc::clone(executor.manager()));
        Self {
            executor,
            gate,
            tokens: Arc::new(tokens),
            started: Instant::now(),
        }
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        self.executor.manager()
    }
}

/// Build the API routes without transport middleware.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/me", get(me))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state.tokens),
            auth_middleware,
        ));

    let auth = Router::new()
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .merge(protected);

    let api = Router::new()
        .route("/health", get(health))
        .route("/health/db", get(db_health))
        .nest("/auth", auth);

    Router::new().nest(API_PREFIX, api).with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime": state.started.elapsed().as_secs_f64(),
        "message": "API is working",
    }))
}

#[derive(Debug, Serialize)]
struct TargetHealth {
    target: String,
    mode: ConnectionMode,
    status: &'static str,
    latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn db_health(State(state): State<AppState>) -> Response {
    let mut targets = Vec::new();
    for (name, mode) in state.manager().connected().await {
        let start = Instant::now();
        let outcome = state
            .executor
            .execute_in(mode, &name, PING_SQL, &Params::none(), &ExecuteOptions::default())
            .await;
        let latency_ms = start.elapsed().as_millis() as u64;
        let error = outcome.err().map(|e| {
            warn!(target_name = %name, mode = %mode, error = %e, "Health check failed");
            e.to_string()
        });
        targets.push(TargetHealth {
            target: name,
            mode,
            status: if error.is_none() { "ok" } else { "error" },
            latency_ms,
            error,
        });
    }

    let healthy = targets.iter().all(|t| t.error.is_none());
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = serde_json::json!({
        "status": if healthy { "ok" } else { "degraded" },
        "targets": targets,
    });
    (status, Json(body)).into_response()
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    target: String,
    login: String,
    password: String,
}

async fn login(State(state): State<AppState>, Json(body): Json<LoginRequest>) -> Response {
    match state
        .gate
        .authenticate(&body.target, &body.login, &body.password)
        .await
    {
        Ok(_) => match state.tokens.issue(&body.login, Some(&body.target)) {
            Ok(pair) => Json(pair).into_response(),
            Err(e) => e.into_response(),
        },
        Err(DbError::Authentication { .. }) => {
            message_response(StatusCode::UNAUTHORIZED, "Invalid login or password")
        }
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

async fn refresh(State(state): State<AppState>, Json(body): Json<RefreshRequest>) -> Response {
    match state.tokens.refresh(&body.refresh_token) {
        Ok(pair) => Json(pair).into_response(),
        Err(DbError::InvalidToken { reason }) => {
            warn!(reason = %reason, "Refresh rejected");
            message_response(StatusCode::FORBIDDEN, INVALID_TOKEN_MESSAGE)
        }
        Err(e) => e.into_response(),
    }
}

async fn me(Extension(claims): Extension<Claims>) -> Json<Claims> {
    Json(claims)
}
