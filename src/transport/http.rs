//! HTTP transport for the gateway.
//!
//! Wraps the API routes in the middleware stack (tracing, CORS, gzip) and
//! runs the server until SIGINT or SIGTERM, then closes every database
//! handle.

use crate::error::{DbError, DbResult};
use crate::transport::routes::{AppState, router};
use axum::{
    Router,
    body::Body,
    http::{HeaderName, HeaderValue, Request, header},
    middleware::{self, Next},
    response::Response,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{
    CompressionLevel,
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

/// Requests carrying this header are never compressed.
pub const NO_COMPRESSION_HEADER: &str = "x-no-compression";

/// Graceful shutdown: in-flight requests get this long once a signal arrives.
const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

/// Listener and middleware settings.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub host: String,
    pub port: u16,
    /// Empty allows any origin
    pub cors_origins: Vec<String>,
    /// Gzip level, 0-9
    pub compression_level: u32,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            host: crate::config::DEFAULT_HTTP_HOST.to_string(),
            port: crate::config::DEFAULT_HTTP_PORT,
            cors_origins: Vec::new(),
            compression_level: crate::config::DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

/// Build the full application: routes plus middleware.
pub fn build_app(state: AppState, settings: &HttpSettings) -> DbResult<Router> {
    let compression = CompressionLayer::new()
        .gzip(true)
        .quality(CompressionLevel::Precise(settings.compression_level.min(9) as i32));

    // Outermost layer last: the compression opt-out must run before the
    // compression layer reads Accept-Encoding.
    Ok(router(state)
        .layer(compression)
        .layer(middleware::from_fn(skip_compression))
        .layer(cors_layer(&settings.cors_origins)?)
        .layer(TraceLayer::new_for_http()))
}

fn cors_layer(origins: &[String]) -> DbResult<CorsLayer> {
    if origins.is_empty() {
        return Ok(CorsLayer::permissive());
    }
    let origins = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin.trim())
                .map_err(|_| DbError::config(format!("Invalid CORS origin: {}", origin)))
        })
        .collect::<DbResult<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any))
}

/// Drop `Accept-Encoding` from requests that opt out of compression.
async fn skip_compression(mut request: Request<Body>, next: Next) -> Response {
    if request
        .headers()
        .contains_key(HeaderName::from_static(NO_COMPRESSION_HEADER))
    {
        request.headers_mut().remove(header::ACCEPT_ENCODING);
    }
    next.run(request).await
}

/// HTTP transport implementation.
pub struct HttpTransport {
    state: AppState,
    settings: HttpSettings,
}

impl HttpTransport {
    pub fn new(state: AppState, settings: HttpSettings) -> Self {
        Self { state, settings }
    }

    /// Get the bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.settings.host, self.settings.port)
    }

    /// Serve until a shutdown signal, then close all database handles.
    pub async fn run(&self) -> DbResult<()> {
        let bind_addr = self.bind_addr();
        let app = build_app(self.state.clone(), &self.settings)?;

        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| DbError::config(format!("Failed to bind to {}: {}", bind_addr, e)))?;

        info!("Server is running => http://{}", bind_addr);

        let shutdown_notify = Arc::new(tokio::sync::Notify::new());
        let shutdown_notify_clone = shutdown_notify.clone();

        let shutdown_signal = async move {
            wait_for_signal().await;
            shutdown_notify_clone.notify_one();
        };

        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal);

        // Race between: server draining normally vs forced timeout/second signal
        tokio::select! {
            result = server => {
                match result {
                    Ok(()) => info!("HTTP server stopped"),
                    Err(e) => {
                        error!(error = %e, "HTTP server error");
                        self.close_connections().await;
                        return Err(DbError::internal(format!("HTTP server error: {}", e)));
                    }
                }
            }
            _ = async {
                shutdown_notify.notified().await;
                info!(
                    timeout_secs = GRACEFUL_TIMEOUT.as_secs(),
                    "Waiting for requests to finish (send signal again to force exit)..."
                );

                tokio::select! {
                    _ = tokio::time::sleep(GRACEFUL_TIMEOUT) => {
                        warn!("Graceful shutdown timeout, forcing exit");
                    }
                    _ = wait_for_signal() => {
                        warn!("Received second signal, forcing immediate exit");
                    }
                }
            } => {}
        }

        self.close_connections().await;
        Ok(())
    }

    async fn close_connections(&self) {
        info!("Closing database connections");
        let report = self.state.manager().close_all().await;
        for failure in &report.failures {
            error!(
                target_name = %failure.target,
                mode = %failure.mode,
                error = %failure.error,
                "Failed to close database connection"
            );
        }
    }
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_signal() {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
