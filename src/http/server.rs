//! HTTP server exposing the rate limit check endpoint.

use std::net::SocketAddr;

use axum::http::StatusCode;
use axum::middleware::from_fn_with_state;
use axum::routing::{any, get};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::middleware::{rate_limit, RateLimitGuard};
use crate::error::{Result, WindowGateError};

/// HTTP server for the rate limit check service.
///
/// `/check` sits behind the limiter and answers `204` when admitted, so a
/// fronting proxy can use it as a subrequest gate. `/healthz` is never
/// limited.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Middleware state wrapping the limiter instance
    guard: RateLimitGuard,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, guard: RateLimitGuard) -> Self {
        Self { addr, guard }
    }

    /// Build the service router.
    pub fn router(&self) -> Router {
        let limited = Router::new()
            .route("/check", any(check))
            .route_layer(from_fn_with_state(self.guard.clone(), rate_limit));

        Router::new().route("/healthz", get(healthz)).merge(limited)
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        let listener = TcpListener::bind(self.addr).await?;

        info!(addr = %self.addr, "Starting HTTP server for rate limit checks");

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            WindowGateError::Server(e.to_string())
        })
    }
}

async fn check() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn healthz() -> &'static str {
    "ok"
}
