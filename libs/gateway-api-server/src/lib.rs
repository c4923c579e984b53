mod error;
mod http;
mod submission;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use error::ApiServerError;
pub use axum::http::StatusCode;
pub use submission::{health_check, Gateway, HealthStatus};

#[derive(Clone)]
pub(crate) struct AppState {
    gateway: Arc<Gateway>,
    request_timeout: Duration,
}

/// Маршруты gateway:
/// - `GET /health` — liveness, без обращения к брокеру;
/// - `POST /` — тело = сериализованная запись, публикуется в канал gateway.
pub fn router(gateway: Arc<Gateway>, request_timeout: Duration) -> Router {
    let state = AppState {
        gateway,
        request_timeout,
    };

    Router::new()
        .route("/health", get(http::handle_health))
        .route("/", post(http::handle_submit))
        .layer(middleware::from_fn_with_state(state.clone(), http::log_requests))
        .with_state(state)
}

/// HTTP gateway на `addr` до отмены `shutdown`.
pub async fn run(
    addr: SocketAddr,
    gateway: Arc<Gateway>,
    request_timeout: Duration,
    shutdown: CancellationToken,
) -> Result<(), ApiServerError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ApiServerError::Bind { addr, source })?;
    serve(listener, gateway, request_timeout, shutdown).await
}

/// То же, что [`run`], на уже открытом listener'е.
pub async fn serve(
    listener: TcpListener,
    gateway: Arc<Gateway>,
    request_timeout: Duration,
    shutdown: CancellationToken,
) -> Result<(), ApiServerError> {
    if let Ok(local) = listener.local_addr() {
        tracing::info!(addr = %local, channel = %gateway.channel(), "gateway listening");
    }

    axum::serve(listener, router(gateway, request_timeout))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(ApiServerError::Serve)
}
