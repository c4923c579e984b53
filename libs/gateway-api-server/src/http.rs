use std::panic::AssertUnwindSafe;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures_util::FutureExt;

use super::{health_check, AppState};

// ═══════════════════════════════════════════════════════════════
//  REST: GET /health
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_health() -> impl IntoResponse {
    let (status, body) = health_check();
    (status, axum::Json(body))
}

// ═══════════════════════════════════════════════════════════════
//  REST: POST /
// ═══════════════════════════════════════════════════════════════

/// Обработка идёт в отдельной задаче: таймаут ответа не обрывает publish,
/// уже отправленный брокеру. Запись либо доходит до канала целиком, либо нет.
pub(crate) async fn handle_submit(
    State(state): State<AppState>,
    body: Bytes,
) -> Response {
    let gateway = state.gateway.clone();
    let submission = tokio::spawn(async move { gateway.handle_submission(&body).await });
    match submission.await {
        Ok(outcome) => outcome.into_response(),
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => {
            tracing::error!(error = %e, "submission task cancelled");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Middleware: request log + timeout + panic isolation
// ═══════════════════════════════════════════════════════════════

/// Два события на запрос: получен и завершён (со статусом и длительностью).
///
/// Таймаут и паника внутри handler'а завершают только этот запрос.
/// По таймауту клиент получает 504: publish продолжается в фоне,
/// и его исход на момент ответа неизвестен.
pub(crate) async fn log_requests(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let start = Instant::now();
    tracing::info!(%method, %uri, "request received");

    let handled = AssertUnwindSafe(next.run(req)).catch_unwind();
    let response = match tokio::time::timeout(state.request_timeout, handled).await {
        Ok(Ok(response)) => response,
        Ok(Err(_)) => {
            tracing::error!(%method, %uri, "request handler panicked");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
        }
        Err(_) => {
            tracing::warn!(
                %method,
                %uri,
                timeout_ms = state.request_timeout.as_millis() as u64,
                "request timed out"
            );
            (
                StatusCode::GATEWAY_TIMEOUT,
                "request timed out; publish outcome unknown",
            )
                .into_response()
        }
    };

    tracing::info!(
        %method,
        %uri,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "request completed"
    );
    response
}
