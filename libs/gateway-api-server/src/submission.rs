use std::sync::Arc;

use axum::http::StatusCode;
use serde::Serialize;

use relay_api::Publisher;

// ═══════════════════════════════════════════════════════════════
//  Gateway — HTTP body → Record → Envelope → publish
// ═══════════════════════════════════════════════════════════════

/// Producer-side relay: валидирует входящую запись и публикует её в канал.
///
/// Единственное разделяемое состояние — handle брокера; он обязан
/// выдерживать конкурентные publish из разных HTTP задач.
pub struct Gateway {
    publisher: Arc<dyn Publisher>,
    channel: String,
    broker_error_status: StatusCode,
}

impl Gateway {
    pub fn new(publisher: Arc<dyn Publisher>, channel: impl Into<String>) -> Self {
        Self {
            publisher,
            channel: channel.into(),
            broker_error_status: StatusCode::BAD_GATEWAY,
        }
    }

    /// Статус ответа при ошибке брокера. По умолчанию 502;
    /// 400 — ошибки брокера и клиента не различаются (legacy-режим).
    pub fn with_broker_error_status(mut self, status: StatusCode) -> Self {
        self.broker_error_status = status;
        self
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Обработать одну отправку. Ровно один publish на успешный запрос,
    /// ни одного — на отклонённый. Без retry.
    pub async fn handle_submission(&self, body: &[u8]) -> (StatusCode, String) {
        let record = match relay_api::decode(body) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, bytes = body.len(), "submission rejected");
                return (StatusCode::BAD_REQUEST, e.to_string());
            }
        };

        let envelope = match relay_api::encode(&record) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::error!(error = %e, "encode of validated record failed");
                return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
            }
        };

        if let Err(e) = self.publisher.publish(&self.channel, envelope).await {
            tracing::error!(channel = %self.channel, error = %e, "publish failed");
            return (self.broker_error_status, e.to_string());
        }

        tracing::info!(channel = %self.channel, name = %record.name(), "record published");
        (StatusCode::OK, format!("Request successfully processed: {record}"))
    }
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
}

/// Liveness процесса. Брокер не опрашивается.
pub fn health_check() -> (StatusCode, HealthStatus) {
    (StatusCode::OK, HealthStatus { status: "ok" })
}
