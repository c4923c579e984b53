use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use broker_engine::RedisBroker;
use gateway_api_server::Gateway;
use relay_api::{BrokerProbe, USERS_CHANNEL};

use crate::config::Effective;
use crate::error::PublisherError;

pub async fn run(eff: Effective) -> Result<(), PublisherError> {
    tracing::info!("relay-publisher starting");

    // --- Broker: недоступен при старте → процесс завершается ---
    let broker = RedisBroker::connect(&eff.redis_url).await?;
    broker.ping().await?;
    tracing::info!(redis = %broker.target(), "broker reachable");

    let gateway = Gateway::new(Arc::new(broker), USERS_CHANNEL)
        .with_broker_error_status(eff.broker_error_status);

    // --- CancellationToken for graceful shutdown ---
    let token = CancellationToken::new();

    let mut api_handle = tokio::spawn(gateway_api_server::run(
        eff.listen,
        Arc::new(gateway),
        eff.request_timeout,
        token.clone(),
    ));

    tracing::info!(
        listen = %eff.listen,
        timeout_s = eff.request_timeout.as_secs(),
        broker_error_status = eff.broker_error_status.as_u16(),
        "publisher ready"
    );

    // --- Ожидание Ctrl+C (или падения сервера, напр. bind) ---
    tokio::select! {
        joined = &mut api_handle => {
            joined??;
            tracing::warn!("api server stopped unexpectedly");
            return Ok(());
        }
        signal = tokio::signal::ctrl_c() => signal?,
    }
    tracing::info!("shutting down...");

    token.cancel();

    // Drain: in-flight запросы получают до 5s
    match tokio::time::timeout(Duration::from_secs(5), &mut api_handle).await {
        Ok(joined) => joined??,
        Err(_) => {
            tracing::warn!("api server did not drain in time, aborting");
            api_handle.abort();
        }
    }

    tracing::info!("shutdown complete");
    Ok(())
}
