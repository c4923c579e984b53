use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use broker_engine::RedisBroker;
use listener::{Listener, TracingSink};

use crate::config::Effective;
use crate::error::SubscriberError;

pub async fn run(eff: Effective) -> Result<(), SubscriberError> {
    tracing::info!("relay-subscriber starting");

    let broker = Arc::new(RedisBroker::connect(&eff.redis_url).await?);
    tracing::info!(redis = %broker.target(), channel = %eff.listener.channel, "connecting listener");

    let listener = Listener::new(broker.clone(), broker, Arc::new(TracingSink), eff.listener);

    // --- Ctrl+C → cooperative stop ---
    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("shutting down...");
                signal_token.cancel();
            }
            Err(e) => tracing::error!(error = %e, "ctrl_c handler unavailable"),
        }
    });

    listener.run(token).await?;

    tracing::info!("shutdown complete");
    Ok(())
}
