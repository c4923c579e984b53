mod error;
mod policy;
mod sink;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use relay_api::{BrokerProbe, Envelope, Subscriber, Subscription};

pub use error::ListenerError;
pub use policy::{Backoff, DecodeFailurePolicy, DisconnectPolicy};
pub use sink::{RecordSink, TracingSink};

#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub channel: String,
    pub on_decode_error: DecodeFailurePolicy,
    pub on_disconnect: DisconnectPolicy,
    pub backoff: Backoff,
}

impl ListenerConfig {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            on_decode_error: DecodeFailurePolicy::default(),
            on_disconnect: DisconnectPolicy::default(),
            backoff: Backoff::default(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Listener — subscription → decode → sink
// ═══════════════════════════════════════════════════════════════

/// Consumer-side relay. Строго последовательная обработка:
/// одно сообщение за раз, в порядке доставки брокером.
pub struct Listener {
    subscriber: Arc<dyn Subscriber>,
    probe: Arc<dyn BrokerProbe>,
    sink: Arc<dyn RecordSink>,
    config: ListenerConfig,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    consumed: u64,
    skipped: u64,
    reconnects: u64,
}

impl Listener {
    pub fn new(
        subscriber: Arc<dyn Subscriber>,
        probe: Arc<dyn BrokerProbe>,
        sink: Arc<dyn RecordSink>,
        config: ListenerConfig,
    ) -> Self {
        Self {
            subscriber,
            probe,
            sink,
            config,
        }
    }

    /// Работает до отмены `token`. Без отмены возвращается только с ошибкой:
    /// брокер недоступен при старте, подписка потеряна (`DisconnectPolicy::Exit`)
    /// или сообщение не декодируется (`DecodeFailurePolicy::Abort`).
    pub async fn run(&self, token: CancellationToken) -> Result<(), ListenerError> {
        let channel = self.config.channel.as_str();

        self.probe.ping().await.map_err(ListenerError::Startup)?;
        tracing::info!(channel, "broker reachable");

        let mut subscription = self
            .subscriber
            .subscribe(channel)
            .await
            .map_err(ListenerError::Subscribe)?;
        tracing::info!(
            channel,
            on_decode_error = %self.config.on_decode_error,
            on_disconnect = %self.config.on_disconnect,
            "subscribed"
        );

        let mut counters = Counters::default();
        let result = loop {
            let next = tokio::select! {
                envelope = subscription.recv() => envelope,
                _ = token.cancelled() => break Ok(()),
            };

            match next {
                Some(envelope) => {
                    if let Err(e) = self.consume(&envelope, &mut counters) {
                        break Err(e);
                    }
                }
                None => match self.config.on_disconnect {
                    DisconnectPolicy::Exit => {
                        tracing::error!(channel, "subscription lost");
                        break Err(ListenerError::SubscriptionLost(channel.to_string()));
                    }
                    DisconnectPolicy::Reconnect => match self.resubscribe(&token).await {
                        Some(fresh) => {
                            counters.reconnects += 1;
                            subscription = fresh;
                        }
                        None => break Ok(()),
                    },
                },
            }
        };

        tracing::info!(
            channel,
            consumed = counters.consumed,
            skipped = counters.skipped,
            reconnects = counters.reconnects,
            "listener stopped"
        );
        result
    }

    fn consume(&self, envelope: &Envelope, counters: &mut Counters) -> Result<(), ListenerError> {
        let channel = self.config.channel.as_str();
        match relay_api::decode(envelope.as_bytes()) {
            Ok(record) => {
                counters.consumed += 1;
                self.sink.accept(channel, &record);
                Ok(())
            }
            Err(e) => match self.config.on_decode_error {
                DecodeFailurePolicy::Skip => {
                    counters.skipped += 1;
                    tracing::warn!(channel, error = %e, bytes = envelope.len(), "skipping undecodable message");
                    Ok(())
                }
                DecodeFailurePolicy::Abort => {
                    tracing::error!(channel, error = %e, "undecodable message");
                    Err(ListenerError::Decode {
                        channel: channel.to_string(),
                        source: e,
                    })
                }
            },
        }
    }

    /// Переподписка с backoff. `None` — отменено во время ожидания.
    async fn resubscribe(&self, token: &CancellationToken) -> Option<Box<dyn Subscription>> {
        let channel = self.config.channel.as_str();
        let backoff = self.config.backoff;
        let mut delay = backoff.initial;

        loop {
            tracing::warn!(channel, delay_ms = delay.as_millis() as u64, "subscription lost, reconnecting");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = token.cancelled() => return None,
            }

            match self.subscriber.subscribe(channel).await {
                Ok(subscription) => {
                    tracing::info!(channel, "resubscribed");
                    return Some(subscription);
                }
                Err(e) => {
                    tracing::warn!(channel, error = %e, "resubscribe failed");
                    delay = backoff.next(delay);
                }
            }
        }
    }
}
