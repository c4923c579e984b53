use std::future::Future;
use std::pin::Pin;

use futures_util::{Stream, StreamExt};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use relay_api::{
    BrokerError, BrokerProbe, Envelope, Publisher, Subscriber, Subscription,
};

// ═══════════════════════════════════════════════════════════════
//  RedisBroker
// ═══════════════════════════════════════════════════════════════

/// Redis PUBLISH/SUBSCRIBE.
///
/// Публикация идёт через `ConnectionManager`: он мультиплексирует
/// конкурентные команды по одному соединению и сам переподключается.
/// Каждая подписка открывает отдельное pub/sub соединение.
pub struct RedisBroker {
    client: redis::Client,
    conn: ConnectionManager,
    target: String,
}

impl RedisBroker {
    /// Открыть клиент и управляющее соединение.
    /// `url` в формате `redis://[:password@]host:port/db`.
    pub async fn connect(url: &str) -> Result<Self, BrokerError> {
        let target = redact_url(url);
        let client = redis::Client::open(url)
            .map_err(|e| BrokerError::Unreachable(format!("open {target}: {e}")))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| BrokerError::Unreachable(format!("connect {target}: {e}")))?;
        tracing::debug!(target = %target, "redis connection established");
        Ok(Self { client, conn, target })
    }

    /// Адрес брокера без учётных данных — безопасно логировать.
    pub fn target(&self) -> &str {
        &self.target
    }
}

impl Publisher for RedisBroker {
    fn publish(
        &self,
        channel: &str,
        envelope: Envelope,
    ) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>> {
        let mut conn = self.conn.clone();
        let channel = channel.to_string();
        Box::pin(async move {
            let receivers: i64 = conn
                .publish(&channel, envelope.into_bytes())
                .await
                .map_err(|e| BrokerError::Publish {
                    channel: channel.clone(),
                    detail: e.to_string(),
                })?;
            tracing::trace!(channel = %channel, receivers, "published");
            Ok(())
        })
    }
}

impl Subscriber for RedisBroker {
    fn subscribe(
        &self,
        channel: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn Subscription>, BrokerError>> + Send + '_>> {
        let channel = channel.to_string();
        Box::pin(async move {
            let subscribe_err = |e: redis::RedisError| BrokerError::Subscribe {
                channel: channel.clone(),
                detail: e.to_string(),
            };
            let mut pubsub = self.client.get_async_pubsub().await.map_err(subscribe_err)?;
            pubsub.subscribe(&channel).await.map_err(subscribe_err)?;
            let stream = pubsub
                .into_on_message()
                .map(|msg| Envelope::from(msg.get_payload_bytes()));
            Ok(Box::new(RedisSubscription { stream: Box::pin(stream) }) as Box<dyn Subscription>)
        })
    }
}

impl BrokerProbe for RedisBroker {
    fn ping(&self) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>> {
        let mut conn = self.conn.clone();
        Box::pin(async move {
            let pong: String = redis::cmd("PING")
                .query_async(&mut conn)
                .await
                .map_err(|e| BrokerError::Unreachable(format!("ping {}: {e}", self.target)))?;
            tracing::debug!(reply = %pong, "redis ping");
            Ok(())
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  RedisSubscription
// ═══════════════════════════════════════════════════════════════

pub struct RedisSubscription {
    stream: Pin<Box<dyn Stream<Item = Envelope> + Send>>,
}

impl Subscription for RedisSubscription {
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Option<Envelope>> + Send + '_>> {
        Box::pin(self.stream.next())
    }
}

/// Убрать userinfo из URL: `redis://:secret@host:6379/0` → `redis://***@host:6379/0`.
pub fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let authority_end = rest.find('/').unwrap_or(rest.len());
    match rest[..authority_end].rfind('@') {
        Some(at) => format!("{scheme}://***{}", &rest[at..]),
        None => url.to_string(),
    }
}
