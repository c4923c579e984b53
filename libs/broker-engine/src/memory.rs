use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Deserialize;
use tokio::sync::{mpsc, watch, RwLock};

use relay_api::{
    BrokerError, BrokerProbe, Envelope, Publisher, Subscriber, Subscription,
};

/// Стратегия при переполнении буфера подписчика.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// try_send(): если канал полон — дропнуть сообщение, залогировать.
    Drop,
    /// .send().await: publisher ждёт, пока у подписчика появится место.
    #[serde(alias = "backpressure")]
    BackPressure,
}

// ═══════════════════════════════════════════════════════════════
//  Subscriber slot / channel state
// ═══════════════════════════════════════════════════════════════

struct SubscriberSlot {
    tx: mpsc::Sender<Envelope>,
    overflow: OverflowPolicy,
}

#[derive(Default)]
struct ChannelState {
    subs: Mutex<Vec<SubscriberSlot>>,
    /// Сериализует publish внутри канала. Другие каналы его не ждут.
    publish_order: tokio::sync::Mutex<()>,
}

impl ChannelState {
    fn slots(&self) -> MutexGuard<'_, Vec<SubscriberSlot>> {
        self.subs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ═══════════════════════════════════════════════════════════════
//  MpscSubscription
// ═══════════════════════════════════════════════════════════════

pub struct MpscSubscription {
    rx: mpsc::Receiver<Envelope>,
}

impl Subscription for MpscSubscription {
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Option<Envelope>> + Send + '_>> {
        Box::pin(async { self.rx.recv().await })
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryBroker
// ═══════════════════════════════════════════════════════════════

/// In-process брокер с семантикой Redis pub/sub: каналы создаются
/// по требованию, публикация без подписчиков успешна и никуда не доставляется,
/// история не хранится.
///
/// Каждый подписчик получает свой mpsc канал с overflow policy.
/// Блокировка общей таблицы каналов никогда не удерживается через `.await`:
/// подписчик, переставший читать, тормозит только publish в свой канал.
pub struct MemoryBroker {
    channels: RwLock<HashMap<String, Arc<ChannelState>>>,
    buffer: usize,
    overflow: OverflowPolicy,
    closed: AtomicBool,
    /// Растёт при `close`/`disconnect_subscribers`; прерывает зависшие backpressure send.
    generation: watch::Sender<u64>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(1024, OverflowPolicy::BackPressure)
    }
}

impl MemoryBroker {
    pub fn new(buffer: usize, overflow: OverflowPolicy) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            channels: RwLock::new(HashMap::new()),
            buffer: buffer.max(1),
            overflow,
            closed: AtomicBool::new(false),
            generation,
        }
    }

    /// Подписаться с явными параметрами буфера.
    pub async fn subscribe_with(
        &self,
        channel: &str,
        buffer: usize,
        overflow: OverflowPolicy,
    ) -> Result<MpscSubscription, BrokerError> {
        if self.is_closed() {
            return Err(BrokerError::Closed);
        }
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let mut channels = self.channels.write().await;
        channels
            .entry(channel.to_string())
            .or_default()
            .slots()
            .push(SubscriberSlot { tx, overflow });
        Ok(MpscSubscription { rx })
    }

    /// Опубликовать envelope всем текущим подписчикам канала.
    /// Возвращает число подписчиков, которым envelope был доставлен.
    pub async fn publish_envelope(
        &self,
        channel: &str,
        envelope: Envelope,
    ) -> Result<usize, BrokerError> {
        if self.is_closed() {
            return Err(BrokerError::Closed);
        }
        let Some(state) = self.channels.read().await.get(channel).cloned() else {
            return Ok(0);
        };

        // Порядок публикаций одинаков для всех подписчиков канала.
        let _order = state.publish_order.lock().await;
        if self.is_closed() {
            return Err(BrokerError::Closed);
        }
        let mut generation = self.generation.subscribe();
        let targets: Vec<(mpsc::Sender<Envelope>, OverflowPolicy)> = {
            let mut subs = state.slots();
            subs.retain(|sub| !sub.tx.is_closed());
            subs.iter().map(|sub| (sub.tx.clone(), sub.overflow)).collect()
        };

        let mut delivered = 0;
        for (tx, overflow) in targets {
            match overflow {
                OverflowPolicy::Drop => match tx.try_send(envelope.clone()) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!(channel, "subscriber channel full, dropping");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {}
                },
                OverflowPolicy::BackPressure => {
                    tokio::select! {
                        sent = tx.send(envelope.clone()) => {
                            if sent.is_ok() {
                                delivered += 1;
                            } else {
                                tracing::warn!(channel, "subscriber closed during backpressure send");
                            }
                        }
                        _ = generation.changed() => {
                            if self.is_closed() {
                                return Err(BrokerError::Closed);
                            }
                            tracing::debug!(channel, delivered, "subscribers reset during publish");
                            break;
                        }
                    }
                }
            }
        }
        Ok(delivered)
    }

    /// Число живых подписчиков канала.
    pub async fn subscriber_count(&self, channel: &str) -> usize {
        let channels = self.channels.read().await;
        channels
            .get(channel)
            .map_or(0, |state| state.slots().iter().filter(|s| !s.tx.is_closed()).count())
    }

    /// Закрыть брокер: все подписки получают `None`, дальнейшие
    /// publish/subscribe/ping возвращают [`BrokerError::Closed`].
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.drop_subscribers().await;
    }

    /// Разорвать текущие подписки, оставив брокер доступным.
    /// Имитирует обрыв соединения subscriber'а.
    pub async fn disconnect_subscribers(&self) {
        self.drop_subscribers().await;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn drop_subscribers(&self) {
        let drained: Vec<_> = self.channels.write().await.drain().collect();
        for (_, state) in drained {
            state.slots().clear();
        }
        self.generation.send_modify(|g| *g += 1);
    }
}

impl Publisher for MemoryBroker {
    fn publish(
        &self,
        channel: &str,
        envelope: Envelope,
    ) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>> {
        let channel = channel.to_string();
        Box::pin(async move {
            self.publish_envelope(&channel, envelope).await.map(|_| ())
        })
    }
}

impl Subscriber for MemoryBroker {
    fn subscribe(
        &self,
        channel: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn Subscription>, BrokerError>> + Send + '_>> {
        let channel = channel.to_string();
        Box::pin(async move {
            let sub = self.subscribe_with(&channel, self.buffer, self.overflow).await?;
            Ok(Box::new(sub) as Box<dyn Subscription>)
        })
    }
}

impl BrokerProbe for MemoryBroker {
    fn ping(&self) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>> {
        Box::pin(async move {
            if self.is_closed() {
                Err(BrokerError::Closed)
            } else {
                Ok(())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    fn env(s: &str) -> Envelope {
        Envelope::from(s.as_bytes())
    }

    #[tokio::test]
    async fn publish_without_subscribers_succeeds() {
        let broker = MemoryBroker::default();
        assert_eq!(broker.publish_envelope("users", env("a")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn every_subscriber_sees_messages_in_order() {
        let broker = MemoryBroker::default();
        let mut first = broker.subscribe("users").await.unwrap();
        let mut second = broker.subscribe("users").await.unwrap();

        for msg in ["1", "2", "3"] {
            assert_eq!(broker.publish_envelope("users", env(msg)).await.unwrap(), 2);
        }

        for sub in [&mut first, &mut second] {
            for expected in ["1", "2", "3"] {
                assert_eq!(sub.recv().await.unwrap(), env(expected));
            }
        }
    }

    #[tokio::test]
    async fn channels_are_isolated() {
        let broker = MemoryBroker::default();
        let mut users = broker.subscribe("users").await.unwrap();
        broker.publish("orders", env("x")).await.unwrap();
        broker.publish("users", env("y")).await.unwrap();
        assert_eq!(users.recv().await.unwrap(), env("y"));
    }

    #[tokio::test]
    async fn no_replay_for_late_subscribers() {
        let broker = MemoryBroker::default();
        broker.publish("users", env("early")).await.unwrap();
        let mut late = broker.subscribe("users").await.unwrap();
        broker.publish("users", env("late")).await.unwrap();
        assert_eq!(late.recv().await.unwrap(), env("late"));
    }

    #[tokio::test]
    async fn drop_policy_discards_when_full() {
        let broker = MemoryBroker::new(1, OverflowPolicy::Drop);
        let mut sub = broker.subscribe("users").await.unwrap();
        assert_eq!(broker.publish_envelope("users", env("kept")).await.unwrap(), 1);
        assert_eq!(broker.publish_envelope("users", env("lost")).await.unwrap(), 0);
        assert_eq!(sub.recv().await.unwrap(), env("kept"));
        let next = tokio::time::timeout(Duration::from_millis(50), sub.recv()).await;
        assert!(next.is_err(), "dropped message must not arrive");
    }

    #[tokio::test]
    async fn dropped_subscriptions_are_pruned() {
        let broker = MemoryBroker::default();
        let sub = broker.subscribe("users").await.unwrap();
        assert_eq!(broker.subscriber_count("users").await, 1);
        drop(sub);
        assert_eq!(broker.publish_envelope("users", env("a")).await.unwrap(), 0);
        assert_eq!(broker.subscriber_count("users").await, 0);
    }

    #[tokio::test]
    async fn close_ends_subscriptions_and_rejects_calls() {
        let broker = MemoryBroker::default();
        let mut sub = broker.subscribe("users").await.unwrap();
        assert!(broker.ping().await.is_ok());

        broker.close().await;

        assert!(sub.recv().await.is_none());
        assert_eq!(broker.ping().await.unwrap_err(), BrokerError::Closed);
        assert_eq!(broker.publish("users", env("a")).await.unwrap_err(), BrokerError::Closed);
        assert!(broker.subscribe("users").await.is_err());
    }

    #[tokio::test]
    async fn disconnect_keeps_broker_usable() {
        let broker = MemoryBroker::default();
        let mut old = broker.subscribe("users").await.unwrap();
        broker.disconnect_subscribers().await;
        assert!(old.recv().await.is_none());

        let mut fresh = broker.subscribe("users").await.unwrap();
        broker.publish("users", env("again")).await.unwrap();
        assert_eq!(fresh.recv().await.unwrap(), env("again"));
    }

    /// Подписчик, который не читает, с буфером на одно сообщение
    /// и вторым publish, зависшим в backpressure.
    async fn stalled_users_channel() -> (
        Arc<MemoryBroker>,
        Box<dyn Subscription>,
        tokio::task::JoinHandle<Result<(), BrokerError>>,
    ) {
        let broker = Arc::new(MemoryBroker::new(1, OverflowPolicy::BackPressure));
        let stalled = broker.subscribe("users").await.unwrap();
        broker.publish("users", env("fills buffer")).await.unwrap();

        let pending = tokio::spawn({
            let broker = broker.clone();
            async move { broker.publish("users", env("blocked")).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!pending.is_finished(), "publish must wait for buffer space");
        (broker, stalled, pending)
    }

    #[tokio::test]
    async fn stalled_subscriber_blocks_only_its_channel() {
        let (broker, _stalled, pending) = stalled_users_channel().await;

        let mut orders = timeout(Duration::from_millis(500), broker.subscribe("orders"))
            .await
            .expect("subscribe blocked")
            .unwrap();
        timeout(Duration::from_millis(500), broker.publish("orders", env("x")))
            .await
            .expect("publish on another channel blocked")
            .unwrap();
        assert_eq!(orders.recv().await.unwrap(), env("x"));

        let count = timeout(Duration::from_millis(500), broker.subscriber_count("users"))
            .await
            .expect("subscriber_count blocked");
        assert_eq!(count, 1);
        assert!(!pending.is_finished());
        pending.abort();
    }

    #[tokio::test]
    async fn close_releases_pending_backpressure_publish() {
        let (broker, mut stalled, pending) = stalled_users_channel().await;

        timeout(Duration::from_millis(500), broker.close())
            .await
            .expect("close blocked");

        let result = timeout(Duration::from_millis(500), pending)
            .await
            .expect("pending publish never released")
            .unwrap();
        assert_eq!(result.unwrap_err(), BrokerError::Closed);

        assert_eq!(stalled.recv().await.unwrap(), env("fills buffer"));
        assert!(stalled.recv().await.is_none());
    }

    #[tokio::test]
    async fn disconnect_releases_pending_backpressure_publish() {
        let (broker, mut stalled, pending) = stalled_users_channel().await;

        timeout(Duration::from_millis(500), broker.disconnect_subscribers())
            .await
            .expect("disconnect blocked");

        timeout(Duration::from_millis(500), pending)
            .await
            .expect("pending publish never released")
            .unwrap()
            .unwrap();
        assert_eq!(stalled.recv().await.unwrap(), env("fills buffer"));
        assert!(stalled.recv().await.is_none());

        let mut fresh = broker.subscribe("users").await.unwrap();
        broker.publish("users", env("after")).await.unwrap();
        assert_eq!(fresh.recv().await.unwrap(), env("after"));
    }
}
