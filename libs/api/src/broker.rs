use std::future::Future;
use std::pin::Pin;

use crate::{BrokerError, Envelope};

// ════════════════════════════════════════════════════════════════
//  Broker capability traits
// ════════════════════════════════════════════════════════════════

/// Публикация envelope'ов в канал.
///
/// Реализация обязана выдерживать конкурентные вызовы из разных задач:
/// gateway делит один handle между всеми HTTP запросами.
pub trait Publisher: Send + Sync {
    /// Один вызов = одна публикация. Без retry и буферизации.
    fn publish(&self, channel: &str, envelope: Envelope)
        -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>>;
}

/// Подписка на real-time поток envelope'ов канала.
pub trait Subscriber: Send + Sync {
    /// Каждый вызов открывает новую независимую подписку.
    /// Сообщения, опубликованные до подписки, не воспроизводятся.
    #[allow(clippy::type_complexity)]
    fn subscribe(&self, channel: &str)
        -> Pin<Box<dyn Future<Output = Result<Box<dyn Subscription>, BrokerError>> + Send + '_>>;
}

/// Ленивый бесконечный поток envelope'ов одной подписки.
pub trait Subscription: Send {
    /// Следующий envelope в порядке доставки брокером.
    /// `None` = подписка потеряна (брокер закрыт / соединение разорвано).
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Option<Envelope>> + Send + '_>>;
}

/// Проверка доступности брокера. Вызывается один раз при старте процесса.
pub trait BrokerProbe: Send + Sync {
    fn ping(&self) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>>;
}
