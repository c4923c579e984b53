pub mod broker;
pub mod error;
pub mod record;

pub use broker::{BrokerProbe, Publisher, Subscriber, Subscription};
pub use error::{BrokerError, DecodeError, EncodeError, RecordError};
pub use record::{decode, encode, Envelope, Record};

/// Имя канала, на котором встречаются publisher и subscriber.
///
/// Обе стороны обязаны использовать его дословно: при несовпадении
/// subscriber никогда не увидит ни одной записи.
pub const USERS_CHANNEL: &str = "users";
