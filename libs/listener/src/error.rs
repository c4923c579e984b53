use relay_api::{BrokerError, DecodeError};

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("broker unreachable at startup: {0}")]
    Startup(BrokerError),

    #[error("{0}")]
    Subscribe(BrokerError),

    #[error("subscription to '{0}' lost")]
    SubscriptionLost(String),

    #[error("decode message on '{channel}': {source}")]
    Decode { channel: String, source: DecodeError },
}
