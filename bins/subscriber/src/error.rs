#[derive(Debug, thiserror::Error)]
pub enum SubscriberError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("{0}")]
    Broker(#[from] relay_api::BrokerError),

    #[error("{0}")]
    Listener(#[from] listener::ListenerError),
}
