#[derive(Debug, thiserror::Error)]
pub enum PublisherError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("{0}")]
    Broker(#[from] relay_api::BrokerError),

    #[error("{0}")]
    Api(#[from] gateway_api_server::ApiServerError),

    #[error("api task: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),
}
