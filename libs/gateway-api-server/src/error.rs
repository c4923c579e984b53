use std::net::SocketAddr;

#[derive(Debug, thiserror::Error)]
pub enum ApiServerError {
    #[error("bind api {addr}: {source}")]
    Bind { addr: SocketAddr, source: std::io::Error },

    #[error("axum serve: {0}")]
    Serve(std::io::Error),
}
