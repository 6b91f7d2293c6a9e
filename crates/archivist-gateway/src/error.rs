use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("malformed gateway payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("gateway protocol error: {0}")]
    Protocol(String),

    #[error("gateway closed: {0}")]
    Closed(String),
}
