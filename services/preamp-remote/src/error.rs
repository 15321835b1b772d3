//! Error types for the preamp remote client

/// Errors that can occur while syncing with the preamp
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("Not connected to preamp")]
    NotConnected,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Invalid gateway: {0}")]
    InvalidGateway(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("No element with id '{0}'")]
    ElementNotFound(String),

    #[error("Failed to send frame: {0}")]
    SendError(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for preamp remote operations
pub type Result<T> = std::result::Result<T, RemoteError>;
