use thiserror::Error;

/// Everything that can terminate a connection attempt or the bridge itself.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("core protocol error: {0}")]
    Core(#[from] loxone_core::Error),

    #[error("persistence error: {0}")]
    Data(#[from] loxone_data::Error),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("socket closed with code {code}")]
    SocketClosed { code: u16 },

    #[error("rest envelope error: {0}")]
    Envelope(String),

    #[error("handshake rejected at step {step}: {reason}")]
    HandshakeRejected { step: &'static str, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// A clean server-side close (code 1000) ends the supervisor without a
    /// reconnect backoff; anything else does not.
    pub fn is_clean_close(&self) -> bool {
        matches!(self, BridgeError::SocketClosed { code: 1000 })
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
