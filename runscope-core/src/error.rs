//! Error types for runscope-core

use thiserror::Error;

/// Main error type for the runscope-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A frame decoded as JSON but does not match the envelope or its payload type
    #[error("malformed {kind} frame: {message}")]
    Protocol { kind: String, message: String },

    /// A frame carried a `type` this client does not know
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid endpoint or location string
    #[error("invalid location: {0}")]
    Location(String),

    /// Outbound send attempted while the channel is not open
    #[error("not connected: the channel is not open")]
    NotConnected,

    /// WebSocket transport error
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Result type alias for runscope-core
pub type Result<T> = std::result::Result<T, Error>;
