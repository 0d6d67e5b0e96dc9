//! Error types shared across the client
//!
//! Nothing here is fatal to the process: the session controller turns every
//! failure into "state unchanged, action unavailable".

use tokio_tungstenite::tungstenite;

/// Errors raised by the WebSocket transport
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: tungstenite::Error,
    },

    #[error("connection is closed")]
    Closed,

    #[error("outbound queue is full")]
    Backpressure,
}

/// Errors raised while decoding a wire frame
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0} frame has no data")]
    MissingPayload(&'static str),

    #[error("unknown event type: {0}")]
    UnknownEvent(String),
}

/// Errors surfaced by the session controller
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("not connected to the controller service")]
    NotConnected,

    #[error("a connection is already open")]
    AlreadyConnected,

    #[error("session has been torn down")]
    TornDown,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors raised while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}
