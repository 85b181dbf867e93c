//! Error types for chat-relay.

/// Top-level error type for the relay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors raised by the messaging session adapter.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session failed to start: {reason}")]
    StartupFailed { reason: String },

    #[error("Session is not ready")]
    NotReady,

    #[error("Bridge request to {endpoint} failed: {reason}")]
    Bridge { endpoint: String, reason: String },

    #[error("Invalid bridge response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Outbound webhook delivery errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DeliveryError {
    #[error("Slack webhook URL is not configured")]
    NotConfigured,

    #[error("Webhook returned HTTP {status}")]
    Status { status: u16 },

    #[error("Webhook request failed: {0}")]
    Transport(String),
}

/// Persisted configuration store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt configuration in {path}: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// HTTP server lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind to {addr}: {reason}")]
    Bind { addr: String, reason: String },
}

/// Result type alias for the relay.
pub type Result<T> = std::result::Result<T, Error>;
