use std::time::Duration;

use http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} not found")]
    Missing(&'static str),

    #[error("invalid connection string: {0}")]
    Malformed(String),

    #[error("invalid setting `{name}`: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("signing key is empty")]
    EmptyKey,

    #[error("signing key rejected: {0}")]
    InvalidKey(String),

    #[error("failed to encode token: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is not a well formed JWT")]
    Malformed,

    #[error("unsupported token algorithm `{0}`")]
    Algorithm(String),

    #[error("token signature does not match")]
    BadSignature,

    #[error("token has expired")]
    Expired,

    #[error("token audience `{0}` does not match")]
    WrongAudience(String),
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("invalid client url `{0}`")]
    InvalidUrl(String),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("hub rejected the connection with status {0}")]
    Rejected(StatusCode),

    #[error("handshake did not complete within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("connection is not connected")]
    NotConnected,

    #[error("connection was closed by the hub")]
    Closed,

    #[error("send did not complete within {0:?}")]
    Timeout(Duration),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("failed to register metrics: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("failed to start metrics server: {0}")]
    Io(#[from] std::io::Error),

    #[error("metrics server error: {0}")]
    Server(#[from] hyper::Error),
}
