// SPDX-License-Identifier: GPL-3.0-or-later

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

/// Failures raised by the HTTP transport.
///
/// Wrapped sources live behind `Arc` so that a resolved request handle can
/// hand the same error to every caller of `fetch`.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[source] Arc<reqwest::Error>),

    #[error("retries exhausted after {attempts} attempts (last status {status})")]
    RetriesExhausted { status: u16, attempts: u32 },

    #[error("invalid request URL: {0}")]
    InvalidUrl(String),

    #[error("invalid JSON body: {0}")]
    Decode(String),

    #[error("request pool closed")]
    PoolClosed,
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        TransportError::Http(Arc::new(error))
    }
}

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("token request failed: {0}")]
    Request(#[source] Arc<reqwest::Error>),

    #[error("token endpoint returned {status}: {message}")]
    TokenEndpoint { status: u16, message: String },

    #[error("credentials cannot be refreshed: {0}")]
    NotRefreshable(&'static str),

    #[error("missing credential: {0}")]
    Missing(&'static str),

    #[error("authorization state mismatch")]
    StateMismatch,

    #[error("invalid authorization URL: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(error: reqwest::Error) -> Self {
        AuthError::Request(Arc::new(error))
    }
}

/// Which kind of constituent call failed inside an `all` aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchUnit {
    Chunk,
    Page,
}

impl fmt::Display for BatchUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchUnit::Chunk => f.write_str("chunk"),
            BatchUnit::Page => f.write_str("page"),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("{endpoint} failed with HTTP {status}: {message}")]
    Remote {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("{endpoint}: {unit} {index} failed: {source}")]
    Aggregation {
        endpoint: String,
        unit: BatchUnit,
        index: usize,
        #[source]
        source: Box<ClientError>,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("field `{0}` not present in response")]
    MissingField(String),

    #[error("unexpected response shape: {0}")]
    Decode(String),

    #[error("request task failed: {0}")]
    TaskFailed(String),
}

impl ClientError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        ClientError::Validation(message.into())
    }

    /// HTTP status of the underlying remote failure, looking through aggregation.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Remote { status, .. } => Some(*status),
            ClientError::Aggregation { source, .. } => source.status(),
            ClientError::Transport(TransportError::RetriesExhausted { status, .. }) => {
                Some(*status)
            }
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(error: serde_json::Error) -> Self {
        ClientError::Decode(error.to_string())
    }
}
