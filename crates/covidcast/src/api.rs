use std::fmt;
use std::sync::Arc;

use crate::partition::PartitionKey;
use crate::record::EpidataResponse;
use crate::window::TimeWindow;

/// How a single HTTP exchange failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Could not establish a connection.
    Connect,
    /// The call exceeded its timeout.
    Timeout,
    /// The server answered with a non-success HTTP status.
    Status(u16),
    /// The body could not be decoded as an Epidata envelope.
    Decode,
    /// The request URL could not be built.
    InvalidUrl,
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "connection failed"),
            Self::Timeout => write!(f, "timed out"),
            Self::Status(code) => write!(f, "HTTP {code}"),
            Self::Decode => write!(f, "malformed response"),
            Self::InvalidUrl => write!(f, "invalid URL"),
            Self::Other => write!(f, "request failed"),
        }
    }
}

/// A failed call to the Epidata API, carrying the URL that was requested.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} for {url}: {message}")]
pub struct TransportError {
    pub url: String,
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(url: impl Into<String>, kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind,
            message: message.into(),
        }
    }

    /// Everything except an undecodable body or a bad URL is worth retrying.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self.kind,
            TransportErrorKind::Decode | TransportErrorKind::InvalidUrl
        )
    }
}

/// One windowed request for a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowQuery {
    pub partition: PartitionKey,
    pub window: TimeWindow,
}

/// The remote catalog/query API.
///
/// Implementations issue exactly one HTTP call per method invocation;
/// retries are layered on top by the caller.
#[async_trait::async_trait]
pub trait EpidataApi: Send + Sync {
    /// Fetch the partition catalog (`covidcast_meta`).
    async fn catalog(&self) -> Result<EpidataResponse, TransportError>;

    /// Fetch every location's rows for one partition window.
    async fn query(&self, query: &WindowQuery) -> Result<EpidataResponse, TransportError>;
}

#[async_trait::async_trait]
impl<T: EpidataApi + ?Sized> EpidataApi for Arc<T> {
    async fn catalog(&self) -> Result<EpidataResponse, TransportError> {
        (**self).catalog().await
    }

    async fn query(&self, query: &WindowQuery) -> Result<EpidataResponse, TransportError> {
        (**self).query(query).await
    }
}
