use crate::api::TransportError;
use crate::config::ConfigError;
use crate::encode::EncodeError;
use crate::partition::PartitionKey;
use crate::publish::PublishError;
use crate::storage::StoreError;

/// A failure that aborts the whole sync cycle.
///
/// Nothing is published once one of these is returned; the caller decides
/// whether to rerun the cycle later.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("fetch failed for {partition} after {attempts} attempt(s) at {url}: {source}")]
    Fetch {
        partition: PartitionKey,
        url: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("catalog request failed after {attempts} attempt(s) at {url}: {source}")]
    CatalogTransport {
        url: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("catalog unavailable: {0}")]
    Catalog(String),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("failed to encode {artifact}: {source}")]
    Encode {
        artifact: String,
        #[source]
        source: EncodeError,
    },

    #[error("publication failed: {0}")]
    Publish(#[from] PublishError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl SyncError {
    /// The URL involved, for fetch failures.
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Fetch { url, .. } | Self::CatalogTransport { url, .. } => Some(url),
            _ => None,
        }
    }
}
