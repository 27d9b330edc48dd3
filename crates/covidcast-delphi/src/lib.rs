pub mod client;
pub mod query;

pub use client::{ClientError, DEFAULT_BASE_URL, EpidataClient, EpidataClientConfig};
pub use query::{catalog_url, window_url};
