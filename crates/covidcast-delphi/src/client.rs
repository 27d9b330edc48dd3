use std::time::Duration;

use covidcast::{EpidataApi, EpidataResponse, TransportError, TransportErrorKind, WindowQuery};
use reqwest::Url;

use crate::query::{catalog_url, parse_base, window_url};

pub const DEFAULT_BASE_URL: &str = "https://delphi.cmu.edu/epidata/api.php";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const USER_AGENT: &str = concat!("covidcast-sync/", env!("CARGO_PKG_VERSION"));

/// Connection settings for the Delphi Epidata endpoint.
#[derive(Debug, Clone)]
pub struct EpidataClientConfig {
    /// Full URL of `api.php`; [`DEFAULT_BASE_URL`] when unset.
    pub base_url: Option<String>,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for EpidataClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
            user_agent: USER_AGENT.to_owned(),
        }
    }
}

/// Errors raised while building an [`EpidataClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid Epidata base URL")]
    InvalidBaseUrl(#[source] TransportError),

    #[error("failed to build HTTP client")]
    Http(#[from] reqwest::Error),
}

/// HTTP client for the Epidata API.
///
/// One method call is one request. Retries belong to the caller.
pub struct EpidataClient {
    client: reqwest::Client,
    base_url: String,
}

impl EpidataClient {
    /// Fails up front on a base URL that cannot be parsed, so a typo is not
    /// retried like a network error.
    pub fn new(config: EpidataClientConfig) -> Result<Self, ClientError> {
        let base_url = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());
        parse_base(&base_url).map_err(ClientError::InvalidBaseUrl)?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent)
            .build()?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(&self, url: Url) -> Result<EpidataResponse, TransportError> {
        let url_text = url.to_string();
        tracing::debug!(url = %url_text, "epidata request");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(&url_text, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::new(
                url_text,
                TransportErrorKind::Status(status.as_u16()),
                format!("server returned {status}"),
            ));
        }

        response
            .json::<EpidataResponse>()
            .await
            .map_err(|e| transport_error(&url_text, &e))
    }
}

fn transport_error(url: &str, error: &reqwest::Error) -> TransportError {
    let kind = if error.is_timeout() {
        TransportErrorKind::Timeout
    } else if error.is_connect() {
        TransportErrorKind::Connect
    } else if error.is_decode() {
        TransportErrorKind::Decode
    } else if let Some(status) = error.status() {
        TransportErrorKind::Status(status.as_u16())
    } else {
        TransportErrorKind::Other
    };
    TransportError::new(url, kind, error.to_string())
}

#[async_trait::async_trait]
impl EpidataApi for EpidataClient {
    async fn catalog(&self) -> Result<EpidataResponse, TransportError> {
        let url = catalog_url(&self.base_url)?;
        self.get(url).await
    }

    async fn query(&self, query: &WindowQuery) -> Result<EpidataResponse, TransportError> {
        let url = window_url(&self.base_url, query)?;
        self.get(url).await
    }
}
