use covidcast::{TransportError, TransportErrorKind, WindowQuery};
use reqwest::Url;

/// `source` value that selects the partition catalog.
pub const CATALOG_SOURCE: &str = "covidcast_meta";

/// `source` value that selects signal rows.
pub const QUERY_SOURCE: &str = "covidcast";

pub(crate) fn parse_base(base_url: &str) -> Result<Url, TransportError> {
    Url::parse(base_url).map_err(|e| {
        TransportError::new(base_url, TransportErrorKind::InvalidUrl, format!("invalid base URL: {e}"))
    })
}

pub fn catalog_url(base_url: &str) -> Result<Url, TransportError> {
    let mut url = parse_base(base_url)?;
    url.query_pairs_mut().append_pair("source", CATALOG_SOURCE);
    Ok(url)
}

/// Every location of one partition over one window (`geo_value=*`).
pub fn window_url(base_url: &str, query: &WindowQuery) -> Result<Url, TransportError> {
    let mut url = parse_base(base_url)?;
    let partition = &query.partition;
    url.query_pairs_mut()
        .append_pair("source", QUERY_SOURCE)
        .append_pair("data_source", &partition.source)
        .append_pair("signal", &partition.signal)
        .append_pair("time_type", partition.time_type.as_str())
        .append_pair("geo_type", &partition.geo_type)
        .append_pair("time_values", &query.window.time_values())
        .append_pair("geo_value", "*");
    Ok(url)
}
