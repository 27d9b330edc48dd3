use serde::Deserialize;

/// A single row returned by the Epidata API.
///
/// The field set is not known statically and varies between signals, so
/// rows are kept as an insertion-ordered JSON object and written back out
/// verbatim.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// `result` value the Epidata API uses for a successful response.
pub const RESULT_OK: i64 = 1;

/// Envelope shared by every Epidata endpoint.
///
/// `epidata` is absent or `null` when `result` is not [`RESULT_OK`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EpidataResponse {
    pub result: i64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub epidata: Option<Vec<Record>>,
}

impl EpidataResponse {
    pub fn ok(records: Vec<Record>) -> Self {
        Self {
            result: RESULT_OK,
            message: Some("success".into()),
            epidata: Some(records),
        }
    }

    pub fn partial(result: i64, message: impl Into<String>) -> Self {
        Self {
            result,
            message: Some(message.into()),
            epidata: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result == RESULT_OK
    }

    pub fn into_records(self) -> Vec<Record> {
        self.epidata.unwrap_or_default()
    }
}
