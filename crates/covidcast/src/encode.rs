use serde_json::Value;

use crate::record::Record;
use crate::storage::ArtifactFormat;

/// Errors raised while serializing records.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Buffer(String),
}

/// Encode records in the given artifact format.
pub fn encode(format: ArtifactFormat, records: &[Record]) -> Result<Vec<u8>, EncodeError> {
    match format {
        ArtifactFormat::Jsonl => encode_jsonl(records),
        ArtifactFormat::Csv => encode_csv(records),
    }
}

/// One compact JSON object per line, joined by `\n` with no trailing newline.
pub fn encode_jsonl(records: &[Record]) -> Result<Vec<u8>, EncodeError> {
    let lines = records
        .iter()
        .map(serde_json::to_string)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(lines.join("\n").into_bytes())
}

/// Parse a JSONL artifact back into records. Blank lines are ignored.
pub fn decode_jsonl(bytes: &[u8]) -> Result<Vec<Record>, EncodeError> {
    let text = std::str::from_utf8(bytes).map_err(|e| EncodeError::Buffer(e.to_string()))?;
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str::<Record>(line).map_err(EncodeError::from))
        .collect()
}

/// CSV with a header taken from the first record's fields.
///
/// Later records are written in that header order: missing fields become
/// empty cells and fields the first record lacks are dropped. An empty
/// input produces an empty artifact, not a header-only one.
pub fn encode_csv(records: &[Record]) -> Result<Vec<u8>, EncodeError> {
    let Some(first) = records.first() else {
        return Ok(Vec::new());
    };
    let header: Vec<&str> = first.keys().map(String::as_str).collect();

    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(Vec::new());
    writer.write_record(&header)?;

    for record in records {
        writer.write_record(header.iter().map(|field| csv_cell(record.get(*field))))?;
    }

    writer
        .into_inner()
        .map_err(|e| EncodeError::Buffer(e.to_string()))
}

fn csv_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
