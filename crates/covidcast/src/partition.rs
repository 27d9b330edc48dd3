use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::Record;
use crate::window::parse_time_value;

/// Granularity of a partition's time axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeType {
    Day,
    Week,
}

impl TimeType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "day" => Some(Self::Day),
            "week" => Some(Self::Week),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
        }
    }
}

impl fmt::Display for TimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a partition: `(source, signal, time_type, geo_type)`.
///
/// Ordering is lexicographic over the four components, which gives the
/// differ a stable iteration order regardless of catalog order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey {
    pub source: String,
    pub signal: String,
    pub time_type: TimeType,
    pub geo_type: String,
}

impl PartitionKey {
    pub fn new(
        source: impl Into<String>,
        signal: impl Into<String>,
        time_type: TimeType,
        geo_type: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            signal: signal.into(),
            time_type,
            geo_type: geo_type.into(),
        }
    }

    /// Components joined with `/`, used as the storage path stem.
    pub fn path(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.source, self.signal, self.time_type, self.geo_type
        )
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// One catalog row: a partition plus its time bounds and freshness.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionDescriptor {
    pub source: String,
    pub signal: String,
    pub time_type: TimeType,
    pub geo_type: String,
    pub min_time: NaiveDate,
    pub max_time: NaiveDate,
    pub num_locations: u64,
    pub last_update: DateTime<Utc>,
}

/// Errors raised when a catalog row cannot be read as a descriptor.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DescriptorError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid value for `{field}`: {value}")]
    InvalidField { field: &'static str, value: String },
}

impl PartitionDescriptor {
    pub fn key(&self) -> PartitionKey {
        PartitionKey::new(
            self.source.clone(),
            self.signal.clone(),
            self.time_type,
            self.geo_type.clone(),
        )
    }

    /// Read a descriptor out of a raw `covidcast_meta` row.
    ///
    /// Time bounds are `YYYYMMDD` for daily partitions and `YYYYWW` (ISO
    /// week) for weekly ones; `last_update` is unix seconds.
    pub fn from_record(record: &Record) -> Result<Self, DescriptorError> {
        let source = string_field(record, "data_source")?;
        let signal = string_field(record, "signal")?;
        let geo_type = string_field(record, "geo_type")?;

        let time_type_raw = string_field(record, "time_type")?;
        let time_type =
            TimeType::parse(&time_type_raw).ok_or(DescriptorError::InvalidField {
                field: "time_type",
                value: time_type_raw,
            })?;

        let min_time = time_field(record, "min_time", time_type)?;
        let max_time = time_field(record, "max_time", time_type)?;

        let num_locations = int_field(record, "num_locations")?;
        if num_locations <= 0 {
            return Err(DescriptorError::InvalidField {
                field: "num_locations",
                value: num_locations.to_string(),
            });
        }

        let last_update_secs = int_field(record, "last_update")?;
        let last_update = DateTime::<Utc>::from_timestamp(last_update_secs, 0).ok_or(
            DescriptorError::InvalidField {
                field: "last_update",
                value: last_update_secs.to_string(),
            },
        )?;

        Ok(Self {
            source,
            signal,
            time_type,
            geo_type,
            min_time,
            max_time,
            num_locations: num_locations as u64,
            last_update,
        })
    }
}

fn string_field(record: &Record, field: &'static str) -> Result<String, DescriptorError> {
    match record.get(field) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Null) | None => Err(DescriptorError::MissingField(field)),
        Some(other) => Err(DescriptorError::InvalidField {
            field,
            value: other.to_string(),
        }),
    }
}

/// Accepts JSON integers, integral floats and numeric strings; the API is
/// not consistent about which it sends.
fn int_field(record: &Record, field: &'static str) -> Result<i64, DescriptorError> {
    let value = record.get(field).ok_or(DescriptorError::MissingField(field))?;
    let parsed = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        Value::Null => return Err(DescriptorError::MissingField(field)),
        _ => None,
    };

    parsed.ok_or_else(|| DescriptorError::InvalidField {
        field,
        value: value.to_string(),
    })
}

fn time_field(
    record: &Record,
    field: &'static str,
    time_type: TimeType,
) -> Result<NaiveDate, DescriptorError> {
    let raw = int_field(record, field)?;
    parse_time_value(time_type, raw).ok_or(DescriptorError::InvalidField {
        field,
        value: raw.to_string(),
    })
}
