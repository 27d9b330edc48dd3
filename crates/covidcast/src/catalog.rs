use crate::error::SyncError;
use crate::partition::PartitionDescriptor;
use crate::record::{EpidataResponse, Record};

/// The remote partition catalog for one cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    /// Rows exactly as returned, written out as the metadata artifacts.
    pub records: Vec<Record>,
    pub partitions: Vec<PartitionDescriptor>,
    /// Rows that could not be read as a partition descriptor.
    pub rejected: usize,
}

impl Catalog {
    /// Build a catalog from a `covidcast_meta` response. A non-success
    /// `result` means there is nothing to diff against and fails the cycle.
    pub fn from_response(response: EpidataResponse) -> Result<Self, SyncError> {
        if !response.is_success() {
            return Err(SyncError::Catalog(format!(
                "result {}: {}",
                response.result,
                response.message.as_deref().unwrap_or("no message")
            )));
        }
        Ok(Self::from_records(response.into_records()))
    }

    pub fn from_records(records: Vec<Record>) -> Self {
        let mut partitions = Vec::with_capacity(records.len());
        let mut rejected = 0;

        for (index, record) in records.iter().enumerate() {
            match PartitionDescriptor::from_record(record) {
                Ok(descriptor) => partitions.push(descriptor),
                Err(e) => {
                    rejected += 1;
                    tracing::warn!(row = index, error = %e, "skipping unreadable catalog row");
                }
            }
        }

        Self {
            records,
            partitions,
            rejected,
        }
    }
}
