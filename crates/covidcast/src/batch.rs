use std::collections::HashSet;

use crate::storage::ChangeEntry;

/// Merge freshly written entries with unchanged ones and split the result
/// into publication batches.
///
/// New entries come first, then unchanged ones; a repeated entry keeps its
/// first position. Every batch holds at most `max_batch_size` entries (a
/// size of zero is treated as one) and concatenating the batches gives back
/// the merged list.
pub fn batch(
    new_entries: impl IntoIterator<Item = ChangeEntry>,
    unchanged_entries: impl IntoIterator<Item = ChangeEntry>,
    max_batch_size: usize,
) -> Vec<Vec<ChangeEntry>> {
    let size = max_batch_size.max(1);
    let mut seen = HashSet::new();

    let merged: Vec<ChangeEntry> = new_entries
        .into_iter()
        .chain(unchanged_entries)
        .filter(|entry| seen.insert(entry.clone()))
        .collect();

    merged.chunks(size).map(<[ChangeEntry]>::to_vec).collect()
}
