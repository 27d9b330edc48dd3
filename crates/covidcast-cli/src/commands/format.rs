use covidcast::{CycleStats, PartitionKey, RevisionSummary, SkippedWindow};

const MAX_KEY_WIDTH: usize = 60;

/// Print partition keys one per line under a counted heading.
pub fn print_partition_list(heading: &str, keys: &[PartitionKey]) {
    if keys.is_empty() {
        return;
    }

    println!("{heading} ({})", keys.len());
    for key in keys {
        println!("  {}", truncate(&key.to_string(), MAX_KEY_WIDTH));
    }
}

/// Print skipped windows to stderr.
pub fn print_skipped(skipped: &[SkippedWindow]) {
    for window in skipped {
        eprintln!("warning: {}", skipped_line(window));
    }
}

pub fn skipped_line(skipped: &SkippedWindow) -> String {
    let message = skipped.message.as_deref().unwrap_or("no message");
    format!(
        "skipped {} window {} (result {}: {message})",
        skipped.partition, skipped.window, skipped.result
    )
}

pub fn stats_line(stats: &CycleStats) -> String {
    format!(
        "{} partitions in catalog: {} synced, {} unchanged, {} excluded, {} rejected rows; \
         {} windows, {} records, {} entries",
        stats.catalog_partitions,
        stats.synced,
        stats.unchanged,
        stats.excluded,
        stats.rejected_rows,
        stats.windows,
        stats.records,
        stats.entries
    )
}

pub fn revision_line(revision: &RevisionSummary) -> String {
    let state = if revision.finalized { "final" } else { "open" };
    format!(
        "#{:<5} {}  {:<5}  {:>5} assets  {}",
        revision.id,
        revision.created_at.format("%Y-%m-%d %H:%M:%S"),
        state,
        revision.asset_count,
        revision.comment
    )
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_owned();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
