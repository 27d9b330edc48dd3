use anyhow::Result;
use covidcast::{PartitionKey, SyncEngine};

use super::format::print_partition_list;

/// Print what a cycle would do without fetching partitions.
pub async fn run(engine: &SyncEngine) -> Result<()> {
    let plan = engine.plan().await?;

    println!(
        "{} partitions in catalog ({} rows rejected), {} stored objects.",
        plan.catalog.partitions.len(),
        plan.catalog.rejected,
        plan.snapshot.len()
    );

    let stale: Vec<PartitionKey> = plan.diff.needs_update.iter().map(|d| d.key()).collect();
    let unchanged: Vec<PartitionKey> = plan.diff.unchanged.iter().map(|u| u.key.clone()).collect();

    print_partition_list("Needs update", &stale);
    print_partition_list("Unchanged", &unchanged);
    print_partition_list("Excluded", &plan.diff.excluded);

    if plan.diff.is_up_to_date() {
        println!("Everything is up to date.");
    }

    Ok(())
}
