use anyhow::Result;
use chrono::Utc;
use covidcast::{CycleOutcome, Publisher, SyncEngine, publish_cycle};

use super::format::{print_skipped, stats_line};

/// Run one cycle, publish its batches unless `dry_run`, and print a summary.
pub async fn run(engine: &SyncEngine, publisher: &dyn Publisher, dry_run: bool) -> Result<()> {
    let config = engine.config();
    println!(
        "Syncing into {}/{}...",
        config.bucket, config.dataset_key_prefix
    );

    let report = engine.run_cycle().await?;

    print_skipped(&report.skipped_windows);
    println!("Cycle {}: {}", report.outcome, stats_line(&report.stats));

    if report.outcome == CycleOutcome::UpToDate {
        println!("Latest revision is final; nothing to publish.");
        return Ok(());
    }

    let entries: usize = report.batches.iter().map(Vec::len).sum();
    if dry_run {
        println!(
            "Dry run: would publish {entries} entries in {} batches.",
            report.batches.len()
        );
        return Ok(());
    }

    match publish_cycle(publisher, &report, Utc::now().date_naive()).await? {
        Some(revision) => println!(
            "Published revision #{} ({} assets): {}",
            revision.id, revision.asset_count, revision.comment
        ),
        None => println!("No entries to publish."),
    }

    Ok(())
}
