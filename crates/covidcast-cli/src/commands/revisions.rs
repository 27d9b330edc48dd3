use anyhow::Result;
use covidcast_store::RevisionLedger;

use super::format::revision_line;

/// List recorded revisions, newest first.
pub fn run(ledger: &RevisionLedger) -> Result<()> {
    let revisions = ledger.revisions()?;

    if revisions.is_empty() {
        println!("No revisions published yet.");
        return Ok(());
    }

    for revision in &revisions {
        println!("{}", revision_line(revision));
    }
    println!("\n{} revisions", revisions.len());

    Ok(())
}
