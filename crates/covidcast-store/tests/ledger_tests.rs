use covidcast::{ChangeEntry, PublishError, Publisher};
use covidcast_store::RevisionLedger;

fn create_ledger() -> RevisionLedger {
    RevisionLedger::open_in_memory().unwrap()
}

fn entries(prefix: &str, n: usize) -> Vec<ChangeEntry> {
    (0..n)
        .map(|i| ChangeEntry::new("bucket", format!("{prefix}/{i}.csv")))
        .collect()
}

#[tokio::test]
async fn empty_ledger_has_no_latest_revision() {
    let ledger = create_ledger();
    assert!(ledger.latest_revision().await.unwrap().is_none());
    assert!(ledger.revisions().unwrap().is_empty());
}

#[tokio::test]
async fn publish_records_finalized_revision_with_assets_in_order() {
    let ledger = create_ledger();
    let batches = vec![entries("a", 100), entries("b", 3)];

    let revision = ledger
        .publish(&batches, "Revision Updates v2021-03-07")
        .await
        .unwrap();

    assert!(revision.finalized);
    assert_eq!(revision.asset_count, 103);
    assert_eq!(revision.comment, "Revision Updates v2021-03-07");

    let latest = ledger.latest_revision().await.unwrap().unwrap();
    assert_eq!(latest, revision);
    assert_eq!(ledger.assets(revision.id).unwrap(), batches.concat());
}

#[tokio::test]
async fn revisions_are_listed_newest_first() {
    let ledger = create_ledger();
    let first = ledger.publish(&[entries("a", 1)], "first").await.unwrap();
    let second = ledger.publish(&[entries("b", 2)], "second").await.unwrap();

    let revisions = ledger.revisions().unwrap();
    let ids: Vec<i64> = revisions.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![second.id, first.id]);
    assert!(second.id > first.id);
}

#[tokio::test]
async fn oversized_batch_is_rejected_without_a_revision() {
    let ledger = create_ledger();

    let result = ledger.publish(&[entries("a", 101)], "too big").await;

    assert!(matches!(result, Err(PublishError::Rejected(_))));
    assert!(ledger.latest_revision().await.unwrap().is_none());
}

#[tokio::test]
async fn configured_limit_applies() {
    let ledger = create_ledger().with_max_batch_size(2);

    assert!(ledger.publish(&[entries("a", 2)], "ok").await.is_ok());
    assert!(matches!(
        ledger.publish(&[entries("b", 3)], "no").await,
        Err(PublishError::Rejected(_))
    ));
}

#[tokio::test]
async fn empty_publication_is_rejected() {
    let ledger = create_ledger();
    assert!(matches!(
        ledger.publish(&[], "nothing").await,
        Err(PublishError::Rejected(_))
    ));
}
