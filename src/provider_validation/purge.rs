//! Validation tests for history purge.

use crate::provider_validation::{history_partition, state_at, OrchestrationStatus, StorageClientFactory};
use crate::query::TimeRangeFilterType;

/// Test: five partitions, two created before the threshold. Purge removes
/// exactly the old partitions' rows and reports that count.
pub async fn test_purge_by_created_time<F: StorageClientFactory>(factory: &F) {
    tracing::info!("→ Testing purge: by created time");
    let client = factory.create_client().await;

    let starts = [100u64, 200, 1_000, 2_000, 3_000];
    for (i, start) in starts.iter().enumerate() {
        client
            .write_history(history_partition(&format!("purge-{i}"), "1", *start, 1, false))
            .await
            .unwrap();
    }

    let removed = client.purge_history(500, TimeRangeFilterType::CreatedTime).await.unwrap();
    assert_eq!(removed, 2);

    assert!(client.read_history("purge-0", "1").await.unwrap().is_empty());
    assert!(client.read_history("purge-1", "1").await.unwrap().is_empty());
    for i in 2..5 {
        assert_eq!(client.read_history(&format!("purge-{i}"), "1").await.unwrap().len(), 1);
    }

    // Nothing left to purge at the same threshold
    assert_eq!(client.purge_history(500, TimeRangeFilterType::CreatedTime).await.unwrap(), 0);

    tracing::info!("✓ Test passed: by created time");
}

/// Test: CompletedTime purges only partitions with a terminal event before
/// the threshold; open partitions survive regardless of age.
pub async fn test_purge_by_completed_time<F: StorageClientFactory>(factory: &F) {
    tracing::info!("→ Testing purge: by completed time");
    let client = factory.create_client().await;

    // completes at 102
    client.write_history(history_partition("pc-done", "1", 100, 3, true)).await.unwrap();
    // open, very old
    client.write_history(history_partition("pc-open", "1", 10, 4, false)).await.unwrap();
    // completes at 5_001
    client.write_history(history_partition("pc-late", "1", 5_000, 2, true)).await.unwrap();

    let removed = client
        .purge_history(1_000, TimeRangeFilterType::CompletedTime)
        .await
        .unwrap();
    assert_eq!(removed, 3, "All rows of the completed partition are removed");

    assert!(client.read_history("pc-done", "1").await.unwrap().is_empty());
    assert_eq!(client.read_history("pc-open", "1").await.unwrap().len(), 4);
    assert_eq!(client.read_history("pc-late", "1").await.unwrap().len(), 2);

    // LastUpdatedTime sees the open partition's latest row (13)
    let removed = client
        .purge_history(1_000, TimeRangeFilterType::LastUpdatedTime)
        .await
        .unwrap();
    assert_eq!(removed, 4);

    tracing::info!("✓ Test passed: by completed time");
}

/// Test: a partition timestamp equal to the threshold is not purged.
pub async fn test_purge_threshold_is_strict<F: StorageClientFactory>(factory: &F) {
    tracing::info!("→ Testing purge: strict threshold");
    let client = factory.create_client().await;

    client.write_history(history_partition("strict", "1", 700, 1, false)).await.unwrap();

    assert_eq!(client.purge_history(700, TimeRangeFilterType::CreatedTime).await.unwrap(), 0);
    assert_eq!(client.read_history("strict", "1").await.unwrap().len(), 1);
    assert_eq!(client.purge_history(701, TimeRangeFilterType::CreatedTime).await.unwrap(), 1);

    tracing::info!("✓ Test passed: strict threshold");
}

/// Test: a `u64::MAX` threshold purges every partition in every mode.
pub async fn test_purge_unbounded_threshold<F: StorageClientFactory>(factory: &F) {
    tracing::info!("→ Testing purge: unbounded threshold");
    let client = factory.create_client().await;

    client.write_history(history_partition("unbounded-a", "1", 10, 1, false)).await.unwrap();
    client.write_history(history_partition("unbounded-b", "1", 20, 2, true)).await.unwrap();
    client.write_history(history_partition("unbounded-c", "1", 30, 3, false)).await.unwrap();

    assert_eq!(
        client.purge_history(u64::MAX, TimeRangeFilterType::CompletedTime).await.unwrap(),
        2
    );
    assert!(client.read_history("unbounded-b", "1").await.unwrap().is_empty());
    assert_eq!(
        client.purge_history(u64::MAX, TimeRangeFilterType::LastUpdatedTime).await.unwrap(),
        4
    );
    assert!(client.read_history("unbounded-a", "1").await.unwrap().is_empty());
    assert!(client.read_history("unbounded-c", "1").await.unwrap().is_empty());

    tracing::info!("✓ Test passed: unbounded threshold");
}

/// Test: purge removes history only; state rows for the same execution stay.
pub async fn test_purge_leaves_state_rows<F: StorageClientFactory>(factory: &F) {
    tracing::info!("→ Testing purge: state rows untouched");
    let client = factory.create_client().await;

    client.write_history(history_partition("keep-state", "1", 10, 2, true)).await.unwrap();
    client
        .write_state(vec![state_at("keep-state", "1", OrchestrationStatus::Completed, 10).into()])
        .await
        .unwrap();

    assert_eq!(
        client.purge_history(1_000, TimeRangeFilterType::CreatedTime).await.unwrap(),
        2
    );
    assert!(client.read_history("keep-state", "1").await.unwrap().is_empty());
    assert_eq!(client.read_state("keep-state", "1").await.unwrap().len(), 1);

    tracing::info!("✓ Test passed: state rows untouched");
}
