//! Validation tests for primary state rows and store lifecycle.

use crate::provider_validation::{completed_state, state_at, OrchestrationStatus, StorageClientFactory};

/// Test: writing the same `(instance_id, execution_id)` twice leaves one row
/// holding the second write.
pub async fn test_state_upsert_replaces_row<F: StorageClientFactory>(factory: &F) {
    tracing::info!("→ Testing state: upsert replaces row");
    let client = factory.create_client().await;

    client
        .write_state(vec![state_at("upsert", "1", OrchestrationStatus::Running, 100).into()])
        .await
        .unwrap();
    let updated = completed_state("upsert", "1", 100, 200);
    client.write_state(vec![updated.clone().into()]).await.unwrap();

    let rows = client.read_state("upsert", "1").await.unwrap();
    assert_eq!(rows.len(), 1, "Upsert must not duplicate rows");
    assert_eq!(rows[0].state, updated);

    tracing::info!("✓ Test passed: state upsert replaces row");
}

/// Test: absence is an empty read, and deleting absent rows succeeds.
pub async fn test_state_missing_reads_empty<F: StorageClientFactory>(factory: &F) {
    tracing::info!("→ Testing state: missing rows read empty");
    let client = factory.create_client().await;

    assert!(client.read_state("nobody", "1").await.unwrap().is_empty());
    client
        .delete_state(vec![state_at("nobody", "1", OrchestrationStatus::Pending, 1).into()])
        .await
        .expect("Deleting a missing row should succeed");
    client.write_state(Vec::new()).await.expect("Empty write should succeed");

    tracing::info!("✓ Test passed: missing rows read empty");
}

/// Test: delete removes exactly the given keys.
pub async fn test_state_delete_is_targeted<F: StorageClientFactory>(factory: &F) {
    tracing::info!("→ Testing state: delete is targeted");
    let client = factory.create_client().await;

    let keep = state_at("del", "1", OrchestrationStatus::ContinuedAsNew, 10);
    let drop = state_at("del", "2", OrchestrationStatus::Running, 20);
    client
        .write_state(vec![keep.clone().into(), drop.clone().into()])
        .await
        .unwrap();

    client.delete_state(vec![drop.into()]).await.unwrap();

    assert!(client.read_state("del", "2").await.unwrap().is_empty());
    let rows = client.read_state("del", "1").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].state, keep);

    tracing::info!("✓ Test passed: delete is targeted");
}

/// Test: deleting the store drops all data; creating it again yields an
/// empty, usable store. Both calls are idempotent.
pub async fn test_store_lifecycle<F: StorageClientFactory>(factory: &F) {
    tracing::info!("→ Testing lifecycle: delete and recreate store");
    let client = factory.create_client().await;

    client
        .write_state(vec![state_at("life", "1", OrchestrationStatus::Running, 10).into()])
        .await
        .unwrap();

    client.create_store_if_not_exists().await.expect("Create on existing store is a no-op");
    assert_eq!(client.read_state("life", "1").await.unwrap().len(), 1);

    client.delete_store_if_exists().await.unwrap();
    client.delete_store_if_exists().await.expect("Second delete is a no-op");
    client.create_store_if_not_exists().await.unwrap();

    assert!(
        client.read_state("life", "1").await.unwrap().is_empty(),
        "Recreated store must be empty"
    );
    assert!(client.read_history("life", "1").await.unwrap().is_empty());

    tracing::info!("✓ Test passed: delete and recreate store");
}
