//! Validation tests for the jump-start table.

use crate::provider_validation::{
    instance_ids, state_at, JumpStartEntity, OrchestrationStatus, StorageClientFactory,
};
use crate::query::OrchestrationStateQuery;

fn pending(instance_id: &str, registered_at: u64) -> JumpStartEntity {
    JumpStartEntity::new(
        state_at(instance_id, "1", OrchestrationStatus::Pending, registered_at),
        registered_at,
    )
}

/// Test: the window read is inclusive on both ends and returns oldest first.
pub async fn test_jump_start_window_bounds_and_order<F: StorageClientFactory>(factory: &F) {
    tracing::info!("→ Testing jump-start: window bounds and order");
    let client = factory.create_client().await;

    client
        .write_jump_start(vec![
            pending("js-late", 3_000),
            pending("js-too-old", 999),
            pending("js-from", 1_000),
            pending("js-mid", 2_000),
            pending("js-too-new", 3_001),
        ])
        .await
        .unwrap();

    let rows = client.query_jump_start_window(1_000, 3_000, 10).await.unwrap();
    let ids: Vec<&str> = rows.iter().map(|r| r.instance_id()).collect();
    assert_eq!(ids, vec!["js-from", "js-mid", "js-late"]);
    assert_eq!(rows[0].jump_start_time, 1_000);

    tracing::info!("✓ Test passed: window bounds and order");
}

/// Test: `top` caps the window read and keeps the oldest entries.
pub async fn test_jump_start_window_respects_top<F: StorageClientFactory>(factory: &F) {
    tracing::info!("→ Testing jump-start: window respects top");
    let client = factory.create_client().await;

    let entries = (0..6).map(|i| pending(&format!("js-top-{i}"), 500 - i * 10)).collect();
    client.write_jump_start(entries).await.unwrap();

    let rows = client.query_jump_start_window(0, 1_000, 2).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].jump_start_time, 450);
    assert_eq!(rows[1].jump_start_time, 460);

    tracing::info!("✓ Test passed: window respects top");
}

/// Test: jump-start rows are queried with the same filter semantics as state rows.
pub async fn test_jump_start_query_filters<F: StorageClientFactory>(factory: &F) {
    tracing::info!("→ Testing jump-start: query filters");
    let client = factory.create_client().await;

    let mut running = pending("jsq-b", 20);
    running.state.status = OrchestrationStatus::Running;
    client
        .write_jump_start(vec![pending("jsq-a", 10), running, pending("other", 30)])
        .await
        .unwrap();

    let by_prefix = client
        .query_jump_start(&OrchestrationStateQuery::new().with_instance_prefix("jsq-"), None)
        .await
        .unwrap();
    let states: Vec<_> = by_prefix.results.into_iter().map(|r| r.state).collect();
    assert_eq!(instance_ids(&states), vec!["jsq-a#1", "jsq-b#1"]);
    assert!(by_prefix.continuation_token.is_none());

    let by_status = client
        .query_jump_start(
            &OrchestrationStateQuery::new().with_status(OrchestrationStatus::Pending),
            None,
        )
        .await
        .unwrap();
    let mut ids: Vec<&str> = by_status.results.iter().map(|r| r.instance_id()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["jsq-a", "other"]);

    tracing::info!("✓ Test passed: query filters");
}

/// Test: jump-start rows upsert and delete by `(instance_id, execution_id)`.
pub async fn test_jump_start_upsert_and_delete<F: StorageClientFactory>(factory: &F) {
    tracing::info!("→ Testing jump-start: upsert and delete");
    let client = factory.create_client().await;

    client.write_jump_start(vec![pending("jsu", 10)]).await.unwrap();
    client.write_jump_start(vec![pending("jsu", 40)]).await.unwrap();

    let query = OrchestrationStateQuery::new().with_instance("jsu");
    let rows = client.query_jump_start(&query, None).await.unwrap().results;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].jump_start_time, 40);

    client.delete_jump_start(rows).await.unwrap();
    assert!(client.query_jump_start(&query, None).await.unwrap().results.is_empty());

    tracing::info!("✓ Test passed: upsert and delete");
}
