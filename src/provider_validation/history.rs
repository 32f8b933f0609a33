//! Validation tests for history partitions.

use crate::provider_validation::{
    history_partition, HistoryEntity, HistoryEvent, OrchestrationInstance, OrchestrationStatus, StorageClientFactory,
};

fn sorted(mut rows: Vec<HistoryEntity>) -> Vec<HistoryEntity> {
    rows.sort_by_key(|e| e.sequence_number);
    rows
}

/// Test: each `(instance_id, execution_id)` is its own partition.
pub async fn test_history_partition_isolation<F: StorageClientFactory>(factory: &F) {
    tracing::info!("→ Testing history: partition isolation");
    let client = factory.create_client().await;

    let first = history_partition("iso", "1", 100, 3, true);
    let second = history_partition("iso", "2", 200, 2, false);
    let other = history_partition("iso-other", "1", 300, 4, false);
    client.write_history(first.clone()).await.unwrap();
    client.write_history(second.clone()).await.unwrap();
    client.write_history(other).await.unwrap();

    assert_eq!(sorted(client.read_history("iso", "1").await.unwrap()), first);
    assert_eq!(sorted(client.read_history("iso", "2").await.unwrap()), second);
    assert!(client.read_history("iso", "3").await.unwrap().is_empty());

    tracing::info!("✓ Test passed: partition isolation");
}

/// Test: a row with an existing sequence number replaces the old row.
pub async fn test_history_upsert_by_sequence<F: StorageClientFactory>(factory: &F) {
    tracing::info!("→ Testing history: upsert by sequence number");
    let client = factory.create_client().await;
    let inst = OrchestrationInstance::new("seq", "1");

    client
        .write_history(vec![
            HistoryEntity::new(&inst, 1, 10, HistoryEvent::TimerCreated { fire_at: 50 }),
            HistoryEntity::new(&inst, 2, 20, HistoryEvent::TimerCreated { fire_at: 60 }),
        ])
        .await
        .unwrap();
    let replacement = HistoryEntity::new(&inst, 2, 25, HistoryEvent::TimerFired { timer_id: 1, fire_at: 60 });
    client.write_history(vec![replacement.clone()]).await.unwrap();

    let rows = sorted(client.read_history("seq", "1").await.unwrap());
    assert_eq!(rows.len(), 2, "Same sequence number must not create a second row");
    assert_eq!(rows[1], replacement);

    tracing::info!("✓ Test passed: upsert by sequence number");
}

/// Test: every event kind round-trips through storage unchanged.
pub async fn test_history_payload_round_trip<F: StorageClientFactory>(factory: &F) {
    tracing::info!("→ Testing history: payload round trip");
    let client = factory.create_client().await;
    let inst = OrchestrationInstance::new("payload", "1");

    let events = vec![
        HistoryEvent::ExecutionStarted {
            name: "Orch".to_string(),
            version: Some("1.0.0".to_string()),
            input: Some("{\"order\":42}".to_string()),
        },
        HistoryEvent::TaskScheduled {
            name: "Charge".to_string(),
            input: None,
        },
        HistoryEvent::TaskCompleted {
            scheduled_id: 2,
            result: Some("ok".to_string()),
        },
        HistoryEvent::TaskFailed {
            scheduled_id: 2,
            reason: "card declined: 'insufficient funds'".to_string(),
        },
        HistoryEvent::TimerCreated { fire_at: 1_000 },
        HistoryEvent::TimerFired {
            timer_id: 5,
            fire_at: 1_000,
        },
        HistoryEvent::EventRaised {
            name: "Approval".to_string(),
            input: Some("yes".to_string()),
        },
        HistoryEvent::ContinuedAsNew {
            input: Some("next".to_string()),
        },
        HistoryEvent::ExecutionCompleted {
            status: OrchestrationStatus::Failed,
            result: Some("boom".to_string()),
        },
    ];
    let rows: Vec<HistoryEntity> = events
        .into_iter()
        .enumerate()
        .map(|(i, event)| HistoryEntity::new(&inst, i as u64 + 1, 100 + i as u64, event))
        .collect();
    client.write_history(rows.clone()).await.unwrap();

    assert_eq!(sorted(client.read_history("payload", "1").await.unwrap()), rows);

    tracing::info!("✓ Test passed: payload round trip");
}

/// Test: delete removes exactly the given rows; deleting absent rows succeeds.
pub async fn test_history_delete_rows<F: StorageClientFactory>(factory: &F) {
    tracing::info!("→ Testing history: delete rows");
    let client = factory.create_client().await;

    let rows = history_partition("hdel", "1", 10, 4, false);
    client.write_history(rows.clone()).await.unwrap();

    client.delete_history(vec![rows[1].clone(), rows[3].clone()]).await.unwrap();
    client
        .delete_history(vec![rows[3].clone()])
        .await
        .expect("Deleting an absent row should succeed");

    let remaining = sorted(client.read_history("hdel", "1").await.unwrap());
    assert_eq!(remaining, vec![rows[0].clone(), rows[2].clone()]);

    tracing::info!("✓ Test passed: delete rows");
}
