//! Validation tests for filtered, paged state queries.

use std::collections::BTreeSet;

use crate::provider_validation::{
    completed_state, instance_ids, state_at, JumpStartEntity, OrchestrationState, OrchestrationStatus, StateEntity,
    StorageClientFactory,
};
use crate::query::{InstanceFilter, OrchestrationStateQuery, TimeRangeFilterType};

fn rows(states: &[OrchestrationState]) -> Vec<StateEntity> {
    states.iter().cloned().map(StateEntity::from).collect()
}

fn states_of(results: Vec<StateEntity>) -> Vec<OrchestrationState> {
    results.into_iter().map(StateEntity::into_state).collect()
}

/// Test: exact instance filter returns every execution, or the pinned one.
pub async fn test_query_exact_instance<F: StorageClientFactory>(factory: &F) {
    tracing::info!("→ Testing query: exact instance");
    let client = factory.create_client().await;

    client
        .write_state(rows(&[
            state_at("exact", "1", OrchestrationStatus::ContinuedAsNew, 10),
            state_at("exact", "2", OrchestrationStatus::Running, 20),
            state_at("exact-not", "1", OrchestrationStatus::Running, 30),
        ]))
        .await
        .unwrap();

    let all = client
        .query_state(&OrchestrationStateQuery::new().with_instance("exact"), None)
        .await
        .unwrap();
    assert_eq!(instance_ids(&states_of(all.results)), vec!["exact#1", "exact#2"]);

    let pinned = client
        .query_state(&OrchestrationStateQuery::new().with_instance_execution("exact", "2"), None)
        .await
        .unwrap();
    assert_eq!(instance_ids(&states_of(pinned.results)), vec!["exact#2"]);

    tracing::info!("✓ Test passed: exact instance");
}

/// Test: prefix filter matches by literal, case-sensitive prefix, with `_`
/// and `%` not acting as wildcards.
pub async fn test_query_instance_prefix<F: StorageClientFactory>(factory: &F) {
    tracing::info!("→ Testing query: instance prefix");
    let client = factory.create_client().await;

    client
        .write_state(rows(&[
            state_at("order_1", "1", OrchestrationStatus::Running, 10),
            state_at("order_2", "1", OrchestrationStatus::Running, 10),
            state_at("orderX3", "1", OrchestrationStatus::Running, 10),
            state_at("ord%er", "1", OrchestrationStatus::Running, 10),
            state_at("invoice_1", "1", OrchestrationStatus::Running, 10),
            state_at("ORDER_9", "1", OrchestrationStatus::Running, 10),
        ]))
        .await
        .unwrap();

    let segment = client
        .query_state(&OrchestrationStateQuery::new().with_instance_prefix("order_"), None)
        .await
        .unwrap();
    assert_eq!(instance_ids(&states_of(segment.results)), vec!["order_1#1", "order_2#1"]);

    let segment = client
        .query_state(&OrchestrationStateQuery::new().with_instance_prefix("ord%"), None)
        .await
        .unwrap();
    assert_eq!(instance_ids(&states_of(segment.results)), vec!["ord%er#1"]);

    let segment = client
        .query_state(&OrchestrationStateQuery::new().with_instance_prefix("ORDER"), None)
        .await
        .unwrap();
    assert_eq!(instance_ids(&states_of(segment.results)), vec!["ORDER_9#1"]);

    let segment = client
        .query_state(&OrchestrationStateQuery::new().with_instance_prefix("Order"), None)
        .await
        .unwrap();
    assert!(segment.results.is_empty(), "Prefix match must not fold case");

    tracing::info!("✓ Test passed: instance prefix");
}

/// Test: name, version and status filters combine conjunctively.
pub async fn test_query_name_and_status<F: StorageClientFactory>(factory: &F) {
    tracing::info!("→ Testing query: name and status");
    let client = factory.create_client().await;

    let mut v1 = state_at("ns-a", "1", OrchestrationStatus::Running, 10);
    v1.name = "Billing".to_string();
    v1.version = Some("1.0.0".to_string());
    let mut v2 = state_at("ns-b", "1", OrchestrationStatus::Running, 10);
    v2.name = "Billing".to_string();
    v2.version = Some("2.0.0".to_string());
    let mut done = completed_state("ns-c", "1", 10, 20);
    done.name = "Billing".to_string();
    done.version = Some("2.0.0".to_string());
    let other = state_at("ns-d", "1", OrchestrationStatus::Running, 10);
    client.write_state(rows(&[v1, v2, done, other])).await.unwrap();

    let billing = client
        .query_state(&OrchestrationStateQuery::new().with_name("Billing", None), None)
        .await
        .unwrap();
    assert_eq!(billing.results.len(), 3);

    let v2_running = client
        .query_state(
            &OrchestrationStateQuery::new()
                .with_name("Billing", Some("2.0.0".to_string()))
                .with_status(OrchestrationStatus::Running),
            None,
        )
        .await
        .unwrap();
    assert_eq!(instance_ids(&states_of(v2_running.results)), vec!["ns-b#1"]);

    let completed = client
        .query_state(
            &OrchestrationStateQuery::new().with_status(OrchestrationStatus::Completed),
            None,
        )
        .await
        .unwrap();
    assert_eq!(instance_ids(&states_of(completed.results)), vec!["ns-c#1"]);

    tracing::info!("✓ Test passed: name and status");
}

/// Test: time ranges are inclusive; executions without a completed time
/// never match a CompletedTime range.
pub async fn test_query_time_range<F: StorageClientFactory>(factory: &F) {
    tracing::info!("→ Testing query: time range");
    let client = factory.create_client().await;

    client
        .write_state(rows(&[
            state_at("tr-a", "1", OrchestrationStatus::Running, 100),
            state_at("tr-b", "1", OrchestrationStatus::Running, 200),
            completed_state("tr-c", "1", 300, 400),
            state_at("tr-d", "1", OrchestrationStatus::Running, 301),
        ]))
        .await
        .unwrap();

    let created = client
        .query_state(
            &OrchestrationStateQuery::new().with_time_range(100, 300, TimeRangeFilterType::CreatedTime),
            None,
        )
        .await
        .unwrap();
    assert_eq!(
        instance_ids(&states_of(created.results)),
        vec!["tr-a#1", "tr-b#1", "tr-c#1"]
    );

    let completed = client
        .query_state(
            &OrchestrationStateQuery::new().with_time_range(0, u32::MAX as u64, TimeRangeFilterType::CompletedTime),
            None,
        )
        .await
        .unwrap();
    assert_eq!(instance_ids(&states_of(completed.results)), vec!["tr-c#1"]);

    let updated = client
        .query_state(
            &OrchestrationStateQuery::new().with_time_range(301, 400, TimeRangeFilterType::LastUpdatedTime),
            None,
        )
        .await
        .unwrap();
    assert_eq!(instance_ids(&states_of(updated.results)), vec!["tr-c#1", "tr-d#1"]);

    tracing::info!("✓ Test passed: time range");
}

/// Test: a range whose upper bound is `u64::MAX` is open-ended, for state
/// queries, jump-start queries and the jump-start window alike.
pub async fn test_query_open_ended_time_range<F: StorageClientFactory>(factory: &F) {
    tracing::info!("→ Testing query: open-ended time range");
    let client = factory.create_client().await;

    client
        .write_state(rows(&[
            state_at("open-a", "1", OrchestrationStatus::Running, 100),
            completed_state("open-b", "1", 200, 300),
        ]))
        .await
        .unwrap();
    client
        .write_jump_start(vec![JumpStartEntity::new(
            state_at("open-js", "1", OrchestrationStatus::Pending, 150),
            150,
        )])
        .await
        .unwrap();

    let created = client
        .query_state(
            &OrchestrationStateQuery::new().with_time_range(0, u64::MAX, TimeRangeFilterType::CreatedTime),
            None,
        )
        .await
        .unwrap();
    assert_eq!(instance_ids(&states_of(created.results)), vec!["open-a#1", "open-b#1"]);

    let completed = client
        .query_state(
            &OrchestrationStateQuery::new().with_time_range(250, u64::MAX, TimeRangeFilterType::CompletedTime),
            None,
        )
        .await
        .unwrap();
    assert_eq!(instance_ids(&states_of(completed.results)), vec!["open-b#1"]);

    let provisional = client
        .query_jump_start(
            &OrchestrationStateQuery::new().with_time_range(0, u64::MAX, TimeRangeFilterType::LastUpdatedTime),
            None,
        )
        .await
        .unwrap();
    assert_eq!(provisional.results.len(), 1);

    let window = client.query_jump_start_window(0, u64::MAX, 10).await.unwrap();
    assert_eq!(window.len(), 1);
    assert_eq!(window[0].state.instance.instance_id, "open-js");

    tracing::info!("✓ Test passed: open-ended time range");
}

/// Test: following continuation tokens visits every match exactly once and
/// ends with `None`.
pub async fn test_query_paging<F: StorageClientFactory>(factory: &F) {
    tracing::info!("→ Testing query: paging");
    let client = factory.create_client().await;

    let states: Vec<OrchestrationState> = (0..7)
        .map(|i| state_at(&format!("page-{i}"), "1", OrchestrationStatus::Running, 10 + i))
        .collect();
    client.write_state(rows(&states)).await.unwrap();

    let query = OrchestrationStateQuery::new().with_instance_prefix("page-").with_top(3);
    let mut seen = Vec::new();
    let mut token: Option<String> = None;
    let mut pages = 0;
    loop {
        let segment = client.query_state(&query, token.as_deref()).await.unwrap();
        assert!(segment.results.len() <= 3, "Page exceeds top");
        pages += 1;
        seen.extend(states_of(segment.results).into_iter().map(|s| s.instance.to_string()));
        token = segment.continuation_token;
        if token.is_none() {
            break;
        }
        assert!(pages < 10, "Paging did not terminate");
    }

    assert_eq!(pages, 3);
    assert_eq!(seen.len(), 7);
    let unique: BTreeSet<&String> = seen.iter().collect();
    assert_eq!(unique.len(), 7, "Rows repeated across pages");

    tracing::info!("✓ Test passed: paging");
}

/// Test: malformed filters and undecodable tokens fail as MalformedFilter,
/// never as retryable errors.
pub async fn test_query_rejects_malformed_filters<F: StorageClientFactory>(factory: &F) {
    tracing::info!("→ Testing query: malformed filters rejected");
    let client = factory.create_client().await;

    let prefix_with_execution = OrchestrationStateQuery {
        instance: Some(InstanceFilter::Prefix {
            prefix: "p".to_string(),
            execution_id: Some("1".to_string()),
        }),
        ..Default::default()
    };
    let bad_queries = [
        prefix_with_execution,
        OrchestrationStateQuery::new().with_time_range(20, 10, TimeRangeFilterType::CreatedTime),
        OrchestrationStateQuery::new().with_top(0),
    ];

    for query in &bad_queries {
        let err = client.query_state(query, None).await.unwrap_err();
        assert!(err.is_malformed_filter(), "Expected MalformedFilter, got {err}");
        assert!(!err.is_retryable());

        let err = client.query_jump_start(query, None).await.unwrap_err();
        assert!(err.is_malformed_filter(), "Expected MalformedFilter, got {err}");
    }

    let err = client
        .query_state(&OrchestrationStateQuery::new(), Some("not-a-token"))
        .await
        .unwrap_err();
    assert!(err.is_malformed_filter());

    tracing::info!("✓ Test passed: malformed filters rejected");
}
