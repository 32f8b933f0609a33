//! Property-based tests using proptest to verify store invariants

mod common;

use common::{jump_start, state};
use duroxide_instance_store::providers::in_memory::InMemoryStorageClient;
use duroxide_instance_store::*;
use proptest::prelude::*;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

fn block_on<F: std::future::Future>(f: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(f)
}

/// Instance ids drawn from a small pool so primary and jump-start sets overlap
fn arb_instance_id() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["a", "b", "c", "d", "e", "f"]).prop_map(str::to_string)
}

fn arb_status() -> impl Strategy<Value = OrchestrationStatus> {
    prop::sample::select(OrchestrationStatus::ALL.to_vec())
}

fn arb_key() -> impl Strategy<Value = (String, String)> {
    (arb_instance_id(), 1u32..4).prop_map(|(id, exec)| (id, exec.to_string()))
}

// ============================================================================
// Property 1: History ordering
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: history reads are sorted by sequence number whatever the
    /// insertion order, and each sequence number appears once.
    #[test]
    fn prop_history_sorted_by_sequence(
        seqs in prop::collection::vec(0u64..500, 0..40),
    ) {
        let result = block_on(async {
            let store = InstanceStore::new(Arc::new(InMemoryStorageClient::new()));
            let inst = OrchestrationInstance::new("prop-h", "1");
            let entities: Vec<InstanceEntity> = seqs
                .iter()
                .map(|&seq| HistoryEntity::new(&inst, seq, seq, HistoryEvent::TimerCreated { fire_at: seq }).into())
                .collect();
            store.write_entities(entities).await.unwrap();
            store.get_orchestration_history_events("prop-h", "1").await.unwrap()
        });

        let read: Vec<u64> = result.iter().map(|e| e.sequence_number).collect();
        let expected: Vec<u64> = seqs.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        prop_assert_eq!(read, expected);
    }
}

// ============================================================================
// Property 2: Primary precedence on merged results
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: no merged result contains a jump-start row for an instance
    /// that has a primary row, and `all_executions` returns |P ∪ J'| rows.
    #[test]
    fn prop_primary_rows_take_precedence(
        primary in prop::collection::vec((arb_key(), arb_status()), 0..10),
        provisional in prop::collection::vec(arb_key(), 0..10),
    ) {
        let (per_instance, queried) = block_on(async {
            let store = InstanceStore::new(Arc::new(InMemoryStorageClient::new()));
            let mut entities: Vec<InstanceEntity> = primary
                .iter()
                .map(|((id, exec), status)| InstanceEntity::State(state(id, exec, *status, 10).into()))
                .collect();
            entities.extend(provisional.iter().map(|(id, exec)| InstanceEntity::JumpStart(jump_start(id, exec, 5))));
            store.write_entities(entities).await.unwrap();

            let mut per_instance = Vec::new();
            for id in ["a", "b", "c", "d", "e", "f"] {
                per_instance.push((id, store.get_orchestration_state(id, true).await.unwrap()));
            }
            let queried = store
                .query_orchestration_states(&OrchestrationStateQuery::new(), None)
                .await
                .unwrap()
                .states;
            (per_instance, queried)
        });

        let primary_keys: HashSet<(String, String)> = primary.iter().map(|(k, _)| k.clone()).collect();
        let primary_ids: HashSet<&str> = primary_keys.iter().map(|(id, _)| id.as_str()).collect();
        let provisional_keys: HashSet<(String, String)> = provisional.iter().cloned().collect();

        for (id, rows) in &per_instance {
            let committed = primary_keys.iter().filter(|(i, _)| i.as_str() == *id).count();
            let expected = if primary_ids.contains(id) {
                committed
            } else {
                provisional_keys.iter().filter(|(i, _)| i.as_str() == *id).count()
            };
            prop_assert_eq!(rows.len(), expected, "instance {}", id);
            if primary_ids.contains(id) {
                prop_assert!(rows
                    .iter()
                    .all(|s| primary_keys.contains(&(s.instance_id().to_string(), s.execution_id().to_string()))));
            }
        }

        // The unfiltered range query obeys the same rule
        for s in &queried {
            let key = (s.instance_id().to_string(), s.execution_id().to_string());
            prop_assert!(primary_keys.contains(&key) || !primary_ids.contains(s.instance_id()));
        }
        let unique: HashSet<(String, String)> = queried
            .iter()
            .map(|s| (s.instance_id().to_string(), s.execution_id().to_string()))
            .collect();
        prop_assert_eq!(unique.len(), queried.len());
    }

    /// Property: LatestNonContinued never picks an older generation than any
    /// other non-continued generation.
    #[test]
    fn prop_latest_selection_is_newest(
        generations in prop::collection::vec((arb_status(), 0u64..1_000), 1..8),
    ) {
        let picked = block_on(async {
            let store = InstanceStore::with_options(
                Arc::new(InMemoryStorageClient::new()),
                InstanceStoreOptions {
                    state_selection: StateSelection::LatestNonContinued,
                    ..Default::default()
                },
            );
            let entities: Vec<InstanceEntity> = generations
                .iter()
                .enumerate()
                .map(|(i, (status, updated))| {
                    InstanceEntity::State(state("gen", &format!("{i}"), *status, *updated).into())
                })
                .collect();
            store.write_entities(entities).await.unwrap();
            store.get_orchestration_state("gen", false).await.unwrap()
        });

        let newest = generations
            .iter()
            .filter(|(status, _)| *status != OrchestrationStatus::ContinuedAsNew)
            .map(|(_, updated)| *updated)
            .max();
        match newest {
            None => prop_assert!(picked.is_empty()),
            Some(t) => {
                prop_assert_eq!(picked.len(), 1);
                prop_assert_eq!(picked[0].last_updated_time, t);
                prop_assert_ne!(picked[0].status, OrchestrationStatus::ContinuedAsNew);
            }
        }
    }
}
