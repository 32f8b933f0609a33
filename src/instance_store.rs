//! Instance-state reconciliation and query engine.
//!
//! [`InstanceStore`] drives a [`StorageClient`] and merges the primary state
//! store with the jump-start store:
//!
//! - a primary row for an instance always wins; jump-start rows for the same
//!   instance id are dropped from merged results;
//! - "current state" of an instance skips `ContinuedAsNew` generations;
//! - history is always returned in sequence-number order.
//!
//! Storage failures propagate unchanged. Absence is an empty `Vec` or `None`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::providers::{StorageClient, StoreError};
use crate::query::{OrchestrationStateQuery, TimeRangeFilterType};
use crate::{
    now_millis, EntityBatch, HistoryEntity, InstanceEntity, JumpStartEntity, OrchestrationState, OrchestrationStatus,
    StateEntity, JUMP_START_WINDOW,
};

/// How [`InstanceStore::get_orchestration_state`] picks the current
/// generation when several executions exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StateSelection {
    /// First non-continued-as-new entry in enumeration order (primary rows,
    /// then jump-start rows, each in storage order). This is not guaranteed
    /// to be the temporally latest generation.
    #[default]
    FirstNonContinued,
    /// Non-continued-as-new entry with the greatest `last_updated_time`;
    /// ties go to the later entry in enumeration order.
    LatestNonContinued,
}

/// Configuration for [`InstanceStore`].
#[derive(Debug, Clone)]
pub struct InstanceStoreOptions {
    pub state_selection: StateSelection,
    /// Trailing window for [`InstanceStore::get_jump_start_entities`].
    pub jump_start_window: Duration,
    /// Reported through [`InstanceStore::max_history_entry_length`].
    pub max_history_entry_length: usize,
}

impl Default for InstanceStoreOptions {
    fn default() -> Self {
        Self {
            state_selection: StateSelection::default(),
            jump_start_window: JUMP_START_WINDOW,
            max_history_entry_length: usize::MAX,
        }
    }
}

/// Per-source continuation for a merged range query.
///
/// `None` on a side means that source is exhausted and is not queried again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateQueryContinuation {
    pub primary: Option<String>,
    pub jump_start: Option<String>,
}

/// One merged page of a range query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateQuerySegment {
    pub states: Vec<OrchestrationState>,
    /// `None` once both sources are exhausted.
    pub continuation: Option<StateQueryContinuation>,
}

/// Persistence and query layer over a primary state store and a jump-start
/// store.
///
/// The store keeps no mutable state of its own; clone the `Arc` or share
/// the store freely between tasks.
pub struct InstanceStore {
    client: Arc<dyn StorageClient>,
    options: InstanceStoreOptions,
}

impl InstanceStore {
    pub fn new(client: Arc<dyn StorageClient>) -> Self {
        Self::with_options(client, InstanceStoreOptions::default())
    }

    pub fn with_options(client: Arc<dyn StorageClient>, options: InstanceStoreOptions) -> Self {
        Self { client, options }
    }

    pub fn client(&self) -> &Arc<dyn StorageClient> {
        &self.client
    }

    pub fn options(&self) -> &InstanceStoreOptions {
        &self.options
    }

    pub fn max_history_entry_length(&self) -> usize {
        self.options.max_history_entry_length
    }

    // ===== Lifecycle =====

    /// Create the store, dropping it first when `recreate` is set.
    pub async fn initialize_store(&self, recreate: bool) -> Result<(), StoreError> {
        if recreate {
            self.delete_store().await?;
        }
        self.client.create_store_if_not_exists().await
    }

    pub async fn delete_store(&self) -> Result<(), StoreError> {
        self.client.delete_store_if_exists().await
    }

    // ===== Write / delete =====

    /// Partition a heterogeneous batch by kind and write each partition.
    pub async fn write_entities(&self, entities: impl IntoIterator<Item = InstanceEntity>) -> Result<(), StoreError> {
        self.write_batch(entities.into_iter().collect()).await
    }

    /// Write pre-partitioned entities. Empty partitions are skipped.
    pub async fn write_batch(&self, batch: EntityBatch) -> Result<(), StoreError> {
        debug!(
            target: "duroxide::instance_store",
            history = batch.history.len(),
            states = batch.states.len(),
            jump_starts = batch.jump_starts.len(),
            "write_entities"
        );
        if !batch.history.is_empty() {
            self.client.write_history(batch.history).await?;
        }
        if !batch.states.is_empty() {
            self.client.write_state(batch.states).await?;
        }
        if !batch.jump_starts.is_empty() {
            self.client.write_jump_start(batch.jump_starts).await?;
        }
        Ok(())
    }

    pub async fn delete_entities(&self, entities: impl IntoIterator<Item = InstanceEntity>) -> Result<(), StoreError> {
        self.delete_batch(entities.into_iter().collect()).await
    }

    pub async fn delete_batch(&self, batch: EntityBatch) -> Result<(), StoreError> {
        debug!(
            target: "duroxide::instance_store",
            history = batch.history.len(),
            states = batch.states.len(),
            jump_starts = batch.jump_starts.len(),
            "delete_entities"
        );
        if !batch.history.is_empty() {
            self.client.delete_history(batch.history).await?;
        }
        if !batch.states.is_empty() {
            self.client.delete_state(batch.states).await?;
        }
        if !batch.jump_starts.is_empty() {
            self.client.delete_jump_start(batch.jump_starts).await?;
        }
        Ok(())
    }

    // ===== Point lookups =====

    /// Raw primary-store rows for the exact key. No jump-start fallback.
    pub async fn get_entities(&self, instance_id: &str, execution_id: &str) -> Result<Vec<StateEntity>, StoreError> {
        self.client.read_state(instance_id, execution_id).await
    }

    /// State of an instance across both stores.
    ///
    /// With `all_executions` every merged row is returned (all generations).
    /// Otherwise at most one row is returned, chosen by
    /// [`InstanceStoreOptions::state_selection`]; an empty result means no
    /// non-continued-as-new row exists.
    pub async fn get_orchestration_state(
        &self,
        instance_id: &str,
        all_executions: bool,
    ) -> Result<Vec<OrchestrationState>, StoreError> {
        let query = OrchestrationStateQuery::new().with_instance(instance_id);

        let primary = self.client.query_state(&query, None).await?.results;
        let jump_start = self.client.query_jump_start(&query, None).await?.results;

        let primary_count = primary.len();
        let jump_start_count = jump_start.len();
        let merged = merge_with_jump_start(
            primary.into_iter().map(StateEntity::into_state).collect(),
            jump_start.into_iter().map(|js| js.state).collect(),
        );

        debug!(
            target: "duroxide::instance_store",
            instance_id,
            primary = primary_count,
            jump_start = jump_start_count,
            merged = merged.len(),
            all_executions,
            "get_orchestration_state"
        );

        if all_executions {
            return Ok(merged);
        }
        Ok(select_current(merged, self.options.state_selection).into_iter().collect())
    }

    /// State of one exact execution: primary row first, jump-start row as
    /// fallback, `None` if neither exists.
    pub async fn get_orchestration_state_by_execution(
        &self,
        instance_id: &str,
        execution_id: &str,
    ) -> Result<Option<OrchestrationState>, StoreError> {
        if let Some(entity) = self.client.read_state(instance_id, execution_id).await?.into_iter().next() {
            return Ok(Some(entity.into_state()));
        }

        let query = OrchestrationStateQuery::new().with_instance_execution(instance_id, execution_id);
        let fallback = self
            .client
            .query_jump_start(&query, None)
            .await?
            .results
            .into_iter()
            .next()
            .map(|js| StateEntity::from(js).into_state());

        if fallback.is_some() {
            debug!(
                target: "duroxide::instance_store",
                instance_id,
                execution_id,
                "state served from jump-start store"
            );
        }
        Ok(fallback)
    }

    // ===== Range query =====

    /// Run `query` against both stores and merge one page from each.
    ///
    /// Pass the returned continuation back to fetch the next page. Each
    /// source pages independently; dedup only applies within one call, so a
    /// jump-start row may appear on a later page than the primary row that
    /// supersedes it.
    pub async fn query_orchestration_states(
        &self,
        query: &OrchestrationStateQuery,
        continuation: Option<&StateQueryContinuation>,
    ) -> Result<StateQuerySegment, StoreError> {
        let (query_primary, primary_token, query_jump_start, jump_start_token) = match continuation {
            None => (true, None, true, None),
            Some(c) => (
                c.primary.is_some(),
                c.primary.as_deref(),
                c.jump_start.is_some(),
                c.jump_start.as_deref(),
            ),
        };

        let (primary, next_primary) = if query_primary {
            let segment = self.client.query_state(query, primary_token).await?;
            (
                segment.results.into_iter().map(StateEntity::into_state).collect(),
                segment.continuation_token,
            )
        } else {
            (Vec::new(), None)
        };

        let (jump_start, next_jump_start) = if query_jump_start {
            let segment = self.client.query_jump_start(query, jump_start_token).await?;
            (
                segment.results.into_iter().map(|js| js.state).collect(),
                segment.continuation_token,
            )
        } else {
            (Vec::new(), None)
        };

        let states = merge_with_jump_start(primary, jump_start);
        let continuation = if next_primary.is_some() || next_jump_start.is_some() {
            Some(StateQueryContinuation {
                primary: next_primary,
                jump_start: next_jump_start,
            })
        } else {
            None
        };

        debug!(
            target: "duroxide::instance_store",
            merged = states.len(),
            more = continuation.is_some(),
            "query_orchestration_states"
        );
        Ok(StateQuerySegment { states, continuation })
    }

    // ===== History =====

    /// History of one execution, ascending by sequence number.
    pub async fn get_orchestration_history_events(
        &self,
        instance_id: &str,
        execution_id: &str,
    ) -> Result<Vec<HistoryEntity>, StoreError> {
        let mut events = self.client.read_history(instance_id, execution_id).await?;
        events.sort_by_key(|e| e.sequence_number);
        Ok(events)
    }

    /// Delete history partitions whose `mode` timestamp is before
    /// `threshold` (ms since epoch). Returns the number of history rows
    /// removed. State rows are untouched.
    pub async fn purge_orchestration_history_events(
        &self,
        threshold: u64,
        mode: TimeRangeFilterType,
    ) -> Result<u64, StoreError> {
        let removed = self.client.purge_history(threshold, mode).await?;
        tracing::info!(
            target: "duroxide::instance_store",
            threshold,
            ?mode,
            removed,
            "purged orchestration history"
        );
        Ok(removed)
    }

    // ===== Jump-start registry =====

    pub async fn write_jump_start_entities(&self, entities: Vec<JumpStartEntity>) -> Result<(), StoreError> {
        self.client.write_jump_start(entities).await
    }

    pub async fn delete_jump_start_entities(&self, entities: Vec<JumpStartEntity>) -> Result<(), StoreError> {
        self.client.delete_jump_start(entities).await
    }

    /// Up to `top` jump-start entries registered within the trailing window,
    /// oldest first.
    pub async fn get_jump_start_entities(&self, top: u32) -> Result<Vec<JumpStartEntity>, StoreError> {
        let now = now_millis();
        let window_ms = u64::try_from(self.options.jump_start_window.as_millis()).unwrap_or(u64::MAX);
        self.client
            .query_jump_start_window(now.saturating_sub(window_ms), now, top)
            .await
    }
}

/// `primary ∪ (jump_start \ {rows whose instance id appears in primary})`,
/// primary rows first.
fn merge_with_jump_start(
    primary: Vec<OrchestrationState>,
    jump_start: Vec<OrchestrationState>,
) -> Vec<OrchestrationState> {
    let committed: HashSet<String> = primary.iter().map(|s| s.instance_id().to_string()).collect();
    let mut merged = primary;
    merged.extend(
        jump_start
            .into_iter()
            .filter(|js| !committed.contains(js.instance_id())),
    );
    merged
}

fn select_current(merged: Vec<OrchestrationState>, selection: StateSelection) -> Option<OrchestrationState> {
    let mut candidates = merged
        .into_iter()
        .filter(|s| s.status != OrchestrationStatus::ContinuedAsNew);
    match selection {
        StateSelection::FirstNonContinued => candidates.next(),
        // max_by_key keeps the last maximum, so ties go to the later entry
        StateSelection::LatestNonContinued => candidates.max_by_key(|s| s.last_updated_time),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::in_memory::InMemoryStorageClient;
    use crate::{HistoryEvent, OrchestrationInstance};

    fn state(id: &str, exec: &str, status: OrchestrationStatus, updated: u64) -> OrchestrationState {
        let mut s = OrchestrationState::new(OrchestrationInstance::new(id, exec), "Orch", status, updated);
        s.last_updated_time = updated;
        s
    }

    fn store() -> InstanceStore {
        InstanceStore::new(Arc::new(InMemoryStorageClient::new()))
    }

    #[test]
    fn merge_drops_jump_start_rows_for_committed_instances() {
        let merged = merge_with_jump_start(
            vec![state("a", "1", OrchestrationStatus::Running, 1)],
            vec![
                state("a", "2", OrchestrationStatus::Pending, 2),
                state("b", "1", OrchestrationStatus::Pending, 3),
            ],
        );
        let keys: Vec<String> = merged.iter().map(|s| s.instance.to_string()).collect();
        assert_eq!(keys, vec!["a#1", "b#1"]);
    }

    #[test]
    fn first_non_continued_follows_enumeration_order() {
        let merged = vec![
            state("a", "1", OrchestrationStatus::ContinuedAsNew, 10),
            state("a", "2", OrchestrationStatus::Completed, 20),
            state("a", "3", OrchestrationStatus::Running, 30),
        ];
        let picked = select_current(merged.clone(), StateSelection::FirstNonContinued).unwrap();
        assert_eq!(picked.execution_id(), "2");

        let picked = select_current(merged, StateSelection::LatestNonContinued).unwrap();
        assert_eq!(picked.execution_id(), "3");
    }

    #[test]
    fn only_continued_generations_select_nothing() {
        let merged = vec![
            state("a", "1", OrchestrationStatus::ContinuedAsNew, 10),
            state("a", "2", OrchestrationStatus::ContinuedAsNew, 20),
        ];
        assert!(select_current(merged.clone(), StateSelection::FirstNonContinued).is_none());
        assert!(select_current(merged, StateSelection::LatestNonContinued).is_none());
    }

    #[tokio::test]
    async fn running_primary_beats_pending_jump_start() {
        let store = store();
        store
            .write_entities(vec![InstanceEntity::State(
                state("A", "1", OrchestrationStatus::Running, 10).into(),
            )])
            .await
            .unwrap();
        store
            .write_jump_start_entities(vec![JumpStartEntity::new(
                state("A", "1", OrchestrationStatus::Pending, 5),
                5,
            )])
            .await
            .unwrap();

        let result = store.get_orchestration_state("A", false).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].status, OrchestrationStatus::Running);
    }

    #[tokio::test]
    async fn jump_start_only_instance_is_visible() {
        let store = store();
        store
            .write_jump_start_entities(vec![JumpStartEntity::new(
                state("B", "1", OrchestrationStatus::Pending, 5),
                5,
            )])
            .await
            .unwrap();

        let result = store.get_orchestration_state("B", false).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].status, OrchestrationStatus::Pending);
        assert_eq!(result[0].instance_id(), "B");
    }

    #[tokio::test]
    async fn exact_lookup_miss_is_none() {
        let store = store();
        assert!(store
            .get_orchestration_state_by_execution("C", "2")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn history_is_sorted_by_sequence_number() {
        let store = store();
        let inst = OrchestrationInstance::new("h", "1");
        let entities: Vec<InstanceEntity> = [5u64, 1, 3, 2, 4]
            .into_iter()
            .map(|seq| HistoryEntity::new(&inst, seq, seq * 10, HistoryEvent::TimerCreated { fire_at: seq }).into())
            .collect();
        store.write_entities(entities).await.unwrap();

        let events = store.get_orchestration_history_events("h", "1").await.unwrap();
        let seqs: Vec<u64> = events.iter().map(|e| e.sequence_number).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn initialize_with_recreate_drops_existing_data() {
        let store = store();
        store
            .write_entities(vec![InstanceEntity::State(
                state("A", "1", OrchestrationStatus::Running, 10).into(),
            )])
            .await
            .unwrap();

        store.initialize_store(true).await.unwrap();
        assert!(store.get_entities("A", "1").await.unwrap().is_empty());
        assert_eq!(store.max_history_entry_length(), usize::MAX);
    }
}
