use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

use super::{StorageClient, StoreError};
use crate::query::{paginate, OrchestrationStateQuery, QuerySegment, TimeRangeFilterType};
use crate::{HistoryEntity, JumpStartEntity, OrchestrationState, StateEntity};

type Key = (String, String);

fn key(instance_id: &str, execution_id: &str) -> Key {
    (instance_id.to_string(), execution_id.to_string())
}

struct Tables {
    exists: bool,
    // Ordered by (instance_id, execution_id) so queries page deterministically.
    state: BTreeMap<Key, OrchestrationState>,
    jump_start: BTreeMap<Key, JumpStartEntity>,
    // Rows kept in arrival order; readers must sort.
    history: HashMap<Key, Vec<HistoryEntity>>,
}

/// In-memory storage client.
///
/// The store exists from construction; `delete_store_if_exists` drops all
/// tables and every later call fails with `Unavailable` until
/// `create_store_if_not_exists` runs again.
pub struct InMemoryStorageClient {
    inner: Mutex<Tables>,
}

impl Default for InMemoryStorageClient {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorageClient {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Tables {
                exists: true,
                state: BTreeMap::new(),
                jump_start: BTreeMap::new(),
                history: HashMap::new(),
            }),
        }
    }

    /// Total history rows across all partitions (test utility).
    pub async fn history_row_count(&self) -> usize {
        self.inner.lock().await.history.values().map(Vec::len).sum()
    }

    /// Return a pretty-printed dump of all tables (test utility).
    pub async fn dump_all_pretty(&self) -> String {
        let g = self.inner.lock().await;
        let mut out = String::new();
        for ((inst, exec), state) in g.state.iter() {
            out.push_str(&format!("state {inst}#{exec} = {:?}\n", state.status));
        }
        for ((inst, exec), js) in g.jump_start.iter() {
            out.push_str(&format!("jump_start {inst}#{exec} = {:?} @ {}\n", js.state.status, js.jump_start_time));
        }
        for ((inst, exec), rows) in g.history.iter() {
            out.push_str(&format!("history {inst}#{exec}\n"));
            for r in rows {
                out.push_str(&format!("  {} {:?}\n", r.sequence_number, r.event));
            }
        }
        out
    }

    fn ensure_exists(tables: &Tables, operation: &str) -> Result<(), StoreError> {
        if tables.exists {
            Ok(())
        } else {
            Err(StoreError::unavailable(operation, "store does not exist"))
        }
    }

    fn partition_time(rows: &[HistoryEntity], mode: TimeRangeFilterType) -> Option<u64> {
        match mode {
            TimeRangeFilterType::CreatedTime => rows.iter().map(|r| r.event_timestamp).min(),
            TimeRangeFilterType::LastUpdatedTime => rows.iter().map(|r| r.event_timestamp).max(),
            TimeRangeFilterType::CompletedTime => rows
                .iter()
                .filter(|r| r.event.is_terminal())
                .map(|r| r.event_timestamp)
                .max(),
        }
    }
}

#[async_trait::async_trait]
impl StorageClient for InMemoryStorageClient {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn create_store_if_not_exists(&self) -> Result<(), StoreError> {
        self.inner.lock().await.exists = true;
        Ok(())
    }

    async fn delete_store_if_exists(&self) -> Result<(), StoreError> {
        let mut g = self.inner.lock().await;
        g.exists = false;
        g.state.clear();
        g.jump_start.clear();
        g.history.clear();
        Ok(())
    }

    async fn write_history(&self, entities: Vec<HistoryEntity>) -> Result<(), StoreError> {
        let mut g = self.inner.lock().await;
        Self::ensure_exists(&g, "write_history")?;
        for entity in entities {
            let rows = g
                .history
                .entry(key(&entity.instance_id, &entity.execution_id))
                .or_default();
            match rows.iter_mut().find(|r| r.sequence_number == entity.sequence_number) {
                Some(existing) => *existing = entity,
                None => rows.push(entity),
            }
        }
        Ok(())
    }

    async fn delete_history(&self, entities: Vec<HistoryEntity>) -> Result<(), StoreError> {
        let mut g = self.inner.lock().await;
        Self::ensure_exists(&g, "delete_history")?;
        for entity in entities {
            let k = key(&entity.instance_id, &entity.execution_id);
            if let Some(rows) = g.history.get_mut(&k) {
                rows.retain(|r| r.sequence_number != entity.sequence_number);
                if rows.is_empty() {
                    g.history.remove(&k);
                }
            }
        }
        Ok(())
    }

    async fn read_history(&self, instance_id: &str, execution_id: &str) -> Result<Vec<HistoryEntity>, StoreError> {
        let g = self.inner.lock().await;
        Self::ensure_exists(&g, "read_history")?;
        Ok(g.history.get(&key(instance_id, execution_id)).cloned().unwrap_or_default())
    }

    async fn write_state(&self, entities: Vec<StateEntity>) -> Result<(), StoreError> {
        let mut g = self.inner.lock().await;
        Self::ensure_exists(&g, "write_state")?;
        for entity in entities {
            let k = key(entity.state.instance_id(), entity.state.execution_id());
            g.state.insert(k, entity.state);
        }
        Ok(())
    }

    async fn delete_state(&self, entities: Vec<StateEntity>) -> Result<(), StoreError> {
        let mut g = self.inner.lock().await;
        Self::ensure_exists(&g, "delete_state")?;
        for entity in entities {
            g.state.remove(&key(entity.state.instance_id(), entity.state.execution_id()));
        }
        Ok(())
    }

    async fn read_state(&self, instance_id: &str, execution_id: &str) -> Result<Vec<StateEntity>, StoreError> {
        let g = self.inner.lock().await;
        Self::ensure_exists(&g, "read_state")?;
        Ok(g
            .state
            .get(&key(instance_id, execution_id))
            .cloned()
            .map(StateEntity::from)
            .into_iter()
            .collect())
    }

    async fn query_state(
        &self,
        query: &OrchestrationStateQuery,
        continuation_token: Option<&str>,
    ) -> Result<QuerySegment<StateEntity>, StoreError> {
        query.validate("query_state")?;
        let g = self.inner.lock().await;
        Self::ensure_exists(&g, "query_state")?;
        let matches: Vec<StateEntity> = g
            .state
            .values()
            .filter(|s| query.matches(s))
            .cloned()
            .map(StateEntity::from)
            .collect();
        paginate("query_state", matches, query.top, continuation_token)
    }

    async fn write_jump_start(&self, entities: Vec<JumpStartEntity>) -> Result<(), StoreError> {
        let mut g = self.inner.lock().await;
        Self::ensure_exists(&g, "write_jump_start")?;
        for entity in entities {
            let k = key(entity.state.instance_id(), entity.state.execution_id());
            g.jump_start.insert(k, entity);
        }
        Ok(())
    }

    async fn delete_jump_start(&self, entities: Vec<JumpStartEntity>) -> Result<(), StoreError> {
        let mut g = self.inner.lock().await;
        Self::ensure_exists(&g, "delete_jump_start")?;
        for entity in entities {
            g.jump_start
                .remove(&key(entity.state.instance_id(), entity.state.execution_id()));
        }
        Ok(())
    }

    async fn query_jump_start(
        &self,
        query: &OrchestrationStateQuery,
        continuation_token: Option<&str>,
    ) -> Result<QuerySegment<JumpStartEntity>, StoreError> {
        query.validate("query_jump_start")?;
        let g = self.inner.lock().await;
        Self::ensure_exists(&g, "query_jump_start")?;
        let matches: Vec<JumpStartEntity> = g
            .jump_start
            .values()
            .filter(|js| query.matches(&js.state))
            .cloned()
            .collect();
        paginate("query_jump_start", matches, query.top, continuation_token)
    }

    async fn query_jump_start_window(&self, from: u64, to: u64, top: u32) -> Result<Vec<JumpStartEntity>, StoreError> {
        let g = self.inner.lock().await;
        Self::ensure_exists(&g, "query_jump_start_window")?;
        let mut rows: Vec<JumpStartEntity> = g
            .jump_start
            .values()
            .filter(|js| js.jump_start_time >= from && js.jump_start_time <= to)
            .cloned()
            .collect();
        rows.sort_by_key(|js| js.jump_start_time);
        rows.truncate(top as usize);
        Ok(rows)
    }

    async fn purge_history(&self, threshold: u64, mode: TimeRangeFilterType) -> Result<u64, StoreError> {
        let mut g = self.inner.lock().await;
        Self::ensure_exists(&g, "purge_history")?;
        let expired: Vec<Key> = g
            .history
            .iter()
            .filter(|(_, rows)| Self::partition_time(rows, mode).is_some_and(|t| t < threshold))
            .map(|(k, _)| k.clone())
            .collect();

        let mut removed = 0u64;
        for k in expired {
            if let Some(rows) = g.history.remove(&k) {
                removed += rows.len() as u64;
            }
        }
        tracing::debug!(
            target: "duroxide::providers::in_memory",
            threshold,
            ?mode,
            removed,
            "purged history"
        );
        Ok(removed)
    }
}
