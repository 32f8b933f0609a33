#![allow(dead_code)]

pub mod fault_injection;
pub mod tracing_capture;

use duroxide_instance_store::providers::in_memory::InMemoryStorageClient;
use duroxide_instance_store::providers::sqlite::SqliteStorageClient;
use duroxide_instance_store::providers::StorageClient;
use duroxide_instance_store::{
    HistoryEntity, HistoryEvent, InstanceStore, JumpStartEntity, OrchestrationInstance, OrchestrationState,
    OrchestrationStatus,
};
use std::sync::Arc;
use tempfile::TempDir;

pub fn in_memory_store() -> (InstanceStore, Arc<InMemoryStorageClient>) {
    let client = Arc::new(InMemoryStorageClient::new());
    (InstanceStore::new(client.clone()), client)
}

pub async fn create_sqlite_client_disk() -> (Arc<dyn StorageClient>, TempDir) {
    let td = tempfile::tempdir().unwrap();
    let db_path = td.path().join("test.db");
    std::fs::File::create(&db_path).unwrap();
    let db_url = format!("sqlite:{}", db_path.display());
    let client = SqliteStorageClient::new(&db_url, None).await.unwrap();
    client.create_store_if_not_exists().await.unwrap();
    (Arc::new(client) as Arc<dyn StorageClient>, td)
}

pub async fn create_sqlite_client_memory() -> Arc<dyn StorageClient> {
    let client = SqliteStorageClient::new_in_memory().await.unwrap();
    client.create_store_if_not_exists().await.unwrap();
    Arc::new(client)
}

pub fn state(instance_id: &str, execution_id: &str, status: OrchestrationStatus, updated: u64) -> OrchestrationState {
    let mut s = OrchestrationState::new(
        OrchestrationInstance::new(instance_id, execution_id),
        "TestOrch",
        status,
        updated,
    );
    s.last_updated_time = updated;
    if status.is_terminal() {
        s.completed_time = Some(updated);
    }
    s
}

pub fn jump_start(instance_id: &str, execution_id: &str, registered_at: u64) -> JumpStartEntity {
    JumpStartEntity::new(
        state(instance_id, execution_id, OrchestrationStatus::Pending, registered_at),
        registered_at,
    )
}

/// One `ExecutionStarted` row at `timestamp`, sequence number 1.
pub fn started_event(instance_id: &str, execution_id: &str, timestamp: u64) -> HistoryEntity {
    HistoryEntity::new(
        &OrchestrationInstance::new(instance_id, execution_id),
        1,
        timestamp,
        HistoryEvent::ExecutionStarted {
            name: "TestOrch".to_string(),
            version: None,
            input: None,
        },
    )
}
