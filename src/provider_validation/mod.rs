//! Storage Client Validation Tests
//!
//! Test suite for validating storage client implementations. Every test
//! works against any client through the `StorageClientFactory` trait.

pub mod history;
pub mod jump_start;
pub mod purge;
pub mod query;
pub mod state;

pub use crate::provider_validations::StorageClientFactory;
pub use crate::{
    HistoryEntity, HistoryEvent, JumpStartEntity, OrchestrationInstance, OrchestrationState, OrchestrationStatus,
    StateEntity,
};

/// State row with `created_time == last_updated_time == time`.
pub(crate) fn state_at(instance_id: &str, execution_id: &str, status: OrchestrationStatus, time: u64) -> OrchestrationState {
    OrchestrationState::new(OrchestrationInstance::new(instance_id, execution_id), "TestOrch", status, time)
}

/// Completed state row.
pub(crate) fn completed_state(instance_id: &str, execution_id: &str, created: u64, completed: u64) -> OrchestrationState {
    let mut state = state_at(instance_id, execution_id, OrchestrationStatus::Completed, created);
    state.last_updated_time = completed;
    state.completed_time = Some(completed);
    state.output = Some("\"done\"".to_string());
    state
}

/// `count` history rows for one partition, sequence numbers `1..=count`,
/// timestamps `start, start + 1, ...`. The last row is terminal when
/// `completed` is set.
pub(crate) fn history_partition(
    instance_id: &str,
    execution_id: &str,
    start: u64,
    count: u64,
    completed: bool,
) -> Vec<HistoryEntity> {
    let inst = OrchestrationInstance::new(instance_id, execution_id);
    (1..=count)
        .map(|seq| {
            let event = if seq == 1 {
                HistoryEvent::ExecutionStarted {
                    name: "TestOrch".to_string(),
                    version: None,
                    input: None,
                }
            } else if completed && seq == count {
                HistoryEvent::ExecutionCompleted {
                    status: OrchestrationStatus::Completed,
                    result: None,
                }
            } else {
                HistoryEvent::TaskScheduled {
                    name: format!("Activity{seq}"),
                    input: None,
                }
            };
            HistoryEntity::new(&inst, seq, start + seq - 1, event)
        })
        .collect()
}

pub(crate) fn instance_ids(states: &[OrchestrationState]) -> Vec<String> {
    states.iter().map(|s| s.instance.to_string()).collect()
}
