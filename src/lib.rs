//! Instance state and history store for durable orchestrations.
//!
//! The orchestration runtime writes history events and state snapshots as it
//! executes; management callers query instance status and purge old history.
//! [`InstanceStore`] sits on top of a pluggable [`providers::StorageClient`] and
//! treats two independent stores as one namespace:
//!
//! - the primary **state** store, one row per `(instance_id, execution_id)`;
//! - the **jump-start** store, provisional state for instances that were
//!   scheduled but are not yet durably committed to the primary store.
//!
//! A primary row always wins over a jump-start row for the same instance.
//!
//! ```rust,no_run
//! use duroxide_instance_store::providers::in_memory::InMemoryStorageClient;
//! use duroxide_instance_store::InstanceStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), duroxide_instance_store::providers::StoreError> {
//! let store = InstanceStore::new(Arc::new(InMemoryStorageClient::new()));
//! store.initialize_store(false).await?;
//! let states = store.get_orchestration_state("order-42", false).await?;
//! # let _ = states;
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub mod instance_store;
pub mod logging;
pub mod metrics;
pub mod providers;
pub mod query;

#[cfg(feature = "provider-test")]
pub mod provider_validation;
#[cfg(feature = "provider-test")]
pub mod provider_validations;

pub use instance_store::{InstanceStore, InstanceStoreOptions, StateQueryContinuation, StateQuerySegment, StateSelection};
pub use query::{InstanceFilter, NameFilter, OrchestrationStateQuery, QuerySegment, TimeRangeFilter, TimeRangeFilterType};

/// Trailing window for [`InstanceStore::get_jump_start_entities`].
pub const JUMP_START_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Identity of one execution (generation) of an orchestration instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrchestrationInstance {
    pub instance_id: String,
    pub execution_id: String,
}

impl OrchestrationInstance {
    pub fn new(instance_id: impl Into<String>, execution_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            execution_id: execution_id.into(),
        }
    }
}

impl fmt::Display for OrchestrationInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.instance_id, self.execution_id)
    }
}

/// Status of a single execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrchestrationStatus {
    Pending,
    Running,
    Completed,
    /// Terminal for this generation; a successor execution exists.
    ContinuedAsNew,
    Failed,
    Canceled,
    Terminated,
}

impl OrchestrationStatus {
    pub const ALL: [OrchestrationStatus; 7] = [
        OrchestrationStatus::Pending,
        OrchestrationStatus::Running,
        OrchestrationStatus::Completed,
        OrchestrationStatus::ContinuedAsNew,
        OrchestrationStatus::Failed,
        OrchestrationStatus::Canceled,
        OrchestrationStatus::Terminated,
    ];

    /// Stable string form used by storage clients and filters.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrchestrationStatus::Pending => "Pending",
            OrchestrationStatus::Running => "Running",
            OrchestrationStatus::Completed => "Completed",
            OrchestrationStatus::ContinuedAsNew => "ContinuedAsNew",
            OrchestrationStatus::Failed => "Failed",
            OrchestrationStatus::Canceled => "Canceled",
            OrchestrationStatus::Terminated => "Terminated",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrchestrationStatus::Pending | OrchestrationStatus::Running)
    }
}

impl fmt::Display for OrchestrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrchestrationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrchestrationStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown orchestration status: {s}"))
    }
}

/// Snapshot of one execution's state.
///
/// Timestamps are milliseconds since the Unix epoch (UTC).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestrationState {
    pub instance: OrchestrationInstance,
    pub name: String,
    pub version: Option<String>,
    pub status: OrchestrationStatus,
    pub input: Option<String>,
    pub output: Option<String>,
    pub custom_status: Option<String>,
    pub parent_instance: Option<OrchestrationInstance>,
    pub created_time: u64,
    pub last_updated_time: u64,
    pub completed_time: Option<u64>,
}

impl OrchestrationState {
    /// New state stamped with the same created/updated time.
    pub fn new(
        instance: OrchestrationInstance,
        name: impl Into<String>,
        status: OrchestrationStatus,
        created_time: u64,
    ) -> Self {
        Self {
            instance,
            name: name.into(),
            version: None,
            status,
            input: None,
            output: None,
            custom_status: None,
            parent_instance: None,
            created_time,
            last_updated_time: created_time,
            completed_time: None,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance.instance_id
    }

    pub fn execution_id(&self) -> &str {
        &self.instance.execution_id
    }

    /// Timestamp compared by a time-range filter of the given kind.
    pub fn time_for(&self, filter_type: TimeRangeFilterType) -> Option<u64> {
        match filter_type {
            TimeRangeFilterType::CreatedTime => Some(self.created_time),
            TimeRangeFilterType::CompletedTime => self.completed_time,
            TimeRangeFilterType::LastUpdatedTime => Some(self.last_updated_time),
        }
    }
}

/// One event in an execution's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HistoryEvent {
    ExecutionStarted {
        name: String,
        version: Option<String>,
        input: Option<String>,
    },
    TaskScheduled {
        name: String,
        input: Option<String>,
    },
    TaskCompleted {
        scheduled_id: u64,
        result: Option<String>,
    },
    TaskFailed {
        scheduled_id: u64,
        reason: String,
    },
    TimerCreated {
        fire_at: u64,
    },
    TimerFired {
        timer_id: u64,
        fire_at: u64,
    },
    EventRaised {
        name: String,
        input: Option<String>,
    },
    ExecutionCompleted {
        status: OrchestrationStatus,
        result: Option<String>,
    },
    ContinuedAsNew {
        input: Option<String>,
    },
}

impl HistoryEvent {
    /// Stable discriminator stored next to the serialized payload.
    pub fn event_type(&self) -> &'static str {
        match self {
            HistoryEvent::ExecutionStarted { .. } => "ExecutionStarted",
            HistoryEvent::TaskScheduled { .. } => "TaskScheduled",
            HistoryEvent::TaskCompleted { .. } => "TaskCompleted",
            HistoryEvent::TaskFailed { .. } => "TaskFailed",
            HistoryEvent::TimerCreated { .. } => "TimerCreated",
            HistoryEvent::TimerFired { .. } => "TimerFired",
            HistoryEvent::EventRaised { .. } => "EventRaised",
            HistoryEvent::ExecutionCompleted { .. } => "ExecutionCompleted",
            HistoryEvent::ContinuedAsNew { .. } => "ContinuedAsNew",
        }
    }

    /// True for events that close an execution.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HistoryEvent::ExecutionCompleted { .. } | HistoryEvent::ContinuedAsNew { .. }
        )
    }
}

/// Stored form of one history event, keyed by partition and sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntity {
    pub instance_id: String,
    pub execution_id: String,
    pub sequence_number: u64,
    pub event_timestamp: u64,
    pub event: HistoryEvent,
}

impl HistoryEntity {
    pub fn new(instance: &OrchestrationInstance, sequence_number: u64, event_timestamp: u64, event: HistoryEvent) -> Self {
        Self {
            instance_id: instance.instance_id.clone(),
            execution_id: instance.execution_id.clone(),
            sequence_number,
            event_timestamp,
            event,
        }
    }

    pub fn instance(&self) -> OrchestrationInstance {
        OrchestrationInstance::new(self.instance_id.clone(), self.execution_id.clone())
    }
}

/// Stored form of an execution's state in the primary store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntity {
    pub state: OrchestrationState,
}

impl StateEntity {
    pub fn instance_id(&self) -> &str {
        self.state.instance_id()
    }

    pub fn into_state(self) -> OrchestrationState {
        self.state
    }
}

impl From<OrchestrationState> for StateEntity {
    fn from(state: OrchestrationState) -> Self {
        Self { state }
    }
}

impl From<JumpStartEntity> for StateEntity {
    fn from(entity: JumpStartEntity) -> Self {
        Self { state: entity.state }
    }
}

/// Provisional state for an instance not yet committed to the primary store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JumpStartEntity {
    pub state: OrchestrationState,
    /// When the entry was registered; drives the trailing-window read.
    pub jump_start_time: u64,
}

impl JumpStartEntity {
    pub fn new(state: OrchestrationState, jump_start_time: u64) -> Self {
        Self { state, jump_start_time }
    }

    pub fn instance_id(&self) -> &str {
        self.state.instance_id()
    }
}

/// A single entity in a heterogeneous write or delete batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceEntity {
    History(HistoryEntity),
    State(StateEntity),
    JumpStart(JumpStartEntity),
}

impl From<HistoryEntity> for InstanceEntity {
    fn from(entity: HistoryEntity) -> Self {
        InstanceEntity::History(entity)
    }
}

impl From<StateEntity> for InstanceEntity {
    fn from(entity: StateEntity) -> Self {
        InstanceEntity::State(entity)
    }
}

impl From<JumpStartEntity> for InstanceEntity {
    fn from(entity: JumpStartEntity) -> Self {
        InstanceEntity::JumpStart(entity)
    }
}

/// Entities grouped by kind, ready for per-kind dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityBatch {
    pub history: Vec<HistoryEntity>,
    pub states: Vec<StateEntity>,
    pub jump_starts: Vec<JumpStartEntity>,
}

impl EntityBatch {
    pub fn is_empty(&self) -> bool {
        self.history.is_empty() && self.states.is_empty() && self.jump_starts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.history.len() + self.states.len() + self.jump_starts.len()
    }
}

impl FromIterator<InstanceEntity> for EntityBatch {
    fn from_iter<I: IntoIterator<Item = InstanceEntity>>(iter: I) -> Self {
        let mut batch = EntityBatch::default();
        for entity in iter {
            match entity {
                InstanceEntity::History(e) => batch.history.push(e),
                InstanceEntity::State(e) => batch.states.push(e),
                InstanceEntity::JumpStart(e) => batch.jump_starts.push(e),
            }
        }
        batch
    }
}
