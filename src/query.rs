//! Query filters over orchestration state.
//!
//! A query is a conjunction of optional predicates. Storage clients evaluate
//! it; the instance store hands the same query object to the primary and the
//! jump-start store.

use crate::providers::StoreError;
use crate::{OrchestrationState, OrchestrationStatus};

/// Which timestamp of an execution a time comparison looks at.
///
/// Also used as the purge comparison mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeRangeFilterType {
    CreatedTime,
    CompletedTime,
    LastUpdatedTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceFilter {
    /// Exact instance id, optionally pinned to one execution.
    Exact {
        instance_id: String,
        execution_id: Option<String>,
    },
    /// Instance ids starting with a prefix. Cannot be combined with an execution id.
    Prefix { prefix: String, execution_id: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameFilter {
    pub name: String,
    pub version: Option<String>,
}

/// Inclusive `[start, end]` window, milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRangeFilter {
    pub start: u64,
    pub end: u64,
    pub filter_type: TimeRangeFilterType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrchestrationStateQuery {
    pub instance: Option<InstanceFilter>,
    pub name: Option<NameFilter>,
    pub status: Option<OrchestrationStatus>,
    pub time_range: Option<TimeRangeFilter>,
    /// Page size; `None` returns every match in one segment.
    pub top: Option<u32>,
}

impl OrchestrationStateQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instance(mut self, instance_id: impl Into<String>) -> Self {
        self.instance = Some(InstanceFilter::Exact {
            instance_id: instance_id.into(),
            execution_id: None,
        });
        self
    }

    pub fn with_instance_execution(mut self, instance_id: impl Into<String>, execution_id: impl Into<String>) -> Self {
        self.instance = Some(InstanceFilter::Exact {
            instance_id: instance_id.into(),
            execution_id: Some(execution_id.into()),
        });
        self
    }

    pub fn with_instance_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.instance = Some(InstanceFilter::Prefix {
            prefix: prefix.into(),
            execution_id: None,
        });
        self
    }

    pub fn with_name(mut self, name: impl Into<String>, version: Option<String>) -> Self {
        self.name = Some(NameFilter {
            name: name.into(),
            version,
        });
        self
    }

    pub fn with_status(mut self, status: OrchestrationStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_time_range(mut self, start: u64, end: u64, filter_type: TimeRangeFilterType) -> Self {
        self.time_range = Some(TimeRangeFilter { start, end, filter_type });
        self
    }

    pub fn with_top(mut self, top: u32) -> Self {
        self.top = Some(top);
        self
    }

    /// Reject filters no storage client can evaluate.
    ///
    /// Called by storage clients, not by the instance store.
    pub fn validate(&self, operation: &str) -> Result<(), StoreError> {
        if let Some(InstanceFilter::Prefix {
            execution_id: Some(execution_id),
            prefix,
        }) = &self.instance
        {
            return Err(StoreError::malformed_filter(
                operation,
                format!("instance prefix '{prefix}' cannot be combined with execution id '{execution_id}'"),
            ));
        }
        if let Some(range) = &self.time_range {
            if range.start > range.end {
                return Err(StoreError::malformed_filter(
                    operation,
                    format!("time range start {} is after end {}", range.start, range.end),
                ));
            }
        }
        if self.top == Some(0) {
            return Err(StoreError::malformed_filter(operation, "top must be greater than zero"));
        }
        Ok(())
    }

    /// Evaluate the filter against one state in memory.
    pub fn matches(&self, state: &OrchestrationState) -> bool {
        let instance_ok = match &self.instance {
            None => true,
            Some(InstanceFilter::Exact {
                instance_id,
                execution_id,
            }) => {
                state.instance_id() == instance_id
                    && execution_id.as_deref().is_none_or(|e| state.execution_id() == e)
            }
            Some(InstanceFilter::Prefix { prefix, execution_id }) => {
                state.instance_id().starts_with(prefix.as_str())
                    && execution_id.as_deref().is_none_or(|e| state.execution_id() == e)
            }
        };
        let name_ok = self.name.as_ref().is_none_or(|f| {
            state.name == f.name && f.version.as_ref().is_none_or(|v| state.version.as_ref() == Some(v))
        });
        let status_ok = self.status.is_none_or(|s| state.status == s);
        let time_ok = self.time_range.is_none_or(|range| {
            state
                .time_for(range.filter_type)
                .is_some_and(|t| t >= range.start && t <= range.end)
        });
        instance_ok && name_ok && status_ok && time_ok
    }
}

/// One page of query results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySegment<T> {
    pub results: Vec<T>,
    /// Opaque token for the next page; `None` when exhausted.
    pub continuation_token: Option<String>,
}

impl<T> QuerySegment<T> {
    pub fn empty() -> Self {
        Self {
            results: Vec::new(),
            continuation_token: None,
        }
    }
}

impl<T> Default for QuerySegment<T> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Offset-encoded continuation tokens shared by the shipped clients.
pub(crate) fn decode_offset_token(operation: &str, token: Option<&str>) -> Result<usize, StoreError> {
    match token {
        None => Ok(0),
        Some(t) => t
            .strip_prefix("offset:")
            .and_then(|n| n.parse::<usize>().ok())
            .ok_or_else(|| StoreError::malformed_filter(operation, format!("invalid continuation token: {t}"))),
    }
}

pub(crate) fn encode_offset_token(offset: usize) -> String {
    format!("offset:{offset}")
}

/// Slice `items` into the page described by `query.top` and `token`.
pub(crate) fn paginate<T>(
    operation: &str,
    items: Vec<T>,
    top: Option<u32>,
    token: Option<&str>,
) -> Result<QuerySegment<T>, StoreError> {
    let offset = decode_offset_token(operation, token)?;
    let total = items.len();
    let page: Vec<T> = match top {
        Some(top) => items.into_iter().skip(offset).take(top as usize).collect(),
        None => items.into_iter().skip(offset).collect(),
    };
    let next = offset + page.len();
    let continuation_token = if top.is_some() && next < total {
        Some(encode_offset_token(next))
    } else {
        None
    };
    Ok(QuerySegment {
        results: page,
        continuation_token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OrchestrationInstance;

    fn state(id: &str, exec: &str, status: OrchestrationStatus, created: u64) -> OrchestrationState {
        let mut s = OrchestrationState::new(OrchestrationInstance::new(id, exec), "Orch", status, created);
        s.version = Some("1.0.0".to_string());
        s
    }

    #[test]
    fn empty_query_matches_everything() {
        let q = OrchestrationStateQuery::new();
        assert!(q.matches(&state("a", "1", OrchestrationStatus::Running, 5)));
        assert!(q.validate("test").is_ok());
    }

    #[test]
    fn predicates_are_conjunctive() {
        let q = OrchestrationStateQuery::new()
            .with_instance("a")
            .with_status(OrchestrationStatus::Completed);
        assert!(q.matches(&state("a", "1", OrchestrationStatus::Completed, 5)));
        assert!(!q.matches(&state("a", "1", OrchestrationStatus::Running, 5)));
        assert!(!q.matches(&state("b", "1", OrchestrationStatus::Completed, 5)));

        let q = OrchestrationStateQuery::new().with_instance_execution("a", "2");
        assert!(q.matches(&state("a", "2", OrchestrationStatus::Running, 5)));
        assert!(!q.matches(&state("a", "1", OrchestrationStatus::Running, 5)));

        let q = OrchestrationStateQuery::new().with_instance_prefix("ord-");
        assert!(q.matches(&state("ord-1", "1", OrchestrationStatus::Running, 5)));
        assert!(!q.matches(&state("inv-1", "1", OrchestrationStatus::Running, 5)));

        let q = OrchestrationStateQuery::new().with_name("Orch", Some("2.0.0".to_string()));
        assert!(!q.matches(&state("a", "1", OrchestrationStatus::Running, 5)));
    }

    #[test]
    fn time_range_uses_selected_timestamp() {
        let mut s = state("a", "1", OrchestrationStatus::Running, 100);
        let q = OrchestrationStateQuery::new().with_time_range(50, 150, TimeRangeFilterType::CreatedTime);
        assert!(q.matches(&s));

        // Not completed yet: a completed-time window never matches
        let q = OrchestrationStateQuery::new().with_time_range(0, u64::MAX, TimeRangeFilterType::CompletedTime);
        assert!(!q.matches(&s));
        s.completed_time = Some(120);
        assert!(q.matches(&s));
    }

    #[test]
    fn malformed_filters_are_rejected() {
        let q = OrchestrationStateQuery::new().with_time_range(10, 5, TimeRangeFilterType::CreatedTime);
        assert!(q.validate("query_state").unwrap_err().is_malformed_filter());

        let mut q = OrchestrationStateQuery::new();
        q.instance = Some(InstanceFilter::Prefix {
            prefix: "a".to_string(),
            execution_id: Some("1".to_string()),
        });
        assert!(q.validate("query_state").unwrap_err().is_malformed_filter());

        let q = OrchestrationStateQuery::new().with_top(0);
        assert!(q.validate("query_state").is_err());
    }

    #[test]
    fn pagination_walks_all_items() {
        let items: Vec<u32> = (0..5).collect();
        let first = paginate("q", items.clone(), Some(2), None).unwrap();
        assert_eq!(first.results, vec![0, 1]);
        let second = paginate("q", items.clone(), Some(2), first.continuation_token.as_deref()).unwrap();
        assert_eq!(second.results, vec![2, 3]);
        let third = paginate("q", items.clone(), Some(2), second.continuation_token.as_deref()).unwrap();
        assert_eq!(third.results, vec![4]);
        assert!(third.continuation_token.is_none());

        let all = paginate("q", items.clone(), None, None).unwrap();
        assert_eq!(all.results.len(), 5);
        assert!(all.continuation_token.is_none());

        assert!(paginate("q", items, Some(2), Some("garbage")).unwrap_err().is_malformed_filter());
    }
}
