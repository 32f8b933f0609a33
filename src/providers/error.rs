/// Storage client error with a failure classification
///
/// Storage clients return this error for every failed operation. The instance
/// store never wraps or swallows it; callers see exactly what the client
/// reported.
///
/// # Error Classification
///
/// **Unavailable (is_retryable = true)**:
/// - Database busy/locked
/// - Connection timeouts
/// - Network failures
///
/// **MalformedFilter (is_retryable = false)**:
/// - Time range with start after end
/// - Instance prefix combined with an execution id
/// - Undecodable continuation token
///
/// **Corrupted (is_retryable = false)**:
/// - Stored payload that no longer deserializes
///
/// **InvalidConfiguration (is_retryable = false)**:
/// - Client options rejected at construction (e.g. table names)
///
/// # Example Usage
///
/// ```rust
/// use duroxide_instance_store::providers::StoreError;
///
/// let busy = StoreError::unavailable("query_state", "database is locked");
/// assert!(busy.is_retryable());
///
/// let bad = StoreError::malformed_filter("query_state", "start after end");
/// assert!(!bad.is_retryable());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    /// Operation that failed (e.g., "write_state", "query_jump_start")
    pub operation: String,
    /// Human-readable error message
    pub message: String,
    pub kind: StoreErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// Backend could not serve the request (connectivity, timeout, busy).
    Unavailable,
    /// The query filter was rejected.
    MalformedFilter,
    /// Stored data is invalid.
    Corrupted,
    /// Client options were rejected before touching storage.
    InvalidConfiguration,
}

impl StoreErrorKind {
    /// Label used for the `error_type` metric attribute.
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreErrorKind::Unavailable => "unavailable",
            StoreErrorKind::MalformedFilter => "malformed_filter",
            StoreErrorKind::Corrupted => "corrupted",
            StoreErrorKind::InvalidConfiguration => "invalid_configuration",
        }
    }
}

impl StoreError {
    pub fn unavailable(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Unavailable, operation, message)
    }

    pub fn malformed_filter(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::MalformedFilter, operation, message)
    }

    pub fn corrupted(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Corrupted, operation, message)
    }

    pub fn invalid_configuration(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::InvalidConfiguration, operation, message)
    }

    fn new(kind: StoreErrorKind, operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
            kind,
        }
    }

    /// Only backend unavailability is worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.kind == StoreErrorKind::Unavailable
    }

    pub fn is_malformed_filter(&self) -> bool {
        self.kind == StoreErrorKind::MalformedFilter
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.operation, self.message)
    }
}

impl std::error::Error for StoreError {}

/// String errors are treated as store unavailability.
impl From<String> for StoreError {
    fn from(s: String) -> Self {
        Self::unavailable("unknown", s)
    }
}

impl From<&str> for StoreError {
    fn from(s: &str) -> Self {
        s.to_string().into()
    }
}
