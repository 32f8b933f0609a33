//! Captures `tracing` events so tests can assert on what the store logs.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::{dispatcher, Dispatch, Event, Level, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::prelude::*;

#[derive(Debug, Clone)]
pub struct LogRecord {
    pub level: Level,
    pub target: String,
    pub message: String,
    pub fields: BTreeMap<String, String>,
}

impl LogRecord {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(|v| v.trim_matches('"'))
    }

    pub fn field_u64(&self, key: &str) -> Option<u64> {
        self.field(key).and_then(|v| v.parse().ok())
    }
}

#[derive(Clone, Default)]
pub struct LogSink {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl LogSink {
    /// Records emitted under `target`, in order.
    pub fn for_target(&self, target: &str) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.target == target)
            .cloned()
            .collect()
    }

    pub fn with_message(&self, target: &str, message: &str) -> Option<LogRecord> {
        self.for_target(target).into_iter().find(|r| r.message == message)
    }
}

struct FieldRecorder<'a>(&'a mut BTreeMap<String, String>);

impl Visit for FieldRecorder<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}"));
    }
}

impl<S: Subscriber> Layer<S> for LogSink {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = BTreeMap::new();
        event.record(&mut FieldRecorder(&mut fields));
        let message = fields.remove("message").unwrap_or_default();
        let meta = event.metadata();
        self.records.lock().unwrap().push(LogRecord {
            level: *meta.level(),
            target: meta.target().to_string(),
            message,
            fields,
        });
    }
}

/// Install a thread-local subscriber recording every event.
///
/// Hold the guard for the duration of the test; `#[tokio::test]` runs on the
/// current thread, so the store's events land in the sink.
pub fn capture_logs() -> (LogSink, dispatcher::DefaultGuard) {
    let sink = LogSink::default();
    let subscriber = tracing_subscriber::registry()
        .with(sink.clone())
        .with(LevelFilter::TRACE);
    let guard = dispatcher::set_default(&Dispatch::new(subscriber));
    (sink, guard)
}
