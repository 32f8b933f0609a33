//! OpenTelemetry instruments for storage client calls.
//!
//! [`StoreMetrics`] owns a meter provider and records:
//! - `duroxide_provider_operation_duration_seconds` (histogram, labels
//!   `operation` and `status`)
//! - `duroxide_provider_errors_total` (counter, labels `operation` and
//!   `error_type`)
//!
//! By default the provider uses a [`ManualReader`], so nothing leaves the
//! process. Pass a provider built with an exporter to
//! [`StoreMetrics::with_meter_provider`] to ship the same instruments.

use std::sync::atomic::{AtomicU64, Ordering};

use opentelemetry::metrics::{Counter, Histogram, MeterProvider as _};
use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::{ManualReader, SdkMeterProvider};

use crate::providers::StoreErrorKind;

/// Counters mirrored from the OpenTelemetry instruments for tests and
/// diagnostics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StoreMetricsSnapshot {
    pub operations: u64,
    pub errors: u64,
    pub unavailable_errors: u64,
}

pub struct StoreMetrics {
    meter_provider: SdkMeterProvider,

    pub provider_operation_duration_seconds: Histogram<f64>,
    pub provider_errors_total: Counter<u64>,

    // Test-observable counters
    operations_atomic: AtomicU64,
    errors_atomic: AtomicU64,
    unavailable_errors_atomic: AtomicU64,
}

impl StoreMetrics {
    /// Instruments on a private meter provider read in-process.
    pub fn new() -> Self {
        let reader = ManualReader::builder().build();
        Self::with_meter_provider(SdkMeterProvider::builder().with_reader(reader).build())
    }

    pub fn with_meter_provider(meter_provider: SdkMeterProvider) -> Self {
        let meter = meter_provider.meter("duroxide");

        let provider_operation_duration_seconds = meter
            .f64_histogram("duroxide_provider_operation_duration_seconds")
            .with_description("Storage client operation latency")
            .with_boundaries(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0])
            .build();

        let provider_errors_total = meter
            .u64_counter("duroxide_provider_errors_total")
            .with_description("Storage client errors")
            .build();

        Self {
            meter_provider,
            provider_operation_duration_seconds,
            provider_errors_total,
            operations_atomic: AtomicU64::new(0),
            errors_atomic: AtomicU64::new(0),
            unavailable_errors_atomic: AtomicU64::new(0),
        }
    }

    pub fn meter_provider(&self) -> &SdkMeterProvider {
        &self.meter_provider
    }

    #[inline]
    pub fn record_provider_operation(&self, operation: &str, duration_seconds: f64, status: &str) {
        self.provider_operation_duration_seconds.record(
            duration_seconds,
            &[
                KeyValue::new("operation", operation.to_string()),
                KeyValue::new("status", status.to_string()),
            ],
        );
        self.operations_atomic.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_provider_error(&self, operation: &str, kind: StoreErrorKind) {
        self.provider_errors_total.add(
            1,
            &[
                KeyValue::new("operation", operation.to_string()),
                KeyValue::new("error_type", kind.as_str()),
            ],
        );
        self.errors_atomic.fetch_add(1, Ordering::Relaxed);
        if kind == StoreErrorKind::Unavailable {
            self.unavailable_errors_atomic.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> StoreMetricsSnapshot {
        StoreMetricsSnapshot {
            operations: self.operations_atomic.load(Ordering::Relaxed),
            errors: self.errors_atomic.load(Ordering::Relaxed),
            unavailable_errors: self.unavailable_errors_atomic.load(Ordering::Relaxed),
        }
    }
}

impl Default for StoreMetrics {
    fn default() -> Self {
        Self::new()
    }
}
