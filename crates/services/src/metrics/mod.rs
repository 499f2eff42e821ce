pub mod capturing;
pub mod consts;

use opentelemetry::{
    metrics::{Counter, Histogram, Meter, MeterProvider as _},
    KeyValue,
};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

pub const METER_NAME: &str = "ecommerce-analytics";

pub trait MetricsServiceTrait: Send + Sync {
    fn record_latency(&self, name: &str, duration: Duration, tags: &[&str]);
    fn record_count(&self, name: &str, value: i64, tags: &[&str]);
}

pub struct OtlpMetricsService {
    meter: Meter,
    // Cache instruments to avoid recreating them
    latency_histograms: Mutex<HashMap<String, Histogram<u64>>>,
    counters: Mutex<HashMap<String, Counter<u64>>>,
}

impl OtlpMetricsService {
    pub fn new(meter_provider: &SdkMeterProvider) -> Self {
        Self {
            meter: meter_provider.meter(METER_NAME),
            latency_histograms: Mutex::new(HashMap::new()),
            counters: Mutex::new(HashMap::new()),
        }
    }

    fn parse_tags(tags: &[&str]) -> Vec<KeyValue> {
        tags.iter()
            .filter_map(|tag| {
                tag.split_once(':')
                    .map(|(key, value)| KeyValue::new(key.to_string(), value.to_string()))
            })
            .collect()
    }
}

impl MetricsServiceTrait for OtlpMetricsService {
    fn record_latency(&self, name: &str, duration: Duration, tags: &[&str]) {
        let mut histograms = self
            .latency_histograms
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let histogram = histograms.entry(name.to_string()).or_insert_with(|| {
            let description = match name {
                consts::METRIC_ASSEMBLY_DURATION => "Time to assemble a fresh analytics report",
                consts::METRIC_HTTP_DURATION => "HTTP request processing time",
                _ => "Latency measurement",
            };

            self.meter
                .u64_histogram(name.to_string())
                .with_description(description)
                .with_unit("ms")
                .build()
        });

        histogram.record(duration.as_millis() as u64, &Self::parse_tags(tags));
    }

    fn record_count(&self, name: &str, value: i64, tags: &[&str]) {
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        let counter = counters.entry(name.to_string()).or_insert_with(|| {
            let description = match name {
                consts::METRIC_CACHE_HITS => "Dashboard requests served from the report cache",
                consts::METRIC_CACHE_MISSES => "Dashboard requests that assembled a fresh report",
                consts::METRIC_ASSEMBLY_FAILURES => "Failed report assemblies by error type",
                consts::METRIC_HTTP_REQUESTS => {
                    "Total HTTP requests by endpoint, method, and status"
                }
                _ => "Count",
            };

            self.meter
                .u64_counter(name.to_string())
                .with_description(description)
                .build()
        });

        counter.add(value.max(0) as u64, &Self::parse_tags(tags));
    }
}

// Helper functions for creating properly formatted tags
/// Create a tag in the "key:value" format
pub fn tag(key: &str, value: impl std::fmt::Display) -> String {
    format!("{key}:{value}")
}

/// Create multiple tags from key-value pairs
pub fn tags(pairs: &[(&str, &str)]) -> Vec<String> {
    pairs.iter().map(|(k, v)| tag(k, v)).collect()
}

// Mock implementation for testing
pub struct MockMetricsService;

impl MetricsServiceTrait for MockMetricsService {
    fn record_latency(&self, _name: &str, _duration: Duration, _tags: &[&str]) {}
    fn record_count(&self, _name: &str, _value: i64, _tags: &[&str]) {}
}
