use crate::metrics::MetricsServiceTrait;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RecordedMetric {
    pub name: String,
    pub value: MetricValue,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Latency(Duration),
    Count(i64),
}

/// Metrics sink that keeps every recorded value in memory for assertions
#[derive(Default)]
pub struct CapturingMetricsService {
    pub metrics: Mutex<Vec<RecordedMetric>>,
}

impl CapturingMetricsService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_metrics(&self) -> Vec<RecordedMetric> {
        self.metrics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Sum of all counts recorded under `name`
    pub fn count_of(&self, name: &str) -> i64 {
        self.get_metrics()
            .iter()
            .filter(|m| m.name == name)
            .filter_map(|m| match m.value {
                MetricValue::Count(v) => Some(v),
                MetricValue::Latency(_) => None,
            })
            .sum()
    }

    fn push(&self, name: &str, value: MetricValue, tags: &[&str]) {
        self.metrics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedMetric {
                name: name.to_string(),
                value,
                tags: tags.iter().map(|s| s.to_string()).collect(),
            });
    }
}

impl MetricsServiceTrait for CapturingMetricsService {
    fn record_latency(&self, name: &str, duration: Duration, tags: &[&str]) {
        self.push(name, MetricValue::Latency(duration), tags);
    }

    fn record_count(&self, name: &str, value: i64, tags: &[&str]) {
        self.push(name, MetricValue::Count(value), tags);
    }
}
