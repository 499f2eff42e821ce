//! Dashboard analytics service
//!
//! Assembles the e-commerce dashboard report from the record store and serves
//! it through a time-bounded cache.

pub mod assembler;
pub mod cache;
pub mod clock;
pub mod computers;
pub mod memory;
pub mod models;
pub mod ports;

#[cfg(test)]
mod tests;

use crate::metrics::{consts::*, MetricsServiceTrait};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

pub use assembler::{MetricSlices, ReportAssembler};
pub use cache::{ClockedReportCache, MokaReportCache, REPORT_CACHE_KEY};
pub use clock::{Clock, ManualClock, SystemClock};
pub use computers::StockThresholds;
pub use memory::InMemoryRecordStore;
pub use models::Report;
pub use ports::{
    AnalyticsError, AnalyticsServiceTrait, DashboardAnalytics, RecordStore, ReportCache,
    ReportSource,
};

impl From<&config::AnalyticsConfig> for StockThresholds {
    fn from(config: &config::AnalyticsConfig) -> Self {
        Self {
            low_stock: config.low_stock_threshold,
            out_of_stock: config.out_of_stock_threshold,
        }
    }
}

pub struct AnalyticsServiceImpl {
    assembler: ReportAssembler,
    cache: Arc<dyn ReportCache>,
    metrics: Arc<dyn MetricsServiceTrait>,
    // Present only when concurrent misses should share one assembly
    in_flight: Option<Mutex<()>>,
}

impl AnalyticsServiceImpl {
    pub fn new(
        assembler: ReportAssembler,
        cache: Arc<dyn ReportCache>,
        metrics: Arc<dyn MetricsServiceTrait>,
    ) -> Self {
        Self {
            assembler,
            cache,
            metrics,
            in_flight: None,
        }
    }

    /// Serialize cache misses so that callers arriving during an assembly
    /// wait for it and are served its result from the cache.
    pub fn with_single_flight(mut self, enabled: bool) -> Self {
        self.in_flight = enabled.then(|| Mutex::new(()));
        self
    }

    async fn cached(&self) -> Option<DashboardAnalytics> {
        let report = self.cache.get().await?;
        self.metrics
            .record_count(METRIC_CACHE_HITS, 1, &[&environment_tag()]);
        tracing::debug!("Serving dashboard analytics from cache");
        Some(DashboardAnalytics {
            report,
            source: ReportSource::Cached,
        })
    }

    async fn compute(&self) -> Result<DashboardAnalytics, AnalyticsError> {
        let environment = environment_tag();
        self.metrics
            .record_count(METRIC_CACHE_MISSES, 1, &[&environment]);

        let started = Instant::now();
        let report = match self.assembler.assemble().await {
            Ok(report) => Arc::new(report),
            Err(e) => {
                let error_type = match &e {
                    AnalyticsError::StoreUnavailable(_) => ERROR_TYPE_STORE_UNAVAILABLE,
                    AnalyticsError::Computation(_) => ERROR_TYPE_COMPUTATION,
                };
                self.metrics.record_count(
                    METRIC_ASSEMBLY_FAILURES,
                    1,
                    &[&environment, &crate::metrics::tag(TAG_ERROR_TYPE, error_type)],
                );
                tracing::error!(error = %e, "Failed to assemble dashboard analytics");
                return Err(e);
            }
        };
        let elapsed = started.elapsed();

        self.metrics
            .record_latency(METRIC_ASSEMBLY_DURATION, elapsed, &[&environment]);
        self.cache.put(report.clone()).await;

        tracing::info!(
            elapsed_ms = elapsed.as_millis() as u64,
            total_orders = report.total_orders,
            customers = report.customer_analytics.total_customers,
            "Assembled dashboard analytics"
        );

        Ok(DashboardAnalytics {
            report,
            source: ReportSource::Computed,
        })
    }
}

fn environment_tag() -> String {
    crate::metrics::tag(TAG_ENVIRONMENT, get_environment())
}

#[async_trait]
impl AnalyticsServiceTrait for AnalyticsServiceImpl {
    async fn get_dashboard_analytics(&self) -> Result<DashboardAnalytics, AnalyticsError> {
        if let Some(hit) = self.cached().await {
            return Ok(hit);
        }

        match &self.in_flight {
            Some(lock) => {
                let _guard = lock.lock().await;
                // Another caller may have filled the cache while we waited
                if let Some(hit) = self.cached().await {
                    return Ok(hit);
                }
                self.compute().await
            }
            None => self.compute().await,
        }
    }
}
