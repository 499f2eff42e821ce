use super::clock::Clock;
use super::models::Report;
use super::ports::ReportCache;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// The report takes no request parameters, so there is only one entry
pub const REPORT_CACHE_KEY: &str = "dashboard-analytics";

/// Default time-to-live of a cached report
pub const DEFAULT_REPORT_TTL: Duration = Duration::from_secs(600);

/// Report cache backed by moka, expiring entries after a fixed TTL
pub struct MokaReportCache {
    inner: Cache<&'static str, Arc<Report>>,
}

impl MokaReportCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                // Single global report
                .max_capacity(1)
                .time_to_live(ttl)
                .build(),
        }
    }
}

impl Default for MokaReportCache {
    fn default() -> Self {
        Self::new(DEFAULT_REPORT_TTL)
    }
}

#[async_trait]
impl ReportCache for MokaReportCache {
    async fn get(&self) -> Option<Arc<Report>> {
        self.inner.get(&REPORT_CACHE_KEY).await
    }

    async fn put(&self, report: Arc<Report>) {
        self.inner.insert(REPORT_CACHE_KEY, report).await;
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub report: Arc<Report>,
    pub computed_at: DateTime<Utc>,
    pub ttl: chrono::Duration,
}

impl CacheEntry {
    /// An entry is valid while its age is below its TTL
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now - self.computed_at < self.ttl
    }
}

/// Report cache whose expiry follows an injected clock.
///
/// Expired entries are not evicted; they stay in place until the next `put`
/// but are never returned from `get`.
pub struct ClockedReportCache {
    entry: RwLock<Option<CacheEntry>>,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl ClockedReportCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entry: RwLock::new(None),
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::weeks(5200)),
            clock,
        }
    }

    /// The stored entry regardless of expiry
    pub async fn entry(&self) -> Option<CacheEntry> {
        self.entry.read().await.clone()
    }

    pub async fn invalidate(&self) {
        *self.entry.write().await = None;
    }
}

#[async_trait]
impl ReportCache for ClockedReportCache {
    async fn get(&self) -> Option<Arc<Report>> {
        let now = self.clock.now();
        self.entry
            .read()
            .await
            .as_ref()
            .filter(|entry| entry.is_valid_at(now))
            .map(|entry| entry.report.clone())
    }

    async fn put(&self, report: Arc<Report>) {
        let entry = CacheEntry {
            report,
            computed_at: self.clock.now(),
            ttl: self.ttl,
        };
        *self.entry.write().await = Some(entry);
    }
}
