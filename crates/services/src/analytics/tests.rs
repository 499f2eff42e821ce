//! Unit tests for AnalyticsServiceImpl

#[cfg(test)]
#[allow(clippy::module_inception)]
mod tests {
    use crate::analytics::cache::{ClockedReportCache, DEFAULT_REPORT_TTL};
    use crate::analytics::clock::ManualClock;
    use crate::analytics::models::{OrderRecord, ProductRecord, UserRecord};
    use crate::analytics::ports::{Collection, MockRecordStore};
    use crate::analytics::{
        AnalyticsError, AnalyticsServiceImpl, AnalyticsServiceTrait, InMemoryRecordStore,
        ReportAssembler, ReportSource, StockThresholds,
    };
    use crate::common::RepositoryError;
    use crate::metrics::capturing::{CapturingMetricsService, MetricValue};
    use crate::metrics::consts::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::Arc;

    struct Harness {
        store: Arc<InMemoryRecordStore>,
        clock: Arc<ManualClock>,
        cache: Arc<ClockedReportCache>,
        metrics: Arc<CapturingMetricsService>,
        service: AnalyticsServiceImpl,
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 20, 10, 0, 0).unwrap()
    }

    async fn seed(store: &InMemoryRecordStore) {
        for id in ["u1", "u2"] {
            store.insert_user(UserRecord { id: id.to_string() }).await;
        }
        store
            .insert_product(ProductRecord {
                id: "p1".to_string(),
                stock: 20,
            })
            .await;
        store
            .insert_order(OrderRecord {
                id: "o1".to_string(),
                user_id: "u1".to_string(),
                total_amount: 80.0,
                order_date: start() - Duration::days(3),
            })
            .await;
    }

    async fn harness(store: InMemoryRecordStore, single_flight: bool) -> Harness {
        let store = Arc::new(store);
        seed(&store).await;

        let clock = Arc::new(ManualClock::new(start()));
        let cache = Arc::new(ClockedReportCache::new(DEFAULT_REPORT_TTL, clock.clone()));
        let metrics = Arc::new(CapturingMetricsService::new());
        let assembler =
            ReportAssembler::new(store.clone(), clock.clone(), StockThresholds::default());
        let service = AnalyticsServiceImpl::new(assembler, cache.clone(), metrics.clone())
            .with_single_flight(single_flight);

        Harness {
            store,
            clock,
            cache,
            metrics,
            service,
        }
    }

    #[tokio::test]
    async fn test_first_request_computes_then_serves_from_cache() {
        let h = harness(InMemoryRecordStore::new(), false).await;

        let first = h.service.get_dashboard_analytics().await.unwrap();
        assert_eq!(first.source, ReportSource::Computed);
        assert_eq!(first.report.active_users, 2);
        assert_eq!(first.report.total_revenue, 80.0);

        let second = h.service.get_dashboard_analytics().await.unwrap();
        assert_eq!(second.source, ReportSource::Cached);
        assert!(Arc::ptr_eq(&first.report, &second.report));

        assert_eq!(h.metrics.count_of(METRIC_CACHE_MISSES), 1);
        assert_eq!(h.metrics.count_of(METRIC_CACHE_HITS), 1);
        let latencies: Vec<_> = h
            .metrics
            .get_metrics()
            .into_iter()
            .filter(|m| m.name == METRIC_ASSEMBLY_DURATION)
            .collect();
        assert_eq!(latencies.len(), 1);
        assert!(matches!(latencies[0].value, MetricValue::Latency(_)));
    }

    #[tokio::test]
    async fn test_cached_report_does_not_see_new_records() {
        let h = harness(InMemoryRecordStore::new(), false).await;
        h.service.get_dashboard_analytics().await.unwrap();

        h.store
            .insert_user(UserRecord {
                id: "u3".to_string(),
            })
            .await;

        let cached = h.service.get_dashboard_analytics().await.unwrap();
        assert_eq!(cached.source, ReportSource::Cached);
        assert_eq!(cached.report.active_users, 2);
    }

    #[tokio::test]
    async fn test_expired_entry_triggers_recomputation() {
        let h = harness(InMemoryRecordStore::new(), false).await;
        h.service.get_dashboard_analytics().await.unwrap();

        h.clock.advance(Duration::seconds(599));
        let within = h.service.get_dashboard_analytics().await.unwrap();
        assert_eq!(within.source, ReportSource::Cached);

        h.store
            .insert_user(UserRecord {
                id: "u3".to_string(),
            })
            .await;
        h.clock.advance(Duration::seconds(1));

        let refreshed = h.service.get_dashboard_analytics().await.unwrap();
        assert_eq!(refreshed.source, ReportSource::Computed);
        assert_eq!(refreshed.report.active_users, 3);
    }

    #[tokio::test]
    async fn test_failed_assembly_leaves_cache_untouched() {
        let h = harness(InMemoryRecordStore::new(), false).await;
        let first = h.service.get_dashboard_analytics().await.unwrap();

        h.clock.advance(Duration::seconds(600));
        h.store.set_unavailable(true);

        let err = h.service.get_dashboard_analytics().await.unwrap_err();
        assert!(matches!(err, AnalyticsError::StoreUnavailable(_)));

        // The expired entry is neither replaced nor served
        let entry = h.cache.entry().await.unwrap();
        assert!(Arc::ptr_eq(&entry.report, &first.report));
        assert_eq!(entry.computed_at, start());

        let failures: Vec<_> = h
            .metrics
            .get_metrics()
            .into_iter()
            .filter(|m| m.name == METRIC_ASSEMBLY_FAILURES)
            .collect();
        assert_eq!(failures.len(), 1);
        assert!(failures[0]
            .tags
            .contains(&format!("{TAG_ERROR_TYPE}:{ERROR_TYPE_STORE_UNAVAILABLE}")));

        h.store.set_unavailable(false);
        let recovered = h.service.get_dashboard_analytics().await.unwrap();
        assert_eq!(recovered.source, ReportSource::Computed);
    }

    #[tokio::test]
    async fn test_failure_with_empty_cache_stores_nothing() {
        let store = InMemoryRecordStore::new();
        store.set_unavailable(true);
        let h = harness(store, false).await;

        assert!(h.service.get_dashboard_analytics().await.is_err());
        assert!(h.cache.entry().await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_misses_each_assemble_without_single_flight() {
        let store = InMemoryRecordStore::new().with_latency(std::time::Duration::from_millis(20));
        let h = harness(store, false).await;

        let (a, b) = tokio::join!(
            h.service.get_dashboard_analytics(),
            h.service.get_dashboard_analytics()
        );

        assert_eq!(a.unwrap().source, ReportSource::Computed);
        assert_eq!(b.unwrap().source, ReportSource::Computed);
        // Six queries per assembly
        assert_eq!(h.store.query_count(), 12);
        assert_eq!(h.metrics.count_of(METRIC_CACHE_MISSES), 2);
    }

    #[tokio::test]
    async fn test_single_flight_shares_one_assembly() {
        let store = InMemoryRecordStore::new().with_latency(std::time::Duration::from_millis(20));
        let h = harness(store, true).await;

        let (a, b) = tokio::join!(
            h.service.get_dashboard_analytics(),
            h.service.get_dashboard_analytics()
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        let mut sources = vec![a.source, b.source];
        sources.sort_by_key(|s| *s == ReportSource::Cached);
        assert_eq!(sources, vec![ReportSource::Computed, ReportSource::Cached]);
        assert!(Arc::ptr_eq(&a.report, &b.report));
        assert_eq!(h.store.query_count(), 6);
    }

    #[tokio::test]
    async fn test_malformed_store_rows_are_computation_errors() {
        let mut store = MockRecordStore::new();
        store.expect_count().returning(|collection| match collection {
            Collection::Users => Ok(4),
            _ => Ok(1),
        });
        store.expect_aggregate().returning(|_| {
            Err(RepositoryError::ValidationFailed(
                "unsupported reducer".to_string(),
            ))
        });

        let clock = Arc::new(ManualClock::new(start()));
        let metrics = Arc::new(CapturingMetricsService::new());
        let service = AnalyticsServiceImpl::new(
            ReportAssembler::new(Arc::new(store), clock.clone(), StockThresholds::default()),
            Arc::new(ClockedReportCache::new(DEFAULT_REPORT_TTL, clock)),
            metrics.clone(),
        );

        let err = service.get_dashboard_analytics().await.unwrap_err();
        assert!(matches!(err, AnalyticsError::Computation(_)));
        assert_eq!(metrics.count_of(METRIC_ASSEMBLY_FAILURES), 1);
        assert_eq!(metrics.count_of(METRIC_CACHE_HITS), 0);
    }
}
