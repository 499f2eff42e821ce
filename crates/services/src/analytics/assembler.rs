use super::clock::Clock;
use super::computers::{self, StockThresholds};
use super::models::{
    CustomerAnalytics, CustomerProfile, InventoryHealth, Kpis, MonthlySalesPoint, Report,
    RevenueSummary,
};
use super::ports::{AnalyticsError, RecordStore};
use std::sync::Arc;
use tracing::debug;

/// Raw outputs of the metric computers, before KPI derivation
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSlices {
    pub active_users: i64,
    pub total_products: i64,
    pub revenue: RevenueSummary,
    pub monthly_sales: Vec<MonthlySalesPoint>,
    pub inventory: InventoryHealth,
    pub customers: Vec<CustomerProfile>,
}

/// `numerator / denominator`, or zero when there is nothing to divide by
fn ratio_or_zero(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl MetricSlices {
    /// Derive secondary KPIs and build the final report
    pub fn into_report(self) -> Report {
        let RevenueSummary {
            total_revenue,
            total_orders,
        } = self.revenue;

        let total_customers = self.customers.len() as i64;
        let lifetime_total: f64 = self.customers.iter().map(|c| c.total_spent).sum();

        let kpis = Kpis {
            average_order_value: ratio_or_zero(total_revenue, total_orders as f64),
            conversion_rate: round2(
                ratio_or_zero(total_orders as f64, self.active_users as f64) * 100.0,
            ),
            stock_turnover_rate: ratio_or_zero(
                total_revenue,
                self.inventory.total_stocks as f64,
            ),
        };

        Report {
            active_users: self.active_users,
            total_products: self.total_products,
            total_revenue,
            total_orders,
            monthly_sales_data: self.monthly_sales,
            inventory_metrics: self.inventory,
            customer_analytics: CustomerAnalytics {
                total_customers,
                average_lifetime_value: ratio_or_zero(lifetime_total, total_customers as f64),
                customer_segments: self.customers,
            },
            kpis,
        }
    }
}

/// Runs every metric computer against the record store and merges the results.
///
/// Holds no state of its own between calls: each `assemble` reflects the
/// store's contents at the time its queries run.
pub struct ReportAssembler {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    thresholds: StockThresholds,
}

impl ReportAssembler {
    pub fn new(
        store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        thresholds: StockThresholds,
    ) -> Self {
        Self {
            store,
            clock,
            thresholds,
        }
    }

    /// Query all slices concurrently; the first failure fails the whole report
    pub async fn collect_slices(&self) -> Result<MetricSlices, AnalyticsError> {
        let store = self.store.as_ref();
        let now = self.clock.now();

        let (active_users, total_products, revenue, monthly_sales, inventory, customers) = tokio::try_join!(
            computers::active_user_count(store),
            computers::product_catalog_size(store),
            computers::revenue_summary(store),
            computers::monthly_sales_series(store),
            computers::inventory_health(store, self.thresholds),
            computers::customer_segmentation(store, now),
        )?;

        debug!(
            active_users,
            total_products,
            total_orders = revenue.total_orders,
            months = monthly_sales.len(),
            customers = customers.len(),
            "Collected analytics metric slices"
        );

        Ok(MetricSlices {
            active_users,
            total_products,
            revenue,
            monthly_sales,
            inventory,
            customers,
        })
    }

    pub async fn assemble(&self) -> Result<Report, AnalyticsError> {
        Ok(self.collect_slices().await?.into_report())
    }
}
