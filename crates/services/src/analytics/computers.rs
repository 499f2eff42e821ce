//! Metric computers: one independent query per slice of the report.

use super::models::{
    CustomerProfile, CustomerSegment, InventoryHealth, MonthlySalesPoint, RevenueSummary,
};
use super::ports::{
    AggregateRow, AggregationQuery, AnalyticsError, Collection, CompareOp, Condition, Field,
    GroupKey, RecordStore, Reducer, SortDirection,
};
use chrono::{DateTime, Utc};

/// Customers who bought within this many days are Active
pub const ACTIVE_WINDOW_DAYS: i64 = 7;
/// Customers who bought within this many days are Regular
pub const REGULAR_WINDOW_DAYS: i64 = 30;
/// Spend above which a recent customer would be VIP
pub const VIP_SPEND_THRESHOLD: f64 = 1000.0;

/// Stock levels used to classify products
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockThresholds {
    /// Stock at or below this is low
    pub low_stock: i64,
    /// Stock equal to this is out of stock
    pub out_of_stock: i64,
}

impl Default for StockThresholds {
    fn default() -> Self {
        Self {
            low_stock: 10,
            out_of_stock: 0,
        }
    }
}

/// Single-group queries return no row for an empty collection
fn single_group(rows: Vec<AggregateRow>) -> Option<AggregateRow> {
    rows.into_iter().next()
}

/// Number of users. Every registered user counts; there is no activity filter.
pub async fn active_user_count(store: &dyn RecordStore) -> Result<i64, AnalyticsError> {
    Ok(store.count(Collection::Users).await?)
}

pub async fn product_catalog_size(store: &dyn RecordStore) -> Result<i64, AnalyticsError> {
    Ok(store.count(Collection::Products).await?)
}

pub async fn revenue_summary(store: &dyn RecordStore) -> Result<RevenueSummary, AnalyticsError> {
    let query = AggregationQuery::over(Collection::Orders)
        .reduce("totalRevenue", Reducer::Sum(Field::TotalAmount))
        .reduce("totalOrders", Reducer::Count);

    match single_group(store.aggregate(&query).await?) {
        Some(row) => Ok(RevenueSummary {
            total_revenue: row.f64("totalRevenue")?,
            total_orders: row.i64("totalOrders")?,
        }),
        None => Ok(RevenueSummary::default()),
    }
}

/// Revenue and order count per calendar month, oldest first
pub async fn monthly_sales_series(
    store: &dyn RecordStore,
) -> Result<Vec<MonthlySalesPoint>, AnalyticsError> {
    let query = AggregationQuery::over(Collection::Orders)
        .group_by(GroupKey::YearMonth(Field::OrderDate))
        .reduce("revenue", Reducer::Sum(Field::TotalAmount))
        .reduce("orders", Reducer::Count)
        .flatten_key()
        .sort_by("year", SortDirection::Asc)
        .sort_by("month", SortDirection::Asc);

    let rows = store.aggregate(&query).await?;
    rows.iter()
        .map(|row| -> Result<MonthlySalesPoint, AnalyticsError> {
            let month = row.i64("month")?;
            Ok(MonthlySalesPoint {
                year: i32::try_from(row.i64("year")?)
                    .map_err(|e| AnalyticsError::Computation(format!("year out of range: {e}")))?,
                month: u32::try_from(month)
                    .ok()
                    .filter(|m| (1..=12).contains(m))
                    .ok_or_else(|| {
                        AnalyticsError::Computation(format!("month out of range: {month}"))
                    })?,
                revenue: row.f64("revenue")?,
                orders: row.i64("orders")?,
            })
        })
        .collect()
}

pub async fn inventory_health(
    store: &dyn RecordStore,
    thresholds: StockThresholds,
) -> Result<InventoryHealth, AnalyticsError> {
    let query = AggregationQuery::over(Collection::Products)
        .reduce("totalStocks", Reducer::Sum(Field::Stock))
        .reduce("averageStock", Reducer::Average(Field::Stock))
        .reduce(
            "lowStock",
            Reducer::ConditionalSum(Condition::new(
                Field::Stock,
                CompareOp::Lte,
                thresholds.low_stock as f64,
            )),
        )
        .reduce(
            "outOfStock",
            Reducer::ConditionalSum(Condition::new(
                Field::Stock,
                CompareOp::Eq,
                thresholds.out_of_stock as f64,
            )),
        );

    match single_group(store.aggregate(&query).await?) {
        Some(row) => Ok(InventoryHealth {
            total_stocks: row.i64("totalStocks")?,
            average_stock: row.f64("averageStock")?,
            low_stock: row.i64("lowStock")?,
            out_of_stock: row.i64("outOfStock")?,
        }),
        None => Ok(InventoryHealth::default()),
    }
}

/// Classify a customer by recency and spend; the first matching rule wins.
///
/// Active is checked before Regular so a purchase 3 days ago is Active.
pub fn assign_segment(days_since_last_purchase: i64, total_spent: f64) -> CustomerSegment {
    if days_since_last_purchase < ACTIVE_WINDOW_DAYS {
        CustomerSegment::Active
    } else if days_since_last_purchase < REGULAR_WINDOW_DAYS {
        CustomerSegment::Regular
    } else if days_since_last_purchase < ACTIVE_WINDOW_DAYS && total_spent > VIP_SPEND_THRESHOLD {
        // Shadowed by the Active rule above: VIP is never assigned.
        CustomerSegment::Vip
    } else {
        CustomerSegment::AtRisk
    }
}

/// Whole days from `last_purchase` to `now`; purchases dated in the future count as today
pub fn days_between(last_purchase: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - last_purchase).num_days().max(0)
}

/// Spend profile and segment for every customer that has placed an order
pub async fn customer_segmentation(
    store: &dyn RecordStore,
    now: DateTime<Utc>,
) -> Result<Vec<CustomerProfile>, AnalyticsError> {
    let query = AggregationQuery::over(Collection::Orders)
        .group_by(GroupKey::Field(Field::UserId))
        .reduce("totalSpent", Reducer::Sum(Field::TotalAmount))
        .reduce("orderCount", Reducer::Count)
        .reduce("averageOrderValue", Reducer::Average(Field::TotalAmount))
        .reduce("lastPurchaseDate", Reducer::Max(Field::OrderDate))
        .flatten_key()
        .sort_by(Field::UserId.wire_name(), SortDirection::Asc);

    let rows = store.aggregate(&query).await?;
    rows.iter()
        .map(|row| -> Result<CustomerProfile, AnalyticsError> {
            let total_spent = row.f64("totalSpent")?;
            let last_purchase_date = row.timestamp("lastPurchaseDate")?;
            let days_since_last_purchase = days_between(last_purchase_date, now);

            Ok(CustomerProfile {
                user_id: row.text(Field::UserId.wire_name())?,
                total_spent,
                order_count: row.i64("orderCount")?,
                average_order_value: row.f64("averageOrderValue")?,
                last_purchase_date,
                days_since_last_purchase,
                segment: assign_segment(days_since_last_purchase, total_spent),
            })
        })
        .collect()
}
