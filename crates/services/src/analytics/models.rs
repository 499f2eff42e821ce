//! Report value types produced by the analytics engine, plus the raw record
//! shapes of the three collections it reads.
//!
//! Everything here serializes with camelCase field names; those names are the
//! wire contract with dashboard clients and with the persistence layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A registered user. Only existence matters to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
}

/// A catalog entry with its on-hand stock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: String,
    pub stock: i64,
}

/// A placed order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    pub id: String,
    pub user_id: String,
    pub total_amount: f64,
    pub order_date: DateTime<Utc>,
}

/// Revenue totals over all orders
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevenueSummary {
    pub total_revenue: f64,
    pub total_orders: i64,
}

/// Revenue and order count for one calendar month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MonthlySalesPoint {
    pub year: i32,
    pub month: u32,
    pub revenue: f64,
    pub orders: i64,
}

/// Stock health across the whole catalog
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InventoryHealth {
    pub total_stocks: i64,
    pub average_stock: f64,
    pub low_stock: i64,
    pub out_of_stock: i64,
}

/// Customer classification derived from recency and spend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum CustomerSegment {
    Regular,
    Active,
    #[serde(rename = "VIP")]
    Vip,
    AtRisk,
}

/// Spend profile of one customer, keyed by the `userId` on their orders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomerProfile {
    pub user_id: String,
    pub total_spent: f64,
    pub order_count: i64,
    pub average_order_value: f64,
    pub last_purchase_date: DateTime<Utc>,
    pub days_since_last_purchase: i64,
    pub segment: CustomerSegment,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomerAnalytics {
    pub total_customers: i64,
    pub average_lifetime_value: f64,
    pub customer_segments: Vec<CustomerProfile>,
}

/// Secondary indicators derived from the primary metric slices
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Kpis {
    pub average_order_value: f64,
    /// Orders per user, as a percentage rounded to two decimals
    pub conversion_rate: f64,
    pub stock_turnover_rate: f64,
}

/// The assembled dashboard payload for one computation cycle.
///
/// A report is never updated in place; recomputation produces a new value
/// which replaces the cached one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub active_users: i64,
    pub total_products: i64,
    pub total_revenue: f64,
    pub total_orders: i64,
    pub monthly_sales_data: Vec<MonthlySalesPoint>,
    pub inventory_metrics: InventoryHealth,
    pub customer_analytics: CustomerAnalytics,
    pub kpis: Kpis,
}

impl Report {
    pub fn revenue(&self) -> RevenueSummary {
        RevenueSummary {
            total_revenue: self.total_revenue,
            total_orders: self.total_orders,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_wire_labels() {
        assert_eq!(
            serde_json::to_string(&CustomerSegment::Vip).unwrap(),
            "\"VIP\""
        );
        assert_eq!(
            serde_json::to_string(&CustomerSegment::AtRisk).unwrap(),
            "\"AtRisk\""
        );
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let report = Report {
            active_users: 2,
            total_products: 1,
            total_revenue: 10.0,
            total_orders: 1,
            monthly_sales_data: vec![],
            inventory_metrics: InventoryHealth::default(),
            customer_analytics: CustomerAnalytics::default(),
            kpis: Kpis::default(),
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["activeUsers"], 2);
        assert_eq!(json["totalRevenue"], 10.0);
        assert!(json["monthlySalesData"].is_array());
        assert_eq!(json["inventoryMetrics"]["outOfStock"], 0);
        assert_eq!(json["customerAnalytics"]["totalCustomers"], 0);
        assert_eq!(json["kpis"]["conversionRate"], 0.0);
    }
}
