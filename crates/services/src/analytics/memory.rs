//! In-process record store.
//!
//! Evaluates aggregation queries over plain vectors with the same semantics
//! as the PostgreSQL adapter. Backs the `memory` store backend and the test
//! suites.

use super::models::{OrderRecord, ProductRecord, UserRecord};
use super::ports::{
    AggregateRow, AggregationQuery, Collection, Field, FieldKind, GroupKey, GroupValue,
    Projection, RecordStore, Reducer, Scalar, SortDirection,
};
use crate::common::RepositoryError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Collections {
    users: Vec<UserRecord>,
    products: Vec<ProductRecord>,
    orders: Vec<OrderRecord>,
}

#[derive(Clone, Copy)]
enum RecordRef<'a> {
    User(&'a UserRecord),
    Product(&'a ProductRecord),
    Order(&'a OrderRecord),
}

impl RecordRef<'_> {
    fn value(&self, field: Field) -> Scalar {
        match (self, field) {
            (Self::Order(order), Field::UserId) => Scalar::Text(order.user_id.clone()),
            (Self::Order(order), Field::TotalAmount) => Scalar::Decimal(order.total_amount),
            (Self::Order(order), Field::OrderDate) => Scalar::Timestamp(order.order_date),
            (Self::Product(product), Field::Stock) => Scalar::Integer(product.stock),
            _ => Scalar::Null,
        }
    }

    fn group_value(&self, key: &GroupKey) -> Option<GroupValue> {
        match key {
            GroupKey::All => Some(GroupValue::All),
            GroupKey::Field(field) => match self.value(*field) {
                Scalar::Text(value) => Some(GroupValue::Text(value)),
                Scalar::Integer(value) => Some(GroupValue::Integer(value)),
                _ => None,
            },
            GroupKey::YearMonth(field) => self
                .value(*field)
                .as_timestamp()
                .map(|ts| GroupValue::year_month(&ts)),
        }
    }
}

fn reduce(reducer: &Reducer, records: &[RecordRef<'_>]) -> Result<Scalar, RepositoryError> {
    let scalar = match reducer {
        Reducer::Count => Scalar::Integer(records.len() as i64),
        Reducer::Sum(field) => {
            if field.kind() == FieldKind::Integer {
                let total = records
                    .iter()
                    .filter_map(|r| r.value(*field).as_i64())
                    .try_fold(0i64, |acc, v| acc.checked_add(v))
                    .ok_or_else(|| {
                        RepositoryError::DataConversionError(anyhow::anyhow!(
                            "sum of {} overflows a 64-bit integer",
                            field.wire_name()
                        ))
                    })?;
                Scalar::Integer(total)
            } else {
                Scalar::Decimal(
                    records
                        .iter()
                        .filter_map(|r| r.value(*field).as_f64())
                        .sum(),
                )
            }
        }
        Reducer::Average(field) => {
            let values: Vec<f64> = records
                .iter()
                .filter_map(|r| r.value(*field).as_f64())
                .collect();
            if values.is_empty() {
                Scalar::Null
            } else {
                Scalar::Decimal(values.iter().sum::<f64>() / values.len() as f64)
            }
        }
        Reducer::Max(field) => records
            .iter()
            .map(|r| r.value(*field))
            .filter(|v| *v != Scalar::Null)
            .max_by(|a, b| a.total_cmp(b))
            .unwrap_or(Scalar::Null),
        Reducer::ConditionalSum(condition) => Scalar::Integer(
            records
                .iter()
                .filter(|r| {
                    r.value(condition.field)
                        .as_f64()
                        .is_some_and(|v| condition.op.matches(v, condition.value))
                })
                .count() as i64,
        ),
    };
    Ok(scalar)
}

/// Record store holding all records in memory
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    data: RwLock<Collections>,
    unavailable: AtomicBool,
    latency: Option<Duration>,
    queries: AtomicUsize,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every query by `latency`, to make concurrent callers overlap
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub async fn insert_user(&self, user: UserRecord) {
        self.data.write().await.users.push(user);
    }

    pub async fn insert_product(&self, product: ProductRecord) {
        self.data.write().await.products.push(product);
    }

    pub async fn insert_order(&self, order: OrderRecord) {
        self.data.write().await.orders.push(order);
    }

    /// Make every subsequent query fail as if the store could not be reached
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of count and aggregate calls served so far
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    async fn begin_query(&self) -> Result<(), RepositoryError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::ConnectionFailed(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn count(&self, collection: Collection) -> Result<i64, RepositoryError> {
        self.begin_query().await?;
        let data = self.data.read().await;
        let count = match collection {
            Collection::Users => data.users.len(),
            Collection::Products => data.products.len(),
            Collection::Orders => data.orders.len(),
        };
        Ok(count as i64)
    }

    async fn aggregate(
        &self,
        query: &AggregationQuery,
    ) -> Result<Vec<AggregateRow>, RepositoryError> {
        query.validate()?;
        self.begin_query().await?;

        let data = self.data.read().await;
        let records: Vec<RecordRef<'_>> = match query.collection {
            Collection::Users => data.users.iter().map(RecordRef::User).collect(),
            Collection::Products => data.products.iter().map(RecordRef::Product).collect(),
            Collection::Orders => data.orders.iter().map(RecordRef::Order).collect(),
        };

        let mut groups: BTreeMap<GroupValue, Vec<RecordRef<'_>>> = BTreeMap::new();
        for record in records {
            if let Some(key) = record.group_value(&query.group_by) {
                groups.entry(key).or_default().push(record);
            }
        }

        let mut rows: Vec<AggregateRow> = groups
            .into_iter()
            .map(|(key, members)| -> Result<AggregateRow, RepositoryError> {
                let mut values: BTreeMap<String, Scalar> = query
                    .reducers
                    .iter()
                    .map(|named| Ok((named.name.clone(), reduce(&named.reducer, &members)?)))
                    .collect::<Result<_, RepositoryError>>()?;

                let key = match query.projection {
                    Projection::KeepKey => Some(key),
                    Projection::FlattenKey => {
                        values.extend(key.flatten(&query.group_by));
                        None
                    }
                };

                Ok(AggregateRow { key, values })
            })
            .collect::<Result<_, _>>()?;

        if !query.sort.is_empty() {
            let key_value = |row: &AggregateRow, name: &str| -> Scalar {
                if let Some(value) = row.values.get(name) {
                    return value.clone();
                }
                row.key
                    .clone()
                    .map(|key| key.flatten(&query.group_by))
                    .and_then(|fields| fields.into_iter().find(|(n, _)| n == name))
                    .map(|(_, v)| v)
                    .unwrap_or(Scalar::Null)
            };

            rows.sort_by(|a, b| {
                query
                    .sort
                    .iter()
                    .map(|spec| {
                        let ordering = key_value(a, &spec.field).total_cmp(&key_value(b, &spec.field));
                        match spec.direction {
                            SortDirection::Asc => ordering,
                            SortDirection::Desc => ordering.reverse(),
                        }
                    })
                    .find(|ordering| ordering.is_ne())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        Ok(rows)
    }
}
