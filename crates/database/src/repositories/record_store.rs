//! PostgreSQL implementation of the record store.
//!
//! Each aggregation query is compiled to a single SQL statement. Identifiers
//! come from the closed `Collection` and `Field` enums or are quoted output
//! aliases, and condition values are validated finite numbers, so statements
//! carry no bind parameters.

use super::utils::{map_db_error, map_pool_error};
use crate::pool::DbPool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use services::analytics::ports::{
    AggregateRow, AggregationQuery, Collection, FieldKind, GroupKey, GroupValue, Projection,
    RecordStore, Reducer, Scalar, SortDirection,
};
use services::common::RepositoryError;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tokio_postgres::Row;
use tracing::{debug, warn};

/// Postgres type an output column is decoded as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    BigInt,
    Double,
    Timestamp,
}

impl From<FieldKind> for ColumnType {
    fn from(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Text => Self::Text,
            FieldKind::Integer => Self::BigInt,
            FieldKind::Decimal => Self::Double,
            FieldKind::Timestamp => Self::Timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputColumn {
    pub name: String,
    pub column_type: ColumnType,
}

impl OutputColumn {
    fn new(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            column_type,
        }
    }
}

/// SQL for one aggregation query plus what is needed to decode its rows
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub key_columns: Vec<OutputColumn>,
    pub value_columns: Vec<OutputColumn>,
    group_by: GroupKey,
    projection: Projection,
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Compile an aggregation query to one SELECT statement
pub fn compile(query: &AggregationQuery) -> Result<CompiledQuery, RepositoryError> {
    query.validate()?;

    let mut select = Vec::new();
    let mut group_by = Vec::new();
    let mut key_columns = Vec::new();

    match query.group_by {
        GroupKey::All => {}
        GroupKey::Field(field) => {
            let column = quote(field.wire_name());
            select.push(format!("{column} AS {column}"));
            group_by.push(column);
            key_columns.push(OutputColumn::new(field.wire_name(), field.kind().into()));
        }
        GroupKey::YearMonth(field) => {
            for part in ["year", "month"] {
                let expr = format!(
                    "EXTRACT({} FROM {} AT TIME ZONE 'UTC')::bigint",
                    part.to_uppercase(),
                    quote(field.wire_name())
                );
                select.push(format!("{expr} AS {}", quote(part)));
                group_by.push(expr);
                key_columns.push(OutputColumn::new(part, ColumnType::BigInt));
            }
        }
    }

    let mut value_columns = Vec::with_capacity(query.reducers.len());
    for named in &query.reducers {
        let (expr, column_type) = match named.reducer {
            Reducer::Sum(field) => match field.kind() {
                FieldKind::Integer => (
                    format!("COALESCE(SUM({}), 0)::bigint", quote(field.wire_name())),
                    ColumnType::BigInt,
                ),
                _ => (
                    format!("COALESCE(SUM({}), 0)::double precision", quote(field.wire_name())),
                    ColumnType::Double,
                ),
            },
            Reducer::Average(field) => (
                format!("AVG({})::double precision", quote(field.wire_name())),
                ColumnType::Double,
            ),
            Reducer::Max(field) => (
                format!("MAX({})", quote(field.wire_name())),
                field.kind().into(),
            ),
            Reducer::Count => ("COUNT(*)::bigint".to_string(), ColumnType::BigInt),
            Reducer::ConditionalSum(condition) => (
                format!(
                    "COALESCE(SUM(CASE WHEN {} {} {} THEN 1 ELSE 0 END), 0)::bigint",
                    quote(condition.field.wire_name()),
                    condition.op.sql_operator(),
                    condition.value
                ),
                ColumnType::BigInt,
            ),
        };
        select.push(format!("{expr} AS {}", quote(&named.name)));
        value_columns.push(OutputColumn::new(&named.name, column_type));
    }

    let mut sql = format!(
        "SELECT {} FROM {}",
        select.join(", "),
        quote(query.collection.name())
    );

    if group_by.is_empty() {
        // An aggregate without GROUP BY yields one row even over an empty table
        sql.push_str(" HAVING COUNT(*) > 0");
    } else {
        sql.push_str(&format!(" GROUP BY {}", group_by.join(", ")));
    }

    if !query.sort.is_empty() {
        let order: Vec<String> = query
            .sort
            .iter()
            .map(|spec| {
                let direction = match spec.direction {
                    SortDirection::Asc => "ASC NULLS FIRST",
                    SortDirection::Desc => "DESC NULLS LAST",
                };
                format!("{} {direction}", quote(&spec.field))
            })
            .collect();
        sql.push_str(&format!(" ORDER BY {}", order.join(", ")));
    }

    Ok(CompiledQuery {
        sql,
        key_columns,
        value_columns,
        group_by: query.group_by,
        projection: query.projection,
    })
}

fn read_scalar(row: &Row, idx: usize, column: &OutputColumn) -> Result<Scalar, RepositoryError> {
    let conversion = |e: tokio_postgres::Error| {
        RepositoryError::DataConversionError(anyhow::anyhow!("column '{}': {e}", column.name))
    };

    let value = match column.column_type {
        ColumnType::Text => row
            .try_get::<_, Option<String>>(idx)
            .map_err(conversion)?
            .map(Scalar::Text),
        ColumnType::BigInt => row
            .try_get::<_, Option<i64>>(idx)
            .map_err(conversion)?
            .map(Scalar::Integer),
        ColumnType::Double => row
            .try_get::<_, Option<f64>>(idx)
            .map_err(conversion)?
            .map(Scalar::Decimal),
        ColumnType::Timestamp => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)
            .map_err(conversion)?
            .map(Scalar::Timestamp),
    };
    Ok(value.unwrap_or(Scalar::Null))
}

fn group_value(group_by: &GroupKey, keys: &[Scalar]) -> Result<GroupValue, RepositoryError> {
    let invalid =
        || RepositoryError::DataConversionError(anyhow::anyhow!("unexpected group key {keys:?}"));

    match (group_by, keys) {
        (GroupKey::All, []) => Ok(GroupValue::All),
        (GroupKey::Field(_), [Scalar::Text(value)]) => Ok(GroupValue::Text(value.clone())),
        (GroupKey::Field(_), [Scalar::Integer(value)]) => Ok(GroupValue::Integer(*value)),
        (GroupKey::YearMonth(_), [Scalar::Integer(year), Scalar::Integer(month)]) => {
            Ok(GroupValue::YearMonth {
                year: i32::try_from(*year).map_err(|_| invalid())?,
                month: u32::try_from(*month).map_err(|_| invalid())?,
            })
        }
        _ => Err(invalid()),
    }
}

impl CompiledQuery {
    /// Build a result row from decoded key and reducer values, in column order
    pub fn assemble_row(
        &self,
        keys: Vec<Scalar>,
        values: Vec<Scalar>,
    ) -> Result<AggregateRow, RepositoryError> {
        let key = group_value(&self.group_by, &keys)?;
        let mut values: BTreeMap<String, Scalar> = self
            .value_columns
            .iter()
            .map(|column| column.name.clone())
            .zip(values)
            .collect();

        let key = match self.projection {
            Projection::KeepKey => Some(key),
            Projection::FlattenKey => {
                values.extend(key.flatten(&self.group_by));
                None
            }
        };

        Ok(AggregateRow { key, values })
    }

    fn decode(&self, row: &Row) -> Result<AggregateRow, RepositoryError> {
        let keys = self
            .key_columns
            .iter()
            .enumerate()
            .map(|(idx, column)| read_scalar(row, idx, column))
            .collect::<Result<Vec<_>, _>>()?;

        let offset = self.key_columns.len();
        let values = self
            .value_columns
            .iter()
            .enumerate()
            .map(|(idx, column)| read_scalar(row, offset + idx, column))
            .collect::<Result<Vec<_>, _>>()?;

        self.assemble_row(keys, values)
    }
}

/// Record store backed by the `users`, `products` and `orders` tables
pub struct PgRecordStore {
    pool: DbPool,
    query_timeout: Duration,
}

impl PgRecordStore {
    pub fn new(pool: DbPool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T, RepositoryError>
    where
        F: Future<Output = Result<T, RepositoryError>>,
    {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    operation,
                    timeout_ms = self.query_timeout.as_millis() as u64,
                    "Record store query timed out"
                );
                Err(RepositoryError::Timeout(self.query_timeout))
            }
        }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn count(&self, collection: Collection) -> Result<i64, RepositoryError> {
        let sql = format!("SELECT COUNT(*)::bigint FROM {}", quote(collection.name()));

        self.bounded("count", async {
            let client = self.pool.get().await.map_err(map_pool_error)?;
            let row = client
                .query_one(sql.as_str(), &[])
                .await
                .map_err(map_db_error)?;
            row.try_get::<_, i64>(0)
                .map_err(|e| RepositoryError::DataConversionError(e.into()))
        })
        .await
    }

    async fn aggregate(
        &self,
        query: &AggregationQuery,
    ) -> Result<Vec<AggregateRow>, RepositoryError> {
        let compiled = compile(query)?;
        debug!(
            collection = query.collection.name(),
            sql = %compiled.sql,
            "Running aggregation"
        );

        self.bounded("aggregate", async {
            let client = self.pool.get().await.map_err(map_pool_error)?;
            let rows = client
                .query(compiled.sql.as_str(), &[])
                .await
                .map_err(map_db_error)?;
            rows.iter().map(|row| compiled.decode(row)).collect()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use services::analytics::ports::{CompareOp, Condition, Field};

    fn monthly_query() -> AggregationQuery {
        AggregationQuery::over(Collection::Orders)
            .group_by(GroupKey::YearMonth(Field::OrderDate))
            .reduce("revenue", Reducer::Sum(Field::TotalAmount))
            .reduce("orders", Reducer::Count)
            .flatten_key()
            .sort_by("year", SortDirection::Asc)
            .sort_by("month", SortDirection::Asc)
    }

    #[test]
    fn test_single_group_query_filters_empty_table() {
        let query = AggregationQuery::over(Collection::Orders)
            .reduce("totalRevenue", Reducer::Sum(Field::TotalAmount))
            .reduce("totalOrders", Reducer::Count);

        let compiled = compile(&query).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT COALESCE(SUM(\"totalAmount\"), 0)::double precision AS \"totalRevenue\", \
             COUNT(*)::bigint AS \"totalOrders\" FROM \"orders\" HAVING COUNT(*) > 0"
        );
        assert!(compiled.key_columns.is_empty());
    }

    #[test]
    fn test_year_month_grouping_extracts_in_utc() {
        let compiled = compile(&monthly_query()).unwrap();

        assert!(compiled
            .sql
            .contains("EXTRACT(YEAR FROM \"orderDate\" AT TIME ZONE 'UTC')::bigint AS \"year\""));
        assert!(compiled.sql.contains(
            " GROUP BY EXTRACT(YEAR FROM \"orderDate\" AT TIME ZONE 'UTC')::bigint, \
             EXTRACT(MONTH FROM \"orderDate\" AT TIME ZONE 'UTC')::bigint"
        ));
        assert!(compiled
            .sql
            .ends_with(" ORDER BY \"year\" ASC NULLS FIRST, \"month\" ASC NULLS FIRST"));
        assert_eq!(
            compiled.key_columns,
            vec![
                OutputColumn::new("year", ColumnType::BigInt),
                OutputColumn::new("month", ColumnType::BigInt),
            ]
        );
    }

    #[test]
    fn test_conditional_sum_compiles_to_case_expression() {
        let query = AggregationQuery::over(Collection::Products)
            .reduce("totalStocks", Reducer::Sum(Field::Stock))
            .reduce(
                "lowStock",
                Reducer::ConditionalSum(Condition::new(Field::Stock, CompareOp::Lte, 10.0)),
            );

        let compiled = compile(&query).unwrap();
        assert!(compiled
            .sql
            .contains("COALESCE(SUM(\"stock\"), 0)::bigint AS \"totalStocks\""));
        assert!(compiled.sql.contains(
            "COALESCE(SUM(CASE WHEN \"stock\" <= 10 THEN 1 ELSE 0 END), 0)::bigint AS \"lowStock\""
        ));
        assert_eq!(compiled.value_columns[0].column_type, ColumnType::BigInt);
    }

    #[test]
    fn test_max_of_timestamp_decodes_as_timestamp() {
        let query = AggregationQuery::over(Collection::Orders)
            .group_by(GroupKey::Field(Field::UserId))
            .reduce("lastPurchaseDate", Reducer::Max(Field::OrderDate))
            .sort_by("userId", SortDirection::Desc);

        let compiled = compile(&query).unwrap();
        assert!(compiled.sql.starts_with("SELECT \"userId\" AS \"userId\", MAX(\"orderDate\")"));
        assert!(compiled.sql.contains(" GROUP BY \"userId\""));
        assert!(compiled.sql.ends_with(" ORDER BY \"userId\" DESC NULLS LAST"));
        assert_eq!(compiled.value_columns[0].column_type, ColumnType::Timestamp);
    }

    #[test]
    fn test_output_names_are_quoted() {
        let query = AggregationQuery::over(Collection::Orders)
            .reduce("odd\"name", Reducer::Count);

        let compiled = compile(&query).unwrap();
        assert!(compiled.sql.contains("AS \"odd\"\"name\""));
    }

    #[test]
    fn test_invalid_query_is_rejected_before_compiling() {
        let query = AggregationQuery::over(Collection::Users)
            .reduce("total", Reducer::Sum(Field::TotalAmount));

        assert!(matches!(
            compile(&query),
            Err(RepositoryError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_assemble_row_flattens_key() {
        let compiled = compile(&monthly_query()).unwrap();

        let row = compiled
            .assemble_row(
                vec![Scalar::Integer(2024), Scalar::Integer(3)],
                vec![Scalar::Decimal(125.5), Scalar::Integer(2)],
            )
            .unwrap();

        assert!(row.key.is_none());
        assert_eq!(row.i64("year").unwrap(), 2024);
        assert_eq!(row.i64("month").unwrap(), 3);
        assert_eq!(row.f64("revenue").unwrap(), 125.5);
        assert_eq!(row.i64("orders").unwrap(), 2);
    }

    #[test]
    fn test_assemble_row_keeps_key() {
        let query = AggregationQuery::over(Collection::Orders)
            .group_by(GroupKey::Field(Field::UserId))
            .reduce("orderCount", Reducer::Count);
        let compiled = compile(&query).unwrap();

        let row = compiled
            .assemble_row(vec![Scalar::Text("u1".to_string())], vec![Scalar::Integer(4)])
            .unwrap();

        assert_eq!(row.key, Some(GroupValue::Text("u1".to_string())));
        assert!(row.get("userId").is_none());
        assert_eq!(row.i64("orderCount").unwrap(), 4);
    }

    #[test]
    fn test_null_group_key_is_a_conversion_error() {
        let query = AggregationQuery::over(Collection::Orders)
            .group_by(GroupKey::Field(Field::UserId))
            .reduce("orderCount", Reducer::Count);
        let compiled = compile(&query).unwrap();

        let err = compiled
            .assemble_row(vec![Scalar::Null], vec![Scalar::Integer(1)])
            .unwrap_err();
        assert!(matches!(err, RepositoryError::DataConversionError(_)));
    }

    #[tokio::test]
    async fn test_unreachable_database_is_reported_unavailable() {
        let config = config::DatabaseConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            query_timeout_secs: 2,
            ..Default::default()
        };
        let pool = crate::pool::build_pool(&config).unwrap();
        let store = PgRecordStore::new(pool, config.query_timeout());

        let err = store.count(Collection::Users).await.unwrap_err();
        assert!(err.is_unavailable(), "unexpected error: {err}");
    }
}
