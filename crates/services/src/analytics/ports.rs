use super::models::Report;
use crate::common::RepositoryError;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use std::{cmp::Ordering, collections::BTreeMap, sync::Arc};

/// The three record collections the engine reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Products,
    Orders,
}

impl Collection {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Products => "products",
            Self::Orders => "orders",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Decimal,
    Timestamp,
}

impl FieldKind {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Decimal)
    }
}

/// Record attributes that aggregation queries may reference.
///
/// Each field belongs to exactly one collection and carries its wire name,
/// which is also the column name in the persistent store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    UserId,
    TotalAmount,
    OrderDate,
    Stock,
}

impl Field {
    pub fn collection(&self) -> Collection {
        match self {
            Self::UserId | Self::TotalAmount | Self::OrderDate => Collection::Orders,
            Self::Stock => Collection::Products,
        }
    }

    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::UserId => "userId",
            Self::TotalAmount => "totalAmount",
            Self::OrderDate => "orderDate",
            Self::Stock => "stock",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Self::UserId => FieldKind::Text,
            Self::TotalAmount => FieldKind::Decimal,
            Self::OrderDate => FieldKind::Timestamp,
            Self::Stock => FieldKind::Integer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    pub fn matches(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Eq => lhs == rhs,
            Self::Lt => lhs < rhs,
            Self::Lte => lhs <= rhs,
            Self::Gt => lhs > rhs,
            Self::Gte => lhs >= rhs,
        }
    }

    pub fn sql_operator(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
        }
    }
}

/// `field <op> value` over a numeric field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Condition {
    pub field: Field,
    pub op: CompareOp,
    pub value: f64,
}

impl Condition {
    pub fn new(field: Field, op: CompareOp, value: impl Into<f64>) -> Self {
        Self {
            field,
            op,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reducer {
    Sum(Field),
    Average(Field),
    Max(Field),
    Count,
    /// Adds one for every record matching the condition
    ConditionalSum(Condition),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamedReducer {
    pub name: String,
    pub reducer: Reducer,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GroupKey {
    /// Every record falls into one group
    All,
    Field(Field),
    /// Calendar year and month of a timestamp field, in UTC
    YearMonth(Field),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Projection {
    #[default]
    KeepKey,
    /// Drop the group key and expose its components as sibling fields
    FlattenKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

/// A grouped aggregation over one collection
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationQuery {
    pub collection: Collection,
    pub group_by: GroupKey,
    pub reducers: Vec<NamedReducer>,
    pub projection: Projection,
    pub sort: Vec<SortSpec>,
}

impl AggregationQuery {
    /// Start a single-group query over `collection`
    pub fn over(collection: Collection) -> Self {
        Self {
            collection,
            group_by: GroupKey::All,
            reducers: Vec::new(),
            projection: Projection::KeepKey,
            sort: Vec::new(),
        }
    }

    pub fn group_by(mut self, key: GroupKey) -> Self {
        self.group_by = key;
        self
    }

    pub fn reduce(mut self, name: impl Into<String>, reducer: Reducer) -> Self {
        self.reducers.push(NamedReducer {
            name: name.into(),
            reducer,
        });
        self
    }

    pub fn flatten_key(mut self) -> Self {
        self.projection = Projection::FlattenKey;
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.push(SortSpec {
            field: field.into(),
            direction,
        });
        self
    }

    /// Names of the group key components, in output order
    pub fn key_columns(&self) -> Vec<&'static str> {
        match self.group_by {
            GroupKey::All => vec![],
            GroupKey::Field(field) => vec![field.wire_name()],
            GroupKey::YearMonth(_) => vec!["year", "month"],
        }
    }

    /// Reject queries that reference fields of another collection, apply a
    /// reducer to a field of the wrong kind, or sort on an unknown name.
    pub fn validate(&self) -> Result<(), RepositoryError> {
        let check_field = |field: Field| -> Result<(), RepositoryError> {
            if field.collection() != self.collection {
                return Err(RepositoryError::ValidationFailed(format!(
                    "field '{}' does not belong to collection '{}'",
                    field.wire_name(),
                    self.collection.name()
                )));
            }
            Ok(())
        };

        match self.group_by {
            GroupKey::All => {}
            GroupKey::Field(field) => {
                check_field(field)?;
                if !matches!(field.kind(), FieldKind::Text | FieldKind::Integer) {
                    return Err(RepositoryError::ValidationFailed(format!(
                        "cannot group by '{}'",
                        field.wire_name()
                    )));
                }
            }
            GroupKey::YearMonth(field) => {
                check_field(field)?;
                if field.kind() != FieldKind::Timestamp {
                    return Err(RepositoryError::ValidationFailed(format!(
                        "'{}' is not a timestamp",
                        field.wire_name()
                    )));
                }
            }
        }

        if self.reducers.is_empty() {
            return Err(RepositoryError::ValidationFailed(
                "aggregation needs at least one reducer".to_string(),
            ));
        }

        let key_columns = self.key_columns();
        let mut names: Vec<&str> = key_columns.clone();
        for named in &self.reducers {
            if named.name.is_empty() || names.contains(&named.name.as_str()) {
                return Err(RepositoryError::ValidationFailed(format!(
                    "duplicate or empty output name '{}'",
                    named.name
                )));
            }
            names.push(&named.name);

            match named.reducer {
                Reducer::Sum(field) | Reducer::Average(field) => {
                    check_field(field)?;
                    if !field.kind().is_numeric() {
                        return Err(RepositoryError::ValidationFailed(format!(
                            "'{}' is not numeric",
                            field.wire_name()
                        )));
                    }
                }
                Reducer::Max(field) => {
                    check_field(field)?;
                    if field.kind() == FieldKind::Text {
                        return Err(RepositoryError::ValidationFailed(format!(
                            "cannot take max of '{}'",
                            field.wire_name()
                        )));
                    }
                }
                Reducer::ConditionalSum(condition) => {
                    check_field(condition.field)?;
                    if !condition.field.kind().is_numeric() || !condition.value.is_finite() {
                        return Err(RepositoryError::ValidationFailed(format!(
                            "invalid condition on '{}'",
                            condition.field.wire_name()
                        )));
                    }
                }
                Reducer::Count => {}
            }
        }

        for spec in &self.sort {
            if !names.contains(&spec.field.as_str()) {
                return Err(RepositoryError::ValidationFailed(format!(
                    "cannot sort on unknown field '{}'",
                    spec.field
                )));
            }
        }

        Ok(())
    }
}

/// A single value in an aggregation result
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Integer(i64),
    Decimal(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl Scalar {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Decimal(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            Self::Decimal(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Integer(_) | Self::Decimal(_) => 1,
            Self::Text(_) => 2,
            Self::Timestamp(_) => 3,
        }
    }

    /// Total order used for sorting result rows; nulls sort first
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Timestamp(a), Self::Timestamp(b)) => a.cmp(b),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                _ => a.rank().cmp(&b.rank()),
            },
        }
    }
}

/// Identity of a result group, when the key is kept on the row
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GroupValue {
    All,
    Text(String),
    Integer(i64),
    YearMonth { year: i32, month: u32 },
}

impl GroupValue {
    pub fn year_month(ts: &DateTime<Utc>) -> Self {
        Self::YearMonth {
            year: ts.year(),
            month: ts.month(),
        }
    }

    /// Key components as named fields, as exposed by `Projection::FlattenKey`
    pub fn flatten(self, group_by: &GroupKey) -> Vec<(String, Scalar)> {
        match (self, group_by) {
            (Self::YearMonth { year, month }, _) => vec![
                ("year".to_string(), Scalar::Integer(year as i64)),
                ("month".to_string(), Scalar::Integer(month as i64)),
            ],
            (Self::Text(value), GroupKey::Field(field)) => {
                vec![(field.wire_name().to_string(), Scalar::Text(value))]
            }
            (Self::Integer(value), GroupKey::Field(field)) => {
                vec![(field.wire_name().to_string(), Scalar::Integer(value))]
            }
            _ => vec![],
        }
    }
}

/// One group of an aggregation result
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRow {
    /// `None` once the key has been projected away
    pub key: Option<GroupValue>,
    pub values: BTreeMap<String, Scalar>,
}

impl AggregateRow {
    pub fn get(&self, name: &str) -> Option<&Scalar> {
        self.values.get(name)
    }

    fn conversion_error(&self, name: &str, expected: &str) -> RepositoryError {
        RepositoryError::DataConversionError(anyhow::anyhow!(
            "field '{name}' is not {expected}: {:?}",
            self.values.get(name)
        ))
    }

    pub fn f64(&self, name: &str) -> Result<f64, RepositoryError> {
        self.get(name)
            .and_then(Scalar::as_f64)
            .ok_or_else(|| self.conversion_error(name, "a number"))
    }

    pub fn i64(&self, name: &str) -> Result<i64, RepositoryError> {
        self.get(name)
            .and_then(Scalar::as_i64)
            .ok_or_else(|| self.conversion_error(name, "an integer"))
    }

    pub fn timestamp(&self, name: &str) -> Result<DateTime<Utc>, RepositoryError> {
        self.get(name)
            .and_then(Scalar::as_timestamp)
            .ok_or_else(|| self.conversion_error(name, "a timestamp"))
    }

    pub fn text(&self, name: &str) -> Result<String, RepositoryError> {
        self.get(name)
            .and_then(Scalar::as_str)
            .map(str::to_string)
            .ok_or_else(|| self.conversion_error(name, "text"))
    }
}

/// Read-only access to the users, products and orders collections.
///
/// Implementations do not retry; connection failures and timeouts are
/// returned to the caller as-is.
#[cfg_attr(any(test, feature = "test-mocks"), mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Number of records in a collection
    async fn count(&self, collection: Collection) -> Result<i64, RepositoryError>;

    /// Run a grouped aggregation. A single-group query over an empty
    /// collection yields no rows.
    async fn aggregate(
        &self,
        query: &AggregationQuery,
    ) -> Result<Vec<AggregateRow>, RepositoryError>;
}

/// Holder of the most recently assembled report
#[async_trait]
pub trait ReportCache: Send + Sync {
    /// The cached report, or `None` if nothing is cached or it has expired
    async fn get(&self) -> Option<Arc<Report>>;

    /// Replace the cached report, restarting its time-to-live
    async fn put(&self, report: Arc<Report>);
}

#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    #[error("Record store unavailable: {0}")]
    StoreUnavailable(#[source] RepositoryError),
    #[error("Failed to compute analytics: {0}")]
    Computation(String),
}

impl From<RepositoryError> for AnalyticsError {
    fn from(err: RepositoryError) -> Self {
        if err.is_unavailable() {
            Self::StoreUnavailable(err)
        } else {
            Self::Computation(err.to_string())
        }
    }
}

/// Where a served report came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportSource {
    Cached,
    Computed,
}

#[derive(Debug, Clone)]
pub struct DashboardAnalytics {
    pub report: Arc<Report>,
    pub source: ReportSource,
}

#[cfg_attr(any(test, feature = "test-mocks"), mockall::automock)]
#[async_trait]
pub trait AnalyticsServiceTrait: Send + Sync {
    /// Serve the dashboard report, assembling a fresh one on a cache miss
    async fn get_dashboard_analytics(&self) -> Result<DashboardAnalytics, AnalyticsError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_field_from_other_collection() {
        let query = AggregationQuery::over(Collection::Products)
            .reduce("revenue", Reducer::Sum(Field::TotalAmount));

        assert!(matches!(
            query.validate(),
            Err(RepositoryError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_validate_rejects_unknown_sort_field() {
        let query = AggregationQuery::over(Collection::Orders)
            .group_by(GroupKey::YearMonth(Field::OrderDate))
            .reduce("orders", Reducer::Count)
            .flatten_key()
            .sort_by("day", SortDirection::Asc);

        assert!(query.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_key_columns_for_sorting() {
        let query = AggregationQuery::over(Collection::Orders)
            .group_by(GroupKey::YearMonth(Field::OrderDate))
            .reduce("orders", Reducer::Count)
            .flatten_key()
            .sort_by("year", SortDirection::Asc)
            .sort_by("month", SortDirection::Asc);

        assert!(query.validate().is_ok());
        assert_eq!(query.key_columns(), vec!["year", "month"]);
    }

    #[test]
    fn test_validate_rejects_duplicate_output_names() {
        let query = AggregationQuery::over(Collection::Orders)
            .group_by(GroupKey::Field(Field::UserId))
            .reduce("userId", Reducer::Count);

        assert!(query.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_sum_of_timestamp() {
        let query =
            AggregationQuery::over(Collection::Orders).reduce("x", Reducer::Sum(Field::OrderDate));

        assert!(query.validate().is_err());
    }

    #[test]
    fn test_scalar_ordering_mixes_numbers() {
        assert_eq!(
            Scalar::Integer(2).total_cmp(&Scalar::Decimal(2.5)),
            Ordering::Less
        );
        assert_eq!(Scalar::Null.total_cmp(&Scalar::Integer(0)), Ordering::Less);
    }

    #[test]
    fn test_repository_errors_are_classified() {
        let unavailable: AnalyticsError =
            RepositoryError::ConnectionFailed("connection refused".into()).into();
        assert!(matches!(unavailable, AnalyticsError::StoreUnavailable(_)));

        let malformed: AnalyticsError =
            RepositoryError::DataConversionError(anyhow::anyhow!("null sum")).into();
        assert!(matches!(malformed, AnalyticsError::Computation(_)));
    }
}
