use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::Span;

use crate::error::{QueryError, QueryResult};
use crate::models::{
    DateTypeCount, Filter, GroupCount, HourlyCount, MonthlyCount, TypeCount, UserCount,
};
use crate::query;
use crate::sql::BoundQuery;

/// Everything the report needs from the audit store.
#[async_trait]
pub trait UsageSource: Send + Sync {
    async fn usage_by_date_type(&self, filter: &Filter) -> QueryResult<Vec<DateTypeCount>>;

    async fn usage_by_type(&self, filter: &Filter) -> QueryResult<Vec<TypeCount>>;

    async fn usage_by_group(&self, filter: &Filter) -> QueryResult<Vec<GroupCount>>;

    async fn usage_by_user(&self, filter: &Filter) -> QueryResult<Vec<UserCount>>;

    /// All-time count, or the count since local midnight of `now`.
    async fn search_totals(
        &self,
        all_time: bool,
        group: Option<&str>,
        now: DateTime<Tz>,
    ) -> QueryResult<i64>;

    async fn search_with_group_filtering(&self, filter: &Filter) -> QueryResult<i64>;

    /// Fails with [`QueryError::MissingFrom`] without touching the store
    /// when the filter has no lower bound.
    async fn hourly_usage(&self, filter: &Filter) -> QueryResult<Vec<HourlyCount>>;

    async fn cumulative_usage(&self) -> QueryResult<Vec<MonthlyCount>>;
}

pub struct PostgresSource {
    pool: PgPool,
    span: Span,
}

fn describe_range(filter: &Filter) -> String {
    let from = filter
        .from
        .map(|f| f.to_rfc3339())
        .unwrap_or_else(|| "the beginning".to_string());
    let to = filter
        .to
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "now".to_string());
    format!("{from} and {to}")
}

fn count(row: &PgRow) -> Result<i64, sqlx::Error> {
    row.try_get::<i32, _>("count").map(i64::from)
}

impl PostgresSource {
    /// Store failures are logged under `span`.
    pub fn new(pool: PgPool, span: Span) -> Self {
        Self { pool, span }
    }

    async fn fetch_all(&self, bound: &BoundQuery) -> Result<Vec<PgRow>, FetchError> {
        let (sql, params) = bound.positional()?;
        let query = params
            .into_iter()
            .fold(sqlx::query(&sql), |query, param| param.bind_to(query));
        Ok(query.fetch_all(&self.pool).await?)
    }

    async fn fetch_one(&self, bound: &BoundQuery) -> Result<PgRow, FetchError> {
        let (sql, params) = bound.positional()?;
        let query = params
            .into_iter()
            .fold(sqlx::query(&sql), |query, param| param.bind_to(query));
        Ok(query.fetch_one(&self.pool).await?)
    }

    fn failed(&self, err: FetchError, context: String) -> QueryError {
        match err {
            FetchError::Query(err) => err,
            FetchError::Store(err) => {
                tracing::error!(parent: &self.span, error = %err, "{context}");
                QueryError::FetchFailed
            }
        }
    }
}

enum FetchError {
    Query(QueryError),
    Store(sqlx::Error),
}

impl From<QueryError> for FetchError {
    fn from(err: QueryError) -> Self {
        FetchError::Query(err)
    }
}

impl From<sqlx::Error> for FetchError {
    fn from(err: sqlx::Error) -> Self {
        FetchError::Store(err)
    }
}

#[async_trait]
impl UsageSource for PostgresSource {
    async fn usage_by_date_type(&self, filter: &Filter) -> QueryResult<Vec<DateTypeCount>> {
        let bound = query::usage_by_date_type(filter);
        let rows = async {
            let rows = self.fetch_all(&bound).await?;
            rows.iter()
                .map(|row| -> Result<_, FetchError> {
                    Ok(DateTypeCount {
                        date: row.try_get("date")?,
                        dataset: row.try_get("dataset")?,
                        count: count(row)?,
                    })
                })
                .collect::<Result<Vec<_>, FetchError>>()
        }
        .await;

        rows.map_err(|err| {
            self.failed(
                err,
                format!(
                    "Problem retrieving counts for datatypes by day between: {}",
                    describe_range(filter)
                ),
            )
        })
    }

    async fn usage_by_type(&self, filter: &Filter) -> QueryResult<Vec<TypeCount>> {
        let bound = query::usage_by_type(filter);
        let rows = async {
            let rows = self.fetch_all(&bound).await?;
            rows.iter()
                .map(|row| -> Result<_, FetchError> {
                    Ok(TypeCount {
                        dataset: row.try_get("dataset")?,
                        count: count(row)?,
                    })
                })
                .collect::<Result<Vec<_>, FetchError>>()
        }
        .await;

        rows.map_err(|err| {
            self.failed(
                err,
                format!(
                    "Problem retrieving counts for datatypes between: {}",
                    describe_range(filter)
                ),
            )
        })
    }

    async fn usage_by_group(&self, filter: &Filter) -> QueryResult<Vec<GroupCount>> {
        let bound = query::usage_by_group(filter);
        let rows = async {
            let rows = self.fetch_all(&bound).await?;
            rows.iter()
                .map(|row| -> Result<_, FetchError> {
                    Ok(GroupCount {
                        name: row.try_get("name")?,
                        dataset: row.try_get("dataset")?,
                        count: count(row)?,
                    })
                })
                .collect::<Result<Vec<_>, FetchError>>()
        }
        .await;

        rows.map_err(|err| {
            self.failed(
                err,
                format!(
                    "Problem retrieving counts for groups between: {}",
                    describe_range(filter)
                ),
            )
        })
    }

    async fn usage_by_user(&self, filter: &Filter) -> QueryResult<Vec<UserCount>> {
        let bound = query::usage_by_user(filter);
        let rows = async {
            let rows = self.fetch_all(&bound).await?;
            rows.iter()
                .map(|row| -> Result<_, FetchError> {
                    Ok(UserCount {
                        date: row.try_get("date")?,
                        dataset: row.try_get("dataset")?,
                        username: row.try_get("username")?,
                        count: count(row)?,
                    })
                })
                .collect::<Result<Vec<_>, FetchError>>()
        }
        .await;

        rows.map_err(|err| {
            self.failed(
                err,
                format!(
                    "Problem retrieving counts for users between: {}",
                    describe_range(filter)
                ),
            )
        })
    }

    async fn search_totals(
        &self,
        all_time: bool,
        group: Option<&str>,
        now: DateTime<Tz>,
    ) -> QueryResult<i64> {
        let bound = query::search_totals(all_time, group, now);
        let total = async {
            let row = self.fetch_one(&bound).await?;
            Ok::<_, FetchError>(count(&row)?)
        }
        .await;

        total.map_err(|err| {
            let period = if all_time {
                "an all time count"
            } else {
                "a count for today"
            };
            let scope = match group {
                Some(group) => format!(" of group {group}"),
                None => " with no group selected".to_string(),
            };
            self.failed(err, format!("Problem retrieving {period}{scope}"))
        })
    }

    async fn search_with_group_filtering(&self, filter: &Filter) -> QueryResult<i64> {
        let bound = query::search_with_group_filtering(filter);
        let total = async {
            let row = self.fetch_one(&bound).await?;
            Ok::<_, FetchError>(count(&row)?)
        }
        .await;

        total.map_err(|err| {
            self.failed(
                err,
                format!(
                    "Problem retrieving a filtered search count between: {} (group: {}, without: {:?})",
                    describe_range(filter),
                    filter.group.as_deref().unwrap_or("any"),
                    filter.without_groups
                ),
            )
        })
    }

    async fn hourly_usage(&self, filter: &Filter) -> QueryResult<Vec<HourlyCount>> {
        let bound = query::hourly_usage(filter)?;
        let rows = async {
            let rows = self.fetch_all(&bound).await?;
            rows.iter()
                .map(|row| -> Result<_, FetchError> {
                    Ok(HourlyCount {
                        count: count(row)?,
                        weekend: row.try_get("weekend")?,
                        hour: row.try_get("hour")?,
                    })
                })
                .collect::<Result<Vec<_>, FetchError>>()
        }
        .await;

        rows.map_err(|err| {
            self.failed(
                err,
                format!(
                    "Problem retrieving hourly usage between: {}",
                    describe_range(filter)
                ),
            )
        })
    }

    async fn cumulative_usage(&self) -> QueryResult<Vec<MonthlyCount>> {
        let bound = query::cumulative_usage();
        let rows = async {
            let rows = self.fetch_all(&bound).await?;
            rows.iter()
                .map(|row| -> Result<_, FetchError> {
                    Ok(MonthlyCount {
                        month: row.try_get::<DateTime<Utc>, _>("month")?,
                        count: row.try_get("count")?,
                    })
                })
                .collect::<Result<Vec<_>, FetchError>>()
        }
        .await;

        rows.map_err(|err| self.failed(err, "Problem retrieving cumulative usage".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    fn unreachable_source() -> PostgresSource {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(std::time::Duration::from_millis(200))
            .connect_lazy("postgres://nobody@127.0.0.1:1/none")
            .unwrap();
        PostgresSource::new(pool, Span::none())
    }

    #[tokio::test]
    async fn hourly_usage_without_from_never_reaches_the_store() {
        let source = unreachable_source();
        let result = source.hourly_usage(&Filter::default()).await;
        assert!(matches!(result, Err(QueryError::MissingFrom)));
    }

    #[tokio::test]
    async fn store_failures_collapse_into_fetch_failed() {
        let source = unreachable_source();
        let result = source.cumulative_usage().await;
        assert!(matches!(result, Err(QueryError::FetchFailed)));
    }

    #[test]
    fn ranges_describe_open_ends() {
        assert_eq!(describe_range(&Filter::default()), "the beginning and now");
    }
}
