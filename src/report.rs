use std::io;

use chrono::DateTime;
use chrono_tz::Tz;
use serde::Serialize;
use uuid::Uuid;

use crate::aggregate;
use crate::calendar;
use crate::db::UsageSource;
use crate::error::{QueryError, QueryResult};
use crate::models::{
    DailySeries, DatasetTotals, Filter, GroupUsageRow, HourlyBucket, UserCount, WithoutGroups,
};

/// A validated report request: the filter sent to the store plus the group
/// text as the caller typed it, echoed back in the report.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRequest {
    pub filter: Filter,
    pub group_text: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub from: Option<String>,
    pub to: Option<String>,
    pub dates: Vec<i64>,
    pub datasets: Vec<DailySeries>,
    pub groups: Vec<GroupUsageRow>,
    pub totals: Option<DatasetTotals>,
    pub current_group: Option<String>,
    pub total: i64,
    pub hourly_usage: Vec<HourlyBucket>,
    pub without_groups: Option<WithoutGroups>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub today: i64,
    pub all_time: i64,
    pub current_group: Option<String>,
}

pub async fn daily_usage(
    source: &dyn UsageSource,
    filter: &Filter,
    tz: Tz,
) -> QueryResult<Vec<DailySeries>> {
    let rows = source.usage_by_date_type(filter).await?;
    Ok(aggregate::daily_usage(&rows, tz))
}

pub async fn dataset_usage(
    source: &dyn UsageSource,
    filter: &Filter,
) -> QueryResult<Option<DatasetTotals>> {
    let rows = source.usage_by_type(filter).await?;
    Ok(aggregate::dataset_usage(&rows))
}

pub async fn group_usage(
    source: &dyn UsageSource,
    filter: &Filter,
) -> QueryResult<Vec<GroupUsageRow>> {
    let rows = source.usage_by_group(filter).await?;
    Ok(aggregate::group_usage(&rows))
}

/// Hourly averages over the days from `from` through `to`, or through today
/// when the range is open.
pub async fn hourly_usage(
    source: &dyn UsageSource,
    filter: &Filter,
    now: DateTime<Tz>,
) -> QueryResult<Vec<HourlyBucket>> {
    let from = filter.from.ok_or(QueryError::MissingFrom)?;
    let to = filter.to.unwrap_or(now);
    let days = calendar::day_counts(from.date_naive(), to.date_naive());

    let rows = source.hourly_usage(filter).await?;
    Ok(aggregate::hourly_usage(days, &rows))
}

/// Runs every aggregation for one report concurrently; the first failure
/// fails the whole report.
#[tracing::instrument(
    name = "report.build",
    skip_all,
    fields(report_id = %Uuid::new_v4(), group = ?request.group_text)
)]
pub async fn build(
    source: &dyn UsageSource,
    request: &ReportRequest,
    now: DateTime<Tz>,
) -> QueryResult<Report> {
    let filter = &request.filter;
    let tz = now.timezone();

    let (datasets, totals, groups, total, hourly_usage) = tokio::try_join!(
        daily_usage(source, filter, tz),
        dataset_usage(source, filter),
        group_usage(source, filter),
        source.search_with_group_filtering(filter),
        hourly_usage(source, filter, now),
    )?;

    let end = filter.to.unwrap_or_else(|| calendar::end_of_day(now));
    let dates = filter
        .from
        .map(|from| calendar::dates_in_range(from, end))
        .unwrap_or_default();
    tracing::debug!(days = dates.len(), total, "Report assembled");

    Ok(Report {
        from: filter.from.map(|f| f.to_rfc3339()),
        to: filter.to.map(|t| t.to_rfc3339()),
        dates,
        datasets,
        groups,
        totals,
        current_group: request.group_text.clone(),
        total,
        hourly_usage,
        without_groups: filter.without_groups.clone(),
    })
}

pub async fn dashboard(
    source: &dyn UsageSource,
    group: Option<&str>,
    group_text: Option<String>,
    now: DateTime<Tz>,
) -> QueryResult<Dashboard> {
    let (today, all_time) = tokio::try_join!(
        source.search_totals(false, group, now),
        source.search_totals(true, group, now),
    )?;
    Ok(Dashboard {
        today,
        all_time,
        current_group: group_text,
    })
}

/// Writes per-user counts as CSV with a header row and returns the number of
/// rows written.
pub fn write_user_csv<W: io::Write>(rows: &[UserCount], out: W) -> anyhow::Result<usize> {
    let mut writer = csv::Writer::from_writer(out);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(rows.len())
}
