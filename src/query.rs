//! SQL for every aggregation the report needs. Nothing here touches the
//! store: each builder returns the statement text with `$(name)`
//! placeholders plus the parameters that were actually supplied.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::calendar;
use crate::error::{QueryError, QueryResult};
use crate::models::{Filter, WithoutGroups};
use crate::sql::{all_of, BoundQuery, Param, Params, Statement};

const AUDIT_TABLE: &str = "lev_audit";
const COUNT: &str = "count(*)::INTEGER";

const FROM_BOUND: &str = "date_time >= $(from)";
const TO_BOUND: &str = "date_time < $(to)";
const GROUP_MATCH: &str = "groups::TEXT ILIKE '%' || $(group) || '%'";
const WITHOUT_ANY_OF: &str = "NOT (groups && $(withoutGroups))";
const WITHOUT_MATCH: &str = "groups::TEXT NOT ILIKE '%' || $(withoutGroups) || '%'";
const EMPTY_GROUPS: &str = "groups='{}'";

/// Group names under this prefix sort ahead of every other group.
const TOP_LEVEL_PREFIX: &str = "/Team";
const GROUP_ORDER: &str = "name~'^/Team' desc, name";

const MONITORING_EXCLUSION: &str = "groups::TEXT NOT LIKE '/Monitor%' AND client = 'lev-web'";
const LOCAL_HOUR: &str = "TO_CHAR(date_time AT TIME ZONE 'europe/london', 'HH24')::INTEGER AS hour,\n    TO_CHAR(date_time AT TIME ZONE 'europe/london', 'DAY') LIKE 'S%' AS weekend";

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn timestamp(value: Option<DateTime<Tz>>) -> Option<Param> {
    value.map(|v| Param::Timestamp(v.with_timezone(&Utc)))
}

fn from_bound(filter: &Filter) -> Option<String> {
    filter.from.map(|_| FROM_BOUND.to_string())
}

fn to_bound(filter: &Filter) -> Option<String> {
    filter.to.map(|_| TO_BOUND.to_string())
}

fn group_match(filter: &Filter) -> Option<String> {
    present(filter.group.as_deref()).map(|_| GROUP_MATCH.to_string())
}

fn without_groups(filter: &Filter) -> Option<String> {
    filter.without_groups.as_ref().map(|w| match w {
        WithoutGroups::Many(_) => WITHOUT_ANY_OF.to_string(),
        WithoutGroups::One(_) => WITHOUT_MATCH.to_string(),
    })
}

fn range_params(filter: &Filter) -> Params {
    Params::new()
        .with("from", timestamp(filter.from))
        .with("to", timestamp(filter.to))
}

fn group_params(filter: &Filter) -> Params {
    range_params(filter).with(
        "group",
        present(filter.group.as_deref()).map(|g| Param::Text(g.to_string())),
    )
}

fn filter_params(filter: &Filter) -> Params {
    group_params(filter).with(
        "withoutGroups",
        filter.without_groups.as_ref().map(|w| match w {
            WithoutGroups::Many(groups) => Param::TextArray(groups.clone()),
            WithoutGroups::One(group) => Param::Text(group.clone()),
        }),
    )
}

/// Daily counts per dataset, oldest day first.
pub fn usage_by_date_type(filter: &Filter) -> BoundQuery {
    let sql = Statement::new()
        .clause("SELECT", Some(format!("date_time::DATE AS date, dataset, {COUNT}")))
        .clause("FROM", Some(AUDIT_TABLE))
        .clause(
            "WHERE",
            all_of([
                from_bound(filter),
                to_bound(filter),
                group_match(filter),
                without_groups(filter),
            ]),
        )
        .clause("GROUP BY", Some("date, dataset"))
        .clause("ORDER BY", Some("date"))
        .render();
    BoundQuery::new(sql, filter_params(filter))
}

pub fn usage_by_type(filter: &Filter) -> BoundQuery {
    let sql = Statement::new()
        .clause("SELECT", Some(format!("dataset, {COUNT}")))
        .clause("FROM", Some(AUDIT_TABLE))
        .clause("WHERE", all_of([from_bound(filter), to_bound(filter)]))
        .clause("GROUP BY", Some("dataset"))
        .render();
    BoundQuery::new(sql, range_params(filter))
}

/// Counts per group tag and dataset, with records that carry no tag at all
/// reported under the synthetic "No group" name.
pub fn usage_by_group(filter: &Filter) -> BoundQuery {
    let range = || all_of([from_bound(filter), to_bound(filter)]);
    let tagged = Statement::new()
        .separator("\n    ")
        .clause("SELECT", Some("UNNEST(groups) AS name, dataset, COUNT(*)"))
        .clause("FROM", Some(AUDIT_TABLE))
        .clause("WHERE", range())
        .clause("GROUP BY", Some("name, dataset"))
        .render();
    let untagged = Statement::new()
        .separator("\n    ")
        .clause("SELECT", Some("'No group' AS name, dataset, COUNT(*)"))
        .clause("FROM", Some(AUDIT_TABLE))
        .clause("WHERE", all_of([Some(EMPTY_GROUPS.to_string()), range()]))
        .clause("GROUP BY", Some("name, dataset"))
        .render();

    let sql = Statement::new()
        .clause("SELECT", Some("name, dataset, SUM(count)::INTEGER AS count"))
        .clause(
            "FROM",
            Some(format!("(\n  {tagged}\n  UNION\n  {untagged}\n) AS counts")),
        )
        .clause("GROUP BY", Some("name, dataset"))
        .clause("ORDER BY", Some(GROUP_ORDER))
        .render();
    BoundQuery::new(sql, range_params(filter))
}

/// The ordering `usage_by_group` asks the store for, for rows that did not
/// come from the store.
pub fn group_order(a: &str, b: &str) -> Ordering {
    let top_level = |name: &str| name.starts_with(TOP_LEVEL_PREFIX);
    top_level(b).cmp(&top_level(a)).then_with(|| a.cmp(b))
}

pub fn usage_by_user(filter: &Filter) -> BoundQuery {
    let sql = Statement::new()
        .clause(
            "SELECT",
            Some(format!("date_time::DATE AS date, dataset, username, {COUNT}")),
        )
        .clause("FROM", Some(AUDIT_TABLE))
        .clause("WHERE", all_of([from_bound(filter), to_bound(filter)]))
        .clause("GROUP BY", Some("date, dataset, username"))
        .clause("ORDER BY", Some("date"))
        .render();
    BoundQuery::new(sql, range_params(filter))
}

/// Either the all-time count or the count since local midnight of `now`.
pub fn search_totals(all_time: bool, group: Option<&str>, now: DateTime<Tz>) -> BoundQuery {
    let filter = Filter {
        from: (!all_time).then(|| calendar::start_of_day(now)),
        group: present(group).map(str::to_string),
        ..Filter::default()
    };
    let sql = Statement::new()
        .separator(" ")
        .clause("SELECT", Some(COUNT))
        .clause("FROM", Some(AUDIT_TABLE))
        .clause("WHERE", all_of([from_bound(&filter), group_match(&filter)]))
        .render();
    BoundQuery::new(sql, group_params(&filter))
}

pub fn search_with_group_filtering(filter: &Filter) -> BoundQuery {
    let sql = Statement::new()
        .clause("SELECT", Some(COUNT))
        .clause("FROM", Some(AUDIT_TABLE))
        .clause(
            "WHERE",
            all_of([
                from_bound(filter),
                to_bound(filter),
                group_match(filter),
                without_groups(filter),
            ]),
        )
        .render();
    BoundQuery::new(sql, filter_params(filter))
}

/// Counts per local hour, split weekday/weekend.
///
/// Requires a lower bound; a missing `from` fails before any statement is
/// built.
pub fn hourly_usage(filter: &Filter) -> QueryResult<BoundQuery> {
    if filter.from.is_none() {
        return Err(QueryError::MissingFrom);
    }

    let audience = group_match(filter).or_else(|| Some(MONITORING_EXCLUSION.to_string()));
    let inner = Statement::new()
        .separator("\n  ")
        .clause("SELECT", Some(LOCAL_HOUR))
        .clause("FROM", Some(AUDIT_TABLE))
        .clause(
            "WHERE",
            all_of([from_bound(filter), to_bound(filter), audience]),
        )
        .render();

    let sql = Statement::new()
        .clause("SELECT", Some("COUNT(*)::INTEGER, weekend::INTEGER, hour"))
        .clause("FROM", Some(format!("(\n  {inner}\n) AS counts")))
        .clause("GROUP BY", Some("weekend, hour"))
        .render();
    Ok(BoundQuery::new(sql, group_params(filter)))
}

/// Running total of records per calendar month since the first record.
pub fn cumulative_usage() -> BoundQuery {
    let months = "SELECT GENERATE_SERIES(DATE_TRUNC('month', MIN(date_time)), DATE_TRUNC('month', NOW()), '1 month'::INTERVAL) AS month\n    FROM lev_audit";
    let sql = Statement::new()
        .clause(
            "SELECT",
            Some("month, (SUM(count) OVER (ORDER BY month))::BIGINT AS count"),
        )
        .clause(
            "FROM",
            Some(format!(
                "(\n  SELECT COUNT(c.*) AS count, months.month AS month\n  FROM lev_audit AS c\n  JOIN (\n    {months}\n  ) AS months\n  ON c.date_time < months.month AND c.date_time >= (months.month - '1 month'::INTERVAL)\n  GROUP BY 2\n) AS counts"
            )),
        )
        .clause("ORDER BY", Some("month"))
        .render();
    BoundQuery::new(sql, Params::new())
}
