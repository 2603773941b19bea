//! Fixture-backed stand-in for the audit store, selected by mock mode.

use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;
use serde::Deserialize;

use crate::db::UsageSource;
use crate::error::{QueryError, QueryResult};
use crate::models::{
    DateTypeCount, Filter, GroupCount, HourlyCount, MonthlyCount, TypeCount, UserCount,
};
use crate::query;

const DAILY_COUNTS: &str = include_str!("../fixtures/daily-counts.json");
const DATASET_TOTALS: &str = include_str!("../fixtures/dataset-totals.json");
const GROUP_DATA: &str = include_str!("../fixtures/group-data.json");
const USER_COUNTS: &str = include_str!("../fixtures/user-counts.json");
const HOURLY_USAGE: &str = include_str!("../fixtures/hourly-usage.json");
const CUMULATIVE_USAGE: &str = include_str!("../fixtures/cumulative-usage.json");
const SEARCH_TOTALS: &str = include_str!("../fixtures/search-totals.json");

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchTotals {
    today: i64,
    all_time: i64,
}

#[derive(Debug, Clone)]
pub struct MockSource {
    daily: Vec<DateTypeCount>,
    totals: Vec<TypeCount>,
    groups: Vec<GroupCount>,
    users: Vec<UserCount>,
    hourly: Vec<HourlyCount>,
    cumulative: Vec<MonthlyCount>,
    searches: SearchTotals,
}

impl MockSource {
    pub fn load() -> QueryResult<Self> {
        let mut groups: Vec<GroupCount> = serde_json::from_str(GROUP_DATA)?;
        groups.sort_by(|a, b| query::group_order(&a.name, &b.name));

        Ok(Self {
            daily: serde_json::from_str(DAILY_COUNTS)?,
            totals: serde_json::from_str(DATASET_TOTALS)?,
            groups,
            users: serde_json::from_str(USER_COUNTS)?,
            hourly: serde_json::from_str(HOURLY_USAGE)?,
            cumulative: serde_json::from_str(CUMULATIVE_USAGE)?,
            searches: serde_json::from_str(SEARCH_TOTALS)?,
        })
    }
}

#[async_trait]
impl UsageSource for MockSource {
    async fn usage_by_date_type(&self, _filter: &Filter) -> QueryResult<Vec<DateTypeCount>> {
        Ok(self.daily.clone())
    }

    async fn usage_by_type(&self, _filter: &Filter) -> QueryResult<Vec<TypeCount>> {
        Ok(self.totals.clone())
    }

    async fn usage_by_group(&self, _filter: &Filter) -> QueryResult<Vec<GroupCount>> {
        Ok(self.groups.clone())
    }

    async fn usage_by_user(&self, _filter: &Filter) -> QueryResult<Vec<UserCount>> {
        Ok(self.users.clone())
    }

    async fn search_totals(
        &self,
        all_time: bool,
        _group: Option<&str>,
        _now: DateTime<Tz>,
    ) -> QueryResult<i64> {
        Ok(if all_time {
            self.searches.all_time
        } else {
            self.searches.today
        })
    }

    async fn search_with_group_filtering(&self, _filter: &Filter) -> QueryResult<i64> {
        Ok(self.totals.iter().map(|t| t.count).sum())
    }

    async fn hourly_usage(&self, filter: &Filter) -> QueryResult<Vec<HourlyCount>> {
        if filter.from.is_none() {
            return Err(QueryError::MissingFrom);
        }
        Ok(self.hourly.clone())
    }

    async fn cumulative_usage(&self) -> QueryResult<Vec<MonthlyCount>> {
        Ok(self.cumulative.clone())
    }
}
