use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Text bound for the group filter when the caller asks for "No group".
pub const EMPTY_GROUP_SET: &str = "{}";
pub const NO_GROUP: &str = "No group";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dataset {
    Birth,
    Death,
    Marriage,
    Partnership,
}

impl Dataset {
    pub const ALL: [Dataset; 4] = [
        Dataset::Birth,
        Dataset::Death,
        Dataset::Marriage,
        Dataset::Partnership,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Dataset::Birth => "birth",
            Dataset::Death => "death",
            Dataset::Marriage => "marriage",
            Dataset::Partnership => "partnership",
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dataset {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "birth" => Ok(Dataset::Birth),
            "death" => Ok(Dataset::Death),
            "marriage" => Ok(Dataset::Marriage),
            "partnership" => Ok(Dataset::Partnership),
            other => Err(format!("unknown dataset: {other}")),
        }
    }
}

/// Groups to exclude from a count.
///
/// A single value excludes records whose group text contains it; a list
/// excludes records whose group set intersects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum WithoutGroups {
    One(String),
    Many(Vec<String>),
}

impl WithoutGroups {
    /// Empty values are dropped; nothing left means no exclusion.
    pub fn from_values(values: Vec<String>) -> Option<Self> {
        let mut values: Vec<String> = values.into_iter().filter(|v| !v.is_empty()).collect();
        match values.len() {
            0 => None,
            1 => values.pop().map(WithoutGroups::One),
            _ => Some(WithoutGroups::Many(values)),
        }
    }

    /// Always a list, even for a single value.
    pub fn list(values: Vec<String>) -> Option<Self> {
        let values: Vec<String> = values.into_iter().filter(|v| !v.is_empty()).collect();
        (!values.is_empty()).then_some(WithoutGroups::Many(values))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub from: Option<DateTime<Tz>>,
    pub to: Option<DateTime<Tz>>,
    pub group: Option<String>,
    pub without_groups: Option<WithoutGroups>,
}

impl Filter {
    #[cfg(test)]
    pub fn between(from: DateTime<Tz>, to: Option<DateTime<Tz>>) -> Self {
        Self {
            from: Some(from),
            to,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateTypeCount {
    pub date: NaiveDate,
    pub dataset: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeCount {
    pub dataset: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupCount {
    pub name: String,
    pub dataset: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserCount {
    pub date: NaiveDate,
    pub dataset: String,
    pub username: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyCount {
    pub count: i64,
    /// 1 for Saturday/Sunday, 0 otherwise.
    pub weekend: i32,
    pub hour: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyCount {
    pub month: DateTime<Utc>,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyPoint {
    /// Epoch milliseconds of local midnight.
    pub date: i64,
    pub usage: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySeries {
    pub name: Dataset,
    pub daily_usage: Vec<DailyPoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DatasetTotals {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub death: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marriage: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partnership: Option<i64>,
    pub total: i64,
}

impl DatasetTotals {
    pub fn set(&mut self, dataset: Dataset, count: i64) {
        let slot = match dataset {
            Dataset::Birth => &mut self.birth,
            Dataset::Death => &mut self.death,
            Dataset::Marriage => &mut self.marriage,
            Dataset::Partnership => &mut self.partnership,
        };
        *slot = Some(count);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupUsageRow {
    pub id: String,
    pub name: String,
    pub total: i64,
    pub parent: Option<String>,
    pub has_children: bool,
    pub birth: i64,
    pub death: i64,
    pub marriage: i64,
    pub partnership: i64,
}

impl GroupUsageRow {
    #[cfg(test)]
    pub fn count(&self, dataset: Dataset) -> i64 {
        match dataset {
            Dataset::Birth => self.birth,
            Dataset::Death => self.death,
            Dataset::Marriage => self.marriage,
            Dataset::Partnership => self.partnership,
        }
    }

    pub fn add(&mut self, dataset: Dataset, count: i64) {
        match dataset {
            Dataset::Birth => self.birth += count,
            Dataset::Death => self.death += count,
            Dataset::Marriage => self.marriage += count,
            Dataset::Partnership => self.partnership += count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourPoint {
    pub hour: u32,
    pub count: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyBucket {
    pub name: &'static str,
    pub colour: &'static str,
    pub data: Vec<HourPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CumulativePoint {
    /// Unix seconds.
    pub month: i64,
    pub count: i64,
}
