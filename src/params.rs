//! Query-string binding for report requests.

use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;

use crate::calendar;
use crate::error::ApiError;
use crate::models::{Filter, WithoutGroups, EMPTY_GROUP_SET, NO_GROUP};
use crate::report::ReportRequest;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

const FROM_MESSAGE: &str = "Must provide \"from\" date parameter, and optionally a \"to\" date";
const TO_MESSAGE: &str = "Make sure the date format is \"YYYY-MM-DD\" (time is ignored)";

/// Raw report parameters, before validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub current_group: Option<String>,
    pub without_groups: Vec<String>,
    /// Set when `withoutGroups[]` was used, which always binds as a list.
    pub without_groups_list: bool,
}

impl ReportQuery {
    /// `withoutGroups` may repeat, or be sent as `withoutGroups[]`; every other
    /// key keeps its last value.
    pub fn parse(raw: Option<&str>) -> Self {
        let mut query = Self::default();
        for (key, value) in url::form_urlencoded::parse(raw.unwrap_or_default().as_bytes()) {
            let value = value.into_owned();
            match key.as_ref() {
                "from" => query.from = Some(value),
                "to" => query.to = Some(value),
                "currentGroup" => query.current_group = Some(value),
                "withoutGroups" => query.without_groups.push(value),
                "withoutGroups[]" => {
                    query.without_groups.push(value);
                    query.without_groups_list = true;
                }
                _ => {}
            }
        }
        query
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateValidation {
    /// Malformed dates are a bad request.
    Strict,
    /// Malformed dates are treated as missing.
    Lenient,
}

/// Parses an exact `YYYY-MM-DD` date as local midnight in `tz`.
pub fn parse_date(value: &str, tz: Tz) -> Option<DateTime<Tz>> {
    let shaped = value.len() == 10
        && value.bytes().enumerate().all(|(i, b)| match i {
            4 | 7 => b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !shaped {
        return None;
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .ok()
        .and_then(|date| calendar::local_midnight(date, tz))
}

fn checked_date(
    value: Option<&str>,
    validation: DateValidation,
    tz: Tz,
    message: &str,
) -> Result<Option<DateTime<Tz>>, ApiError> {
    let Some(value) = value.filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    match (parse_date(value, tz), validation) {
        (Some(date), _) => Ok(Some(date)),
        (None, DateValidation::Strict) => Err(ApiError::BadRequest(message.to_string())),
        (None, DateValidation::Lenient) => {
            tracing::debug!(value, "Ignoring malformed date parameter");
            Ok(None)
        }
    }
}

/// The group value sent to the store: "No group" becomes the empty set.
pub fn group_filter(group: Option<&str>) -> Option<String> {
    group.filter(|g| !g.is_empty()).map(|g| {
        if g == NO_GROUP {
            EMPTY_GROUP_SET.to_string()
        } else {
            g.to_string()
        }
    })
}

/// Validates a report query. A missing `from` defaults to the start of the
/// month containing `now`.
pub fn bind(
    query: ReportQuery,
    validation: DateValidation,
    now: DateTime<Tz>,
) -> Result<ReportRequest, ApiError> {
    let tz = now.timezone();
    let from = checked_date(query.from.as_deref(), validation, tz, FROM_MESSAGE)?
        .unwrap_or_else(|| calendar::start_of_month(now));
    let to = checked_date(query.to.as_deref(), validation, tz, TO_MESSAGE)?;
    let group_text = query.current_group.filter(|g| !g.is_empty());
    let without_groups = if query.without_groups_list {
        WithoutGroups::list(query.without_groups)
    } else {
        WithoutGroups::from_values(query.without_groups)
    };

    Ok(ReportRequest {
        filter: Filter {
            from: Some(from),
            to,
            group: group_filter(group_text.as_deref()),
            without_groups,
        },
        group_text,
    })
}
