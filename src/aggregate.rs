use chrono_tz::Tz;

use crate::calendar;
use crate::models::{
    DailyPoint, DailySeries, Dataset, DatasetTotals, DateTypeCount, GroupCount, GroupUsageRow,
    HourPoint, HourlyBucket, HourlyCount, TypeCount,
};

const WEEKDAY_COLOUR: &str = "#2746B9";
const WEEKEND_COLOUR: &str = "#31BB76";
const AVERAGE_COLOUR: &str = "#0B69D4";

/// One series per dataset, in `Dataset::ALL` order, even when a dataset has
/// no rows. Rows for unknown datasets are dropped.
pub fn daily_usage(rows: &[DateTypeCount], tz: Tz) -> Vec<DailySeries> {
    let mut series: Vec<DailySeries> = Dataset::ALL
        .iter()
        .map(|&name| DailySeries {
            name,
            daily_usage: Vec::new(),
        })
        .collect();

    for row in rows {
        let Ok(dataset) = row.dataset.parse::<Dataset>() else {
            continue;
        };
        let Some(midnight) = calendar::local_midnight(row.date, tz) else {
            continue;
        };
        if let Some(entry) = series.iter_mut().find(|s| s.name == dataset) {
            entry.daily_usage.push(DailyPoint {
                date: midnight.timestamp_millis(),
                usage: row.count,
            });
        }
    }

    series
}

/// `None` when there are no rows at all.
pub fn dataset_usage(rows: &[TypeCount]) -> Option<DatasetTotals> {
    if rows.is_empty() {
        return None;
    }

    let mut totals = DatasetTotals::default();
    for row in rows {
        if let Ok(dataset) = row.dataset.parse::<Dataset>() {
            totals.set(dataset, row.count);
        }
        totals.total += row.count;
    }
    Some(totals)
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn words(name: &str) -> impl Iterator<Item = &str> {
    name.split(|c: char| !is_word_char(c))
        .filter(|w| !w.is_empty())
}

/// Strips a leading `/<unit> - ` from names such as `/Police - Metropolitan`.
fn strip_unit_prefix(name: &str) -> Option<&str> {
    let body = name.strip_prefix('/')?;
    let end = body.find(|c: char| !is_word_char(c))?;
    if end == 0 {
        return None;
    }
    body[end..].strip_prefix(" - ")
}

/// Identifier for a group name: a leading `/Team ` or `/<unit> - ` is
/// removed, then everything but word characters.
///
/// Distinct names can normalize to the same id (`/Team A-B` and `/Team AB`);
/// such rows are not told apart when looking up parents.
pub fn group_id(name: &str) -> String {
    let rest = name
        .strip_prefix("/Team ")
        .or_else(|| strip_unit_prefix(name))
        .unwrap_or(name);
    rest.chars().filter(|&c| is_word_char(c)).collect()
}

fn new_group_row(name: &str) -> GroupUsageRow {
    GroupUsageRow {
        id: group_id(name),
        name: name.to_string(),
        total: 0,
        parent: None,
        has_children: false,
        birth: 0,
        death: 0,
        marriage: 0,
        partnership: 0,
    }
}

/// Folds name-ordered `(name, dataset, count)` rows into one row per group.
///
/// Consecutive rows with the same name merge. A new group's parent is the
/// first earlier group whose id is one of the words of the new group's name;
/// that earlier group is then marked as having children.
pub fn group_usage(rows: &[GroupCount]) -> Vec<GroupUsageRow> {
    let mut groups: Vec<GroupUsageRow> = Vec::new();

    for row in rows {
        let continues_last = groups.last().is_some_and(|last| last.name == row.name);
        if !continues_last {
            let mut group = new_group_row(&row.name);
            let parent = groups
                .iter()
                .position(|g| !g.id.is_empty() && words(&row.name).any(|w| w == g.id));
            if let Some(index) = parent {
                groups[index].has_children = true;
                group.parent = Some(groups[index].id.clone());
            }
            groups.push(group);
        }

        if let Some(group) = groups.last_mut() {
            if let Ok(dataset) = row.dataset.parse::<Dataset>() {
                group.add(dataset, row.count);
            }
            group.total += row.count;
        }
    }

    groups
}

fn hours(name: &'static str, colour: &'static str) -> HourlyBucket {
    HourlyBucket {
        name,
        colour,
        data: (0..24).map(|hour| HourPoint { hour, count: 0.0 }).collect(),
    }
}

/// Turns raw per-hour counts into per-day averages.
///
/// Weekday counts are divided by `weekdays`, weekend counts by
/// `weekend_days`; a bucket with no days is left out. The combined
/// `average` bucket, divided by all days, only appears when both kinds of
/// day are present.
pub fn hourly_usage((weekdays, weekend_days): (i64, i64), rows: &[HourlyCount]) -> Vec<HourlyBucket> {
    let days = [weekdays, weekend_days];
    let mut traces = [
        (weekdays > 0).then(|| hours("weekday", WEEKDAY_COLOUR)),
        (weekend_days > 0).then(|| hours("weekend", WEEKEND_COLOUR)),
    ];
    let mut average = hours("average", AVERAGE_COLOUR);

    for row in rows {
        let Some(hour) = usize::try_from(row.hour).ok().filter(|&h| h < 24) else {
            tracing::warn!(hour = row.hour, "Ignoring hourly count outside 0..24");
            continue;
        };
        let bucket = usize::from(row.weekend != 0);
        if let Some(trace) = traces[bucket].as_mut() {
            trace.data[hour].count += row.count as f64 / days[bucket] as f64;
        }
        average.data[hour].count += row.count as f64;
    }

    let mut buckets: Vec<HourlyBucket> = traces.into_iter().flatten().collect();
    if weekdays > 0 && weekend_days > 0 {
        let total = (weekdays + weekend_days) as f64;
        for point in &mut average.data {
            point.count /= total;
        }
        buckets.push(average);
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::local_midnight;
    use chrono::NaiveDate;
    use chrono_tz::Europe::London;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn group(name: &str, dataset: &str, count: i64) -> GroupCount {
        GroupCount {
            name: name.to_string(),
            dataset: dataset.to_string(),
            count,
        }
    }

    #[test]
    fn daily_usage_single_birth_row() {
        let rows = vec![DateTypeCount {
            date: date(2020, 6, 1),
            dataset: "birth".to_string(),
            count: 3,
        }];
        let series = daily_usage(&rows, London);

        assert_eq!(series.len(), 4);
        let midnight = local_midnight(date(2020, 6, 1), London).unwrap();
        assert_eq!(series[0].name, Dataset::Birth);
        assert_eq!(
            series[0].daily_usage,
            vec![DailyPoint {
                date: midnight.timestamp_millis(),
                usage: 3
            }]
        );
        assert!(series[1..].iter().all(|s| s.daily_usage.is_empty()));
    }

    #[test]
    fn daily_usage_always_has_four_series() {
        assert_eq!(daily_usage(&[], London).len(), 4);

        let rows = vec![DateTypeCount {
            date: date(2020, 6, 2),
            dataset: "adoption".to_string(),
            count: 9,
        }];
        let series = daily_usage(&rows, London);
        let names: Vec<Dataset> = series.iter().map(|s| s.name).collect();
        assert_eq!(names, Dataset::ALL.to_vec());
        assert!(series.iter().all(|s| s.daily_usage.is_empty()));
    }

    #[test]
    fn dataset_usage_sums_totals() {
        let rows = vec![
            TypeCount {
                dataset: "birth".into(),
                count: 10,
            },
            TypeCount {
                dataset: "death".into(),
                count: 5,
            },
        ];
        let totals = dataset_usage(&rows).unwrap();
        assert_eq!(totals.birth, Some(10));
        assert_eq!(totals.death, Some(5));
        assert_eq!(totals.marriage, None);
        assert_eq!(totals.total, 15);
    }

    #[test]
    fn dataset_usage_distinguishes_no_data_from_zero() {
        assert_eq!(dataset_usage(&[]), None);
        let zero = dataset_usage(&[TypeCount {
            dataset: "birth".into(),
            count: 0,
        }]);
        assert_eq!(zero.map(|t| t.total), Some(0));
    }

    #[test]
    fn group_ids_strip_prefixes_and_punctuation() {
        assert_eq!(group_id("/Team Registration"), "Registration");
        assert_eq!(group_id("/Team Registration/Coroners"), "RegistrationCoroners");
        assert_eq!(group_id("/Police - Metropolitan"), "Metropolitan");
        assert_eq!(group_id("/Police - Metropolitan Fraud"), "MetropolitanFraud");
        assert_eq!(group_id("No group"), "Nogroup");
        assert_eq!(group_id("/Agency"), "Agency");
    }

    #[test]
    fn colliding_ids_are_left_as_is() {
        assert_eq!(group_id("/Team A-B"), group_id("/Team AB"));
    }

    #[test]
    fn consecutive_rows_merge() {
        let rows = vec![
            group("/Team Registration", "birth", 200),
            group("/Team Registration", "death", 60),
        ];
        let groups = group_usage(&rows);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].birth, 200);
        assert_eq!(groups[0].death, 60);
        assert_eq!(groups[0].total, 260);
        assert_eq!(groups[0].parent, None);
        assert!(!groups[0].has_children);
    }

    #[test]
    fn children_find_first_matching_parent() {
        let rows = vec![
            group("/Team Registration", "birth", 200),
            group("/Team Registration/Coroners", "death", 30),
            group("/Team Registration/Local Offices", "birth", 120),
            group("/Police - Metropolitan", "birth", 20),
            group("/Police - Metropolitan Fraud", "death", 7),
            group("No group", "birth", 4),
        ];
        let groups = group_usage(&rows);
        let parents: Vec<Option<&str>> = groups.iter().map(|g| g.parent.as_deref()).collect();
        assert_eq!(
            parents,
            vec![
                None,
                Some("Registration"),
                Some("Registration"),
                None,
                Some("Metropolitan"),
                None,
            ]
        );
        let with_children: Vec<bool> = groups.iter().map(|g| g.has_children).collect();
        assert_eq!(with_children, vec![true, false, false, true, false, false]);
    }

    #[test]
    fn partial_words_are_not_parents() {
        let rows = vec![
            group("/Team Reg", "birth", 1),
            group("/Team Registration", "birth", 1),
        ];
        let groups = group_usage(&rows);
        assert_eq!(groups[1].parent, None);
        assert!(!groups[0].has_children);
    }

    #[test]
    fn empty_ids_never_parent() {
        let rows = vec![group("/Team ", "birth", 1), group("/Team Anything", "birth", 1)];
        let groups = group_usage(&rows);
        assert_eq!(groups[0].id, "");
        assert_eq!(groups[1].parent, None);
    }

    #[test]
    fn unknown_datasets_only_count_towards_total() {
        let groups = group_usage(&[group("/Team X", "adoption", 5), group("/Team X", "birth", 1)]);
        assert_eq!(groups[0].total, 6);
        assert_eq!(groups[0].birth, 1);
    }

    #[test]
    fn group_fold_is_idempotent() {
        let rows = vec![
            group("/Team Registration", "birth", 200),
            group("/Team Registration", "death", 60),
            group("/Team Registration/Coroners", "death", 30),
            group("/Police - Metropolitan", "birth", 20),
            group("/Police - Metropolitan Fraud", "birth", 9),
            group("/Police - Metropolitan Fraud", "partnership", 3),
        ];
        let once = group_usage(&rows);

        let flattened: Vec<GroupCount> = once
            .iter()
            .flat_map(|g| {
                Dataset::ALL
                    .iter()
                    .filter(|&&d| g.count(d) > 0)
                    .map(|&d| group(&g.name, d.as_str(), g.count(d)))
                    .collect::<Vec<_>>()
            })
            .collect();
        let twice = group_usage(&flattened);

        assert_eq!(once, twice);
    }

    fn hourly(weekend: i32, hour: i32, count: i64) -> HourlyCount {
        HourlyCount {
            count,
            weekend,
            hour,
        }
    }

    #[test]
    fn hourly_usage_averages_per_day() {
        let rows = vec![hourly(0, 9, 50), hourly(1, 9, 4), hourly(0, 17, 10)];
        let buckets = hourly_usage((5, 2), &rows);

        let names: Vec<&str> = buckets.iter().map(|b| b.name).collect();
        assert_eq!(names, vec!["weekday", "weekend", "average"]);
        assert!(buckets.iter().all(|b| b.data.len() == 24));
        assert_eq!(buckets[0].data[9].count, 10.0);
        assert_eq!(buckets[0].data[17].count, 2.0);
        assert_eq!(buckets[1].data[9].count, 2.0);
        assert_eq!(buckets[2].data[9].count, 54.0 / 7.0);
        assert_eq!(buckets[2].colour, "#0B69D4");
    }

    #[test]
    fn hourly_usage_round_trips_to_raw_totals() {
        let rows: Vec<HourlyCount> = (0..24)
            .flat_map(|h| [hourly(0, h, i64::from(h) * 7 + 3), hourly(1, h, i64::from(h) + 1)])
            .collect();
        let (weekdays, weekend_days) = (17, 6);
        let buckets = hourly_usage((weekdays, weekend_days), &rows);

        let raw = |weekend: i32| -> i64 {
            rows.iter()
                .filter(|r| r.weekend == weekend)
                .map(|r| r.count)
                .sum()
        };
        let restored = |bucket: &HourlyBucket, days: i64| -> f64 {
            bucket.data.iter().map(|p| p.count * days as f64).sum()
        };

        assert!((restored(&buckets[0], weekdays) - raw(0) as f64).abs() < 1e-6);
        assert!((restored(&buckets[1], weekend_days) - raw(1) as f64).abs() < 1e-6);
        assert!(
            (restored(&buckets[2], weekdays + weekend_days) - (raw(0) + raw(1)) as f64).abs()
                < 1e-6
        );
    }

    #[test]
    fn weekday_only_range_has_no_weekend_or_average() {
        let rows = vec![hourly(0, 10, 6), hourly(1, 10, 3)];
        let buckets = hourly_usage((3, 0), &rows);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].name, "weekday");
        assert_eq!(buckets[0].data[10].count, 2.0);
    }

    #[test]
    fn out_of_range_hours_are_ignored() {
        let buckets = hourly_usage((1, 1), &[hourly(0, 24, 5), hourly(0, -1, 5)]);
        assert!(buckets
            .iter()
            .all(|b| b.data.iter().all(|p| p.count == 0.0)));
    }
}
