use chrono::{DateTime, Datelike, Days, Duration, NaiveDate, NaiveTime, TimeZone};
use chrono_tz::Tz;

pub fn local_midnight(date: NaiveDate, tz: Tz) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(&date.and_time(NaiveTime::MIN))
        .earliest()
}

pub fn start_of_day(at: DateTime<Tz>) -> DateTime<Tz> {
    local_midnight(at.date_naive(), at.timezone()).unwrap_or(at)
}

/// Last millisecond of the local day containing `at`.
pub fn end_of_day(at: DateTime<Tz>) -> DateTime<Tz> {
    at.date_naive()
        .checked_add_days(Days::new(1))
        .and_then(|next| local_midnight(next, at.timezone()))
        .map(|next| next - Duration::milliseconds(1))
        .unwrap_or(at)
}

pub fn start_of_month(at: DateTime<Tz>) -> DateTime<Tz> {
    NaiveDate::from_ymd_opt(at.year(), at.month(), 1)
        .and_then(|first| local_midnight(first, at.timezone()))
        .unwrap_or_else(|| start_of_day(at))
}

/// Epoch milliseconds of each local day from `from` (inclusive) to `to`
/// (exclusive), stepping by calendar day so DST changes keep wall time.
pub fn dates_in_range(from: DateTime<Tz>, to: DateTime<Tz>) -> Vec<i64> {
    let mut dates = Vec::new();
    let mut day = from;
    while day < to {
        dates.push(day.timestamp_millis());
        match day.checked_add_days(Days::new(1)) {
            Some(next) => day = next,
            None => break,
        }
    }
    dates
}

/// `(weekdays, weekend days)` covered by the local days from `from` through
/// `to`, both inclusive, with ISO weekdays (Monday = 1 .. Sunday = 7).
pub fn day_counts(from: NaiveDate, to: NaiveDate) -> (i64, i64) {
    let days = (to - from).num_days().abs() + 1;
    let start = from.min(to);

    let weeks = days / 7;
    let remainder = days % 7;
    let start_day = i64::from(start.weekday().number_from_monday());
    let extra_weekend_days = [6, 7]
        .iter()
        .filter(|&&n| start_day <= n && start_day + remainder > n)
        .count() as i64;
    let weekend = weeks * 2 + extra_weekend_days;

    (days - weekend, weekend)
}
