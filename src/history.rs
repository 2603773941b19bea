use serde::Serialize;

use crate::db::UsageSource;
use crate::error::QueryResult;
use crate::models::{CumulativePoint, MonthlyCount};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct History {
    pub data: Vec<CumulativePoint>,
}

pub fn process_history(rows: &[MonthlyCount]) -> History {
    History {
        data: rows
            .iter()
            .map(|row| CumulativePoint {
                month: row.month.timestamp(),
                count: row.count,
            })
            .collect(),
    }
}

pub async fn history(source: &dyn UsageSource) -> QueryResult<History> {
    let rows = source.cumulative_usage().await?;
    Ok(process_history(&rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    #[test]
    fn dates_become_unix_seconds() {
        let expected = vec![
            CumulativePoint {
                month: 1_585_695_600,
                count: 15,
            },
            CumulativePoint {
                month: 1_588_287_600,
                count: 567,
            },
            CumulativePoint {
                month: 1_590_966_000,
                count: 4567,
            },
        ];
        let rows: Vec<MonthlyCount> = expected
            .iter()
            .map(|p| MonthlyCount {
                month: DateTime::from_timestamp(p.month, 0).unwrap(),
                count: p.count,
            })
            .collect();

        assert_eq!(process_history(&rows).data, expected);
    }

    #[test]
    fn empty_history_is_empty() {
        assert!(process_history(&[]).data.is_empty());
    }
}
