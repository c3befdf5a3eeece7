//! Timeframes and their calendar bucketing rules.

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Aggregation timeframe of a Silver table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    Daily,
    Weekly,
    Monthly,
}

impl Timeframe {
    /// Every timeframe, in processing order.
    pub const ALL: [Timeframe; 3] = [Timeframe::Daily, Timeframe::Weekly, Timeframe::Monthly];

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Daily => "daily",
            Timeframe::Weekly => "weekly",
            Timeframe::Monthly => "monthly",
        }
    }

    /// Table holding this timeframe's aggregate bars, e.g. `weekly_aggregates`.
    pub fn aggregates_table(&self) -> String {
        format!("{}_aggregates", self.as_str())
    }

    /// Table holding this timeframe's indicator rows, e.g. `weekly_indicators`.
    pub fn indicators_table(&self) -> String {
        format!("{}_indicators", self.as_str())
    }

    /// First calendar day of the bucket containing `date`.
    ///
    /// Weeks start on Monday; months on the 1st.
    pub fn period_start(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Timeframe::Daily => date,
            Timeframe::Weekly => {
                let back = u64::from(date.weekday().num_days_from_monday());
                date.checked_sub_days(Days::new(back)).unwrap_or(date)
            }
            Timeframe::Monthly => {
                let back = u64::from(date.day0());
                date.checked_sub_days(Days::new(back)).unwrap_or(date)
            }
        }
    }

    /// Last calendar day of the bucket containing `date`.
    pub fn period_end(&self, date: NaiveDate) -> NaiveDate {
        let start = self.period_start(date);
        match self {
            Timeframe::Daily => date,
            Timeframe::Weekly => start.checked_add_days(Days::new(6)).unwrap_or(NaiveDate::MAX),
            Timeframe::Monthly => start
                .checked_add_months(Months::new(1))
                .and_then(|next| next.pred_opt())
                .unwrap_or(NaiveDate::MAX),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn weekly_bucket_starts_monday() {
        // 2024-01-03 is a Wednesday
        assert_eq!(Timeframe::Weekly.period_start(d(2024, 1, 3)), d(2024, 1, 1));
        assert_eq!(Timeframe::Weekly.period_end(d(2024, 1, 3)), d(2024, 1, 7));
        // Monday maps to itself, Sunday to the preceding Monday
        assert_eq!(Timeframe::Weekly.period_start(d(2024, 1, 8)), d(2024, 1, 8));
        assert_eq!(Timeframe::Weekly.period_start(d(2024, 1, 14)), d(2024, 1, 8));
    }

    #[test]
    fn weekly_bucket_crosses_year_boundary() {
        // 2025-01-01 is a Wednesday; its week began in 2024
        assert_eq!(Timeframe::Weekly.period_start(d(2025, 1, 1)), d(2024, 12, 30));
        assert_eq!(Timeframe::Weekly.period_end(d(2025, 1, 1)), d(2025, 1, 5));
    }

    #[test]
    fn monthly_bucket_is_calendar_month() {
        assert_eq!(Timeframe::Monthly.period_start(d(2024, 2, 15)), d(2024, 2, 1));
        assert_eq!(Timeframe::Monthly.period_end(d(2024, 2, 15)), d(2024, 2, 29));
        assert_eq!(Timeframe::Monthly.period_end(d(2023, 2, 1)), d(2023, 2, 28));
        assert_eq!(Timeframe::Monthly.period_end(d(2024, 12, 31)), d(2024, 12, 31));
    }

    #[test]
    fn daily_bucket_is_identity() {
        let day = d(2024, 3, 5);
        assert_eq!(Timeframe::Daily.period_start(day), day);
        assert_eq!(Timeframe::Daily.period_end(day), day);
    }

    #[test]
    fn table_names() {
        assert_eq!(Timeframe::Daily.aggregates_table(), "daily_aggregates");
        assert_eq!(Timeframe::Monthly.indicators_table(), "monthly_indicators");
    }

    #[test]
    fn serde_is_lowercase() {
        let json = serde_json::to_string(&Timeframe::Weekly).unwrap();
        assert_eq!(json, "\"weekly\"");
    }
}
