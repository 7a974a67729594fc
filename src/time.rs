//! Named reporting windows resolved once per query.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Week-aligned windows compare against the same weekdays 52 weeks earlier.
const WEEK_ALIGNED_SHIFT_DAYS: i64 = 364;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodBounds {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub compare_start: NaiveDate,
    pub compare_end: NaiveDate,
}

impl PeriodBounds {
    fn week_aligned(start: NaiveDate, end: NaiveDate) -> Self {
        let shift = Duration::days(WEEK_ALIGNED_SHIFT_DAYS);
        Self {
            start,
            end,
            compare_start: start - shift,
            compare_end: end - shift,
        }
    }

    fn calendar(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end,
            compare_start: year_earlier(start),
            compare_end: year_earlier(end),
        }
    }

    /// `(key, iso date)` pairs in a stable order.
    pub fn fields(&self) -> [(&'static str, String); 4] {
        [
            ("start", iso(self.start)),
            ("end", iso(self.end)),
            ("compare_start", iso(self.compare_start)),
            ("compare_end", iso(self.compare_end)),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimePeriods {
    pub as_of: NaiveDate,
    periods: Vec<(String, PeriodBounds)>,
}

impl TimePeriods {
    /// Resolve `lw`, `mtd`, `qtd`, `ytd` and `trailing_13_weeks` relative to `as_of`.
    pub fn resolve(as_of: NaiveDate) -> Self {
        let monday = as_of - Duration::days(as_of.weekday().num_days_from_monday() as i64);
        let last_week_start = monday - Duration::days(7);
        let last_week_end = monday - Duration::days(1);

        let month_start = as_of.with_day(1).unwrap_or(as_of);
        let quarter_month = ((as_of.month() - 1) / 3) * 3 + 1;
        let quarter_start = NaiveDate::from_ymd_opt(as_of.year(), quarter_month, 1).unwrap_or(as_of);
        let year_start = NaiveDate::from_ymd_opt(as_of.year(), 1, 1).unwrap_or(as_of);
        let trailing_start = as_of - Duration::days(13 * 7 - 1);

        let periods = vec![
            ("lw".to_string(), PeriodBounds::week_aligned(last_week_start, last_week_end)),
            ("mtd".to_string(), PeriodBounds::calendar(month_start, as_of)),
            ("qtd".to_string(), PeriodBounds::calendar(quarter_start, as_of)),
            ("ytd".to_string(), PeriodBounds::calendar(year_start, as_of)),
            (
                "trailing_13_weeks".to_string(),
                PeriodBounds::week_aligned(trailing_start, as_of),
            ),
        ];

        Self { as_of, periods }
    }

    pub fn get(&self, name: &str) -> Option<&PeriodBounds> {
        self.periods
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, bounds)| bounds)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PeriodBounds)> {
        self.periods.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Dictionary literal shown to the code-synthesis prompt.
    pub fn to_prompt_block(&self) -> String {
        let mut out = String::from("time_periods = {\n");
        for (name, bounds) in self.iter() {
            let fields: Vec<String> = bounds
                .fields()
                .iter()
                .map(|(k, v)| format!("\"{}\": \"{}\"", k, v))
                .collect();
            out.push_str(&format!("    \"{}\": {{{}}},\n", name, fields.join(", ")));
        }
        out.push('}');
        out
    }
}

/// Monday..Sunday of ISO week `week` in ISO year `year`.
pub fn iso_week_bounds(year: i32, week: u32) -> Option<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)?;
    Some((start, start + Duration::days(6)))
}

pub fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Same calendar day one year earlier; Feb 29 falls back to Feb 28.
fn year_earlier(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year() - 1, date.month(), date.day())
        .or_else(|| NaiveDate::from_ymd_opt(date.year() - 1, date.month(), date.day() - 1))
        .unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_last_week_matches_worked_example() {
        // 2025-05-14 is a Wednesday; the previous ISO week is 05-05..05-11.
        let periods = TimePeriods::resolve(d(2025, 5, 14));
        let lw = periods.get("lw").unwrap();
        assert_eq!(lw.start, d(2025, 5, 5));
        assert_eq!(lw.end, d(2025, 5, 11));
        assert_eq!(lw.compare_start, d(2024, 5, 6));
        assert_eq!(lw.compare_end, d(2024, 5, 12));
    }

    #[test]
    fn test_calendar_windows() {
        let periods = TimePeriods::resolve(d(2025, 8, 20));
        assert_eq!(periods.get("mtd").unwrap().start, d(2025, 8, 1));
        assert_eq!(periods.get("qtd").unwrap().start, d(2025, 7, 1));
        assert_eq!(periods.get("ytd").unwrap().start, d(2025, 1, 1));
        assert_eq!(periods.get("ytd").unwrap().compare_end, d(2024, 8, 20));

        let trailing = periods.get("trailing_13_weeks").unwrap();
        assert_eq!((trailing.end - trailing.start).num_days(), 90);
    }

    #[test]
    fn test_leap_day_compare_clamps() {
        let periods = TimePeriods::resolve(d(2024, 2, 29));
        assert_eq!(periods.get("mtd").unwrap().compare_end, d(2023, 2, 28));
    }

    #[test]
    fn test_iso_week_bounds() {
        let (start, end) = iso_week_bounds(2025, 18).unwrap();
        assert_eq!(start, d(2025, 4, 28));
        assert_eq!(end, d(2025, 5, 4));
        assert!(iso_week_bounds(2025, 60).is_none());
    }

    #[test]
    fn test_prompt_block_lists_every_period() {
        let block = TimePeriods::resolve(d(2025, 5, 14)).to_prompt_block();
        for name in ["lw", "mtd", "qtd", "ytd", "trailing_13_weeks"] {
            assert!(block.contains(&format!("\"{}\"", name)));
        }
        assert!(block.contains("\"start\": \"2025-05-05\""));
    }
}
