//! Calendar math for the report window.
//!
//! All rollup periods are inclusive day ranges derived from the configured
//! week-ending date and the fiscal-year-end month. The prior-year weekly
//! offset is exactly 364 days (52 weeks) so weekdays stay aligned; prior-year
//! monthly periods shift by one calendar year instead, because months align
//! by calendar month, not by weekday.

use chrono::{Datelike, Duration, NaiveDate};

use crate::error::{WbrError, WbrResult};

/// Number of trailing weeks shown on the left half of a 6-12 chart.
pub const NUM_TRAILING_WEEKS: usize = 6;
/// Number of trailing complete months shown on the right half.
pub const NUM_TRAILING_MONTHS: usize = 12;
/// Prior-year weekly offset: 52 weeks exactly, preserving the weekday.
pub const PY_WEEKLY_OFFSET_DAYS: i64 = 364;
/// Days covered by the trailing six weeks, inclusive of both ends.
pub const SIX_WEEKS_LOOKBACK_DAYS: i64 = 41;

/// Strict format for `setup.weekEnding`, e.g. `25-SEP-2021`.
pub const WEEK_ENDING_FORMAT: &str = "%d-%b-%Y";

const MONTH_ABBR: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Parse a `DD-MMM-YYYY` week-ending date.
pub fn parse_week_ending(value: &str) -> WbrResult<NaiveDate> {
    NaiveDate::parse_from_str(value, WEEK_ENDING_FORMAT).map_err(|_| {
        WbrError::config(
            "setup.weekEnding",
            format!(
                "'{}' is not a valid week ending date; expected the format 25-SEP-2021",
                value
            ),
        )
    })
}

/// Parse a three-letter fiscal month abbreviation (`JAN`..`DEC`) into 1-12.
pub fn parse_fiscal_month(value: &str) -> WbrResult<u32> {
    let needle = value.to_ascii_lowercase();
    MONTH_ABBR
        .iter()
        .position(|m| m.to_ascii_lowercase() == needle)
        .map(|idx| idx as u32 + 1)
        .ok_or_else(|| {
            WbrError::config(
                "setup.fiscalYearEndMonth",
                format!("'{}' is not a month abbreviation such as DEC or MAY", value),
            )
        })
}

/// A calendar month identified by year and month number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Month {
    pub year: i32,
    pub month: u32,
}

impl Month {
    /// The month containing `date`.
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// First day of the month.
    pub fn first_day(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).expect("valid month")
    }

    /// Last day of the month.
    pub fn last_day(self) -> NaiveDate {
        self.succ().first_day() - Duration::days(1)
    }

    /// The previous month.
    pub fn pred(self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    /// The next month.
    pub fn succ(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// The same month `n` years earlier.
    pub fn years_back(self, n: i32) -> Self {
        Self {
            year: self.year - n,
            month: self.month,
        }
    }

    /// Three-letter label, e.g. `Sep`.
    pub fn label(self) -> &'static str {
        MONTH_ABBR[(self.month - 1) as usize]
    }
}

/// Whether `date` is the last day of its month.
pub fn is_last_day_of_month(date: NaiveDate) -> bool {
    Month::of(date).last_day() == date
}

/// The same date one calendar year earlier; Feb 29 falls back to Feb 28.
pub fn one_year_earlier(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year() - 1, date.month(), date.day()).unwrap_or_else(|| {
        NaiveDate::from_ymd_opt(date.year() - 1, date.month(), 28).expect("valid fallback date")
    })
}

/// An inclusive day range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaySpan {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DaySpan {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Period boundaries around a week-ending date, fiscal-year aware.
#[derive(Debug, Clone, Copy)]
pub struct ReportCalendar {
    week_ending: NaiveDate,
    fiscal_end_month: u32,
}

impl ReportCalendar {
    pub fn new(week_ending: NaiveDate, fiscal_end_month: u32) -> Self {
        debug_assert!((1..=12).contains(&fiscal_end_month));
        Self {
            week_ending,
            fiscal_end_month,
        }
    }

    pub fn week_ending(&self) -> NaiveDate {
        self.week_ending
    }

    pub fn fiscal_end_month(&self) -> u32 {
        self.fiscal_end_month
    }

    /// First month of the fiscal year (the month after the fiscal year end).
    pub fn fiscal_start_month(&self) -> u32 {
        self.fiscal_end_month % 12 + 1
    }

    /// `count` seven-day spans ending at `end`, oldest first.
    pub fn weeks_ending(end: NaiveDate, count: usize) -> Vec<DaySpan> {
        (0..count)
            .map(|i| {
                let week_end = end - Duration::days(7 * (count - 1 - i) as i64);
                DaySpan::new(week_end - Duration::days(6), week_end)
            })
            .collect()
    }

    /// The trailing current-year weeks, oldest first.
    pub fn cy_weeks(&self, count: usize) -> Vec<DaySpan> {
        Self::weeks_ending(self.week_ending, count)
    }

    /// The prior-year counterparts, shifted back 364 days.
    pub fn py_weeks(&self, count: usize) -> Vec<DaySpan> {
        Self::weeks_ending(
            self.week_ending - Duration::days(PY_WEEKLY_OFFSET_DAYS),
            count,
        )
    }

    /// The most recent complete month: the month of the week ending when it
    /// falls on the month's last day, otherwise the month before.
    pub fn last_complete_month(&self) -> Month {
        if is_last_day_of_month(self.week_ending) {
            Month::of(self.week_ending)
        } else {
            Month::of(self.week_ending).pred()
        }
    }

    /// The trailing complete months, oldest first, ending at
    /// [`last_complete_month`](Self::last_complete_month).
    pub fn trailing_months(&self, count: usize) -> Vec<Month> {
        let last = self.last_complete_month();
        let mut months = Vec::with_capacity(count);
        let mut m = last;
        for _ in 0..count {
            months.push(m);
            m = m.pred();
        }
        months.reverse();
        months
    }

    /// Months appended beyond the trailing twelve: the partial current month
    /// (when the week ends mid-month) and the months through fiscal-year end.
    /// Returns `(months, partial)` where `partial` is the mid-month cell, if
    /// any, that needs the missing-day guard.
    pub fn extension_months(&self) -> (Vec<Month>, Option<Month>) {
        let mut months = Vec::new();
        let current = Month::of(self.week_ending);
        let partial = if is_last_day_of_month(self.week_ending) {
            None
        } else {
            months.push(current);
            Some(current)
        };
        if current.month != self.fiscal_end_month {
            let fy_end = self.fiscal_year_end_month();
            let mut m = current.succ();
            while m <= fy_end {
                months.push(m);
                m = m.succ();
            }
        }
        (months, partial)
    }

    /// The month in which the fiscal year containing the week ending ends:
    /// the next occurrence of the fiscal-end month at or after it.
    pub fn fiscal_year_end_month(&self) -> Month {
        let current = Month::of(self.week_ending);
        if current.month <= self.fiscal_end_month {
            Month {
                year: current.year,
                month: self.fiscal_end_month,
            }
        } else {
            Month {
                year: current.year + 1,
                month: self.fiscal_end_month,
            }
        }
    }

    /// Month-to-date: first of the month through the week ending.
    pub fn mtd(&self) -> DaySpan {
        DaySpan::new(Month::of(self.week_ending).first_day(), self.week_ending)
    }

    /// Quarter-to-date, with quarters anchored so the fiscal-end month closes
    /// Q4.
    pub fn qtd(&self) -> DaySpan {
        DaySpan::new(self.quarter_start(self.week_ending), self.week_ending)
    }

    /// Year-to-date over the fiscal year containing the week ending.
    pub fn ytd(&self) -> DaySpan {
        DaySpan::new(self.fiscal_year_start(self.week_ending), self.week_ending)
    }

    /// Prior-year MTD/QTD/YTD: the same period boundaries derived from the
    /// week ending shifted one calendar year.
    pub fn py_mtd(&self) -> DaySpan {
        let py_end = one_year_earlier(self.week_ending);
        DaySpan::new(Month::of(py_end).first_day(), py_end)
    }

    pub fn py_qtd(&self) -> DaySpan {
        let py_end = one_year_earlier(self.week_ending);
        DaySpan::new(self.quarter_start(py_end), py_end)
    }

    pub fn py_ytd(&self) -> DaySpan {
        let py_end = one_year_earlier(self.week_ending);
        DaySpan::new(self.fiscal_year_start(py_end), py_end)
    }

    fn fiscal_year_start(&self, date: NaiveDate) -> NaiveDate {
        let fs = self.fiscal_start_month();
        let year = if date.month() >= fs {
            date.year()
        } else {
            date.year() - 1
        };
        NaiveDate::from_ymd_opt(year, fs, 1).expect("valid fiscal start")
    }

    fn quarter_start(&self, date: NaiveDate) -> NaiveDate {
        let fs = self.fiscal_start_month() as i64;
        let months_into_year = (date.month() as i64 - fs).rem_euclid(12);
        let quarter_offset = months_into_year - months_into_year % 3;
        let start_month = ((fs - 1 + quarter_offset) % 12) as u32 + 1;
        let year = if start_month <= date.month() {
            date.year()
        } else {
            date.year() - 1
        };
        NaiveDate::from_ymd_opt(year, start_month, 1).expect("valid quarter start")
    }

    /// Week labels for the x axis: `wk N-5` through `wk N` with mod-52
    /// wraparound.
    pub fn week_labels(&self, week_number: u32) -> Vec<String> {
        (1..=NUM_TRAILING_WEEKS as u32)
            .rev()
            .map(|i| {
                let n = (week_number as i64 - i as i64).rem_euclid(52) + 1;
                format!("wk {}", n)
            })
            .collect()
    }

    /// ISO week number of the week ending, used when `weekNumber` is omitted.
    pub fn default_week_number(&self) -> u32 {
        self.week_ending.iso_week().week()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_week_ending_formats() {
        assert_eq!(parse_week_ending("25-SEP-2021").unwrap(), date(2021, 9, 25));
        assert_eq!(parse_week_ending("31-May-2022").unwrap(), date(2022, 5, 31));
        assert!(parse_week_ending("2021-09-25").is_err());
        assert!(parse_week_ending("32-SEP-2021").is_err());
    }

    #[test]
    fn test_parse_fiscal_month() {
        assert_eq!(parse_fiscal_month("DEC").unwrap(), 12);
        assert_eq!(parse_fiscal_month("may").unwrap(), 5);
        assert!(parse_fiscal_month("DECEMBER").is_err());
    }

    #[test]
    fn test_weeks_ending_are_seven_days_and_adjacent() {
        let weeks = ReportCalendar::weeks_ending(date(2021, 9, 25), 6);
        assert_eq!(weeks.len(), 6);
        assert_eq!(weeks[5].end, date(2021, 9, 25));
        assert_eq!(weeks[5].start, date(2021, 9, 19));
        assert_eq!(weeks[0].end, date(2021, 8, 21));
        for pair in weeks.windows(2) {
            assert_eq!(pair[0].end + Duration::days(1), pair[1].start);
        }
    }

    #[test]
    fn test_py_weeks_preserve_weekday() {
        let cal = ReportCalendar::new(date(2021, 9, 25), 12);
        let cy = cal.cy_weeks(6);
        let py = cal.py_weeks(6);
        for (c, p) in cy.iter().zip(py.iter()) {
            assert_eq!(c.end - p.end, Duration::days(364));
            assert_eq!(c.end.weekday(), p.end.weekday());
        }
    }

    #[test]
    fn test_trailing_months_mid_month() {
        let cal = ReportCalendar::new(date(2021, 9, 25), 12);
        let months = cal.trailing_months(12);
        assert_eq!(months[0], Month { year: 2020, month: 9 });
        assert_eq!(months[11], Month { year: 2021, month: 8 });
    }

    #[test]
    fn test_trailing_months_month_end() {
        let cal = ReportCalendar::new(date(2021, 9, 30), 12);
        let months = cal.trailing_months(12);
        assert_eq!(months[11], Month { year: 2021, month: 9 });
    }

    #[test]
    fn test_extension_months_to_fiscal_year_end() {
        let cal = ReportCalendar::new(date(2021, 9, 25), 12);
        let (months, partial) = cal.extension_months();
        assert_eq!(partial, Some(Month { year: 2021, month: 9 }));
        // Partial September plus October through December.
        assert_eq!(months.len(), 4);
        assert_eq!(months[3], Month { year: 2021, month: 12 });
    }

    #[test]
    fn test_no_extension_at_fiscal_year_end() {
        let cal = ReportCalendar::new(date(2022, 5, 31), 5);
        let (months, partial) = cal.extension_months();
        assert!(partial.is_none());
        assert!(months.is_empty());
    }

    #[test]
    fn test_fiscal_quarter_boundaries_may_year_end() {
        // Fiscal year ends in May: Q4 is Mar-May.
        let cal = ReportCalendar::new(date(2022, 5, 31), 5);
        assert_eq!(cal.qtd().start, date(2022, 3, 1));
        assert_eq!(cal.ytd().start, date(2021, 6, 1));
    }

    #[test]
    fn test_calendar_year_quarters_for_december_year_end() {
        let cal = ReportCalendar::new(date(2021, 9, 25), 12);
        assert_eq!(cal.qtd().start, date(2021, 7, 1));
        assert_eq!(cal.ytd().start, date(2021, 1, 1));
        assert_eq!(cal.mtd().start, date(2021, 9, 1));
    }

    #[test]
    fn test_py_periods_shift_one_calendar_year() {
        let cal = ReportCalendar::new(date(2021, 9, 25), 12);
        assert_eq!(cal.py_mtd().start, date(2020, 9, 1));
        assert_eq!(cal.py_mtd().end, date(2020, 9, 25));
        assert_eq!(cal.py_ytd().start, date(2020, 1, 1));
    }

    #[test]
    fn test_week_labels_wrap_around_year() {
        let cal = ReportCalendar::new(date(2022, 1, 8), 12);
        assert_eq!(
            cal.week_labels(38),
            vec!["wk 33", "wk 34", "wk 35", "wk 36", "wk 37", "wk 38"]
        );
        // Week 2 looks back across the 52-week boundary.
        assert_eq!(
            cal.week_labels(2),
            vec!["wk 49", "wk 50", "wk 51", "wk 52", "wk 1", "wk 2"]
        );
    }

    #[test]
    fn test_one_year_earlier_handles_leap_day() {
        assert_eq!(one_year_earlier(date(2020, 2, 29)), date(2019, 2, 28));
        assert_eq!(one_year_earlier(date(2021, 9, 25)), date(2020, 9, 25));
    }

    #[test]
    fn test_month_helpers() {
        let m = Month { year: 2021, month: 12 };
        assert_eq!(m.succ(), Month { year: 2022, month: 1 });
        assert_eq!(m.last_day(), date(2021, 12, 31));
        assert_eq!(m.label(), "Dec");
        assert!(is_last_day_of_month(date(2020, 2, 29)));
        assert!(!is_last_day_of_month(date(2020, 2, 28)));
    }
}
