//! Quincena calendar dimension.
//!
//! Mexico pays salaries twice a month: on the 15th and on the last day of
//! the month, each moved to the preceding Friday when it falls on a
//! weekend. Loan cohorts are analyzed relative to these paydays, so every
//! calendar day carries its quincena and a signed day offset to it.

use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// First month with any loan data.
pub const CALENDAR_START: (i32, u32) = (2022, 8);
/// Days before this date are trimmed from the output.
pub const DATA_AVAILABILITY_CUTOFF: (i32, u32, u32) = (2022, 9, 1);

/// One row of the calendar dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarDay {
    pub month: NaiveDate,
    pub day: NaiveDate,
    pub quincena: NaiveDate,
    pub is_quincena: bool,
    pub prev_quincena: Option<NaiveDate>,
    pub day_of_week: Weekday,
    pub day_relative_to_quincena: i64,
}

/// Move a payday off the weekend to the preceding Friday.
pub fn weekend_adjusted(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date - Duration::days(1),
        Weekday::Sun => date - Duration::days(2),
        _ => date,
    }
}

fn month_start(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
}

fn next_month(date: NaiveDate) -> Option<NaiveDate> {
    if date.month() == 12 {
        month_start(date.year() + 1, 1)
    } else {
        month_start(date.year(), date.month() + 1)
    }
}

fn month_end(start: NaiveDate) -> Option<NaiveDate> {
    Some(next_month(start)? - Duration::days(1))
}

/// Build the calendar dimension from the fixed start month through `end`.
///
/// Output starts at the data-availability cutoff even though quincena
/// chaining begins a month earlier.
pub fn build_calendar(end: NaiveDate) -> Vec<CalendarDay> {
    let (start_year, start_month) = CALENDAR_START;
    let (cy, cm, cd) = DATA_AVAILABILITY_CUTOFF;
    let cutoff = NaiveDate::from_ymd_opt(cy, cm, cd).expect("cutoff is a valid date");

    let mut rows = Vec::new();
    let mut current = match month_start(start_year, start_month) {
        Some(date) => date,
        None => return rows,
    };
    let mut prev_q2: Option<NaiveDate> = None;

    while current <= end {
        let Some(end_of_month) = month_end(current) else { break };
        let q1 = weekend_adjusted(
            NaiveDate::from_ymd_opt(current.year(), current.month(), 15)
                .expect("every month has a 15th"),
        );
        let q2 = weekend_adjusted(end_of_month);

        let mut day = current;
        while day <= end_of_month {
            let (quincena, prev_quincena) = if day <= q1 {
                (q1, prev_q2)
            } else {
                (q2, Some(q1))
            };

            if day >= cutoff {
                rows.push(CalendarDay {
                    month: current,
                    day,
                    quincena,
                    is_quincena: day == quincena,
                    prev_quincena,
                    day_of_week: day.weekday(),
                    day_relative_to_quincena: (day - quincena).num_days(),
                });
            }
            day += Duration::days(1);
        }

        prev_q2 = Some(q2);
        current = match next_month(current) {
            Some(date) => date,
            None => break,
        };
    }

    rows
}
