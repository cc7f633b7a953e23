//! Calendar arithmetic shared by the interest calculator and the stage schedule.

use chrono::{Datelike, Months, NaiveDate};

/// Whole calendar months plus remaining days between two dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthParts {
    pub months: i64,
    pub days: i64,
}

/// Split `start..end` into whole calendar months and leftover days.
///
/// Months are counted as `(year_e*12 + month_e) - (year_s*12 + month_s)`,
/// decremented by one when the end day-of-month falls before the start
/// day-of-month. Days are whatever remains past the month anchor.
/// `end <= start` yields zero months and zero days.
pub fn month_parts(start: NaiveDate, end: NaiveDate) -> MonthParts {
    if end <= start {
        return MonthParts { months: 0, days: 0 };
    }

    let mut months = (end.year() as i64 - start.year() as i64) * 12
        + (end.month() as i64 - start.month() as i64);
    if (end.day() as i64) < (start.day() as i64) {
        months -= 1;
    }
    if months < 0 {
        months = 0;
    }

    let anchor = start
        .checked_add_months(Months::new(months as u32))
        .unwrap_or(start);
    let days = (end - anchor).num_days().max(0);

    MonthParts { months, days }
}

/// Last day of the month containing `month_start`.
pub fn end_of_month(month_start: NaiveDate) -> NaiveDate {
    let first = first_of_month(month_start);
    first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(month_start)
}

/// First day of the month containing `d`.
pub fn first_of_month(d: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(d.year(), d.month(), 1).unwrap_or(d)
}
