//! Simple-interest accrual over a principal period.
//!
//! Whole calendar months are charged at the monthly rate; the partial-month
//! remainder is prorated against a nominal 30-day month, deliberately not
//! the true days in the calendar month.

use chrono::NaiveDate;

use crate::domain::{month_parts, Amount};

/// Which accrual formula applies to a period.
///
/// Periods opened before the configured cutover date fall under the legacy
/// regime; the shape of the legacy formula is a recorded policy decision
/// (see DESIGN.md), not a hardcoded constant of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatePolicy {
    /// Whole months plus a 30-day-prorated partial month.
    Current,
    /// Whole-month charging: any partial month rounds up to a full month.
    Legacy,
}

impl RatePolicy {
    /// Select the policy for a period starting at `start`, given an optional
    /// cutover date. No cutover configured means everything is `Current`.
    pub fn for_start(start: NaiveDate, cutover: Option<NaiveDate>) -> Self {
        match cutover {
            Some(cutover) if start < cutover => RatePolicy::Legacy,
            _ => RatePolicy::Current,
        }
    }
}

/// Outcome of accruing interest over one period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterestResult {
    pub months_elapsed: i64,
    pub days_elapsed: i64,
    /// Accrued interest, rounded to minor units.
    pub amount: Amount,
    /// Human label such as "3 months 12 days".
    pub label: String,
}

/// Accrue simple interest on `principal` from `start` to `end` at
/// `monthly_rate` (e.g. 0.01 for 1%/month) under `policy`.
pub fn accrue(
    principal: Amount,
    start: NaiveDate,
    end: NaiveDate,
    monthly_rate: Amount,
    policy: RatePolicy,
) -> InterestResult {
    let parts = month_parts(start, end);
    let per_month = principal * monthly_rate;

    let amount = match policy {
        RatePolicy::Current => {
            let whole = per_month * Amount::from_i64(parts.months);
            let partial =
                per_month * Amount::from_i64(parts.days) / Amount::from_i64(30);
            (whole + partial).round_minor()
        }
        RatePolicy::Legacy => {
            let charged_months = parts.months + i64::from(parts.days > 0);
            (per_month * Amount::from_i64(charged_months)).round_minor()
        }
    };

    InterestResult {
        months_elapsed: parts.months,
        days_elapsed: parts.days,
        amount,
        label: label(parts.months, parts.days),
    }
}

fn label(months: i64, days: i64) -> String {
    let month_word = if months == 1 { "month" } else { "months" };
    let day_word = if days == 1 { "day" } else { "days" };
    format!("{} {} {} {}", months, month_word, days, day_word)
}
