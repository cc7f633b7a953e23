//! Deposit stage schedule: the club's contribution rate over time.
//!
//! The schedule drives two things: how many deposit periods a cumulative
//! paid amount completes (the `Term` value source) and the expected
//! per-member deposit total as of a date (aggregate reports).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::dates::month_parts;
use super::Amount;

/// One contribution-rate regime: `amount_per_period` per month from `start`
/// until `end` (exclusive), or open-ended when `end` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositStage {
    pub amount_per_period: Amount,
    pub start: NaiveDate,
    #[serde(default)]
    pub end: Option<NaiveDate>,
}

impl DepositStage {
    /// Number of whole monthly periods this stage can hold. `None` means
    /// unbounded (the open tail stage).
    fn capacity(&self) -> Option<i64> {
        self.end.map(|end| month_parts(self.start, end).months)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("deposit stage schedule is empty")]
    Empty,
    #[error("deposit stage {index} has a non-positive rate")]
    NonPositiveRate { index: usize },
    #[error("deposit stage {index} starts before the previous stage ends")]
    Overlap { index: usize },
    #[error("only the final deposit stage may be open-ended (stage {index})")]
    OpenNotLast { index: usize },
}

/// Ordered, non-overlapping deposit stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<DepositStage>", into = "Vec<DepositStage>")]
pub struct StageSchedule {
    stages: Vec<DepositStage>,
}

impl StageSchedule {
    pub fn new(stages: Vec<DepositStage>) -> Result<Self, ScheduleError> {
        if stages.is_empty() {
            return Err(ScheduleError::Empty);
        }
        for (index, stage) in stages.iter().enumerate() {
            if !stage.amount_per_period.is_positive() {
                return Err(ScheduleError::NonPositiveRate { index });
            }
            if stage.end.is_none() && index != stages.len() - 1 {
                return Err(ScheduleError::OpenNotLast { index });
            }
            if index > 0 {
                let prev_end = stages[index - 1].end;
                match prev_end {
                    Some(end) if stage.start >= end => {}
                    _ => return Err(ScheduleError::Overlap { index }),
                }
            }
        }
        Ok(StageSchedule { stages })
    }

    pub fn stages(&self) -> &[DepositStage] {
        &self.stages
    }

    /// Rate in force on `date`, if any stage covers it.
    pub fn rate_on(&self, date: NaiveDate) -> Option<Amount> {
        self.stages
            .iter()
            .find(|s| date >= s.start && s.end.map_or(true, |end| date < end))
            .map(|s| s.amount_per_period)
    }

    /// Map a cumulative paid amount to completed deposit periods.
    ///
    /// Consumes the paid amount stage by stage: a date-bounded stage caps
    /// its period count at the whole months it spans, so a period count
    /// stays exact across a rate-change boundary.
    pub fn completed_periods(&self, cumulative_paid: Amount) -> i64 {
        let mut remaining = cumulative_paid;
        let mut periods = 0i64;

        for stage in &self.stages {
            if !remaining.is_positive() {
                break;
            }
            let affordable = remaining.whole_units_of(stage.amount_per_period);
            let taken = match stage.capacity() {
                Some(cap) => affordable.min(cap),
                None => affordable,
            };
            periods += taken;
            remaining -= Amount::from_i64(taken) * stage.amount_per_period;
        }

        periods
    }

    /// Cumulative expected per-member deposit total as of `as_of`.
    pub fn expected_total(&self, as_of: NaiveDate) -> Amount {
        let mut total = Amount::zero();
        for stage in &self.stages {
            let effective_end = match stage.end {
                Some(end) if end < as_of => end,
                _ => as_of,
            };
            let months = month_parts(stage.start, effective_end).months;
            total += Amount::from_i64(months) * stage.amount_per_period;
        }
        total
    }
}

impl TryFrom<Vec<DepositStage>> for StageSchedule {
    type Error = ScheduleError;

    fn try_from(stages: Vec<DepositStage>) -> Result<Self, Self::Error> {
        StageSchedule::new(stages)
    }
}

impl From<StageSchedule> for Vec<DepositStage> {
    fn from(schedule: StageSchedule) -> Self {
        schedule.stages
    }
}
