//! Loan cycle decomposer: turns one participant's loan history into
//! disjoint, time-bounded principal periods.
//!
//! Periods are derived, never persisted: an open period's effective end is
//! always "now", so every query recomputes from the log.

use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::{Amount, ParticipantId, Transaction, TxType};

use super::interest::{accrue, RatePolicy};

/// One interval of constant outstanding principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoanPeriod {
    pub principal: Amount,
    pub start: NaiveDate,
    /// `None` while the period is still open (accrues to the query cutoff).
    pub end: Option<NaiveDate>,
    pub months_elapsed: i64,
    pub days_elapsed: i64,
    pub interest: Amount,
    pub label: String,
}

/// Problems found while decomposing a loan history. Isolated to the one
/// participant; a batch decomposition across participants never aborts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum LoanAnomaly {
    /// A repayment with no outstanding loan.
    RepayWithoutLoan { at: NaiveDate, amount: Amount },
    /// A repayment exceeding the outstanding balance; the balance is
    /// clamped to zero and the excess recorded here.
    OverRepayment {
        at: NaiveDate,
        amount: Amount,
        outstanding: Amount,
    },
}

/// Decomposed loan history for one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoanSchedule {
    pub participant: ParticipantId,
    pub periods: Vec<LoanPeriod>,
    pub outstanding: Amount,
    pub anomalies: Vec<LoanAnomaly>,
    /// Total accrued interest across all periods, filled by [`accrue_periods`].
    pub interest_total: Amount,
}

/// A loan event as seen from one participant's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoanEvent {
    pub kind: LoanEventKind,
    pub amount: Amount,
    pub at: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanEventKind {
    Taken,
    Repay,
}

impl LoanEvent {
    /// Interpret a transaction as a loan event for `participant`, if it is one.
    pub fn from_transaction(tx: &Transaction, participant: ParticipantId) -> Option<LoanEvent> {
        let kind = match tx.tx_type {
            TxType::LoanTaken if tx.to == participant => LoanEventKind::Taken,
            TxType::LoanRepay if tx.from == participant => LoanEventKind::Repay,
            _ => return None,
        };
        Some(LoanEvent {
            kind,
            amount: tx.amount,
            at: tx.occurred_at.date_naive(),
        })
    }
}

/// Run the period state machine over time-ordered loan events.
///
/// Every event closes the open period (if any) and re-opens at the new
/// running balance; the invariant `sum(taken) - sum(repaid) == outstanding
/// == open period principal` holds for well-formed histories.
pub fn decompose(participant: ParticipantId, events: &[LoanEvent]) -> LoanSchedule {
    let mut periods: Vec<LoanPeriod> = Vec::new();
    let mut anomalies = Vec::new();
    let mut balance = Amount::zero();
    let mut open_start: Option<NaiveDate> = None;

    let close_open = |open_start: &mut Option<NaiveDate>,
                          periods: &mut Vec<LoanPeriod>,
                          balance: Amount,
                          at: NaiveDate| {
        if let Some(start) = open_start.take() {
            periods.push(raw_period(balance, start, Some(at)));
        }
    };

    for event in events {
        match event.kind {
            LoanEventKind::Taken => {
                close_open(&mut open_start, &mut periods, balance, event.at);
                balance += event.amount;
                open_start = Some(event.at);
            }
            LoanEventKind::Repay => {
                if balance.is_zero() {
                    anomalies.push(LoanAnomaly::RepayWithoutLoan {
                        at: event.at,
                        amount: event.amount,
                    });
                    continue;
                }
                close_open(&mut open_start, &mut periods, balance, event.at);
                if event.amount > balance {
                    anomalies.push(LoanAnomaly::OverRepayment {
                        at: event.at,
                        amount: event.amount,
                        outstanding: balance,
                    });
                    balance = Amount::zero();
                } else {
                    balance -= event.amount;
                }
                if balance.is_positive() {
                    open_start = Some(event.at);
                }
            }
        }
    }

    if let Some(start) = open_start {
        if balance.is_positive() {
            periods.push(raw_period(balance, start, None));
        }
    }

    LoanSchedule {
        participant,
        periods,
        outstanding: balance,
        anomalies,
        interest_total: Amount::zero(),
    }
}

/// Fill in accrued interest for every period.
///
/// Open periods accrue to `cutoff`. The policy for each period follows its
/// start date relative to `rate_cutover`.
pub fn accrue_periods(
    schedule: &mut LoanSchedule,
    monthly_rate: Amount,
    rate_cutover: Option<NaiveDate>,
    cutoff: NaiveDate,
) {
    let mut total = Amount::zero();
    for period in &mut schedule.periods {
        let end = period.end.unwrap_or(cutoff);
        let policy = RatePolicy::for_start(period.start, rate_cutover);
        let result = accrue(period.principal, period.start, end, monthly_rate, policy);
        period.months_elapsed = result.months_elapsed;
        period.days_elapsed = result.days_elapsed;
        period.interest = result.amount;
        period.label = result.label;
        total += result.amount;
    }
    schedule.interest_total = total;
}

fn raw_period(principal: Amount, start: NaiveDate, end: Option<NaiveDate>) -> LoanPeriod {
    LoanPeriod {
        principal,
        start,
        end,
        months_elapsed: 0,
        days_elapsed: 0,
        interest: Amount::zero(),
        label: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn amt(s: &str) -> Amount {
        Amount::from_str_canonical(s).unwrap()
    }

    fn taken(amount: &str, at: NaiveDate) -> LoanEvent {
        LoanEvent {
            kind: LoanEventKind::Taken,
            amount: amt(amount),
            at,
        }
    }

    fn repay(amount: &str, at: NaiveDate) -> LoanEvent {
        LoanEvent {
            kind: LoanEventKind::Repay,
            amount: amt(amount),
            at,
        }
    }

    #[test]
    fn test_reference_scenario() {
        // TAKEN 5000 @ Jan-01, TAKEN 3000 @ Feb-01, REPAY 4000 @ Mar-01.
        let participant = ParticipantId::generate();
        let events = [
            taken("5000", d(2024, 1, 1)),
            taken("3000", d(2024, 2, 1)),
            repay("4000", d(2024, 3, 1)),
        ];
        let schedule = decompose(participant, &events);

        assert_eq!(schedule.periods.len(), 3);
        assert_eq!(schedule.periods[0].principal, amt("5000"));
        assert_eq!(schedule.periods[0].start, d(2024, 1, 1));
        assert_eq!(schedule.periods[0].end, Some(d(2024, 2, 1)));

        assert_eq!(schedule.periods[1].principal, amt("8000"));
        assert_eq!(schedule.periods[1].start, d(2024, 2, 1));
        assert_eq!(schedule.periods[1].end, Some(d(2024, 3, 1)));

        assert_eq!(schedule.periods[2].principal, amt("4000"));
        assert_eq!(schedule.periods[2].start, d(2024, 3, 1));
        assert_eq!(schedule.periods[2].end, None);

        assert_eq!(schedule.outstanding, amt("4000"));
        assert!(schedule.anomalies.is_empty());
    }

    #[test]
    fn test_conservation() {
        let participant = ParticipantId::generate();
        let events = [
            taken("5000", d(2024, 1, 1)),
            repay("1500", d(2024, 2, 10)),
            taken("2000", d(2024, 4, 1)),
            repay("3000", d(2024, 6, 20)),
        ];
        let schedule = decompose(participant, &events);

        let taken_total = amt("7000");
        let repaid_total = amt("4500");
        assert_eq!(schedule.outstanding, taken_total - repaid_total);
        assert_eq!(
            schedule.periods.last().unwrap().principal,
            schedule.outstanding
        );
    }

    #[test]
    fn test_full_repayment_leaves_no_open_period() {
        let participant = ParticipantId::generate();
        let events = [taken("5000", d(2024, 1, 1)), repay("5000", d(2024, 3, 1))];
        let schedule = decompose(participant, &events);

        assert_eq!(schedule.outstanding, Amount::zero());
        assert_eq!(schedule.periods.len(), 1);
        assert_eq!(schedule.periods[0].end, Some(d(2024, 3, 1)));
    }

    #[test]
    fn test_repay_without_loan_is_flagged() {
        let participant = ParticipantId::generate();
        let events = [repay("1000", d(2024, 1, 1))];
        let schedule = decompose(participant, &events);

        assert!(schedule.periods.is_empty());
        assert_eq!(schedule.outstanding, Amount::zero());
        assert_eq!(
            schedule.anomalies,
            vec![LoanAnomaly::RepayWithoutLoan {
                at: d(2024, 1, 1),
                amount: amt("1000"),
            }]
        );
    }

    #[test]
    fn test_over_repayment_clamps_and_flags() {
        let participant = ParticipantId::generate();
        let events = [taken("2000", d(2024, 1, 1)), repay("2500", d(2024, 2, 1))];
        let schedule = decompose(participant, &events);

        assert_eq!(schedule.outstanding, Amount::zero());
        assert_eq!(
            schedule.anomalies,
            vec![LoanAnomaly::OverRepayment {
                at: d(2024, 2, 1),
                amount: amt("2500"),
                outstanding: amt("2000"),
            }]
        );
    }

    #[test]
    fn test_accrual_fills_every_period() {
        let participant = ParticipantId::generate();
        let events = [
            taken("5000", d(2024, 1, 1)),
            taken("3000", d(2024, 2, 1)),
            repay("4000", d(2024, 3, 1)),
        ];
        let mut schedule = decompose(participant, &events);
        accrue_periods(&mut schedule, amt("0.01"), None, d(2024, 4, 1));

        // 5000 for one month = 50; 8000 for one month = 80; 4000 open
        // period for one month to the cutoff = 40.
        assert_eq!(schedule.periods[0].interest, amt("50"));
        assert_eq!(schedule.periods[1].interest, amt("80"));
        assert_eq!(schedule.periods[2].interest, amt("40"));
        assert_eq!(schedule.interest_total, amt("170"));
        assert_eq!(schedule.periods[0].label, "1 month 0 days");
    }

    #[test]
    fn test_loan_event_from_transaction() {
        use chrono::{TimeZone, Utc};
        let member = ParticipantId::generate();
        let club = ParticipantId::generate();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();

        let taken_tx = Transaction::new(TxType::LoanTaken, club, member, amt("5000"), at);
        let event = LoanEvent::from_transaction(&taken_tx, member).unwrap();
        assert_eq!(event.kind, LoanEventKind::Taken);

        // Same transaction is not a loan event from the club's perspective.
        assert!(LoanEvent::from_transaction(&taken_tx, club).is_none());

        let deposit = Transaction::new(TxType::PeriodicDeposit, member, club, amt("2000"), at);
        assert!(LoanEvent::from_transaction(&deposit, member).is_none());
    }
}
