//! Ledger mutation engine: interprets one rule-table entry against the
//! affected participants' records.
//!
//! The engine is pure: it mutates an in-memory record set and leaves
//! persistence (and the atomic commit boundary) to the caller. Everything is
//! validated and every operand resolved before the first field is written,
//! so a failed application never leaves a partially-mutated set.

use std::collections::BTreeMap;

use crate::domain::{Amount, LedgerRecord, ParticipantId, StageSchedule, Transaction};
use crate::error::LedgerError;
use crate::rules::{ActionDescriptor, RuleRole, RuleTable, ValueSource};

/// Forward application or its exact inverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Revert,
}

/// Apply `tx` to the records it touches. Returns the touched participant ids.
pub fn apply(
    tx: &Transaction,
    rules: &RuleTable,
    schedule: &StageSchedule,
    club: Option<ParticipantId>,
    records: &mut BTreeMap<ParticipantId, LedgerRecord>,
) -> Result<Vec<ParticipantId>, LedgerError> {
    mutate(tx, Direction::Forward, rules, schedule, club, records)
}

/// Apply the same rule with ADD and SUB swapped, restoring every field the
/// forward application touched to its exact prior value.
pub fn revert(
    tx: &Transaction,
    rules: &RuleTable,
    schedule: &StageSchedule,
    club: Option<ParticipantId>,
    records: &mut BTreeMap<ParticipantId, LedgerRecord>,
) -> Result<Vec<ParticipantId>, LedgerError> {
    mutate(tx, Direction::Revert, rules, schedule, club, records)
}

/// Participant ids a transaction's rule entries reference, in role order.
pub fn referenced_ids(
    tx: &Transaction,
    rules: &RuleTable,
    club: Option<ParticipantId>,
) -> Result<Vec<ParticipantId>, LedgerError> {
    let entries = rules.entries_for(tx.tx_type);
    if entries.is_empty() {
        return Err(LedgerError::UnknownTransactionType(tx.tx_type));
    }
    entries
        .iter()
        .map(|(role, _)| resolve_role(*role, tx, club))
        .collect()
}

fn resolve_role(
    role: RuleRole,
    tx: &Transaction,
    club: Option<ParticipantId>,
) -> Result<ParticipantId, LedgerError> {
    match role {
        RuleRole::Sender => Ok(tx.from),
        RuleRole::Receiver => Ok(tx.to),
        RuleRole::Club => club.ok_or(LedgerError::ClubNotFound),
    }
}

fn mutate(
    tx: &Transaction,
    direction: Direction,
    rules: &RuleTable,
    schedule: &StageSchedule,
    club: Option<ParticipantId>,
    records: &mut BTreeMap<ParticipantId, LedgerRecord>,
) -> Result<Vec<ParticipantId>, LedgerError> {
    if !tx.amount.is_positive() {
        return Err(LedgerError::InvalidAmount(tx.amount));
    }

    let entries = rules.entries_for(tx.tx_type);
    if entries.is_empty() {
        return Err(LedgerError::UnknownTransactionType(tx.tx_type));
    }

    // Resolve every referenced role to a present record before writing.
    let mut touched = Vec::with_capacity(entries.len());
    for (role, _) in &entries {
        let id = resolve_role(*role, tx, club)?;
        if !records.contains_key(&id) {
            return Err(LedgerError::ParticipantNotFound(id));
        }
        touched.push(id);
    }

    let resolved = resolve_values(tx, direction, schedule, &entries, records)?;

    for ((_, descriptor), id) in entries.iter().zip(touched.iter()) {
        let (adds, subs) = match direction {
            Direction::Forward => (&descriptor.add, &descriptor.sub),
            Direction::Revert => (&descriptor.sub, &descriptor.add),
        };
        if let Some(record) = records.get_mut(id) {
            for (field, source) in adds {
                record.add(*field, resolved.get(*source));
            }
            for (field, source) in subs {
                record.sub(*field, resolved.get(*source));
            }
        }
    }

    Ok(touched)
}

struct ResolvedValues {
    amount: Amount,
    term: Amount,
    profit: Amount,
}

impl ResolvedValues {
    fn get(&self, source: ValueSource) -> Amount {
        match source {
            ValueSource::Amount => self.amount,
            ValueSource::One => Amount::one(),
            ValueSource::Term => self.term,
            ValueSource::Profit => self.profit,
        }
    }
}

/// Resolve the value-source map against the current record state.
///
/// `Term` and `Profit` are direction-aware: reverting derives the same
/// figure the forward application used, read off the post-application state.
fn resolve_values(
    tx: &Transaction,
    direction: Direction,
    schedule: &StageSchedule,
    entries: &[(RuleRole, &ActionDescriptor)],
    records: &BTreeMap<ParticipantId, LedgerRecord>,
) -> Result<ResolvedValues, LedgerError> {
    let needs = |wanted: ValueSource| {
        entries
            .iter()
            .any(|(_, d)| d.sources().any(|s| s == wanted))
    };

    let term = if needs(ValueSource::Term) {
        resolve_term(tx, direction, schedule, records)?
    } else {
        Amount::zero()
    };
    let profit = if needs(ValueSource::Profit) {
        resolve_profit(tx, direction, records)?
    } else {
        Amount::zero()
    };

    Ok(ResolvedValues {
        amount: tx.amount,
        term,
        profit,
    })
}

/// Newly-completed deposit periods for this deposit.
///
/// Forward: periods completed by `period_in + amount`, minus the stored
/// counter. Revert: the stored counter minus periods completed by
/// `period_in - amount` (the record already includes this deposit).
/// Either way the delta is exactly what the forward application added,
/// even when the deposit straddles a rate-change boundary.
fn resolve_term(
    tx: &Transaction,
    direction: Direction,
    schedule: &StageSchedule,
    records: &BTreeMap<ParticipantId, LedgerRecord>,
) -> Result<Amount, LedgerError> {
    if !tx.tx_type.is_deposit() {
        return Err(LedgerError::TermNotApplicable(tx.tx_type));
    }
    let sender = records
        .get(&tx.from)
        .ok_or(LedgerError::ParticipantNotFound(tx.from))?;

    let term = match direction {
        Direction::Forward => {
            schedule.completed_periods(sender.period_in + tx.amount) - sender.current_term_count()
        }
        Direction::Revert => {
            sender.current_term_count() - schedule.completed_periods(sender.period_in - tx.amount)
        }
    };

    Ok(Amount::from_i64(term.max(0)))
}

/// Portion of a vendor return that exceeds the sender's remaining invested
/// principal, clamped to `[0, amount]`.
fn resolve_profit(
    tx: &Transaction,
    direction: Direction,
    records: &BTreeMap<ParticipantId, LedgerRecord>,
) -> Result<Amount, LedgerError> {
    let sender = records
        .get(&tx.from)
        .ok_or(LedgerError::ParticipantNotFound(tx.from))?;
    let base = match direction {
        // Forward: amount beyond the remaining principal.
        Direction::Forward => tx.amount - sender.fund,
        // Revert: the principal was already subtracted, so the excess shows
        // up as the fund balance gone negative.
        Direction::Revert => -sender.fund,
    };
    Ok(base.clamp(Amount::zero(), tx.amount))
}
