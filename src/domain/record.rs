//! The ledger record: one running-balance row per participant.

use serde::{Deserialize, Serialize};

use super::Amount;

/// Addressable numeric fields of a [`LedgerRecord`].
///
/// The mutation rule table refers to fields through this enum so a rule
/// entry stays pure data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    TotalIn,
    TotalOut,
    PeriodIn,
    OffsetIn,
    Offset,
    Fund,
    Returns,
    CurrentTerm,
}

impl Field {
    pub const ALL: [Field; 8] = [
        Field::TotalIn,
        Field::TotalOut,
        Field::PeriodIn,
        Field::OffsetIn,
        Field::Offset,
        Field::Fund,
        Field::Returns,
        Field::CurrentTerm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::TotalIn => "total_in",
            Field::TotalOut => "total_out",
            Field::PeriodIn => "period_in",
            Field::OffsetIn => "offset_in",
            Field::Offset => "offset",
            Field::Fund => "fund",
            Field::Returns => "returns",
            Field::CurrentTerm => "current_term",
        }
    }
}

/// Running balances for one participant.
///
/// Every field starts at zero and is mutated only through the mutation
/// engine; all arithmetic is exact so apply-then-revert is an identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    /// Cumulative money in.
    pub total_in: Amount,
    /// Cumulative money out.
    pub total_out: Amount,
    /// Cumulative periodic deposits.
    pub period_in: Amount,
    /// Cumulative one-time offset deposits received.
    pub offset_in: Amount,
    /// Expected one-time offsets owed (late joiners / rejoins).
    pub offset: Amount,
    /// Liquid fund held by this participant.
    pub fund: Amount,
    /// Profit generated (vendor returns over principal, loan interest).
    pub returns: Amount,
    /// Completed deposit periods, kept as an exact integer counter.
    pub current_term: Amount,
}

impl LedgerRecord {
    pub fn get(&self, field: Field) -> Amount {
        match field {
            Field::TotalIn => self.total_in,
            Field::TotalOut => self.total_out,
            Field::PeriodIn => self.period_in,
            Field::OffsetIn => self.offset_in,
            Field::Offset => self.offset,
            Field::Fund => self.fund,
            Field::Returns => self.returns,
            Field::CurrentTerm => self.current_term,
        }
    }

    pub fn add(&mut self, field: Field, delta: Amount) {
        *self.field_mut(field) += delta;
    }

    pub fn sub(&mut self, field: Field, delta: Amount) {
        *self.field_mut(field) -= delta;
    }

    /// Completed deposit periods as a plain counter.
    pub fn current_term_count(&self) -> i64 {
        self.current_term.to_i64()
    }

    /// Net holding: money in minus money out.
    pub fn net_in(&self) -> Amount {
        self.total_in - self.total_out
    }

    fn field_mut(&mut self, field: Field) -> &mut Amount {
        match field {
            Field::TotalIn => &mut self.total_in,
            Field::TotalOut => &mut self.total_out,
            Field::PeriodIn => &mut self.period_in,
            Field::OffsetIn => &mut self.offset_in,
            Field::Offset => &mut self.offset,
            Field::Fund => &mut self.fund,
            Field::Returns => &mut self.returns,
            Field::CurrentTerm => &mut self.current_term,
        }
    }
}
