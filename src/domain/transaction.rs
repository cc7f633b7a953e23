//! Transaction types and the immutable transaction record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Amount, ParticipantId};

/// The fixed transaction-type vocabulary.
///
/// The mutation rule table is keyed by this enum; anything outside it is
/// rejected before any balance is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxType {
    PeriodicDeposit,
    OffsetDeposit,
    Withdraw,
    Rejoin,
    FundsTransfer,
    LoanTaken,
    LoanRepay,
    LoanInterest,
    VendorInvest,
    VendorReturns,
    PeriodicVendorInvest,
    PeriodicVendorReturns,
}

impl TxType {
    pub const ALL: [TxType; 12] = [
        TxType::PeriodicDeposit,
        TxType::OffsetDeposit,
        TxType::Withdraw,
        TxType::Rejoin,
        TxType::FundsTransfer,
        TxType::LoanTaken,
        TxType::LoanRepay,
        TxType::LoanInterest,
        TxType::VendorInvest,
        TxType::VendorReturns,
        TxType::PeriodicVendorInvest,
        TxType::PeriodicVendorReturns,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TxType::PeriodicDeposit => "PERIODIC_DEPOSIT",
            TxType::OffsetDeposit => "OFFSET_DEPOSIT",
            TxType::Withdraw => "WITHDRAW",
            TxType::Rejoin => "REJOIN",
            TxType::FundsTransfer => "FUNDS_TRANSFER",
            TxType::LoanTaken => "LOAN_TAKEN",
            TxType::LoanRepay => "LOAN_REPAY",
            TxType::LoanInterest => "LOAN_INTEREST",
            TxType::VendorInvest => "VENDOR_INVEST",
            TxType::VendorReturns => "VENDOR_RETURNS",
            TxType::PeriodicVendorInvest => "PERIODIC_VENDOR_INVEST",
            TxType::PeriodicVendorReturns => "PERIODIC_VENDOR_RETURNS",
        }
    }

    /// Deposit types are the only ones for which the `Term` value source
    /// (newly-completed deposit periods) is meaningful.
    pub fn is_deposit(&self) -> bool {
        matches!(self, TxType::PeriodicDeposit | TxType::OffsetDeposit)
    }
}

impl std::fmt::Display for TxType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TxType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TxType::ALL
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown transaction type: {}", s))
    }
}

/// An immutable, timestamped financial event between two participants.
///
/// Once committed to the log it is append-only; corrections are compensating
/// operations, never in-place edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub tx_type: TxType,
    pub from: ParticipantId,
    pub to: ParticipantId,
    pub amount: Amount,
    pub occurred_at: DateTime<Utc>,
    pub method: Option<String>,
    pub note: Option<String>,
}

impl Transaction {
    pub fn new(
        tx_type: TxType,
        from: ParticipantId,
        to: ParticipantId,
        amount: Amount,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Transaction {
            id: Uuid::new_v4(),
            tx_type,
            from,
            to,
            amount,
            occurred_at,
            method: None,
            note: None,
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// True when `participant` appears on either side of the transfer.
    pub fn touches(&self, participant: ParticipantId) -> bool {
        self.from == participant || self.to == participant
    }
}
