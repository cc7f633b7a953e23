use thiserror::Error;

use crate::domain::{Amount, ParticipantId, TxType};
use crate::store::StoreError;

/// Errors surfaced by the ledger engine and its orchestration layer.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A role referenced by the mutation rule could not be resolved.
    /// The whole mutation is rejected; nothing is committed.
    #[error("participant not found: {0}")]
    ParticipantNotFound(ParticipantId),

    /// No club participant exists but the rule references club scope.
    #[error("no club participant is configured")]
    ClubNotFound,

    /// Rejected before any mutation is attempted.
    #[error("no mutation rule for transaction type {0}")]
    UnknownTransactionType(TxType),

    /// The engine assumes amount > 0; enforced at the boundary.
    #[error("transaction amount must be positive, got {0}")]
    InvalidAmount(Amount),

    /// The `term` value source only makes sense for deposit transactions.
    #[error("term value source is not valid for transaction type {0}")]
    TermNotApplicable(TxType),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("configuration error: {0}")]
    Config(String),
}
