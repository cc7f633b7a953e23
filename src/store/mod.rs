//! Durable-store abstractions: transaction log, participant directory,
//! ledger store.
//!
//! The engine never talks to a database directly; it consumes these traits.
//! `MemoryStore` backs tests, `db::Repository` backs the real SQLite store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{LedgerRecord, Participant, ParticipantId, Role, Transaction, TxType};

pub mod memory;

pub use memory::MemoryStore;

/// Error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Filter for listing transactions from the log.
#[derive(Debug, Clone, Default)]
pub struct TxFilter {
    /// Only transactions with `occurred_at <= upto` (inclusive).
    pub upto: Option<DateTime<Utc>>,
    /// Only transactions touching this participant (either side).
    pub participant: Option<ParticipantId>,
    /// Only transactions of this type.
    pub tx_type: Option<TxType>,
}

impl TxFilter {
    pub fn upto(upto: DateTime<Utc>) -> Self {
        TxFilter {
            upto: Some(upto),
            ..Default::default()
        }
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        if let Some(upto) = self.upto {
            if tx.occurred_at > upto {
                return false;
            }
        }
        if let Some(participant) = self.participant {
            if !tx.touches(participant) {
                return false;
            }
        }
        if let Some(tx_type) = self.tx_type {
            if tx.tx_type != tx_type {
                return false;
            }
        }
        true
    }
}

/// Append-only transaction log.
///
/// `list` returns transactions ascending by `(occurred_at, insertion order)`;
/// this ordering is what makes replay deterministic.
#[async_trait]
pub trait TransactionLog: Send + Sync {
    async fn append(&self, tx: &Transaction) -> Result<Uuid, StoreError>;

    async fn list(&self, filter: &TxFilter) -> Result<Vec<Transaction>, StoreError>;
}

/// Directory of passbook holders.
#[async_trait]
pub trait ParticipantDirectory: Send + Sync {
    async fn resolve(&self, id: ParticipantId) -> Result<Option<Participant>, StoreError>;

    async fn count(&self, role: Role, active: Option<bool>) -> Result<i64, StoreError>;

    async fn list_participants(&self) -> Result<Vec<Participant>, StoreError>;
}

/// Live ledger records, one per participant.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn get(&self, id: ParticipantId) -> Result<Option<LedgerRecord>, StoreError>;

    /// Write every entry as one atomic unit. Partial application on failure
    /// is forbidden.
    async fn commit(&self, entries: &[(ParticipantId, LedgerRecord)]) -> Result<(), StoreError>;

    /// Append `tx` to the log and write `entries` in the same atomic unit.
    async fn commit_with_log(
        &self,
        tx: &Transaction,
        entries: &[(ParticipantId, LedgerRecord)],
    ) -> Result<(), StoreError>;
}
