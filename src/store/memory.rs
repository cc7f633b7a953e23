//! In-memory store for tests: all three store traits behind one mutex.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{LedgerRecord, Participant, ParticipantId, Role, Transaction};

use super::{LedgerStore, ParticipantDirectory, StoreError, TransactionLog, TxFilter};

#[derive(Debug, Default)]
struct Inner {
    participants: HashMap<ParticipantId, Participant>,
    // Insertion order is the log's tie-breaker within one occurred_at.
    log: Vec<Transaction>,
    records: HashMap<ParticipantId, LedgerRecord>,
}

/// Mutex-guarded in-memory store.
///
/// The single lock makes `commit_with_log` trivially atomic, which is all
/// the concurrency the test double needs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_participant(self, participant: Participant) -> Self {
        {
            let mut inner = self.lock();
            inner.participants.insert(participant.id, participant);
        }
        self
    }

    pub fn with_participants(self, participants: Vec<Participant>) -> Self {
        {
            let mut inner = self.lock();
            for p in participants {
                inner.participants.insert(p.id, p);
            }
        }
        self
    }

    /// Seed a log entry without touching any ledger record.
    pub fn with_transaction(self, tx: Transaction) -> Self {
        {
            let mut inner = self.lock();
            inner.log.push(tx);
        }
        self
    }

    /// Overwrite one live record out-of-band (used to simulate drift).
    pub fn tamper_record(&self, id: ParticipantId, record: LedgerRecord) {
        self.lock().records.insert(id, record);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock only happens after a panic in a test.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl TransactionLog for MemoryStore {
    async fn append(&self, tx: &Transaction) -> Result<Uuid, StoreError> {
        self.lock().log.push(tx.clone());
        Ok(tx.id)
    }

    async fn list(&self, filter: &TxFilter) -> Result<Vec<Transaction>, StoreError> {
        let inner = self.lock();
        let mut matched: Vec<(usize, Transaction)> = inner
            .log
            .iter()
            .enumerate()
            .filter(|(_, tx)| filter.matches(tx))
            .map(|(seq, tx)| (seq, tx.clone()))
            .collect();
        matched.sort_by_key(|(seq, tx)| (tx.occurred_at, *seq));
        Ok(matched.into_iter().map(|(_, tx)| tx).collect())
    }
}

#[async_trait]
impl ParticipantDirectory for MemoryStore {
    async fn resolve(&self, id: ParticipantId) -> Result<Option<Participant>, StoreError> {
        Ok(self.lock().participants.get(&id).cloned())
    }

    async fn count(&self, role: Role, active: Option<bool>) -> Result<i64, StoreError> {
        Ok(self
            .lock()
            .participants
            .values()
            .filter(|p| p.role == role && active.map_or(true, |a| p.active == a))
            .count() as i64)
    }

    async fn list_participants(&self) -> Result<Vec<Participant>, StoreError> {
        let mut participants: Vec<Participant> =
            self.lock().participants.values().cloned().collect();
        participants.sort_by_key(|p| p.id);
        Ok(participants)
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn get(&self, id: ParticipantId) -> Result<Option<LedgerRecord>, StoreError> {
        Ok(self.lock().records.get(&id).cloned())
    }

    async fn commit(&self, entries: &[(ParticipantId, LedgerRecord)]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        for (id, record) in entries {
            inner.records.insert(*id, record.clone());
        }
        Ok(())
    }

    async fn commit_with_log(
        &self,
        tx: &Transaction,
        entries: &[(ParticipantId, LedgerRecord)],
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.log.push(tx.clone());
        for (id, record) in entries {
            inner.records.insert(*id, record.clone());
        }
        Ok(())
    }
}
