//! Orchestration layer: wires the store, the rule table, and the policy
//! into the operations the binary (and the integration tests) call.
//!
//! All writes go through a single async mutex so a transaction's
//! read-mutate-commit cycle never interleaves with another writer. Reads
//! (replay, snapshots) take no lock; they only see committed log prefixes.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, warn};

use crate::config::Policy;
use crate::domain::{
    dates, Amount, Field, LedgerRecord, Participant, ParticipantId, Role, StageSchedule,
    Transaction, TxType,
};
use crate::engine::{self, aggregate, loan, mutation, ClubFacts, LoanEvent, LoanSchedule,
    MonthlySnapshot};
use crate::error::LedgerError;
use crate::rules::RuleTable;
use crate::store::{LedgerStore, ParticipantDirectory, TransactionLog, TxFilter};

/// One field-level divergence between the live records and a fresh replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftEntry {
    pub participant: ParticipantId,
    pub field: Field,
    pub live: Amount,
    pub replayed: Amount,
}

pub struct LedgerService<S> {
    store: Arc<S>,
    rules: RuleTable,
    policy: Policy,
    write_lock: tokio::sync::Mutex<()>,
}

impl<S> LedgerService<S>
where
    S: TransactionLog + ParticipantDirectory + LedgerStore,
{
    pub fn new(store: Arc<S>, policy: Policy) -> Self {
        LedgerService {
            store,
            rules: RuleTable::standard(),
            policy,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn schedule(&self) -> &StageSchedule {
        &self.policy.schedule
    }

    /// Apply one transaction: mutate the touched records and append it to
    /// the log in a single atomic commit.
    pub async fn apply_transaction(
        &self,
        tx: Transaction,
    ) -> Result<Vec<(ParticipantId, LedgerRecord)>, LedgerError> {
        let _guard = self.write_lock.lock().await;

        let club = self.club_id().await?;
        let mut records = self.load_touched(&tx, club).await?;
        let touched = mutation::apply(&tx, &self.rules, &self.policy.schedule, club, &mut records)?;

        let entries = collect_entries(&touched, &records);
        self.store.commit_with_log(&tx, &entries).await?;
        info!(tx_type = %tx.tx_type, amount = %tx.amount, "applied transaction");
        Ok(entries)
    }

    /// Undo a previously applied transaction on the live records.
    ///
    /// Only the records are compensated; the log keeps the original entry.
    /// Callers that also want the entry gone from history must remove it
    /// and recalculate.
    pub async fn revert_transaction(
        &self,
        tx: &Transaction,
    ) -> Result<Vec<(ParticipantId, LedgerRecord)>, LedgerError> {
        let _guard = self.write_lock.lock().await;

        let club = self.club_id().await?;
        let mut records = self.load_touched(tx, club).await?;
        let touched = mutation::revert(tx, &self.rules, &self.policy.schedule, club, &mut records)?;

        let entries = collect_entries(&touched, &records);
        self.store.commit(&entries).await?;
        info!(tx_type = %tx.tx_type, amount = %tx.amount, "reverted transaction");
        Ok(entries)
    }

    /// Rebuild every record from the log, up to `as_of` when given.
    pub async fn replay(
        &self,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<BTreeMap<ParticipantId, LedgerRecord>, LedgerError> {
        let participants = self.store.list_participants().await?;
        let filter = match as_of {
            Some(upto) => TxFilter::upto(upto),
            None => TxFilter::default(),
        };
        let transactions = self.store.list(&filter).await?;
        engine::replay(&participants, &transactions).run(&self.rules, &self.policy.schedule)
    }

    /// Decompose one participant's loan history into constant-principal
    /// periods with interest accrued to `cutoff`.
    pub async fn loan_schedule(
        &self,
        participant: ParticipantId,
        cutoff: NaiveDate,
    ) -> Result<LoanSchedule, LedgerError> {
        let filter = TxFilter {
            upto: Some(end_of_day(cutoff)),
            participant: Some(participant),
            ..Default::default()
        };
        let transactions = self.store.list(&filter).await?;
        let events: Vec<LoanEvent> = transactions
            .iter()
            .filter_map(|tx| LoanEvent::from_transaction(tx, participant))
            .collect();

        let mut schedule = loan::decompose(participant, &events);
        loan::accrue_periods(
            &mut schedule,
            self.policy.monthly_rate,
            self.policy.rate_cutover,
            cutoff,
        );
        Ok(schedule)
    }

    /// Interest on an arbitrary principal over a date range, under whichever
    /// rate policy the start date selects.
    pub fn accrued_interest(
        &self,
        principal: Amount,
        start: NaiveDate,
        end: NaiveDate,
    ) -> engine::InterestResult {
        let policy = engine::RatePolicy::for_start(start, self.policy.rate_cutover);
        engine::accrue(principal, start, end, self.policy.monthly_rate, policy)
    }

    /// Compute the aggregate report for the month containing `month_start`.
    pub async fn monthly_snapshot(
        &self,
        month_start: NaiveDate,
    ) -> Result<MonthlySnapshot, LedgerError> {
        let month_start = dates::first_of_month(month_start);
        let month_end = dates::end_of_month(month_start);
        let cutoff = end_of_day(month_end);

        let participants = self.store.list_participants().await?;
        let transactions = self.store.list(&TxFilter::upto(cutoff)).await?;
        let records = engine::replay(&participants, &transactions)
            .run(&self.rules, &self.policy.schedule)?;

        let facts = self
            .club_facts(&participants, &transactions, month_end)
            .await?;
        Ok(aggregate::compute(
            month_start,
            month_end,
            &participants,
            &records,
            &facts,
        ))
    }

    /// One snapshot per month, `months` months starting at `from`.
    pub async fn snapshot_series(
        &self,
        from: NaiveDate,
        months: u32,
    ) -> Result<Vec<MonthlySnapshot>, LedgerError> {
        let mut out = Vec::with_capacity(months as usize);
        let mut month_start = dates::first_of_month(from);
        for _ in 0..months {
            out.push(self.monthly_snapshot(month_start).await?);
            month_start = month_start
                .checked_add_months(chrono::Months::new(1))
                .ok_or_else(|| LedgerError::Config("snapshot range overflow".to_string()))?;
        }
        Ok(out)
    }

    /// Compare the live records against a fresh replay, field by field.
    pub async fn check_replay_drift(
        &self,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Vec<DriftEntry>, LedgerError> {
        let replayed = self.replay(as_of).await?;
        let mut drift = Vec::new();
        for (id, expected) in &replayed {
            let live = self.store.get(*id).await?.unwrap_or_default();
            for field in Field::ALL {
                if live.get(field) != expected.get(field) {
                    drift.push(DriftEntry {
                        participant: *id,
                        field,
                        live: live.get(field),
                        replayed: expected.get(field),
                    });
                }
            }
        }
        Ok(drift)
    }

    /// Replace every live record with its replayed value.
    ///
    /// This is the recovery path after manual log edits: the log is the
    /// source of truth and the records are a cache of it.
    pub async fn recalculate(&self) -> Result<usize, LedgerError> {
        let _guard = self.write_lock.lock().await;

        let drift = self.check_replay_drift(None).await?;
        for entry in &drift {
            warn!(
                participant = %entry.participant,
                field = entry.field.as_str(),
                live = %entry.live,
                replayed = %entry.replayed,
                "record drifted from replay"
            );
        }

        let replayed = self.replay(None).await?;
        let entries: Vec<(ParticipantId, LedgerRecord)> =
            replayed.into_iter().collect();
        self.store.commit(&entries).await?;
        info!(records = entries.len(), drifted_fields = drift.len(), "recalculated ledger");
        Ok(entries.len())
    }

    async fn club_id(&self) -> Result<Option<ParticipantId>, LedgerError> {
        let participants = self.store.list_participants().await?;
        Ok(participants
            .iter()
            .find(|p| p.role == Role::Club)
            .map(|p| p.id))
    }

    /// Load the records a transaction's rule entries will touch, verifying
    /// every referenced participant exists. A participant with no record
    /// yet starts from the zero baseline.
    async fn load_touched(
        &self,
        tx: &Transaction,
        club: Option<ParticipantId>,
    ) -> Result<BTreeMap<ParticipantId, LedgerRecord>, LedgerError> {
        let ids = mutation::referenced_ids(tx, &self.rules, club)?;
        let mut records = BTreeMap::new();
        for id in ids {
            if self.store.resolve(id).await?.is_none() {
                return Err(LedgerError::ParticipantNotFound(id));
            }
            let record = self.store.get(id).await?.unwrap_or_default();
            records.insert(id, record);
        }
        Ok(records)
    }

    /// Assemble the external facts the snapshot formulas need.
    async fn club_facts(
        &self,
        participants: &[Participant],
        transactions: &[Transaction],
        as_of: NaiveDate,
    ) -> Result<ClubFacts, LedgerError> {
        let active_members = self.store.count(Role::Member, Some(true)).await?;
        let expected_deposit_per_member = self.policy.schedule.expected_total(as_of);

        let interest_collected: Amount = transactions
            .iter()
            .filter(|tx| tx.tx_type == TxType::LoanInterest)
            .map(|tx| tx.amount)
            .sum();

        let mut expected_interest = Amount::zero();
        let mut loans_outstanding = Amount::zero();
        for participant in participants.iter().filter(|p| p.role == Role::Member) {
            let events: Vec<LoanEvent> = transactions
                .iter()
                .filter_map(|tx| LoanEvent::from_transaction(tx, participant.id))
                .collect();
            if events.is_empty() {
                continue;
            }
            let mut schedule = loan::decompose(participant.id, &events);
            loan::accrue_periods(
                &mut schedule,
                self.policy.monthly_rate,
                self.policy.rate_cutover,
                as_of,
            );
            expected_interest += schedule.interest_total;
            loans_outstanding += schedule.outstanding;
        }

        Ok(ClubFacts {
            active_members,
            expected_deposit_per_member,
            expected_interest,
            interest_collected,
            loans_outstanding,
        })
    }
}

fn collect_entries(
    touched: &[ParticipantId],
    records: &BTreeMap<ParticipantId, LedgerRecord>,
) -> Vec<(ParticipantId, LedgerRecord)> {
    let mut entries: Vec<(ParticipantId, LedgerRecord)> = Vec::with_capacity(touched.len());
    for id in touched {
        if entries.iter().any(|(seen, _)| seen == id) {
            continue;
        }
        if let Some(record) = records.get(id) {
            entries.push((*id, record.clone()));
        }
    }
    entries
}

fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(23, 59, 59)
        .map(|ndt| ndt.and_utc())
        .unwrap_or_else(|| Utc::now())
}
