//! SQLite repository: the durable implementation of the store traits.
//!
//! Amounts are stored as canonical decimal strings and timestamps as
//! integer Unix milliseconds; both survive a write/read cycle losslessly.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::{
    Amount, LedgerRecord, Participant, ParticipantId, Role, Transaction, TxType,
};
use crate::engine::MonthlySnapshot;
use crate::store::{
    LedgerStore, ParticipantDirectory, StoreError, TransactionLog, TxFilter,
};

/// Repository over a SQLite pool.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub async fn insert_participant(&self, participant: &Participant) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO participants (id, role, active)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET active = excluded.active
            "#,
        )
        .bind(participant.id.to_string())
        .bind(participant.role.as_str())
        .bind(participant.active as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persist a computed monthly snapshot (cache row; replay stays the
    /// source of truth).
    pub async fn save_snapshot(&self, snapshot: &MonthlySnapshot) -> Result<(), StoreError> {
        let payload = serde_json::to_string(snapshot)
            .map_err(|e| StoreError::Corrupt(format!("snapshot serialization: {}", e)))?;
        sqlx::query(
            r#"
            INSERT INTO monthly_snapshots (month_start, payload, computed_at_ms)
            VALUES (?, ?, ?)
            ON CONFLICT(month_start) DO UPDATE SET
                payload = excluded.payload,
                computed_at_ms = excluded.computed_at_ms
            "#,
        )
        .bind(snapshot.month_start.to_string())
        .bind(payload)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_snapshot(
        &self,
        month_start: NaiveDate,
    ) -> Result<Option<MonthlySnapshot>, StoreError> {
        let row = sqlx::query("SELECT payload FROM monthly_snapshots WHERE month_start = ?")
            .bind(month_start.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let payload: String = row.get(0);
                let snapshot = serde_json::from_str(&payload)
                    .map_err(|e| StoreError::Corrupt(format!("snapshot payload: {}", e)))?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }
}

fn parse_amount(column: &str, raw: &str) -> Result<Amount, StoreError> {
    Amount::from_str_canonical(raw)
        .map_err(|e| StoreError::Corrupt(format!("{}: {} ({})", column, raw, e)))
}

fn parse_participant_id(column: &str, raw: &str) -> Result<ParticipantId, StoreError> {
    ParticipantId::from_str(raw)
        .map_err(|e| StoreError::Corrupt(format!("{}: {} ({})", column, raw, e)))
}

fn tx_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Transaction, StoreError> {
    let id_raw: String = row.get("id");
    let tx_type_raw: String = row.get("tx_type");
    let from_raw: String = row.get("from_id");
    let to_raw: String = row.get("to_id");
    let amount_raw: String = row.get("amount");
    let occurred_at_ms: i64 = row.get("occurred_at_ms");

    let id = Uuid::parse_str(&id_raw)
        .map_err(|e| StoreError::Corrupt(format!("transaction id: {} ({})", id_raw, e)))?;
    let tx_type = TxType::from_str(&tx_type_raw).map_err(StoreError::Corrupt)?;
    let occurred_at = DateTime::<Utc>::from_timestamp_millis(occurred_at_ms)
        .ok_or_else(|| StoreError::Corrupt(format!("occurred_at_ms: {}", occurred_at_ms)))?;

    Ok(Transaction {
        id,
        tx_type,
        from: parse_participant_id("from_id", &from_raw)?,
        to: parse_participant_id("to_id", &to_raw)?,
        amount: parse_amount("amount", &amount_raw)?,
        occurred_at,
        method: row.get("method"),
        note: row.get("note"),
    })
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<LedgerRecord, StoreError> {
    Ok(LedgerRecord {
        total_in: parse_amount("total_in", &row.get::<String, _>("total_in"))?,
        total_out: parse_amount("total_out", &row.get::<String, _>("total_out"))?,
        period_in: parse_amount("period_in", &row.get::<String, _>("period_in"))?,
        offset_in: parse_amount("offset_in", &row.get::<String, _>("offset_in"))?,
        offset: parse_amount("offset_amt", &row.get::<String, _>("offset_amt"))?,
        fund: parse_amount("fund", &row.get::<String, _>("fund"))?,
        returns: parse_amount("returns", &row.get::<String, _>("returns"))?,
        current_term: parse_amount("current_term", &row.get::<String, _>("current_term"))?,
    })
}

async fn upsert_record<'e, E>(
    executor: E,
    id: ParticipantId,
    record: &LedgerRecord,
) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO ledger_records
            (participant_id, total_in, total_out, period_in, offset_in,
             offset_amt, fund, returns, current_term)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(participant_id) DO UPDATE SET
            total_in = excluded.total_in,
            total_out = excluded.total_out,
            period_in = excluded.period_in,
            offset_in = excluded.offset_in,
            offset_amt = excluded.offset_amt,
            fund = excluded.fund,
            returns = excluded.returns,
            current_term = excluded.current_term
        "#,
    )
    .bind(id.to_string())
    .bind(record.total_in.to_canonical_string())
    .bind(record.total_out.to_canonical_string())
    .bind(record.period_in.to_canonical_string())
    .bind(record.offset_in.to_canonical_string())
    .bind(record.offset.to_canonical_string())
    .bind(record.fund.to_canonical_string())
    .bind(record.returns.to_canonical_string())
    .bind(record.current_term.to_canonical_string())
    .execute(executor)
    .await?;
    Ok(())
}

async fn insert_tx<'e, E>(executor: E, tx: &Transaction) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO transactions
            (id, tx_type, from_id, to_id, amount, occurred_at_ms, method, note)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(tx.id.to_string())
    .bind(tx.tx_type.as_str())
    .bind(tx.from.to_string())
    .bind(tx.to.to_string())
    .bind(tx.amount.to_canonical_string())
    .bind(tx.occurred_at.timestamp_millis())
    .bind(tx.method.as_deref())
    .bind(tx.note.as_deref())
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl TransactionLog for Repository {
    async fn append(&self, tx: &Transaction) -> Result<Uuid, StoreError> {
        insert_tx(&self.pool, tx).await?;
        Ok(tx.id)
    }

    async fn list(&self, filter: &TxFilter) -> Result<Vec<Transaction>, StoreError> {
        // rowid breaks ties within one occurred_at_ms: insertion order.
        let mut sql = String::from(
            "SELECT id, tx_type, from_id, to_id, amount, occurred_at_ms, method, note \
             FROM transactions WHERE 1=1",
        );
        if filter.upto.is_some() {
            sql.push_str(" AND occurred_at_ms <= ?");
        }
        if filter.participant.is_some() {
            sql.push_str(" AND (from_id = ? OR to_id = ?)");
        }
        if filter.tx_type.is_some() {
            sql.push_str(" AND tx_type = ?");
        }
        sql.push_str(" ORDER BY occurred_at_ms ASC, rowid ASC");

        let mut query = sqlx::query(&sql);
        if let Some(upto) = filter.upto {
            query = query.bind(upto.timestamp_millis());
        }
        if let Some(participant) = filter.participant {
            let id = participant.to_string();
            query = query.bind(id.clone()).bind(id);
        }
        if let Some(tx_type) = filter.tx_type {
            query = query.bind(tx_type.as_str());
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(tx_from_row).collect()
    }
}

#[async_trait]
impl ParticipantDirectory for Repository {
    async fn resolve(&self, id: ParticipantId) -> Result<Option<Participant>, StoreError> {
        let row = sqlx::query("SELECT id, role, active FROM participants WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let role_raw: String = row.get("role");
                let role = Role::from_str(&role_raw).map_err(StoreError::Corrupt)?;
                let active: i64 = row.get("active");
                Ok(Some(Participant {
                    id,
                    role,
                    active: active != 0,
                }))
            }
            None => Ok(None),
        }
    }

    async fn count(&self, role: Role, active: Option<bool>) -> Result<i64, StoreError> {
        let (count,): (i64,) = match active {
            Some(active) => {
                sqlx::query_as(
                    "SELECT COUNT(*) FROM participants WHERE role = ? AND active = ?",
                )
                .bind(role.as_str())
                .bind(active as i64)
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as("SELECT COUNT(*) FROM participants WHERE role = ?")
                    .bind(role.as_str())
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(count)
    }

    async fn list_participants(&self) -> Result<Vec<Participant>, StoreError> {
        let rows = sqlx::query("SELECT id, role, active FROM participants ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let id_raw: String = row.get("id");
                let role_raw: String = row.get("role");
                let active: i64 = row.get("active");
                Ok(Participant {
                    id: parse_participant_id("id", &id_raw)?,
                    role: Role::from_str(&role_raw).map_err(StoreError::Corrupt)?,
                    active: active != 0,
                })
            })
            .collect()
    }
}

#[async_trait]
impl LedgerStore for Repository {
    async fn get(&self, id: ParticipantId) -> Result<Option<LedgerRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM ledger_records WHERE participant_id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn commit(&self, entries: &[(ParticipantId, LedgerRecord)]) -> Result<(), StoreError> {
        let mut db_tx = self.pool.begin().await?;
        for (id, record) in entries {
            upsert_record(&mut *db_tx, *id, record).await?;
        }
        db_tx.commit().await?;
        Ok(())
    }

    async fn commit_with_log(
        &self,
        tx: &Transaction,
        entries: &[(ParticipantId, LedgerRecord)],
    ) -> Result<(), StoreError> {
        let mut db_tx = self.pool.begin().await?;
        insert_tx(&mut *db_tx, tx).await?;
        for (id, record) in entries {
            upsert_record(&mut *db_tx, *id, record).await?;
        }
        db_tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use chrono::TimeZone;
    use tempfile::TempDir;

    async fn setup() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (Repository::new(pool), temp_dir)
    }

    fn amt(s: &str) -> Amount {
        Amount::from_str_canonical(s).unwrap()
    }

    #[tokio::test]
    async fn test_participant_roundtrip() {
        let (repo, _temp) = setup().await;
        let participant = Participant::new(Role::Member);
        repo.insert_participant(&participant).await.unwrap();

        let resolved = repo.resolve(participant.id).await.unwrap();
        assert_eq!(resolved, Some(participant));
        assert_eq!(repo.count(Role::Member, Some(true)).await.unwrap(), 1);
        assert_eq!(repo.count(Role::Vendor, None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_transaction_log_ordering_and_filters() {
        let (repo, _temp) = setup().await;
        let member = Participant::new(Role::Member);
        let club = Participant::new(Role::Club);
        repo.insert_participant(&member).await.unwrap();
        repo.insert_participant(&club).await.unwrap();

        let at = |d: u32| Utc.with_ymd_and_hms(2024, 1, d, 9, 0, 0).unwrap();
        let first = Transaction::new(TxType::PeriodicDeposit, member.id, club.id, amt("2000"), at(5));
        let second = Transaction::new(TxType::LoanTaken, club.id, member.id, amt("500"), at(5));
        let third = Transaction::new(TxType::LoanRepay, member.id, club.id, amt("500"), at(9));

        // Insert out of time order; list must sort by time then insertion.
        repo.append(&third).await.unwrap();
        repo.append(&first).await.unwrap();
        repo.append(&second).await.unwrap();

        let all = repo.list(&TxFilter::default()).await.unwrap();
        assert_eq!(
            all.iter().map(|t| t.id).collect::<Vec<_>>(),
            vec![first.id, second.id, third.id],
            "time first, insertion order breaks same-instant ties"
        );

        let upto = repo.list(&TxFilter::upto(at(5))).await.unwrap();
        assert_eq!(upto.len(), 2);

        let loans = repo
            .list(&TxFilter {
                tx_type: Some(TxType::LoanTaken),
                participant: Some(member.id),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(loans.len(), 1);
        assert_eq!(loans[0], second);
    }

    #[tokio::test]
    async fn test_record_roundtrip_is_lossless() {
        let (repo, _temp) = setup().await;
        let member = Participant::new(Role::Member);
        repo.insert_participant(&member).await.unwrap();

        let mut record = LedgerRecord::default();
        record.total_in = amt("12345.67");
        record.fund = amt("-200.01");
        record.current_term = amt("13");

        repo.commit(&[(member.id, record.clone())]).await.unwrap();
        assert_eq!(repo.get(member.id).await.unwrap(), Some(record));
        assert_eq!(repo.get(ParticipantId::generate()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_commit_with_log_is_atomic_on_conflict() {
        let (repo, _temp) = setup().await;
        let member = Participant::new(Role::Member);
        let club = Participant::new(Role::Club);
        repo.insert_participant(&member).await.unwrap();
        repo.insert_participant(&club).await.unwrap();

        let at = Utc.with_ymd_and_hms(2024, 1, 5, 9, 0, 0).unwrap();
        let tx = Transaction::new(TxType::PeriodicDeposit, member.id, club.id, amt("2000"), at);
        let mut record = LedgerRecord::default();
        record.total_in = amt("2000");

        repo.commit_with_log(&tx, &[(member.id, record.clone())])
            .await
            .unwrap();

        // Re-inserting the same transaction id violates the primary key; the
        // record update in the same unit must roll back with it.
        let mut tampered = record.clone();
        tampered.total_in = amt("9999");
        let result = repo.commit_with_log(&tx, &[(member.id, tampered)]).await;
        assert!(result.is_err());
        assert_eq!(repo.get(member.id).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_snapshot_persistence_roundtrip() {
        use crate::engine::ClubFacts;
        use std::collections::BTreeMap;

        let (repo, _temp) = setup().await;
        let month_start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let month_end = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        let snapshot = crate::engine::aggregate::compute(
            month_start,
            month_end,
            &[],
            &BTreeMap::new(),
            &ClubFacts::default(),
        );

        repo.save_snapshot(&snapshot).await.unwrap();
        let loaded = repo.load_snapshot(month_start).await.unwrap();
        assert_eq!(loaded, Some(snapshot));
        assert_eq!(
            repo.load_snapshot(NaiveDate::from_ymd_opt(2024, 4, 1).unwrap())
                .await
                .unwrap(),
            None
        );
    }
}
