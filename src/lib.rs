pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod rules;
pub mod service;
pub mod store;

pub use config::{Config, Policy};
pub use db::{init_db, Repository};
pub use domain::{
    Amount, DepositStage, Field, LedgerRecord, Participant, ParticipantId, Role, StageSchedule,
    Transaction, TxType,
};
pub use engine::{LoanSchedule, MonthlySnapshot, RatePolicy};
pub use error::LedgerError;
pub use rules::RuleTable;
pub use service::{DriftEntry, LedgerService};
pub use store::{LedgerStore, MemoryStore, ParticipantDirectory, StoreError, TransactionLog};
