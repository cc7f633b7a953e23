//! Domain types for the club ledger.
//!
//! This module provides:
//! - Exact money handling via the Amount wrapper
//! - Participant identity and roles
//! - The immutable Transaction record and its type vocabulary
//! - The per-participant LedgerRecord and its addressable fields
//! - The deposit stage schedule and shared calendar arithmetic

pub mod dates;
pub mod money;
pub mod primitives;
pub mod record;
pub mod schedule;
pub mod transaction;

pub use dates::{end_of_month, first_of_month, month_parts, MonthParts};
pub use money::Amount;
pub use primitives::{Participant, ParticipantId, Role};
pub use record::{Field, LedgerRecord};
pub use schedule::{DepositStage, ScheduleError, StageSchedule};
pub use transaction::{Transaction, TxType};
