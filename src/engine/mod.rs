//! Pure computation engines for the deterministic ledger core.

pub mod aggregate;
pub mod interest;
pub mod loan;
pub mod mutation;
pub mod replay;

pub use aggregate::{ClubFacts, MonthlySnapshot};
pub use interest::{accrue, InterestResult, RatePolicy};
pub use loan::{
    accrue_periods, decompose, LoanAnomaly, LoanEvent, LoanEventKind, LoanPeriod, LoanSchedule,
};
pub use mutation::Direction;
pub use replay::replay;
