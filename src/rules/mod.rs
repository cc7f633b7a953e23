//! Declarative mutation rule table.
//!
//! Pure data: `(transaction type, participant role in the transfer)` maps to
//! the field mutations the transaction performs. The mutation engine
//! interprets these entries; nothing here has behavior beyond lookup, which
//! keeps the table testable on its own and stops the transaction vocabulary
//! from leaking into imperative branches elsewhere.

use std::collections::HashMap;

use crate::domain::{Field, TxType};

/// Which leg of a transaction a rule entry applies to.
///
/// `Club` always resolves to the club participant, regardless of which side
/// of the transfer it sits on. A transaction touches at most three records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleRole {
    Sender,
    Receiver,
    Club,
}

/// Where a mutation's operand comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueSource {
    /// The transaction amount.
    Amount,
    /// Newly-completed deposit periods against the stage schedule.
    /// Valid only for deposit transaction types.
    Term,
    /// The constant 1.
    One,
    /// The portion of a vendor return exceeding remaining invested
    /// principal, clamped to `[0, amount]`.
    Profit,
}

/// Field mutations for one (transaction type, role) pair.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActionDescriptor {
    pub add: Vec<(Field, ValueSource)>,
    pub sub: Vec<(Field, ValueSource)>,
}

impl ActionDescriptor {
    fn add(mut self, field: Field, source: ValueSource) -> Self {
        self.add.push((field, source));
        self
    }

    fn sub(mut self, field: Field, source: ValueSource) -> Self {
        self.sub.push((field, source));
        self
    }

    /// All value sources this descriptor reads.
    pub fn sources(&self) -> impl Iterator<Item = ValueSource> + '_ {
        self.add
            .iter()
            .chain(self.sub.iter())
            .map(|&(_, source)| source)
    }
}

/// The club's standard mutation rule table.
#[derive(Debug, Clone)]
pub struct RuleTable {
    entries: HashMap<(TxType, RuleRole), ActionDescriptor>,
}

impl RuleTable {
    /// Build the standard table covering the full transaction vocabulary.
    pub fn standard() -> Self {
        use Field::*;
        use RuleRole::*;
        use TxType::*;
        use ValueSource::{Amount, One, Profit, Term};

        let mut entries = HashMap::new();
        let mut rule = |tx_type: TxType, role: RuleRole, descriptor: ActionDescriptor| {
            entries.insert((tx_type, role), descriptor);
        };
        let descriptor = ActionDescriptor::default;

        // Member pays a periodic contribution into the club fund. The term
        // counter advances by however many periods this deposit completes.
        rule(
            PeriodicDeposit,
            Sender,
            descriptor()
                .add(TotalIn, Amount)
                .add(PeriodIn, Amount)
                .add(CurrentTerm, Term),
        );
        rule(
            PeriodicDeposit,
            Club,
            descriptor()
                .add(TotalIn, Amount)
                .add(PeriodIn, Amount)
                .add(Fund, Amount),
        );

        // Member clears (part of) a one-time offset owed.
        rule(
            OffsetDeposit,
            Sender,
            descriptor().add(TotalIn, Amount).add(OffsetIn, Amount),
        );
        rule(
            OffsetDeposit,
            Club,
            descriptor()
                .add(TotalIn, Amount)
                .add(OffsetIn, Amount)
                .add(Fund, Amount),
        );

        // Club pays money out to a member.
        rule(Withdraw, Receiver, descriptor().add(TotalOut, Amount));
        rule(
            Withdraw,
            Club,
            descriptor().add(TotalOut, Amount).sub(Fund, Amount),
        );

        // A rejoining member is assessed a one-time offset; the amount
        // records what is owed, not money moving.
        rule(Rejoin, Sender, descriptor().add(Offset, Amount));
        rule(Rejoin, Club, descriptor().add(Offset, Amount));

        // Internal transfer between funds. Deliberately no club entry:
        // internal moves must not be double-counted at club scope.
        rule(FundsTransfer, Sender, descriptor().sub(Fund, Amount));
        rule(FundsTransfer, Receiver, descriptor().add(Fund, Amount));

        // Loan principal out of the club fund to a member.
        rule(LoanTaken, Receiver, descriptor().add(TotalOut, Amount));
        rule(
            LoanTaken,
            Club,
            descriptor().add(TotalOut, Amount).sub(Fund, Amount),
        );

        // Loan principal repaid.
        rule(LoanRepay, Sender, descriptor().sub(TotalOut, Amount));
        rule(
            LoanRepay,
            Club,
            descriptor().sub(TotalOut, Amount).add(Fund, Amount),
        );

        // Loan interest collected: pure club profit.
        rule(LoanInterest, Sender, descriptor().add(Returns, Amount));
        rule(
            LoanInterest,
            Club,
            descriptor().add(Returns, Amount).add(Fund, Amount),
        );

        // Club places money with a vendor.
        rule(
            VendorInvest,
            Receiver,
            descriptor().add(Fund, Amount).add(TotalIn, Amount),
        );
        rule(
            VendorInvest,
            Club,
            descriptor().add(TotalOut, Amount).sub(Fund, Amount),
        );

        // Vendor returns money; anything beyond remaining principal is profit.
        rule(
            VendorReturns,
            Sender,
            descriptor()
                .sub(Fund, Amount)
                .add(TotalOut, Amount)
                .add(Returns, Profit),
        );
        rule(
            VendorReturns,
            Club,
            descriptor().add(Fund, Amount).add(Returns, Profit),
        );

        // Periodic vendor variants track an installment counter on top of
        // the plain invest/return mutations.
        rule(
            PeriodicVendorInvest,
            Receiver,
            descriptor()
                .add(Fund, Amount)
                .add(TotalIn, Amount)
                .add(PeriodIn, Amount)
                .add(CurrentTerm, One),
        );
        rule(
            PeriodicVendorInvest,
            Club,
            descriptor().add(TotalOut, Amount).sub(Fund, Amount),
        );
        rule(
            PeriodicVendorReturns,
            Sender,
            descriptor()
                .sub(Fund, Amount)
                .add(TotalOut, Amount)
                .add(Returns, Profit)
                .add(CurrentTerm, One),
        );
        rule(
            PeriodicVendorReturns,
            Club,
            descriptor().add(Fund, Amount).add(Returns, Profit),
        );

        RuleTable { entries }
    }

    /// Look up the mutations for one (type, role) pair.
    pub fn lookup(&self, tx_type: TxType, role: RuleRole) -> Option<&ActionDescriptor> {
        self.entries.get(&(tx_type, role))
    }

    /// All rule entries for a transaction type, in a fixed role order.
    ///
    /// Empty means the type is unknown to the table.
    pub fn entries_for(&self, tx_type: TxType) -> Vec<(RuleRole, &ActionDescriptor)> {
        [RuleRole::Sender, RuleRole::Receiver, RuleRole::Club]
            .into_iter()
            .filter_map(|role| self.lookup(tx_type, role).map(|d| (role, d)))
            .collect()
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::standard()
    }
}
