//! Petty cash ledger: the balance singleton, its transactions and the
//! secondary audit log.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;

/// Id of the one and only petty cash document.
pub const PETTY_CASH_ID: Uuid = Uuid::nil();

/// Kind of money movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    /// Money received outside a collection (manual entry, reversals).
    Income,
    /// Money leaving petty cash.
    Expense,
    /// Money received against a collection.
    Collection,
    /// Forgiven debt. Recorded for reporting, never moves the balance.
    Exonerated,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Income => "Income",
            TransactionType::Expense => "Expense",
            TransactionType::Collection => "Collection",
            TransactionType::Exonerated => "Exonerated",
        }
    }

    /// Signed effect of `amount` on the balance.
    pub fn balance_delta(&self, amount: Decimal) -> Decimal {
        match self {
            TransactionType::Income | TransactionType::Collection => amount,
            TransactionType::Expense => -amount,
            TransactionType::Exonerated => Decimal::ZERO,
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TransactionType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Income" => Ok(TransactionType::Income),
            "Expense" => Ok(TransactionType::Expense),
            "Collection" => Ok(TransactionType::Collection),
            "Exonerated" => Ok(TransactionType::Exonerated),
            other => Err(AppError::BadRequest(anyhow::anyhow!(
                "Unknown transaction type '{}'",
                other
            ))),
        }
    }
}

/// The school's cash-on-hand balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PettyCash {
    pub id: Uuid,
    pub current_balance: Decimal,
    pub total_income: Decimal,
    pub total_expense: Decimal,
    pub last_updated: DateTime<Utc>,
    pub active: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl PettyCash {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: PETTY_CASH_ID,
            current_balance: Decimal::ZERO,
            total_income: Decimal::ZERO,
            total_expense: Decimal::ZERO,
            last_updated: now,
            active: true,
            version: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Apply a movement and return `(balance_before, balance_after)`.
    ///
    /// Expenses that would take the balance below zero are refused unless
    /// `allow_overdraft` is set.
    pub(crate) fn apply(
        &mut self,
        tx_type: TransactionType,
        amount: Decimal,
        allow_overdraft: bool,
    ) -> Result<(Decimal, Decimal), AppError> {
        if amount <= Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Ledger amount must be positive, got {}",
                amount
            )));
        }

        let before = self.current_balance;
        match tx_type {
            TransactionType::Income | TransactionType::Collection => {
                self.total_income += amount;
            }
            TransactionType::Expense => {
                if !allow_overdraft && before < amount {
                    return Err(AppError::BadRequest(anyhow::anyhow!(
                        "Insufficient petty cash balance: {} available, {} requested",
                        before,
                        amount
                    )));
                }
                self.total_expense += amount;
            }
            TransactionType::Exonerated => {}
        }
        self.current_balance += tx_type.balance_delta(amount);
        self.last_updated = Utc::now();

        Ok((before, self.current_balance))
    }

    /// Undo a previously applied movement.
    pub(crate) fn unapply(&mut self, tx_type: TransactionType, amount: Decimal) -> (Decimal, Decimal) {
        let before = self.current_balance;
        match tx_type {
            TransactionType::Income | TransactionType::Collection => {
                self.total_income -= amount;
            }
            TransactionType::Expense => {
                self.total_expense -= amount;
            }
            TransactionType::Exonerated => {}
        }
        self.current_balance -= tx_type.balance_delta(amount);
        self.last_updated = Utc::now();

        (before, self.current_balance)
    }
}

impl Default for PettyCash {
    fn default() -> Self {
        Self::new()
    }
}

super::impl_entity!(PettyCash, "petty_cash");

/// Immutable ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub description: String,
    pub related_entity_id: Option<Uuid>,
    pub related_entity_type: Option<String>,
    pub student_id: Option<Uuid>,
    pub collection_id: Option<Uuid>,
    pub student_payment_id: Option<Uuid>,
    pub previous_balance: Decimal,
    pub new_balance: Decimal,
    pub user_id: String,
    pub active: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

super::impl_entity!(Transaction, "transactions");

/// What happened to the balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    Posted,
    Reverted,
}

/// Audit record of a balance change, kept apart from [`Transaction`] so a
/// reverted posting still leaves a trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionLog {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub event: LedgerEvent,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub description: String,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub user_id: String,
    pub user_name: String,
    pub ip_address: Option<String>,
    pub active: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

super::impl_entity!(TransactionLog, "transaction_logs");

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn income_and_collection_raise_the_balance() {
        let mut cash = PettyCash::new();
        assert_eq!(
            cash.apply(TransactionType::Income, dec!(50), false).unwrap(),
            (dec!(0), dec!(50))
        );
        cash.apply(TransactionType::Collection, dec!(25), false)
            .unwrap();

        assert_eq!(cash.current_balance, dec!(75));
        assert_eq!(cash.total_income, dec!(75));
        assert_eq!(cash.total_expense, dec!(0));
    }

    #[test]
    fn expense_requires_funds() {
        let mut cash = PettyCash::new();
        cash.apply(TransactionType::Income, dec!(10), false).unwrap();

        let result = cash.apply(TransactionType::Expense, dec!(20), false);
        assert!(matches!(result, Err(AppError::BadRequest(_))));
        assert_eq!(cash.current_balance, dec!(10));
        assert_eq!(cash.total_expense, dec!(0));

        cash.apply(TransactionType::Expense, dec!(20), true).unwrap();
        assert_eq!(cash.current_balance, dec!(-10));
    }

    #[test]
    fn exoneration_leaves_balance_untouched() {
        let mut cash = PettyCash::new();
        cash.apply(TransactionType::Income, dec!(10), false).unwrap();
        let (before, after) = cash
            .apply(TransactionType::Exonerated, dec!(40), false)
            .unwrap();
        assert_eq!(before, after);
        assert_eq!(cash.total_income, dec!(10));
    }

    #[test]
    fn unapply_restores_totals() {
        let mut cash = PettyCash::new();
        cash.apply(TransactionType::Income, dec!(100), false).unwrap();
        cash.apply(TransactionType::Expense, dec!(30), false).unwrap();

        cash.unapply(TransactionType::Expense, dec!(30));
        assert_eq!(cash.current_balance, dec!(100));
        assert_eq!(cash.total_expense, dec!(0));

        cash.unapply(TransactionType::Income, dec!(100));
        assert_eq!(cash.current_balance, dec!(0));
        assert_eq!(cash.total_income, dec!(0));
    }

    #[test]
    fn non_positive_amounts_are_refused() {
        let mut cash = PettyCash::new();
        assert!(cash.apply(TransactionType::Income, dec!(0), false).is_err());
        assert!(cash.apply(TransactionType::Income, dec!(-5), false).is_err());
    }
}
