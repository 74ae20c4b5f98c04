use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Money spent out of petty cash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub amount: Decimal,
    pub date: DateTime<Utc>,
    /// Active students when the expense was recorded.
    pub student_quantity: i64,
    /// Share of the expense per student.
    pub individual_amount: Decimal,
    #[serde(default)]
    pub images: Vec<String>,
    /// Ledger transaction that paid for it.
    pub transaction_id: Option<Uuid>,
    pub created_by: String,
    pub active: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

super::impl_entity!(Expense, "expenses");
