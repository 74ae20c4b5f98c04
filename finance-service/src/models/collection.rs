use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How many students have fully paid a collection.
///
/// Always rebuilt from the payment set, so `total == completed + pending`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advance {
    pub total: i64,
    pub completed: i64,
    pub pending: i64,
}

impl Advance {
    pub fn new(total: i64, completed: i64) -> Self {
        Self {
            total,
            completed,
            pending: total - completed,
        }
    }
}

/// Which students a collection targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "count")]
pub enum StudentQuantity {
    /// Every active student at creation time.
    All,
    /// An explicit subset of this many students.
    Specific(i64),
}

/// A charge levied against some or all students.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub id: Uuid,
    pub collection_type_id: Option<Uuid>,
    pub name: String,
    pub total_amount: Decimal,
    pub individual_amount: Decimal,
    pub adjusted_individual_amount: Option<Decimal>,
    pub total_surplus: Decimal,
    pub date: DateTime<Utc>,
    pub percentage_paid: Decimal,
    pub allows_exemptions: bool,
    pub advance: Advance,
    pub student_quantity: StudentQuantity,
    #[serde(default)]
    pub images: Vec<String>,
    pub active: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Collection {
    /// Per-student amount currently in force.
    pub fn effective_individual_amount(&self) -> Decimal {
        self.adjusted_individual_amount
            .unwrap_or(self.individual_amount)
    }
}

super::impl_entity!(Collection, "collections");
