use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::settlement::{derive_payment_status, PaymentStanding};

/// Settlement status of one student's obligation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    PartiallyPaid,
    Paid,
    /// Overpayment marker written by older records. New writes express
    /// overpayment as `Paid` with a non-zero `excedent`.
    Excedent,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::PartiallyPaid => "PartiallyPaid",
            PaymentStatus::Paid => "Paid",
            PaymentStatus::Excedent => "Excedent",
        }
    }

    /// Nothing left to pay.
    pub fn is_settled(&self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::Excedent)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One student's payment record against a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentPayment {
    pub id: Uuid,
    pub collection_id: Uuid,
    pub student_id: Uuid,
    /// Per-student base amount owed. Adjustments never overwrite it.
    pub amount_collection: Decimal,
    pub adjusted_amount_collection: Option<Decimal>,
    pub amount_paid: Decimal,
    pub payment_status: PaymentStatus,
    pub excedent: Decimal,
    pub surplus: Decimal,
    pub pending: Decimal,
    #[serde(default)]
    pub exonerated: bool,
    #[serde(default)]
    pub images: Vec<String>,
    pub voucher: Option<String>,
    pub comment: Option<String>,
    pub payment_date: Option<DateTime<Utc>>,
    pub active: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl StudentPayment {
    /// A fresh obligation with nothing paid yet.
    pub fn new(
        collection_id: Uuid,
        student_id: Uuid,
        amount_collection: Decimal,
        adjusted_amount_collection: Option<Decimal>,
    ) -> Self {
        let now = Utc::now();
        let mut payment = Self {
            id: Uuid::new_v4(),
            collection_id,
            student_id,
            amount_collection,
            adjusted_amount_collection,
            amount_paid: Decimal::ZERO,
            payment_status: PaymentStatus::Pending,
            excedent: Decimal::ZERO,
            surplus: Decimal::ZERO,
            pending: Decimal::ZERO,
            exonerated: false,
            images: Vec::new(),
            voucher: None,
            comment: None,
            payment_date: None,
            active: true,
            version: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        payment.rederive();
        payment
    }

    /// Amount the student actually owes: the adjusted amount when set, else
    /// the base amount. Once exonerated, only what was already paid counts
    /// as owed, so the forgiven part is neither pending nor excedent.
    pub fn effective_owed(&self) -> Decimal {
        let owed = self
            .adjusted_amount_collection
            .unwrap_or(self.amount_collection);
        if self.exonerated {
            owed.min(self.amount_paid)
        } else {
            owed
        }
    }

    /// Recompute status, pending and excedent from the amounts on record.
    pub fn rederive(&mut self) -> PaymentStanding {
        let standing = derive_payment_status(self.effective_owed(), self.amount_paid);
        self.payment_status = standing.status;
        self.excedent = standing.excedent;
        self.pending = standing.pending;
        standing
    }
}

super::impl_entity!(
    StudentPayment,
    "student_payments",
    unique(collection_id, student_id)
);

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn new_payment_is_pending_for_full_amount() {
        let payment = StudentPayment::new(Uuid::new_v4(), Uuid::new_v4(), dec!(100), None);
        assert_eq!(payment.payment_status, PaymentStatus::Pending);
        assert_eq!(payment.pending, dec!(100));
        assert_eq!(payment.excedent, Decimal::ZERO);
    }

    #[test]
    fn adjusted_amount_takes_precedence_over_base() {
        let mut payment =
            StudentPayment::new(Uuid::new_v4(), Uuid::new_v4(), dec!(100), Some(dec!(80)));
        payment.amount_paid = dec!(60);
        payment.rederive();

        assert_eq!(payment.effective_owed(), dec!(80));
        assert_eq!(payment.payment_status, PaymentStatus::PartiallyPaid);
        assert_eq!(payment.pending, dec!(20));
    }

    #[test]
    fn exoneration_clears_the_obligation() {
        let mut payment = StudentPayment::new(Uuid::new_v4(), Uuid::new_v4(), dec!(100), None);
        payment.amount_paid = dec!(30);
        payment.exonerated = true;
        payment.rederive();

        assert_eq!(payment.effective_owed(), dec!(30));
        assert_eq!(payment.payment_status, PaymentStatus::Paid);
        assert_eq!(payment.pending, Decimal::ZERO);
        assert_eq!(payment.excedent, Decimal::ZERO);
    }

    #[test]
    fn exonerated_overpayment_still_reports_excedent() {
        let mut payment =
            StudentPayment::new(Uuid::new_v4(), Uuid::new_v4(), dec!(100), Some(dec!(80)));
        payment.amount_paid = dec!(90);
        payment.exonerated = true;
        payment.rederive();

        assert_eq!(payment.effective_owed(), dec!(80));
        assert_eq!(payment.excedent, dec!(10));
    }

    #[test]
    fn legacy_excedent_counts_as_settled() {
        assert!(PaymentStatus::Excedent.is_settled());
        assert!(PaymentStatus::Paid.is_settled());
        assert!(!PaymentStatus::PartiallyPaid.is_settled());
    }
}
