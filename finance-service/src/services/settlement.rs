//! Settlement rules shared by every path that touches a student payment or
//! a collection's aggregates.
//!
//! All of these are pure and recompute from source values, so running them
//! twice over the same payments yields the same result.

use rust_decimal::Decimal;

use crate::models::{Advance, PaymentStatus, StudentPayment};

/// Outcome of comparing what is owed with what was paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentStanding {
    pub status: PaymentStatus,
    pub excedent: Decimal,
    pub pending: Decimal,
}

/// The one rule for payment status.
///
/// Overpayment is `Paid` with a non-zero `excedent`; `Excedent` is never
/// produced here.
pub fn derive_payment_status(owed: Decimal, paid: Decimal) -> PaymentStanding {
    if paid >= owed {
        PaymentStanding {
            status: PaymentStatus::Paid,
            excedent: paid - owed,
            pending: Decimal::ZERO,
        }
    } else if paid > Decimal::ZERO {
        PaymentStanding {
            status: PaymentStatus::PartiallyPaid,
            excedent: Decimal::ZERO,
            pending: owed - paid,
        }
    } else {
        PaymentStanding {
            status: PaymentStatus::Pending,
            excedent: Decimal::ZERO,
            pending: owed,
        }
    }
}

/// Progress counters rebuilt from the payment set.
pub fn compute_advance(payments: &[StudentPayment]) -> Advance {
    let completed = payments
        .iter()
        .filter(|p| p.payment_status.is_settled())
        .count() as i64;
    Advance::new(payments.len() as i64, completed)
}

/// `Σ amount_paid / (individual × total) × 100`, rounded to two places.
/// Zero when there is nothing to divide by.
pub fn compute_percentage_paid(payments: &[StudentPayment], individual: Decimal) -> Decimal {
    let expected = individual * Decimal::from(payments.len() as i64);
    if expected <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    let collected: Decimal = payments.iter().map(|p| p.amount_paid).sum();
    (collected / expected * Decimal::ONE_HUNDRED).round_dp(2)
}

/// Even split of `total` across `count` students, rounded to cents.
pub fn split_amount(total: Decimal, count: i64) -> Option<Decimal> {
    if count <= 0 {
        return None;
    }
    Some((total / Decimal::from(count)).round_dp(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn payment(owed: Decimal, paid: Decimal) -> StudentPayment {
        let mut p = StudentPayment::new(Uuid::new_v4(), Uuid::new_v4(), owed, None);
        p.amount_paid = paid;
        p.rederive();
        p
    }

    #[test]
    fn partial_payment() {
        let standing = derive_payment_status(dec!(100), dec!(60));
        assert_eq!(standing.status, PaymentStatus::PartiallyPaid);
        assert_eq!(standing.pending, dec!(40));
        assert_eq!(standing.excedent, dec!(0));
    }

    #[test]
    fn nothing_paid() {
        let standing = derive_payment_status(dec!(100), dec!(0));
        assert_eq!(standing.status, PaymentStatus::Pending);
        assert_eq!(standing.pending, dec!(100));
    }

    #[test]
    fn exact_payment() {
        let standing = derive_payment_status(dec!(100), dec!(100));
        assert_eq!(standing.status, PaymentStatus::Paid);
        assert_eq!(standing.pending, dec!(0));
        assert_eq!(standing.excedent, dec!(0));
    }

    #[test]
    fn overpayment_is_paid_with_excedent() {
        let standing = derive_payment_status(dec!(100), dec!(120));
        assert_eq!(standing.status, PaymentStatus::Paid);
        assert_eq!(standing.excedent, dec!(20));
        assert_eq!(standing.pending, dec!(0));
    }

    #[test]
    fn nothing_owed_is_paid() {
        let standing = derive_payment_status(dec!(0), dec!(0));
        assert_eq!(standing.status, PaymentStatus::Paid);
    }

    #[test]
    fn pending_and_excedent_are_never_both_positive() {
        for owed in [dec!(0), dec!(50), dec!(80), dec!(100)] {
            for paid in [dec!(0), dec!(10), dec!(80), dec!(150)] {
                let s = derive_payment_status(owed, paid);
                assert_eq!(s.pending, (owed - paid).max(Decimal::ZERO));
                assert_eq!(s.excedent, (paid - owed).max(Decimal::ZERO));
                assert!(s.pending.is_zero() || s.excedent.is_zero());
            }
        }
    }

    #[test]
    fn advance_counts_settled_payments() {
        let payments = vec![
            payment(dec!(100), dec!(100)),
            payment(dec!(100), dec!(130)),
            payment(dec!(100), dec!(40)),
            payment(dec!(100), dec!(0)),
        ];
        let advance = compute_advance(&payments);
        assert_eq!(advance.total, 4);
        assert_eq!(advance.completed, 2);
        assert_eq!(advance.pending, 2);
        assert_eq!(advance.total, advance.completed + advance.pending);
    }

    #[test]
    fn percentage_over_expected_total() {
        let payments = vec![payment(dec!(100), dec!(100)), payment(dec!(100), dec!(50))];
        assert_eq!(compute_percentage_paid(&payments, dec!(100)), dec!(75));
    }

    #[test]
    fn percentage_guards_division_by_zero() {
        assert_eq!(compute_percentage_paid(&[], dec!(100)), dec!(0));
        let payments = vec![payment(dec!(0), dec!(0))];
        assert_eq!(compute_percentage_paid(&payments, dec!(0)), dec!(0));
    }

    #[test]
    fn split_rounds_to_cents() {
        assert_eq!(split_amount(dec!(100), 3), Some(dec!(33.33)));
        assert_eq!(split_amount(dec!(100), 0), None);
    }
}
