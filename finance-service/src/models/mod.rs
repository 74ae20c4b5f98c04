//! Domain models for finance-service.
//!
//! Every persisted document carries the same bookkeeping fields (`id`,
//! `active`, `version`, `created_at`, `updated_at`, `deleted_at`) and
//! implements [`Entity`] so the generic repositories can store it.

mod collection;
mod expense;
mod notification;
mod payment_request;
mod petty_cash;
mod student;
mod student_payment;

pub use collection::{Advance, Collection, StudentQuantity};
pub use expense::Expense;
pub use notification::{NotificationData, PushTarget};
pub use payment_request::{
    AdminComment, AuditTrail, HistoryEntry, PaymentRequest, PaymentRequestStatus, RequestAction,
};
pub use petty_cash::{
    LedgerEvent, PettyCash, Transaction, TransactionLog, TransactionType, PETTY_CASH_ID,
};
pub use student::Student;
pub use student_payment::{PaymentStatus, StudentPayment};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

/// A document stored in its own collection.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + Unpin + 'static {
    /// Collection (table) name.
    const COLLECTION: &'static str;

    fn id(&self) -> Uuid;
    fn version(&self) -> i64;
    fn is_active(&self) -> bool;

    /// Advance the optimistic-concurrency version and stamp `updated_at`.
    fn bump_version(&mut self, now: DateTime<Utc>);

    /// Soft delete.
    fn mark_deleted(&mut self, now: DateTime<Utc>);

    /// Natural key that at most one active document may hold.
    fn unique_key(&self) -> Option<String> {
        None
    }
}

macro_rules! impl_entity {
    ($ty:ty, $collection:literal $(, unique($($field:ident),+))?) => {
        impl $crate::models::Entity for $ty {
            const COLLECTION: &'static str = $collection;

            fn id(&self) -> ::uuid::Uuid {
                self.id
            }

            fn version(&self) -> i64 {
                self.version
            }

            fn is_active(&self) -> bool {
                self.active
            }

            fn bump_version(&mut self, now: ::chrono::DateTime<::chrono::Utc>) {
                self.version += 1;
                self.updated_at = now;
            }

            fn mark_deleted(&mut self, now: ::chrono::DateTime<::chrono::Utc>) {
                self.active = false;
                self.deleted_at = Some(now);
                self.bump_version(now);
            }

            $(
                fn unique_key(&self) -> Option<String> {
                    Some([$(self.$field.to_string()),+].join(":"))
                }
            )?
        }
    };
}

pub(crate) use impl_entity;
