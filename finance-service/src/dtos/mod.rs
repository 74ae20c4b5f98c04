//! Request and response bodies for the REST API.

mod collections;
mod expenses;
mod payment_requests;
mod petty_cash;
mod student_payments;
mod students;

pub use collections::{AdjustCollectionRequest, CreateCollectionRequest, UpdateCollectionRequest};
pub use expenses::CreateExpenseRequest;
pub use payment_requests::{
    AdminCommentBody, ApprovePaymentRequestBody, CreatePaymentRequestBody,
    PaymentRequestListQuery, RejectPaymentRequestBody, RequestChangesBody,
    UpdatePaymentRequestBody,
};
pub use petty_cash::{ManualEntryRequest, TransactionListQuery};
pub use student_payments::{
    ExonerateRequest, PaymentListQuery, RecordPaymentRequest, UpdatePaymentRequest,
};
pub use students::CreateStudentRequest;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::models::{Collection, Expense, PaymentRequest, StudentPayment};
use crate::services::images::ImageStore;

/// Image uploaded inline as base64.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ImageUpload {
    #[validate(length(min = 1, max = 255, message = "File name cannot be empty"))]
    pub file_name: String,
    #[validate(length(min = 1, message = "Image content cannot be empty"))]
    pub content_base64: String,
}

/// Optional evidence attached to a payment.
#[derive(Debug, Clone, Default)]
pub struct PaymentDetails {
    pub voucher: Option<String>,
    pub comment: Option<String>,
    pub payment_date: Option<DateTime<Utc>>,
    pub images: Vec<String>,
}

/// Entities that keep relative image paths.
pub trait HasImages {
    fn image_paths(&self) -> &[String];
}

macro_rules! has_images {
    ($($ty:ty),+) => {
        $(impl HasImages for $ty {
            fn image_paths(&self) -> &[String] {
                &self.images
            }
        })+
    };
}

has_images!(Collection, StudentPayment, PaymentRequest, Expense);

/// Entity plus absolute URLs for its stored images.
#[derive(Debug, Clone, Serialize)]
pub struct WithImages<T> {
    #[serde(flatten)]
    pub item: T,
    pub image_urls: Vec<String>,
}

impl<T: HasImages> WithImages<T> {
    pub fn new(item: T, store: &dyn ImageStore) -> Self {
        let image_urls = item
            .image_paths()
            .iter()
            .map(|path| store.image_url(path))
            .collect();
        Self { item, image_urls }
    }

    pub fn all(items: Vec<T>, store: &dyn ImageStore) -> Vec<Self> {
        items.into_iter().map(|item| Self::new(item, store)).collect()
    }
}

pub(crate) fn positive_amount(value: &Decimal) -> Result<(), ValidationError> {
    if *value > Decimal::ZERO {
        Ok(())
    } else {
        let mut err = ValidationError::new("positive_amount");
        err.message = Some("Amount must be greater than zero".into());
        Err(err)
    }
}

pub(crate) fn non_negative_amount(value: &Decimal) -> Result<(), ValidationError> {
    if *value >= Decimal::ZERO {
        Ok(())
    } else {
        let mut err = ValidationError::new("non_negative_amount");
        err.message = Some("Amount cannot be negative".into());
        Err(err)
    }
}
