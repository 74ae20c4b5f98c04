use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::{non_negative_amount, positive_amount, ImageUpload};

/// Money handed to an administrator for a student.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RecordPaymentRequest {
    pub collection_id: Uuid,
    pub student_id: Uuid,
    #[validate(custom(function = "positive_amount"))]
    pub amount_paid: Decimal,
    #[validate(length(max = 200))]
    pub voucher: Option<String>,
    #[validate(length(max = 1000))]
    pub comment: Option<String>,
    pub payment_date: Option<DateTime<Utc>>,
    #[serde(default)]
    #[validate(nested)]
    pub images: Vec<ImageUpload>,
}

/// Correction of a payment; `amount_paid` is the new absolute amount.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdatePaymentRequest {
    #[validate(custom(function = "non_negative_amount"))]
    pub amount_paid: Decimal,
    #[validate(length(max = 200))]
    pub voucher: Option<String>,
    #[validate(length(max = 1000))]
    pub comment: Option<String>,
    pub payment_date: Option<DateTime<Utc>>,
    #[serde(default)]
    #[validate(nested)]
    pub images: Vec<ImageUpload>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ExonerateRequest {
    #[validate(length(max = 1000))]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentListQuery {
    pub collection_id: Option<Uuid>,
    pub student_id: Option<Uuid>,
}
