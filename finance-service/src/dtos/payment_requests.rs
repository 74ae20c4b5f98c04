use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::{positive_amount, ImageUpload};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePaymentRequestBody {
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

/// Owner edit. New images are added to the existing ones.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdatePaymentRequestBody {
    pub amount_paid: Option<Decimal>,
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
pub struct ApprovePaymentRequestBody {
    #[validate(length(max = 1000))]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RejectPaymentRequestBody {
    #[validate(length(min = 1, max = 1000, message = "A rejection reason is required"))]
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RequestChangesBody {
    #[validate(length(min = 1, max = 1000, message = "A comment is required"))]
    pub comment: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AdminCommentBody {
    #[validate(length(min = 1, max = 1000, message = "Comment cannot be empty"))]
    pub comment: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentRequestListQuery {
    pub status: Option<String>,
    pub collection_id: Option<Uuid>,
    pub student_id: Option<Uuid>,
}
