use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::{non_negative_amount, positive_amount, ImageUpload};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCollectionRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,
    #[validate(custom(function = "positive_amount"))]
    pub total_amount: Decimal,
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub allows_exemptions: bool,
    pub collection_type_id: Option<Uuid>,
    /// Students to charge. Every active student when absent or empty.
    #[serde(default)]
    pub student_ids: Vec<Uuid>,
    #[serde(default)]
    #[validate(nested)]
    pub images: Vec<ImageUpload>,
}

/// Partial update. At most one of the two amounts may be given; the other
/// follows from the number of students charged.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateCollectionRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub allows_exemptions: Option<bool>,
    pub total_amount: Option<Decimal>,
    pub individual_amount: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AdjustCollectionRequest {
    #[validate(custom(function = "positive_amount"))]
    pub adjusted_amount: Decimal,
    #[validate(custom(function = "non_negative_amount"))]
    #[serde(default)]
    pub surplus: Decimal,
}
