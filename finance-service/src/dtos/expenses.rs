use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use validator::Validate;

use super::{positive_amount, ImageUpload};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateExpenseRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    #[validate(custom(function = "positive_amount"))]
    pub amount: Decimal,
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    #[validate(nested)]
    pub images: Vec<ImageUpload>,
}
