use rust_decimal::Decimal;
use serde::Deserialize;
use validator::Validate;

use super::positive_amount;
use crate::models::TransactionType;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ManualEntryRequest {
    pub transaction_type: TransactionType,
    #[validate(custom(function = "positive_amount"))]
    pub amount: Decimal,
    #[validate(length(min = 1, max = 500, message = "Description must be 1-500 characters"))]
    pub description: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionListQuery {
    pub transaction_type: Option<String>,
}
