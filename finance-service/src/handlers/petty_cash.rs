use axum::{
    extract::{Query, State},
    Json,
};
use service_core::error::AppError;
use service_core::response::{ApiResponse, Created};
use validator::Validate;

use crate::dtos::{ManualEntryRequest, TransactionListQuery};
use crate::middleware::AuthUser;
use crate::models::{PettyCash, Transaction, TransactionLog, TransactionType};
use crate::startup::AppState;

pub async fn get_balance(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
) -> Result<ApiResponse<PettyCash>, AppError> {
    Ok(ApiResponse::ok(state.ledger.balance().await?))
}

pub async fn manual_entry(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Json(request): Json<ManualEntryRequest>,
) -> Result<Created<Transaction>, AppError> {
    request.validate()?;
    let transaction = state
        .ledger
        .manual_entry(
            &actor,
            request.transaction_type,
            request.amount,
            request.description,
        )
        .await?;
    Ok(Created(ApiResponse::with_message(
        transaction,
        "Transaction posted",
    )))
}

pub async fn list_transactions(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Query(query): Query<TransactionListQuery>,
) -> Result<ApiResponse<Vec<Transaction>>, AppError> {
    let transaction_type = query
        .transaction_type
        .as_deref()
        .map(str::parse::<TransactionType>)
        .transpose()?;
    Ok(ApiResponse::ok(
        state.ledger.transactions(transaction_type).await?,
    ))
}

pub async fn list_logs(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
) -> Result<ApiResponse<Vec<TransactionLog>>, AppError> {
    actor.require_admin()?;
    Ok(ApiResponse::ok(state.ledger.logs().await?))
}
