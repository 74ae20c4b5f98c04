use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;
use service_core::response::{ApiResponse, Created};
use uuid::Uuid;

use crate::dtos::{CreateExpenseRequest, WithImages};
use crate::middleware::AuthUser;
use crate::models::Expense;
use crate::startup::AppState;

type ExpenseView = WithImages<Expense>;

pub async fn list_expenses(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
) -> Result<ApiResponse<Vec<ExpenseView>>, AppError> {
    let expenses = state.expenses.list().await?;
    Ok(ApiResponse::ok(WithImages::all(expenses, &*state.images)))
}

pub async fn create_expense(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Json(request): Json<CreateExpenseRequest>,
) -> Result<Created<ExpenseView>, AppError> {
    let expense = state.expenses.create(&actor, request).await?;
    Ok(Created(ApiResponse::with_message(
        WithImages::new(expense, &*state.images),
        "Expense recorded",
    )))
}

pub async fn get_expense(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<ExpenseView>, AppError> {
    let expense = state.expenses.get(id).await?;
    Ok(ApiResponse::ok(WithImages::new(expense, &*state.images)))
}

pub async fn delete_expense(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<()>, AppError> {
    state.expenses.delete(&actor, id).await?;
    Ok(ApiResponse::with_message((), "Expense deleted"))
}
