use axum::{
    extract::{Path, Query, State},
    Json,
};
use service_core::error::AppError;
use service_core::response::{ApiResponse, Created};
use uuid::Uuid;

use crate::dtos::{
    ExonerateRequest, PaymentListQuery, RecordPaymentRequest, UpdatePaymentRequest, WithImages,
};
use crate::middleware::AuthUser;
use crate::models::StudentPayment;
use crate::startup::AppState;

type PaymentView = WithImages<StudentPayment>;

pub async fn list_payments(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Query(query): Query<PaymentListQuery>,
) -> Result<ApiResponse<Vec<PaymentView>>, AppError> {
    let payments = state.student_payments.list(&actor, query).await?;
    Ok(ApiResponse::ok(WithImages::all(payments, &*state.images)))
}

pub async fn record_payment(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Json(request): Json<RecordPaymentRequest>,
) -> Result<Created<PaymentView>, AppError> {
    let payment = state.student_payments.record_payment(&actor, request).await?;
    Ok(Created(ApiResponse::with_message(
        WithImages::new(payment, &*state.images),
        "Payment recorded",
    )))
}

pub async fn get_payment(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<PaymentView>, AppError> {
    let payment = state.student_payments.get(&actor, id).await?;
    Ok(ApiResponse::ok(WithImages::new(payment, &*state.images)))
}

pub async fn update_payment(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdatePaymentRequest>,
) -> Result<ApiResponse<PaymentView>, AppError> {
    let payment = state
        .student_payments
        .update_payment(&actor, id, request)
        .await?;
    Ok(ApiResponse::with_message(
        WithImages::new(payment, &*state.images),
        "Payment updated",
    ))
}

pub async fn exonerate_payment(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<ExonerateRequest>,
) -> Result<ApiResponse<PaymentView>, AppError> {
    let payment = state.student_payments.exonerate(&actor, id, request).await?;
    Ok(ApiResponse::with_message(
        WithImages::new(payment, &*state.images),
        "Payment exonerated",
    ))
}
