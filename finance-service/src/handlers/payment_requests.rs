use axum::{
    extract::{Path, Query, State},
    Json,
};
use service_core::error::AppError;
use service_core::response::{ApiResponse, Created};
use uuid::Uuid;

use crate::dtos::{
    AdminCommentBody, ApprovePaymentRequestBody, CreatePaymentRequestBody,
    PaymentRequestListQuery, RejectPaymentRequestBody, RequestChangesBody,
    UpdatePaymentRequestBody, WithImages,
};
use crate::middleware::AuthUser;
use crate::models::PaymentRequest;
use crate::startup::AppState;

type RequestView = WithImages<PaymentRequest>;

fn view(state: &AppState, request: PaymentRequest) -> RequestView {
    WithImages::new(request, &*state.images)
}

pub async fn list_requests(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Query(query): Query<PaymentRequestListQuery>,
) -> Result<ApiResponse<Vec<RequestView>>, AppError> {
    let requests = state.payment_requests.list(&actor, query).await?;
    Ok(ApiResponse::ok(WithImages::all(requests, &*state.images)))
}

pub async fn create_request(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Json(body): Json<CreatePaymentRequestBody>,
) -> Result<Created<RequestView>, AppError> {
    let request = state.payment_requests.create(&actor, body).await?;
    Ok(Created(ApiResponse::with_message(
        view(&state, request),
        "Payment request submitted",
    )))
}

pub async fn get_request(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<RequestView>, AppError> {
    let request = state.payment_requests.get(&actor, id).await?;
    Ok(ApiResponse::ok(view(&state, request)))
}

pub async fn update_request(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdatePaymentRequestBody>,
) -> Result<ApiResponse<RequestView>, AppError> {
    let request = state.payment_requests.update(&actor, id, body).await?;
    Ok(ApiResponse::with_message(
        view(&state, request),
        "Payment request updated",
    ))
}

pub async fn delete_request(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<()>, AppError> {
    state.payment_requests.delete(&actor, id).await?;
    Ok(ApiResponse::with_message((), "Payment request deleted"))
}

pub async fn start_review(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<RequestView>, AppError> {
    let request = state.payment_requests.start_review(&actor, id).await?;
    Ok(ApiResponse::with_message(view(&state, request), "Review started"))
}

pub async fn approve_request(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
    body: Option<Json<ApprovePaymentRequestBody>>,
) -> Result<ApiResponse<RequestView>, AppError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let request = state.payment_requests.approve(&actor, id, body).await?;
    Ok(ApiResponse::with_message(
        view(&state, request),
        "Payment request approved",
    ))
}

pub async fn reject_request(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<RejectPaymentRequestBody>,
) -> Result<ApiResponse<RequestView>, AppError> {
    let request = state.payment_requests.reject(&actor, id, body).await?;
    Ok(ApiResponse::with_message(
        view(&state, request),
        "Payment request rejected",
    ))
}

pub async fn request_changes(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<RequestChangesBody>,
) -> Result<ApiResponse<RequestView>, AppError> {
    let request = state
        .payment_requests
        .request_changes(&actor, id, body)
        .await?;
    Ok(ApiResponse::with_message(view(&state, request), "Changes requested"))
}

pub async fn add_comment(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<AdminCommentBody>,
) -> Result<ApiResponse<RequestView>, AppError> {
    let request = state.payment_requests.add_comment(&actor, id, body).await?;
    Ok(ApiResponse::with_message(view(&state, request), "Comment added"))
}
