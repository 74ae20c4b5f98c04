use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;
use service_core::response::{ApiResponse, Created};
use uuid::Uuid;

use crate::dtos::{
    AdjustCollectionRequest, CreateCollectionRequest, UpdateCollectionRequest, WithImages,
};
use crate::middleware::AuthUser;
use crate::models::{Collection, StudentPayment};
use crate::startup::AppState;

type CollectionView = WithImages<Collection>;

pub async fn list_collections(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
) -> Result<ApiResponse<Vec<CollectionView>>, AppError> {
    let collections = state.collections.list().await?;
    Ok(ApiResponse::ok(WithImages::all(collections, &*state.images)))
}

pub async fn create_collection(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Json(request): Json<CreateCollectionRequest>,
) -> Result<Created<CollectionView>, AppError> {
    let collection = state.collections.create(&actor, request).await?;
    Ok(Created(ApiResponse::with_message(
        WithImages::new(collection, &*state.images),
        "Collection created",
    )))
}

pub async fn get_collection(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<CollectionView>, AppError> {
    let collection = state.collections.get(id).await?;
    Ok(ApiResponse::ok(WithImages::new(collection, &*state.images)))
}

pub async fn update_collection(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateCollectionRequest>,
) -> Result<ApiResponse<CollectionView>, AppError> {
    let collection = state.collections.update(&actor, id, request).await?;
    Ok(ApiResponse::with_message(
        WithImages::new(collection, &*state.images),
        "Collection updated",
    ))
}

pub async fn adjust_collection(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<AdjustCollectionRequest>,
) -> Result<ApiResponse<CollectionView>, AppError> {
    let collection = state.collections.adjust(&actor, id, request).await?;
    Ok(ApiResponse::with_message(
        WithImages::new(collection, &*state.images),
        "Collection amount adjusted",
    ))
}

pub async fn recompute_collection(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<CollectionView>, AppError> {
    actor.require_admin()?;
    let collection = state.collections.recompute(id).await?;
    Ok(ApiResponse::ok(WithImages::new(collection, &*state.images)))
}

pub async fn collection_payments(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<Vec<WithImages<StudentPayment>>>, AppError> {
    let payments = state.collections.payments(id).await?;
    Ok(ApiResponse::ok(WithImages::all(payments, &*state.images)))
}

pub async fn delete_collection(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<()>, AppError> {
    state.collections.delete(&actor, id).await?;
    Ok(ApiResponse::with_message((), "Collection deleted"))
}
