use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;
use service_core::response::{ApiResponse, Created};
use uuid::Uuid;

use crate::dtos::CreateStudentRequest;
use crate::middleware::AuthUser;
use crate::models::Student;
use crate::startup::AppState;

pub async fn list_students(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
) -> Result<ApiResponse<Vec<Student>>, AppError> {
    Ok(ApiResponse::ok(state.students.list(&actor).await?))
}

pub async fn create_student(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Json(request): Json<CreateStudentRequest>,
) -> Result<Created<Student>, AppError> {
    let student = state.students.create(&actor, request).await?;
    Ok(Created(ApiResponse::with_message(student, "Student created")))
}

pub async fn get_student(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<Student>, AppError> {
    Ok(ApiResponse::ok(state.students.get(id).await?))
}

pub async fn delete_student(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<()>, AppError> {
    state.students.delete(&actor, id).await?;
    Ok(ApiResponse::with_message((), "Student deleted"))
}
