use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use super::dto::{CreateTask, UpdateTask};
use crate::error::ApiError;
use crate::routes::middleware_auth::JwtUser;
use crate::state::AppState;

/// List every task owned by the caller.
pub async fn list(
    State(state): State<AppState>,
    JwtUser(user_id): JwtUser,
) -> Result<impl IntoResponse, ApiError> {
    let tasks = state.tasks.list_by_owner(user_id).await?;
    Ok(Json(tasks))
}

/// Create a task owned by the caller, whatever owner the body names.
pub async fn create(
    State(state): State<AppState>,
    JwtUser(user_id): JwtUser,
    body: Result<Json<CreateTask>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body?;
    let new_task = body.into_new_task(user_id).map_err(ApiError::Validation)?;

    let task = state.tasks.insert(new_task).await?;
    tracing::debug!(task_id = %task.id, %user_id, "task created");

    Ok((StatusCode::CREATED, Json(task)))
}

/// Partially update one of the caller's tasks.
pub async fn update(
    State(state): State<AppState>,
    JwtUser(user_id): JwtUser,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<UpdateTask>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = id?;
    let Json(body) = body?;
    let changes = body.into_changes().map_err(ApiError::Validation)?;

    match state.tasks.update_owned(user_id, id, changes).await? {
        Some(task) => Ok(Json(task)),
        None => Err(ApiError::NotFound("Task")),
    }
}

/// Delete one of the caller's tasks.
pub async fn delete(
    State(state): State<AppState>,
    JwtUser(user_id): JwtUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = id?;

    if state.tasks.delete_owned(user_id, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Task"))
    }
}
