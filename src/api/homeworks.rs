use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::api::validation::validate_payload;
use crate::core::state::AppState;
use crate::schemas::homework::{
    HomeworkCreate, HomeworkProgressResponse, HomeworkResponse, SubmissionResponse,
    SubmitHomeworkRequest,
};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_homework))
        .route("/:homework_id/submissions", post(submit_homework))
        .route("/:homework_id/progress", get(homework_progress))
}

async fn create_homework(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(payload): Json<HomeworkCreate>,
) -> Result<(StatusCode, Json<HomeworkResponse>), ApiError> {
    validate_payload(&payload)?;
    if payload.title.trim().is_empty() {
        return Err(ApiError::BadRequest("Homework title must not be empty".to_string()));
    }

    let homework = state.services().homeworks.create_homework(&user_id, payload).await?;
    Ok((StatusCode::CREATED, Json(homework.into())))
}

/// Accepted submissions are graded later by the worker; the response carries INITIALIZED.
async fn submit_homework(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(homework_id): Path<String>,
    Json(payload): Json<SubmitHomeworkRequest>,
) -> Result<(StatusCode, Json<SubmissionResponse>), ApiError> {
    validate_payload(&payload)?;

    let submission =
        state.services().homeworks.submit_homework(&user_id, &homework_id, payload.images).await?;
    Ok((StatusCode::ACCEPTED, Json(submission.into())))
}

async fn homework_progress(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(homework_id): Path<String>,
) -> Result<Json<HomeworkProgressResponse>, ApiError> {
    let progress = state.services().homeworks.homework_progress(&user_id, &homework_id).await?;
    Ok(Json(progress))
}
