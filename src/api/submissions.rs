use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::api::validation::validate_payload;
use crate::core::state::AppState;
use crate::schemas::evaluation::EvaluationEdit;
use crate::schemas::homework::{
    BatchDownloadRequest, SubmissionEvaluationResponse, SubmissionResponse,
};
use crate::schemas::DownloadLink;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/:submission_id/evaluation",
            get(get_submission_evaluation).patch(modify_submission_evaluation),
        )
        .route("/download", post(download_submission_evaluations))
}

async fn get_submission_evaluation(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(submission_id): Path<String>,
) -> Result<Json<SubmissionEvaluationResponse>, ApiError> {
    let evaluation =
        state.services().homeworks.get_submission_evaluation(&user_id, &submission_id).await?;
    Ok(Json(evaluation))
}

async fn modify_submission_evaluation(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(submission_id): Path<String>,
    Json(edit): Json<EvaluationEdit>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    validate_payload(&edit)?;

    let submission = state
        .services()
        .homeworks
        .modify_submission_evaluation(&user_id, &submission_id, &edit)
        .await?;
    Ok(Json(submission.into()))
}

async fn download_submission_evaluations(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(payload): Json<BatchDownloadRequest>,
) -> Result<Json<DownloadLink>, ApiError> {
    validate_payload(&payload)?;

    let link = state
        .services()
        .homeworks
        .download_submission_evaluations(&user_id, &payload.submission_ids)
        .await?;
    Ok(Json(link))
}
