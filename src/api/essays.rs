use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use futures::stream::{self, Stream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::api::validation::validate_payload;
use crate::core::state::AppState;
use crate::schemas::essay::{EssayEvaluateRequest, EvaluationLogResponse};
use crate::schemas::evaluation::EvaluationEdit;
use crate::schemas::DownloadLink;
use crate::services::stream_relay::{RelayKind, RelayMessage};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/evaluate", post(evaluate_essay))
        .route("/:log_id", patch(modify_evaluation))
        .route("/:log_id/download", get(download_evaluation))
}

/// Streams grading progress as server-sent events. Failures before grading starts (another
/// evaluation in flight, no quota) are plain error responses instead of a stream. Dropping
/// the response cancels the grading call.
async fn evaluate_essay(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(payload): Json<EssayEvaluateRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    validate_payload(&payload)?;

    let (sink, mut messages) = mpsc::channel(state.settings().grading().relay_channel_capacity);
    let cancel = CancellationToken::new();
    let service = state.services().essays.clone();
    let task_cancel = cancel.clone();
    let task = tokio::spawn(async move {
        let result = service.evaluate_under_lock(&user_id, payload, sink, task_cancel).await;
        if let Err(err) = &result {
            tracing::warn!(user_id = %user_id, error = %err, "Essay evaluation did not complete");
        }
        result
    });

    let first = match messages.recv().await {
        Some(message) if message.kind == RelayKind::Init => message,
        _ => {
            return match task.await {
                Ok(Err(err)) => Err(err.into()),
                Ok(Ok(_)) => Err(ApiError::Internal("Grading finished without a stream".into())),
                Err(err) => Err(ApiError::internal(err, "Essay evaluation task failed")),
            };
        }
    };

    let guard = cancel.drop_guard();
    let events = stream::unfold(
        (Some(first), messages, guard),
        |(pending, mut messages, guard)| async move {
            let message = match pending {
                Some(message) => message,
                None => messages.recv().await?,
            };
            Some((sse_event(&message), (None, messages, guard)))
        },
    );

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn sse_event(message: &RelayMessage) -> Result<Event, axum::Error> {
    Event::default().json_data(message)
}

async fn download_evaluation(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(log_id): Path<String>,
) -> Result<Json<DownloadLink>, ApiError> {
    let link = state.services().essays.download_evaluation(&user_id, &log_id).await?;
    Ok(Json(link))
}

async fn modify_evaluation(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(log_id): Path<String>,
    Json(edit): Json<EvaluationEdit>,
) -> Result<Json<EvaluationLogResponse>, ApiError> {
    validate_payload(&edit)?;

    let log = state.services().essays.modify_evaluation(&user_id, &log_id, &edit).await?;
    Ok(Json(log.into()))
}
