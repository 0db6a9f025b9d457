use std::time::Instant;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::GradingPipeline;
use crate::core::lease::{LeaseError, LeaseLock};
use crate::core::time::primitive_now_utc as now_primitive;
use crate::db::models::Submission;
use crate::db::types::SubmissionStatus;
use crate::services::essay_grading::GradingRequest;
use crate::services::stream_relay::{relay, RelayError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SubmissionOutcome {
    Completed,
    Failed,
    /// Claimed elsewhere, no longer INITIALIZED, or interrupted and handed back.
    Skipped,
}

impl SubmissionOutcome {
    fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// Grades every INITIALIZED submission one after another. A failure on one submission is
/// logged and never stops the rest of the batch.
pub(crate) async fn process_pending_submissions(
    pipeline: &GradingPipeline,
    cancel: &CancellationToken,
) -> Result<usize> {
    let pending = pipeline
        .repositories
        .submissions
        .list_by_status(SubmissionStatus::Initialized)
        .await
        .context("Failed to fetch initialized submissions")?;

    let mut completed = 0;
    for submission in pending {
        if cancel.is_cancelled() {
            break;
        }
        match process_one_submission(pipeline, &submission.id, cancel).await {
            Ok(SubmissionOutcome::Completed) => completed += 1,
            Ok(_) => {}
            Err(err) => {
                tracing::error!(
                    submission_id = %submission.id,
                    error = %err,
                    "Failed to process submission"
                );
            }
        }
    }

    Ok(completed)
}

pub(crate) async fn process_one_submission(
    pipeline: &GradingPipeline,
    submission_id: &str,
    cancel: &CancellationToken,
) -> Result<SubmissionOutcome> {
    let mut claim = LeaseLock::new(
        pipeline.coordination.clone(),
        format!("grading:submission:{submission_id}"),
        pipeline.claim_ttl,
        pipeline.stale_timeout,
    );
    let claimed = match claim.lock().await {
        Ok(()) => {
            metrics::counter!("grading_claims_total", "result" => "acquired").increment(1);
            true
        }
        Err(LeaseError::AlreadyHeld(_)) => {
            metrics::counter!("grading_claims_total", "result" => "held").increment(1);
            tracing::info!(submission_id, "Submission is claimed by another poller");
            return Ok(SubmissionOutcome::Skipped);
        }
        Err(err) => {
            metrics::counter!("grading_claims_total", "result" => "unavailable").increment(1);
            tracing::warn!(
                submission_id,
                error = %err,
                "Could not claim submission; grading without a claim"
            );
            false
        }
    };

    let started = Instant::now();
    let result = grade_claimed(pipeline, submission_id, cancel).await;

    if claimed {
        if let Err(err) = claim.unlock().await {
            tracing::warn!(submission_id, error = %err, "Submission claim was lost while grading");
        }
    }

    if let Ok(outcome) = &result {
        metrics::counter!("grading_jobs_total", "status" => outcome.as_str()).increment(1);
        if *outcome != SubmissionOutcome::Skipped {
            metrics::histogram!("grading_duration_seconds")
                .record(started.elapsed().as_secs_f64());
        }
    }
    result
}

async fn grade_claimed(
    pipeline: &GradingPipeline,
    submission_id: &str,
    cancel: &CancellationToken,
) -> Result<SubmissionOutcome> {
    let repositories = &pipeline.repositories;

    // Re-read under the claim: an earlier holder may have finished it already.
    let Some(mut submission) = repositories
        .submissions
        .find_by_id(submission_id)
        .await
        .context("Failed to load submission")?
    else {
        return Ok(SubmissionOutcome::Skipped);
    };
    if submission.status != SubmissionStatus::Initialized {
        tracing::info!(submission_id, status = submission.status.as_str(), "Skipping grading");
        return Ok(SubmissionOutcome::Skipped);
    }

    let quota = repositories
        .users
        .remaining_quota(&submission.teacher_id)
        .await
        .context("Failed to load teacher quota")?;
    if quota.unwrap_or(0) <= 0 {
        return mark_failed(pipeline, &mut submission, "Teacher has no gradings left").await;
    }

    let Some(homework) = repositories
        .homeworks
        .find_by_id(&submission.homework_id)
        .await
        .context("Failed to load homework")?
    else {
        return mark_failed(pipeline, &mut submission, "Homework no longer exists").await;
    };

    submission.begin_grading(now_primitive())?;
    if !repositories
        .submissions
        .update(&submission, SubmissionStatus::Initialized)
        .await
        .context("Failed to move submission to grading")?
    {
        return Ok(SubmissionOutcome::Skipped);
    }
    tracing::info!(submission_id, teacher_id = %submission.teacher_id, "Grading submission");

    let text = match pipeline.ocr.recognize(&submission.images.0).await {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!(submission_id, error = %err, "OCR failed");
            return mark_failed(pipeline, &mut submission, &format!("OCR failed: {err:#}")).await;
        }
    };
    submission.title = Some(text.title.clone());

    let grading = pipeline.grading.clone();
    let request = GradingRequest::for_homework(&homework, text.title, text.content);
    let producer_cancel = cancel.clone();
    let produce = move |records: mpsc::Sender<String>| async move {
        grading.evaluate_stream(request, records, producer_cancel).await
    };

    let payload = match relay(produce, None, cancel, pipeline.relay_capacity).await {
        Ok(payload) => payload,
        Err(RelayError::Cancelled) => return hand_back(pipeline, &mut submission).await,
        Err(err) => {
            tracing::warn!(submission_id, error = %err, "Grading stream failed");
            return mark_failed(pipeline, &mut submission, &format!("Grading failed: {err}")).await;
        }
    };
    let grade_result = match payload.grade_result() {
        Ok(grade_result) => grade_result,
        Err(err) => {
            return mark_failed(pipeline, &mut submission, &format!("Grading failed: {err}")).await;
        }
    };

    if let Err(err) = repositories.users.decrement_quota(&submission.teacher_id, 1).await {
        tracing::warn!(submission_id, error = %err, "Failed to charge teacher quota");
        return mark_failed(pipeline, &mut submission, &format!("Quota update failed: {err}")).await;
    }

    let mut completed = submission.clone();
    completed.complete(payload.into_value(), grade_result, now_primitive())?;
    match repositories.submissions.update(&completed, SubmissionStatus::Grading).await {
        Ok(true) => {
            tracing::info!(
                submission_id,
                grade_result = completed.grade_result.as_deref().unwrap_or_default(),
                "Submission graded"
            );
            Ok(SubmissionOutcome::Completed)
        }
        Ok(false) => {
            tracing::warn!(submission_id, "Submission left GRADING before its result was stored");
            Ok(SubmissionOutcome::Skipped)
        }
        Err(err) => {
            tracing::error!(submission_id, error = %err, "Failed to store grading result");
            mark_failed(pipeline, &mut submission, "Failed to store grading result").await
        }
    }
}

/// Moves `submission` to FAILED with `message`. Best effort: a failed write is logged
/// and the timeout pass eventually recovers a submission stuck in GRADING.
async fn mark_failed(
    pipeline: &GradingPipeline,
    submission: &mut Submission,
    message: &str,
) -> Result<SubmissionOutcome> {
    let expected = submission.status;
    submission.fail(message, now_primitive())?;

    match pipeline.repositories.submissions.update(submission, expected).await {
        Ok(true) => {
            tracing::info!(submission_id = %submission.id, message, "Submission failed");
        }
        Ok(false) => {
            tracing::warn!(
                submission_id = %submission.id,
                "Submission changed before it could be marked failed"
            );
        }
        Err(err) => {
            tracing::error!(
                submission_id = %submission.id,
                error = %err,
                "Failed to mark submission as failed"
            );
        }
    }
    Ok(SubmissionOutcome::Failed)
}

/// Returns an interrupted submission to INITIALIZED for the next tick.
async fn hand_back(
    pipeline: &GradingPipeline,
    submission: &mut Submission,
) -> Result<SubmissionOutcome> {
    submission.reset_for_retry(now_primitive())?;
    if let Err(err) =
        pipeline.repositories.submissions.update(submission, SubmissionStatus::Grading).await
    {
        tracing::warn!(
            submission_id = %submission.id,
            error = %err,
            "Failed to hand back interrupted submission; timeout pass will recover it"
        );
    }
    Ok(SubmissionOutcome::Skipped)
}
