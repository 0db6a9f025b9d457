use anyhow::{Context, Result};
use time::PrimitiveDateTime;

use super::GradingPipeline;
use crate::core::time::primitive_now_utc as now_primitive;
use crate::db::types::SubmissionStatus;

/// Returns submissions stuck in GRADING past the stale timeout to INITIALIZED.
pub(crate) async fn process_timeout_submissions(pipeline: &GradingPipeline) -> Result<usize> {
    let now = now_primitive();
    let before = stale_cutoff(now, pipeline.stale_timeout);

    let stuck = pipeline
        .repositories
        .submissions
        .list_timed_out(SubmissionStatus::Grading, before)
        .await
        .context("Failed to fetch timed out submissions")?;

    let mut reset = 0;
    for mut submission in stuck {
        submission.reset_for_retry(now)?;
        match pipeline.repositories.submissions.update(&submission, SubmissionStatus::Grading).await
        {
            Ok(true) => {
                reset += 1;
                tracing::warn!(submission_id = %submission.id, "Reset stale grading submission");
            }
            Ok(false) => {}
            Err(err) => {
                tracing::error!(
                    submission_id = %submission.id,
                    error = %err,
                    "Failed to reset stale submission"
                );
            }
        }
    }

    if reset > 0 {
        metrics::counter!("stale_submissions_reset_total").increment(reset as u64);
    }
    Ok(reset)
}

fn stale_cutoff(now: PrimitiveDateTime, timeout: std::time::Duration) -> PrimitiveDateTime {
    time::Duration::try_from(timeout)
        .ok()
        .and_then(|timeout| now.checked_sub(timeout))
        .unwrap_or(PrimitiveDateTime::MIN)
}
