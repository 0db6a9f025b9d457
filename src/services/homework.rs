use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::core::time::{primitive_now_utc, strictly_after};
use crate::db::models::{Homework, Submission, TransitionError, User};
use crate::db::types::UserRole;
use crate::repositories::{RepositoryError, Repositories};
use crate::schemas::evaluation::{EvaluationEdit, GradingPayload, PayloadError};
use crate::schemas::homework::{
    HomeworkCreate, HomeworkProgressResponse, SubmissionEvaluationResponse,
};
use crate::schemas::DownloadLink;
use crate::services::download_cache::{fingerprint_batch, DownloadCache};
use crate::services::report_export::ReportExporter;
use crate::services::Backends;

#[derive(Debug, Error)]
pub(crate) enum HomeworkError {
    #[error("user not found")]
    UserNotFound,
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("homework not found")]
    HomeworkNotFound,
    #[error("submission not found")]
    SubmissionNotFound,
    #[error("submission has no evaluation yet")]
    NotEvaluated,
    #[error("submission changed concurrently; retry")]
    Conflict,
    #[error("no evaluations to export")]
    NothingToExport,
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("stored evaluation is unreadable: {0}")]
    Payload(#[from] PayloadError),
    #[error("report export failed: {0:#}")]
    Export(anyhow::Error),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Clone)]
pub(crate) struct HomeworkService {
    repositories: Repositories,
    exporter: Arc<dyn ReportExporter>,
    cache: DownloadCache,
}

impl HomeworkService {
    pub(crate) fn new(backends: &Backends, cache: DownloadCache) -> Self {
        Self {
            repositories: backends.repositories.clone(),
            exporter: backends.exporter.clone(),
            cache,
        }
    }

    pub(crate) async fn create_homework(
        &self,
        user_id: &str,
        payload: HomeworkCreate,
    ) -> Result<Homework, HomeworkError> {
        let user = self.user(user_id).await?;
        if !matches!(user.role, UserRole::Teacher | UserRole::Admin) {
            return Err(HomeworkError::Forbidden("Only teachers can create homework"));
        }

        let now = primitive_now_utc();
        let homework = Homework {
            id: Uuid::new_v4().to_string(),
            teacher_id: user.id,
            title: payload.title,
            grade: payload.grade,
            essay_type: payload.essay_type,
            prompt: payload.prompt,
            total_score: payload.total_score,
            created_at: now,
            updated_at: now,
        };
        self.repositories.homeworks.insert(&homework).await?;

        tracing::info!(homework_id = %homework.id, teacher_id = %homework.teacher_id, "Homework created");
        Ok(homework)
    }

    /// Records a new submission in INITIALIZED; grading happens later on the poller.
    pub(crate) async fn submit_homework(
        &self,
        user_id: &str,
        homework_id: &str,
        images: Vec<String>,
    ) -> Result<Submission, HomeworkError> {
        let user = self.user(user_id).await?;
        if user.role != UserRole::Student {
            return Err(HomeworkError::Forbidden("Only students can submit homework"));
        }
        let homework = self
            .repositories
            .homeworks
            .find_by_id(homework_id)
            .await?
            .ok_or(HomeworkError::HomeworkNotFound)?;

        let submission =
            Submission::new(Uuid::new_v4().to_string(), &homework, user.id, images, primitive_now_utc());
        self.repositories.submissions.insert(&submission).await?;

        tracing::info!(
            submission_id = %submission.id,
            homework_id,
            student_id = %submission.student_id,
            "Homework submitted"
        );
        Ok(submission)
    }

    pub(crate) async fn homework_progress(
        &self,
        user_id: &str,
        homework_id: &str,
    ) -> Result<HomeworkProgressResponse, HomeworkError> {
        if self.repositories.homeworks.find_by_id(homework_id).await?.is_none() {
            return Err(HomeworkError::HomeworkNotFound);
        }
        let latest =
            self.repositories.submissions.find_latest_for_student(user_id, homework_id).await?;
        Ok(HomeworkProgressResponse::new(homework_id.to_string(), latest))
    }

    pub(crate) async fn get_submission_evaluation(
        &self,
        user_id: &str,
        submission_id: &str,
    ) -> Result<SubmissionEvaluationResponse, HomeworkError> {
        let submission = self.visible_submission(user_id, submission_id).await?;
        let Some(response) = submission.response.filter(|_| submission.status.has_result()) else {
            return Err(HomeworkError::NotEvaluated);
        };

        Ok(SubmissionEvaluationResponse {
            submission_id: submission.id,
            title: submission.title,
            status: submission.status.as_str(),
            grade_result: submission.grade_result,
            response: response.0,
        })
    }

    /// Applies a teacher's edit to a graded submission and moves it to MODIFIED.
    pub(crate) async fn modify_submission_evaluation(
        &self,
        user_id: &str,
        submission_id: &str,
        edit: &EvaluationEdit,
    ) -> Result<Submission, HomeworkError> {
        let mut submission = self
            .repositories
            .submissions
            .find_by_id(submission_id)
            .await?
            .ok_or(HomeworkError::SubmissionNotFound)?;
        if submission.teacher_id != user_id {
            return Err(HomeworkError::Forbidden("Only the homework's teacher can modify its evaluation"));
        }
        let expected = submission.status;
        let Some(response) = submission.response.clone().filter(|_| expected.has_result()) else {
            return Err(HomeworkError::NotEvaluated);
        };

        let mut payload = GradingPayload::new(response.0)?;
        payload.apply(edit);
        let grade_result = payload
            .grade_result()
            .ok()
            .or_else(|| submission.grade_result.clone())
            .unwrap_or_default();

        let now = strictly_after(submission.updated_at, primitive_now_utc());
        submission.modify(payload.into_value(), grade_result, now)?;
        if !self.repositories.submissions.update(&submission, expected).await? {
            return Err(HomeworkError::Conflict);
        }
        self.cache.invalidate(&fingerprint_batch(&[submission_id])).await;

        tracing::info!(submission_id, teacher_id = user_id, "Submission evaluation modified");
        Ok(submission)
    }

    /// One report covering every requested submission the caller may see.
    pub(crate) async fn download_submission_evaluations(
        &self,
        user_id: &str,
        submission_ids: &[String],
    ) -> Result<DownloadLink, HomeworkError> {
        let requested: HashSet<&str> = submission_ids.iter().map(String::as_str).collect();
        let submissions = self.repositories.submissions.list_by_ids(submission_ids).await?;
        if submissions.len() != requested.len() {
            return Err(HomeworkError::SubmissionNotFound);
        }
        if submissions.iter().any(|submission| !can_view(submission, user_id)) {
            return Err(HomeworkError::Forbidden("Submission belongs to another user"));
        }

        let key = fingerprint_batch(submission_ids);
        if let Some(link) = self.cache.get(&key).await {
            return Ok(link);
        }

        let mut evaluations = Vec::with_capacity(submissions.len());
        for submission in submissions {
            let Some(response) = submission.response.filter(|_| submission.status.has_result())
            else {
                continue;
            };
            match GradingPayload::new(response.0) {
                Ok(payload) if payload.decode().is_ok() => evaluations.push(payload.into_value()),
                Ok(_) | Err(_) => {
                    tracing::warn!(
                        submission_id = %submission.id,
                        "Skipping submission with undecodable evaluation"
                    );
                }
            }
        }
        if evaluations.is_empty() {
            return Err(HomeworkError::NothingToExport);
        }

        let user = self.user(user_id).await?;
        let link = self
            .exporter
            .export(&user.username, evaluations)
            .await
            .map_err(HomeworkError::Export)?;
        self.cache.set(&key, &link).await;
        Ok(link)
    }

    async fn user(&self, user_id: &str) -> Result<User, HomeworkError> {
        self.repositories.users.find_by_id(user_id).await?.ok_or(HomeworkError::UserNotFound)
    }

    async fn visible_submission(
        &self,
        user_id: &str,
        submission_id: &str,
    ) -> Result<Submission, HomeworkError> {
        self.repositories
            .submissions
            .find_by_id(submission_id)
            .await?
            .filter(|submission| can_view(submission, user_id))
            .ok_or(HomeworkError::SubmissionNotFound)
    }
}

fn can_view(submission: &Submission, user_id: &str) -> bool {
    submission.student_id == user_id || submission.teacher_id == user_id
}
