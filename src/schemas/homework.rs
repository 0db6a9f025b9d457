use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{Homework, Submission};
use crate::db::types::SubmissionProgress;

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HomeworkCreate {
    #[validate(length(min = 1, max = 255))]
    pub(crate) title: String,
    #[validate(range(min = 1, max = 12))]
    pub(crate) grade: i32,
    #[validate(length(min = 1, max = 64))]
    pub(crate) essay_type: String,
    #[serde(default)]
    #[validate(length(max = 5000))]
    pub(crate) prompt: String,
    #[validate(range(min = 1, max = 1000))]
    pub(crate) total_score: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HomeworkResponse {
    pub(crate) id: String,
    pub(crate) teacher_id: String,
    pub(crate) title: String,
    pub(crate) grade: i32,
    pub(crate) essay_type: String,
    pub(crate) prompt: String,
    pub(crate) total_score: i32,
    pub(crate) created_at: String,
}

impl From<Homework> for HomeworkResponse {
    fn from(homework: Homework) -> Self {
        Self {
            id: homework.id,
            teacher_id: homework.teacher_id,
            title: homework.title,
            grade: homework.grade,
            essay_type: homework.essay_type,
            prompt: homework.prompt,
            total_score: homework.total_score,
            created_at: format_primitive(homework.created_at),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub(crate) struct SubmitHomeworkRequest {
    #[validate(length(min = 1, max = 20))]
    pub(crate) images: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubmissionResponse {
    pub(crate) id: String,
    pub(crate) homework_id: String,
    pub(crate) student_id: String,
    pub(crate) status: &'static str,
    pub(crate) status_code: i32,
    pub(crate) message: Option<String>,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl From<Submission> for SubmissionResponse {
    fn from(submission: Submission) -> Self {
        let progress = SubmissionProgress::Stored(submission.status);
        Self {
            id: submission.id,
            homework_id: submission.homework_id,
            student_id: submission.student_id,
            status: progress.as_str(),
            status_code: progress.code(),
            message: submission.message,
            created_at: format_primitive(submission.created_at),
            updated_at: format_primitive(submission.updated_at),
        }
    }
}

/// A student's view of one homework: the latest submission, or the virtual not-submitted state.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HomeworkProgressResponse {
    pub(crate) homework_id: String,
    pub(crate) status: &'static str,
    pub(crate) status_code: i32,
    pub(crate) submission_id: Option<String>,
    pub(crate) grade_result: Option<String>,
}

impl HomeworkProgressResponse {
    pub(crate) fn new(homework_id: String, latest: Option<Submission>) -> Self {
        let progress = SubmissionProgress::from(latest.as_ref().map(|submission| submission.status));
        Self {
            homework_id,
            status: progress.as_str(),
            status_code: progress.code(),
            submission_id: latest.as_ref().map(|submission| submission.id.clone()),
            grade_result: latest.and_then(|submission| submission.grade_result),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubmissionEvaluationResponse {
    pub(crate) submission_id: String,
    pub(crate) title: Option<String>,
    pub(crate) status: &'static str,
    pub(crate) grade_result: Option<String>,
    pub(crate) response: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BatchDownloadRequest {
    #[validate(length(min = 1, max = 100))]
    pub(crate) submission_ids: Vec<String>,
}
