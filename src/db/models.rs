use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use thiserror::Error;
use time::PrimitiveDateTime;

use crate::core::time::strictly_after;
use crate::db::types::{SubmissionStatus, UserRole};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct User {
    pub(crate) id: String,
    pub(crate) username: String,
    pub(crate) full_name: String,
    pub(crate) role: UserRole,
    pub(crate) grading_quota: i32,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Homework {
    pub(crate) id: String,
    pub(crate) teacher_id: String,
    pub(crate) title: String,
    pub(crate) grade: i32,
    pub(crate) essay_type: String,
    pub(crate) prompt: String,
    pub(crate) total_score: i32,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct EvaluationLog {
    pub(crate) id: String,
    pub(crate) user_id: String,
    pub(crate) title: String,
    pub(crate) content: String,
    pub(crate) grade: i32,
    pub(crate) essay_type: String,
    pub(crate) prompt: String,
    pub(crate) total_score: i32,
    pub(crate) response: Json<serde_json::Value>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Submission {
    pub(crate) id: String,
    pub(crate) homework_id: String,
    pub(crate) student_id: String,
    pub(crate) teacher_id: String,
    pub(crate) images: Json<Vec<String>>,
    pub(crate) title: Option<String>,
    pub(crate) status: SubmissionStatus,
    pub(crate) response: Option<Json<serde_json::Value>>,
    pub(crate) grade_result: Option<String>,
    pub(crate) message: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("submission cannot move from {} to {}", from.as_str(), to.as_str())]
pub(crate) struct TransitionError {
    pub(crate) from: SubmissionStatus,
    pub(crate) to: SubmissionStatus,
}

impl Submission {
    pub(crate) fn new(
        id: String,
        homework: &Homework,
        student_id: String,
        images: Vec<String>,
        now: PrimitiveDateTime,
    ) -> Self {
        Self {
            id,
            homework_id: homework.id.clone(),
            student_id,
            teacher_id: homework.teacher_id.clone(),
            images: Json(images),
            title: None,
            status: SubmissionStatus::Initialized,
            response: None,
            grade_result: None,
            message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn begin_grading(&mut self, now: PrimitiveDateTime) -> Result<(), TransitionError> {
        self.transition(SubmissionStatus::Grading, now)
    }

    pub(crate) fn complete(
        &mut self,
        response: serde_json::Value,
        grade_result: String,
        now: PrimitiveDateTime,
    ) -> Result<(), TransitionError> {
        self.transition(SubmissionStatus::Completed, now)?;
        self.response = Some(Json(response));
        self.grade_result = Some(grade_result);
        Ok(())
    }

    pub(crate) fn fail(
        &mut self,
        message: impl Into<String>,
        now: PrimitiveDateTime,
    ) -> Result<(), TransitionError> {
        self.transition(SubmissionStatus::Failed, now)?;
        self.message = Some(message.into());
        Ok(())
    }

    pub(crate) fn reset_for_retry(&mut self, now: PrimitiveDateTime) -> Result<(), TransitionError> {
        self.transition(SubmissionStatus::Initialized, now)
    }

    pub(crate) fn modify(
        &mut self,
        response: serde_json::Value,
        grade_result: String,
        now: PrimitiveDateTime,
    ) -> Result<(), TransitionError> {
        self.transition(SubmissionStatus::Modified, now)?;
        self.response = Some(Json(response));
        self.grade_result = Some(grade_result);
        Ok(())
    }

    fn transition(
        &mut self,
        to: SubmissionStatus,
        now: PrimitiveDateTime,
    ) -> Result<(), TransitionError> {
        use SubmissionStatus::*;

        let allowed = matches!(
            (self.status, to),
            (Initialized, Grading)
                | (Initialized, Failed)
                | (Grading, Completed)
                | (Grading, Failed)
                | (Grading, Initialized)
                | (Completed, Modified)
                | (Modified, Modified)
        );
        if !allowed {
            return Err(TransitionError { from: self.status, to });
        }

        self.status = to;
        self.updated_at = strictly_after(self.updated_at, now);
        if !to.has_result() {
            self.response = None;
            self.grade_result = None;
        }
        if to != Failed {
            self.message = None;
        }
        Ok(())
    }
}
