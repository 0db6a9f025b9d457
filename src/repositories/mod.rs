//! Persistence ports. The Postgres functions in the sibling modules are the only production
//! implementation; the traits exist so the grading core can run against in-memory stores.

pub(crate) mod evaluation_logs;
pub(crate) mod health;
pub(crate) mod homeworks;
pub(crate) mod submissions;
pub(crate) mod users;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use time::PrimitiveDateTime;

use crate::db::models::{EvaluationLog, Homework, Submission, User};
use crate::db::types::SubmissionStatus;

#[derive(Debug, Error)]
pub(crate) enum RepositoryError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("user {0} has no grading quota left")]
    QuotaExhausted(String),
}

#[async_trait]
pub(crate) trait SubmissionRepository: Send + Sync {
    async fn insert(&self, submission: &Submission) -> Result<(), RepositoryError>;

    /// Persists `submission` only if the stored row is still in `expected`.
    async fn update(
        &self,
        submission: &Submission,
        expected: SubmissionStatus,
    ) -> Result<bool, RepositoryError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Submission>, RepositoryError>;

    async fn list_by_ids(&self, ids: &[String]) -> Result<Vec<Submission>, RepositoryError>;

    async fn list_by_status(
        &self,
        status: SubmissionStatus,
    ) -> Result<Vec<Submission>, RepositoryError>;

    async fn list_timed_out(
        &self,
        status: SubmissionStatus,
        before: PrimitiveDateTime,
    ) -> Result<Vec<Submission>, RepositoryError>;

    async fn find_latest_for_student(
        &self,
        student_id: &str,
        homework_id: &str,
    ) -> Result<Option<Submission>, RepositoryError>;
}

#[async_trait]
pub(crate) trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, RepositoryError>;

    /// `None` when the user does not exist.
    async fn remaining_quota(&self, id: &str) -> Result<Option<i32>, RepositoryError>;

    async fn decrement_quota(&self, id: &str, amount: i32) -> Result<(), RepositoryError>;
}

#[async_trait]
pub(crate) trait HomeworkRepository: Send + Sync {
    async fn insert(&self, homework: &Homework) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Homework>, RepositoryError>;
}

#[async_trait]
pub(crate) trait EvaluationLogRepository: Send + Sync {
    async fn insert(&self, log: &EvaluationLog) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<EvaluationLog>, RepositoryError>;

    async fn update(&self, log: &EvaluationLog) -> Result<bool, RepositoryError>;
}

#[derive(Clone)]
pub(crate) struct Repositories {
    pub(crate) submissions: Arc<dyn SubmissionRepository>,
    pub(crate) users: Arc<dyn UserRepository>,
    pub(crate) homeworks: Arc<dyn HomeworkRepository>,
    pub(crate) evaluation_logs: Arc<dyn EvaluationLogRepository>,
}

impl Repositories {
    pub(crate) fn postgres(pool: PgPool) -> Self {
        let pg = Arc::new(PgRepositories { pool });
        Self {
            submissions: pg.clone(),
            users: pg.clone(),
            homeworks: pg.clone(),
            evaluation_logs: pg,
        }
    }
}

pub(crate) struct PgRepositories {
    pool: PgPool,
}

#[async_trait]
impl SubmissionRepository for PgRepositories {
    async fn insert(&self, submission: &Submission) -> Result<(), RepositoryError> {
        Ok(submissions::insert(&self.pool, submission).await?)
    }

    async fn update(
        &self,
        submission: &Submission,
        expected: SubmissionStatus,
    ) -> Result<bool, RepositoryError> {
        Ok(submissions::update(&self.pool, submission, expected).await?)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Submission>, RepositoryError> {
        Ok(submissions::find_by_id(&self.pool, id).await?)
    }

    async fn list_by_ids(&self, ids: &[String]) -> Result<Vec<Submission>, RepositoryError> {
        Ok(submissions::list_by_ids(&self.pool, ids).await?)
    }

    async fn list_by_status(
        &self,
        status: SubmissionStatus,
    ) -> Result<Vec<Submission>, RepositoryError> {
        Ok(submissions::list_by_status(&self.pool, status).await?)
    }

    async fn list_timed_out(
        &self,
        status: SubmissionStatus,
        before: PrimitiveDateTime,
    ) -> Result<Vec<Submission>, RepositoryError> {
        Ok(submissions::list_timed_out(&self.pool, status, before).await?)
    }

    async fn find_latest_for_student(
        &self,
        student_id: &str,
        homework_id: &str,
    ) -> Result<Option<Submission>, RepositoryError> {
        Ok(submissions::find_latest_for_student(&self.pool, student_id, homework_id).await?)
    }
}

#[async_trait]
impl UserRepository for PgRepositories {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, RepositoryError> {
        Ok(users::find_by_id(&self.pool, id).await?)
    }

    async fn remaining_quota(&self, id: &str) -> Result<Option<i32>, RepositoryError> {
        Ok(users::remaining_quota(&self.pool, id).await?)
    }

    async fn decrement_quota(&self, id: &str, amount: i32) -> Result<(), RepositoryError> {
        let now = crate::core::time::primitive_now_utc();
        if users::decrement_quota(&self.pool, id, amount, now).await? {
            Ok(())
        } else {
            Err(RepositoryError::QuotaExhausted(id.to_string()))
        }
    }
}

#[async_trait]
impl HomeworkRepository for PgRepositories {
    async fn insert(&self, homework: &Homework) -> Result<(), RepositoryError> {
        Ok(homeworks::insert(&self.pool, homework).await?)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Homework>, RepositoryError> {
        Ok(homeworks::find_by_id(&self.pool, id).await?)
    }
}

#[async_trait]
impl EvaluationLogRepository for PgRepositories {
    async fn insert(&self, log: &EvaluationLog) -> Result<(), RepositoryError> {
        Ok(evaluation_logs::insert(&self.pool, log).await?)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<EvaluationLog>, RepositoryError> {
        Ok(evaluation_logs::find_by_id(&self.pool, id).await?)
    }

    async fn update(&self, log: &EvaluationLog) -> Result<bool, RepositoryError> {
        Ok(evaluation_logs::update(&self.pool, log).await?)
    }
}
