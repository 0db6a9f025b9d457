use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::Submission;
use crate::db::types::SubmissionStatus;

const COLUMNS: &str = "\
    id, homework_id, student_id, teacher_id, images, title, status, \
    response, grade_result, message, created_at, updated_at";

pub(crate) async fn insert(pool: &PgPool, submission: &Submission) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO submissions (
            id, homework_id, student_id, teacher_id, images, title, status,
            response, grade_result, message, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
    )
    .bind(&submission.id)
    .bind(&submission.homework_id)
    .bind(&submission.student_id)
    .bind(&submission.teacher_id)
    .bind(&submission.images)
    .bind(&submission.title)
    .bind(submission.status)
    .bind(&submission.response)
    .bind(&submission.grade_result)
    .bind(&submission.message)
    .bind(submission.created_at)
    .bind(submission.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Writes the mutable columns only while the stored status still equals `expected`.
pub(crate) async fn update(
    pool: &PgPool,
    submission: &Submission,
    expected: SubmissionStatus,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE submissions
         SET title = $3,
             status = $4,
             response = $5,
             grade_result = $6,
             message = $7,
             updated_at = $8
         WHERE id = $1 AND status = $2",
    )
    .bind(&submission.id)
    .bind(expected)
    .bind(&submission.title)
    .bind(submission.status)
    .bind(&submission.response)
    .bind(&submission.grade_result)
    .bind(&submission.message)
    .bind(submission.updated_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!("SELECT {COLUMNS} FROM submissions WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn list_by_ids(
    pool: &PgPool,
    ids: &[String],
) -> Result<Vec<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {COLUMNS} FROM submissions WHERE id = ANY($1) ORDER BY id"
    ))
    .bind(ids)
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_by_status(
    pool: &PgPool,
    status: SubmissionStatus,
) -> Result<Vec<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {COLUMNS} FROM submissions WHERE status = $1 ORDER BY created_at"
    ))
    .bind(status)
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_timed_out(
    pool: &PgPool,
    status: SubmissionStatus,
    before: PrimitiveDateTime,
) -> Result<Vec<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {COLUMNS} FROM submissions
         WHERE status = $1 AND updated_at < $2
         ORDER BY updated_at"
    ))
    .bind(status)
    .bind(before)
    .fetch_all(pool)
    .await
}

pub(crate) async fn find_latest_for_student(
    pool: &PgPool,
    student_id: &str,
    homework_id: &str,
) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {COLUMNS} FROM submissions
         WHERE student_id = $1 AND homework_id = $2
         ORDER BY created_at DESC
         LIMIT 1"
    ))
    .bind(student_id)
    .bind(homework_id)
    .fetch_optional(pool)
    .await
}
