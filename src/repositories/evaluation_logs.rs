use sqlx::PgPool;

use crate::db::models::EvaluationLog;

const COLUMNS: &str = "\
    id, user_id, title, content, grade, essay_type, prompt, total_score, \
    response, created_at, updated_at";

pub(crate) async fn insert(pool: &PgPool, log: &EvaluationLog) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO evaluation_logs (
            id, user_id, title, content, grade, essay_type, prompt, total_score,
            response, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(&log.id)
    .bind(&log.user_id)
    .bind(&log.title)
    .bind(&log.content)
    .bind(log.grade)
    .bind(&log.essay_type)
    .bind(&log.prompt)
    .bind(log.total_score)
    .bind(&log.response)
    .bind(log.created_at)
    .bind(log.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub(crate) async fn find_by_id(
    pool: &PgPool,
    id: &str,
) -> Result<Option<EvaluationLog>, sqlx::Error> {
    sqlx::query_as::<_, EvaluationLog>(&format!(
        "SELECT {COLUMNS} FROM evaluation_logs WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn update(pool: &PgPool, log: &EvaluationLog) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE evaluation_logs
         SET title = $2,
             content = $3,
             response = $4,
             updated_at = $5
         WHERE id = $1",
    )
    .bind(&log.id)
    .bind(&log.title)
    .bind(&log.content)
    .bind(&log.response)
    .bind(log.updated_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}
