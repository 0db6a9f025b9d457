use sqlx::PgPool;

use crate::db::models::Homework;

const COLUMNS: &str =
    "id, teacher_id, title, grade, essay_type, prompt, total_score, created_at, updated_at";

pub(crate) async fn insert(pool: &PgPool, homework: &Homework) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO homeworks (
            id, teacher_id, title, grade, essay_type, prompt, total_score, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(&homework.id)
    .bind(&homework.teacher_id)
    .bind(&homework.title)
    .bind(homework.grade)
    .bind(&homework.essay_type)
    .bind(&homework.prompt)
    .bind(homework.total_score)
    .bind(homework.created_at)
    .bind(homework.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Homework>, sqlx::Error> {
    sqlx::query_as::<_, Homework>(&format!("SELECT {COLUMNS} FROM homeworks WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}
