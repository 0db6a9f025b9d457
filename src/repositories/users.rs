use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::User;

const COLUMNS: &str = "id, username, full_name, role, grading_quota, created_at, updated_at";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!("SELECT {COLUMNS} FROM users WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn remaining_quota(pool: &PgPool, id: &str) -> Result<Option<i32>, sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT grading_quota FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Returns `false` when the user does not exist or has fewer than `amount` gradings left.
pub(crate) async fn decrement_quota(
    pool: &PgPool,
    id: &str,
    amount: i32,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE users
         SET grading_quota = grading_quota - $2,
             updated_at = $3
         WHERE id = $1 AND grading_quota >= $2",
    )
    .bind(id)
    .bind(amount)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}
