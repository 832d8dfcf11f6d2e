use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Quick readiness probe: is the baseline schema in place?
pub async fn schema_ready(pool: &DbPool) -> Result<bool, sqlx::Error> {
    use sqlx::Row;

    let row = sqlx::query(
        "SELECT COUNT(*) AS count FROM sqlite_master
         WHERE type = 'table' AND name = 'purchase_request'",
    )
    .fetch_one(pool)
    .await?;
    Ok(row.get::<i64, _>("count") == 1)
}
