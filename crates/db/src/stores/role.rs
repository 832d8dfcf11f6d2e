use chrono::{DateTime, Utc};
use sqlx::Row;

use procura_core::domain::actor::{Role, UserId, UserProfile};

use super::{RoleDirectory, StoreError};
use crate::DbPool;

pub struct SqlRoleDirectory {
    pool: DbPool,
}

impl SqlRoleDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_profile(row: &sqlx::sqlite::SqliteRow) -> Result<UserProfile, StoreError> {
    let user_id: String = row.try_get("user_id").map_err(|e| StoreError::Decode(e.to_string()))?;
    let role_text: String = row.try_get("role").map_err(|e| StoreError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| StoreError::Decode(e.to_string()))?;
    let updated_at: String =
        row.try_get("updated_at").map_err(|e| StoreError::Decode(e.to_string()))?;

    Ok(UserProfile {
        user_id: UserId(user_id),
        // Unrecognized role text means "no role": the profile exists but the
        // user sees nothing until an admin assigns a known role.
        role: Role::parse(&role_text),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Decode(format!("bad timestamp in user_profile: {raw} ({e})")))
}

async fn fetch_profile(pool: &DbPool, user_id: &UserId) -> Result<UserProfile, StoreError> {
    let row = sqlx::query(
        "SELECT user_id, role, created_at, updated_at FROM user_profile WHERE user_id = ?",
    )
    .bind(&user_id.0)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(ref r) => row_to_profile(r),
        None => Err(StoreError::MissingUser(user_id.0.clone())),
    }
}

#[async_trait::async_trait]
impl RoleDirectory for SqlRoleDirectory {
    async fn lookup(&self, user_id: &UserId) -> Result<Option<Role>, StoreError> {
        let row = sqlx::query("SELECT role FROM user_profile WHERE user_id = ?")
            .bind(&user_id.0)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let role_text: String =
            row.try_get("role").map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(Role::parse(&role_text))
    }

    async fn provision(&self, user_id: &UserId, role: Role) -> Result<UserProfile, StoreError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO user_profile (user_id, role, created_at, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(user_id) DO NOTHING",
        )
        .bind(&user_id.0)
        .bind(role.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        fetch_profile(&self.pool, user_id).await
    }

    async fn change_role(&self, user_id: &UserId, role: Role) -> Result<UserProfile, StoreError> {
        let updated = sqlx::query(
            "UPDATE user_profile SET role = ?, updated_at = ? WHERE user_id = ?",
        )
        .bind(role.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(&user_id.0)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::MissingUser(user_id.0.clone()));
        }

        fetch_profile(&self.pool, user_id).await
    }
}
