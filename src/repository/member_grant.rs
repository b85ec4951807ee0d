//! Member action grant repository

use crate::domain::MemberGrant;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::MySqlPool;
use uuid::Uuid;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MemberGrantRepository: Send + Sync {
    async fn find(&self, user_id: Uuid, cap_key: &str) -> Result<Option<MemberGrant>>;

    /// Create or replace the grant for `(user, capability)`. The action set
    /// is replaced outright and the granter recorded; there is no merge.
    async fn upsert(
        &self,
        user_id: Uuid,
        cap_key: &str,
        actions: &[String],
        granted_by: Option<Uuid>,
    ) -> Result<MemberGrant>;

    /// Remove the grant entirely. Deleting a missing grant is a no-op.
    async fn delete(&self, user_id: Uuid, cap_key: &str) -> Result<()>;
}

pub struct MemberGrantRepositoryImpl {
    pool: MySqlPool,
}

impl MemberGrantRepositoryImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MemberGrantRepository for MemberGrantRepositoryImpl {
    async fn find(&self, user_id: Uuid, cap_key: &str) -> Result<Option<MemberGrant>> {
        let grant = sqlx::query_as::<_, MemberGrant>(
            r#"
            SELECT id, user_id, cap_key, actions, granted_by, created_at, updated_at
            FROM member_grants WHERE user_id = ? AND cap_key = ?
            "#,
        )
        .bind(user_id)
        .bind(cap_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(grant)
    }

    async fn upsert(
        &self,
        user_id: Uuid,
        cap_key: &str,
        actions: &[String],
        granted_by: Option<Uuid>,
    ) -> Result<MemberGrant> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO member_grants (id, user_id, cap_key, actions, granted_by)
            VALUES (?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                actions = VALUES(actions),
                granted_by = VALUES(granted_by)
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(cap_key)
        .bind(Json(actions))
        .bind(granted_by)
        .execute(&self.pool)
        .await?;

        self.find(user_id, cap_key)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to upsert member grant")))
    }

    async fn delete(&self, user_id: Uuid, cap_key: &str) -> Result<()> {
        sqlx::query("DELETE FROM member_grants WHERE user_id = ? AND cap_key = ?")
            .bind(user_id)
            .bind(cap_key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
