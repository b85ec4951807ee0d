//! Tenant capability enablement repository

use crate::domain::TenantAccessGrant;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use sqlx::MySqlPool;
use uuid::Uuid;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TenantAccessRepository: Send + Sync {
    async fn find(&self, tenant_id: Uuid, cap_key: &str) -> Result<Option<TenantAccessGrant>>;

    /// Point lookup for the decision path: a missing row and a row with
    /// `enabled = false` are both `false`.
    async fn is_enabled(&self, tenant_id: Uuid, cap_key: &str) -> Result<bool>;

    /// Enable or disable a capability for a tenant. Disabling flips the flag
    /// in place so the row (and its history) survives.
    async fn upsert_enabled(
        &self,
        tenant_id: Uuid,
        cap_key: &str,
        enabled: bool,
    ) -> Result<TenantAccessGrant>;
}

pub struct TenantAccessRepositoryImpl {
    pool: MySqlPool,
}

impl TenantAccessRepositoryImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantAccessRepository for TenantAccessRepositoryImpl {
    async fn find(&self, tenant_id: Uuid, cap_key: &str) -> Result<Option<TenantAccessGrant>> {
        let grant = sqlx::query_as::<_, TenantAccessGrant>(
            r#"
            SELECT id, tenant_id, cap_key, enabled, created_at, updated_at
            FROM tenant_capabilities WHERE tenant_id = ? AND cap_key = ?
            "#,
        )
        .bind(tenant_id)
        .bind(cap_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(grant)
    }

    async fn is_enabled(&self, tenant_id: Uuid, cap_key: &str) -> Result<bool> {
        let enabled: Option<(bool,)> = sqlx::query_as(
            "SELECT enabled FROM tenant_capabilities WHERE tenant_id = ? AND cap_key = ?",
        )
        .bind(tenant_id)
        .bind(cap_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(enabled.map(|(e,)| e).unwrap_or(false))
    }

    async fn upsert_enabled(
        &self,
        tenant_id: Uuid,
        cap_key: &str,
        enabled: bool,
    ) -> Result<TenantAccessGrant> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO tenant_capabilities (id, tenant_id, cap_key, enabled)
            VALUES (?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE enabled = VALUES(enabled)
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(cap_key)
        .bind(enabled)
        .execute(&self.pool)
        .await?;

        self.find(tenant_id, cap_key).await?.ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("Failed to upsert tenant access grant"))
        })
    }
}
