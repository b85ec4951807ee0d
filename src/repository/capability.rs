//! Capability repository

use crate::domain::{Capability, CapabilityDefinition, CapabilityOrigin};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::MySqlPool;
use uuid::Uuid;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CapabilityRepository: Send + Sync {
    /// Point lookup by unique key.
    async fn find_by_key(&self, cap_key: &str) -> Result<Option<Capability>>;

    async fn list_all(&self) -> Result<Vec<Capability>>;

    /// Insert or update the row for a validated definition. Idempotent: the
    /// unique key on `cap_key` makes concurrent syncs converge on one row.
    async fn upsert_definition(&self, def: &CapabilityDefinition) -> Result<Capability>;

    /// Flip the active flag. Errors with NotFound when no row exists.
    async fn set_active(&self, cap_key: &str, active: bool) -> Result<Capability>;
}

pub struct CapabilityRepositoryImpl {
    pool: MySqlPool,
}

impl CapabilityRepositoryImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CapabilityRepository for CapabilityRepositoryImpl {
    async fn find_by_key(&self, cap_key: &str) -> Result<Option<Capability>> {
        let capability = sqlx::query_as::<_, Capability>(
            r#"
            SELECT id, cap_key, name, version, is_active, actions, default_actions,
                   origin, icon, category, config, created_at, updated_at
            FROM capabilities WHERE cap_key = ?
            "#,
        )
        .bind(cap_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(capability)
    }

    async fn list_all(&self) -> Result<Vec<Capability>> {
        let capabilities = sqlx::query_as::<_, Capability>(
            r#"
            SELECT id, cap_key, name, version, is_active, actions, default_actions,
                   origin, icon, category, config, created_at, updated_at
            FROM capabilities ORDER BY cap_key
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(capabilities)
    }

    async fn upsert_definition(&self, def: &CapabilityDefinition) -> Result<Capability> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO capabilities
                (id, cap_key, name, version, is_active, actions, default_actions,
                 origin, icon, category, config)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                name = VALUES(name),
                version = VALUES(version),
                is_active = VALUES(is_active),
                actions = VALUES(actions),
                default_actions = VALUES(default_actions),
                icon = VALUES(icon),
                category = VALUES(category),
                config = VALUES(config)
            "#,
        )
        .bind(id)
        .bind(&def.identifier)
        .bind(&def.name)
        .bind(&def.version)
        .bind(def.is_active)
        .bind(Json(&def.actions))
        .bind(def.default_actions.as_ref().map(Json))
        .bind(CapabilityOrigin::Config)
        .bind(&def.icon)
        .bind(&def.category)
        .bind(def.config.as_ref().map(Json))
        .execute(&self.pool)
        .await?;

        self.find_by_key(&def.identifier)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to upsert capability")))
    }

    async fn set_active(&self, cap_key: &str, active: bool) -> Result<Capability> {
        let result = sqlx::query("UPDATE capabilities SET is_active = ? WHERE cap_key = ?")
            .bind(active)
            .bind(cap_key)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            // rows_affected is also 0 when the flag already holds the target
            // value, so double-check existence before reporting NotFound.
            if self.find_by_key(cap_key).await?.is_none() {
                return Err(AppError::NotFound(format!(
                    "Capability {} not found",
                    cap_key
                )));
            }
        }

        self.find_by_key(cap_key)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Capability {} not found", cap_key)))
    }
}
