//! Tenant access grants and member action grants

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Tenant-level enablement of a capability.
///
/// A row with `enabled = false` is, for decision purposes, equivalent to no
/// row at all; disabling keeps the row so enablement history survives.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TenantAccessGrant {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub cap_key: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-member action grant within a capability.
///
/// Absence of a row means no grant. Re-granting replaces the action set
/// outright; there is no union semantics.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MemberGrant {
    pub id: Uuid,
    pub user_id: Uuid,
    pub cap_key: String,
    #[sqlx(json)]
    pub actions: Vec<String>,
    pub granted_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemberGrant {
    /// Whether the grant lists `action`. An empty set denies every action.
    pub fn allows(&self, action: &str) -> bool {
        self.actions.iter().any(|a| a == action)
    }
}

/// Input for granting member-level actions
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GrantActionsInput {
    /// Tenant the target belongs to, as asserted by the caller. Must match
    /// the granter's own tenant; membership truth lives outside this engine.
    pub tenant_id: Uuid,
    #[validate(length(min = 1, message = "actions must not be empty"))]
    pub actions: Vec<String>,
}
