//! Actor domain model
//!
//! An `Actor` is produced by the upstream authentication layer before this
//! engine is invoked. Capgate never issues or validates credentials; it only
//! consumes the authenticated identity, role, and tenant affiliation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The three-tier role model.
///
/// Kept as a closed set of variants so each tier's authorization rule lives
/// in exactly one `match` inside the permission resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Platform-level role. Bypasses capability gating entirely but carries
    /// no implicit business-data rights (enforced elsewhere).
    Operator,
    /// Coarse, all-or-nothing access to every capability enabled for the
    /// owner's tenant.
    TenantOwner,
    /// Requires tenant-level enablement plus an explicit per-action grant.
    Member,
}

impl Role {
    /// Whether this role must carry a tenant affiliation.
    pub fn requires_tenant(&self) -> bool {
        !matches!(self, Role::Operator)
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "operator" => Ok(Role::Operator),
            "tenant_owner" => Ok(Role::TenantOwner),
            "member" => Ok(Role::Member),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Operator => write!(f, "operator"),
            Role::TenantOwner => write!(f, "tenant_owner"),
            Role::Member => write!(f, "member"),
        }
    }
}

/// Authenticated actor as handed over by the upstream authentication step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    /// Stable user identifier
    pub user_id: Uuid,
    /// Role tier
    pub role: Role,
    /// Tenant affiliation; absent for operators, required for the other tiers
    pub tenant_id: Option<Uuid>,
}

impl Actor {
    pub fn operator(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::Operator,
            tenant_id: None,
        }
    }

    pub fn tenant_owner(user_id: Uuid, tenant_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::TenantOwner,
            tenant_id: Some(tenant_id),
        }
    }

    pub fn member(user_id: Uuid, tenant_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::Member,
            tenant_id: Some(tenant_id),
        }
    }

    /// Tenant id when the role requires one; `None` marks an inconsistent
    /// actor, which every decision path treats as a denial.
    pub fn affiliated_tenant(&self) -> Option<Uuid> {
        if self.role.requires_tenant() {
            self.tenant_id
        } else {
            None
        }
    }
}
