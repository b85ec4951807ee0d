//! Permission resolver
//!
//! Pure decision logic over the capability registry, the tenant access
//! store, and the member grant store. All three role tiers are dispatched
//! from a single `match` so policy changes touch one place. Deny-by-default:
//! every ambiguous state (missing capability, inactive capability, missing
//! tenant affiliation) resolves to `false`.

use crate::domain::{Actor, Capability, Role};
use crate::error::Result;
use crate::registry::CapabilityRegistry;
use crate::repository::{CapabilityRepository, MemberGrantRepository, TenantAccessRepository};
use std::sync::Arc;

pub struct PermissionResolver<R, T, M>
where
    R: CapabilityRepository,
    T: TenantAccessRepository,
    M: MemberGrantRepository,
{
    registry: Arc<CapabilityRegistry<R>>,
    tenant_access: Arc<T>,
    member_grants: Arc<M>,
}

impl<R, T, M> PermissionResolver<R, T, M>
where
    R: CapabilityRepository,
    T: TenantAccessRepository,
    M: MemberGrantRepository,
{
    pub fn new(
        registry: Arc<CapabilityRegistry<R>>,
        tenant_access: Arc<T>,
        member_grants: Arc<M>,
    ) -> Self {
        Self {
            registry,
            tenant_access,
            member_grants,
        }
    }

    /// Whether the actor may use the capability at all.
    ///
    /// Operators bypass capability gating unconditionally; this says nothing
    /// about business-data visibility, which a different layer enforces.
    /// Owners need tenant-level enablement. Members need tenant-level
    /// enablement AND a member grant; which actions the grant lists is
    /// irrelevant here, only its presence.
    pub async fn can_reach(&self, actor: &Actor, cap_key: &str) -> Result<bool> {
        match actor.role {
            Role::Operator => Ok(true),
            Role::TenantOwner => {
                let Some(tenant_id) = actor.affiliated_tenant() else {
                    return Ok(false);
                };
                if self.active_capability(cap_key).await?.is_none() {
                    return Ok(false);
                }
                self.tenant_access.is_enabled(tenant_id, cap_key).await
            }
            Role::Member => {
                let Some(tenant_id) = actor.affiliated_tenant() else {
                    return Ok(false);
                };
                if self.active_capability(cap_key).await?.is_none() {
                    return Ok(false);
                }
                if !self.tenant_access.is_enabled(tenant_id, cap_key).await? {
                    return Ok(false);
                }
                // Revoking either the tenant grant or the member grant must
                // deny immediately, so both stores are consulted.
                let grant = self.member_grants.find(actor.user_id, cap_key).await?;
                Ok(grant.is_some())
            }
        }
    }

    /// Whether the actor may perform a specific action within the capability.
    ///
    /// Owners implicitly hold every action once their tenant has the
    /// capability; members need the action listed in their grant, and an
    /// empty or missing grant denies all actions.
    pub async fn can_perform(&self, actor: &Actor, cap_key: &str, action: &str) -> Result<bool> {
        match actor.role {
            Role::Operator => Ok(true),
            Role::TenantOwner => self.can_reach(actor, cap_key).await,
            Role::Member => {
                let Some(tenant_id) = actor.affiliated_tenant() else {
                    return Ok(false);
                };
                if self.active_capability(cap_key).await?.is_none() {
                    return Ok(false);
                }
                if !self.tenant_access.is_enabled(tenant_id, cap_key).await? {
                    return Ok(false);
                }
                let grant = self.member_grants.find(actor.user_id, cap_key).await?;
                Ok(grant.map(|g| g.allows(action)).unwrap_or(false))
            }
        }
    }

    /// Cached capability lookup, filtered to active rows.
    async fn active_capability(&self, cap_key: &str) -> Result<Option<Capability>> {
        Ok(self
            .registry
            .lookup(cap_key)
            .await?
            .filter(|cap| cap.is_active))
    }
}
