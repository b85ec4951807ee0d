//! Grant management
//!
//! Mutations over the tenant access store and the member grant store, with
//! the who-may-grant-what rules enforced here rather than at call sites:
//! operators handle coarse tenant-level enablement, tenant owners handle
//! member-level actions within their own tenant, everyone else is rejected.

use crate::domain::{Actor, Capability, GrantActionsInput, MemberGrant, Role, TenantAccessGrant};
use crate::error::{AppError, Result};
use crate::registry::CapabilityRegistry;
use crate::repository::{CapabilityRepository, MemberGrantRepository, TenantAccessRepository};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

pub struct GrantService<R, T, M>
where
    R: CapabilityRepository,
    T: TenantAccessRepository,
    M: MemberGrantRepository,
{
    caps: Arc<R>,
    registry: Arc<CapabilityRegistry<R>>,
    tenant_access: Arc<T>,
    member_grants: Arc<M>,
}

impl<R, T, M> GrantService<R, T, M>
where
    R: CapabilityRepository,
    T: TenantAccessRepository,
    M: MemberGrantRepository,
{
    pub fn new(
        caps: Arc<R>,
        registry: Arc<CapabilityRegistry<R>>,
        tenant_access: Arc<T>,
        member_grants: Arc<M>,
    ) -> Self {
        Self {
            caps,
            registry,
            tenant_access,
            member_grants,
        }
    }

    /// Enable a capability for a tenant. Operator only.
    pub async fn enable_for_tenant(
        &self,
        granter: &Actor,
        tenant_id: Uuid,
        cap_key: &str,
    ) -> Result<TenantAccessGrant> {
        self.set_tenant_enabled(granter, tenant_id, cap_key, true)
            .await
    }

    /// Disable a capability for a tenant. Operator only. The grant row is
    /// kept with `enabled = false`, which denies exactly like no row.
    pub async fn disable_for_tenant(
        &self,
        granter: &Actor,
        tenant_id: Uuid,
        cap_key: &str,
    ) -> Result<TenantAccessGrant> {
        self.set_tenant_enabled(granter, tenant_id, cap_key, false)
            .await
    }

    async fn set_tenant_enabled(
        &self,
        granter: &Actor,
        tenant_id: Uuid,
        cap_key: &str,
        enabled: bool,
    ) -> Result<TenantAccessGrant> {
        if granter.role != Role::Operator {
            return Err(AppError::Forbidden(format!(
                "role {} may not change tenant capability access",
                granter.role
            )));
        }
        self.require_capability(cap_key).await?;

        let grant = self
            .tenant_access
            .upsert_enabled(tenant_id, cap_key, enabled)
            .await?;
        info!(
            "Capability '{}' {} for tenant {} by operator {}",
            cap_key,
            if enabled { "enabled" } else { "disabled" },
            tenant_id,
            granter.user_id
        );
        Ok(grant)
    }

    /// Grant member-level actions. Tenant owner only, own tenant only, and
    /// only while the tenant has the capability enabled. Re-granting replaces
    /// the previous action set and records the new granter.
    pub async fn grant(
        &self,
        granter: &Actor,
        target_user_id: Uuid,
        cap_key: &str,
        input: GrantActionsInput,
    ) -> Result<MemberGrant> {
        input.validate()?;
        let granter_tenant = self.require_owner_of(granter, input.tenant_id)?;

        let capability = self.require_capability(cap_key).await?;
        if !self
            .tenant_access
            .is_enabled(granter_tenant, cap_key)
            .await?
        {
            return Err(AppError::Forbidden(format!(
                "capability '{}' is not enabled for tenant {}",
                cap_key, granter_tenant
            )));
        }

        if let Some(unknown) = input
            .actions
            .iter()
            .find(|a| !capability.declares_action(a))
        {
            return Err(AppError::Validation(format!(
                "action '{}' is not declared by capability '{}'",
                unknown, cap_key
            )));
        }

        let grant = self
            .member_grants
            .upsert(
                target_user_id,
                cap_key,
                &input.actions,
                Some(granter.user_id),
            )
            .await?;
        info!(
            "Granted [{}] on '{}' to user {} by owner {}",
            input.actions.join(", "),
            cap_key,
            target_user_id,
            granter.user_id
        );
        Ok(grant)
    }

    /// Revoke a member grant entirely. Tenant owner only, own tenant only.
    /// Revoking a grant that does not exist is a no-op.
    pub async fn revoke(
        &self,
        granter: &Actor,
        target_user_id: Uuid,
        target_tenant_id: Uuid,
        cap_key: &str,
    ) -> Result<()> {
        self.require_owner_of(granter, target_tenant_id)?;
        self.require_capability(cap_key).await?;

        self.member_grants.delete(target_user_id, cap_key).await?;
        info!(
            "Revoked grant on '{}' from user {} by owner {}",
            cap_key, target_user_id, granter.user_id
        );
        Ok(())
    }

    /// Activate or deactivate a capability row. Operator only. Sync never
    /// deletes rows, so this is how a capability absent from configuration
    /// is actually retired.
    pub async fn set_capability_active(
        &self,
        granter: &Actor,
        cap_key: &str,
        active: bool,
    ) -> Result<Capability> {
        if granter.role != Role::Operator {
            return Err(AppError::Forbidden(format!(
                "role {} may not change capability state",
                granter.role
            )));
        }

        let capability = self.caps.set_active(cap_key, active).await?;
        self.registry.invalidate(cap_key);
        info!(
            "Capability '{}' {} by operator {}",
            cap_key,
            if active { "activated" } else { "deactivated" },
            granter.user_id
        );
        Ok(capability)
    }

    /// Admin-surface capability lookup: a fresh store read, bypassing the
    /// cache, erroring with a specific NotFound (the callers here are
    /// already privileged, so disclosure is not a concern).
    async fn require_capability(&self, cap_key: &str) -> Result<Capability> {
        self.caps
            .find_by_key(cap_key)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Capability {} not found", cap_key)))
    }

    /// The granter must be a tenant owner acting on their own tenant.
    fn require_owner_of(&self, granter: &Actor, tenant_id: Uuid) -> Result<Uuid> {
        if granter.role != Role::TenantOwner {
            return Err(AppError::Forbidden(format!(
                "role {} may not manage member grants",
                granter.role
            )));
        }
        match granter.affiliated_tenant() {
            Some(own) if own == tenant_id => Ok(own),
            Some(own) => Err(AppError::Forbidden(format!(
                "owner of tenant {} may not manage grants in tenant {}",
                own, tenant_id
            ))),
            None => Err(AppError::Forbidden(
                "tenant owner without tenant affiliation".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CapabilityOrigin;
    use crate::repository::capability::MockCapabilityRepository;
    use crate::repository::member_grant::MockMemberGrantRepository;
    use crate::repository::tenant_access::MockTenantAccessRepository;
    use chrono::Utc;
    use std::time::Duration;

    fn capability(cap_key: &str) -> Capability {
        Capability {
            id: Uuid::new_v4(),
            cap_key: cap_key.to_string(),
            name: "Invoicing".to_string(),
            version: "1.0.0".to_string(),
            is_active: true,
            actions: vec!["read".to_string(), "write".to_string()],
            default_actions: None,
            origin: CapabilityOrigin::Config,
            icon: None,
            category: None,
            config: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn tenant_grant(tenant_id: Uuid, cap_key: &str, enabled: bool) -> TenantAccessGrant {
        TenantAccessGrant {
            id: Uuid::new_v4(),
            tenant_id,
            cap_key: cap_key.to_string(),
            enabled,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn member_grant(user_id: Uuid, cap_key: &str, actions: &[String]) -> MemberGrant {
        MemberGrant {
            id: Uuid::new_v4(),
            user_id,
            cap_key: cap_key.to_string(),
            actions: actions.to_vec(),
            granted_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn service(
        caps: MockCapabilityRepository,
        tenant_access: MockTenantAccessRepository,
        member_grants: MockMemberGrantRepository,
    ) -> GrantService<MockCapabilityRepository, MockTenantAccessRepository, MockMemberGrantRepository>
    {
        let caps = Arc::new(caps);
        let registry = Arc::new(CapabilityRegistry::new(
            caps.clone(),
            std::env::temp_dir(),
            Duration::from_secs(60),
        ));
        GrantService::new(caps, registry, Arc::new(tenant_access), Arc::new(member_grants))
    }

    fn grant_input(tenant_id: Uuid, actions: &[&str]) -> GrantActionsInput {
        GrantActionsInput {
            tenant_id,
            actions: actions.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_operator_enables_capability_for_tenant() {
        let tenant = Uuid::new_v4();
        let mut caps = MockCapabilityRepository::new();
        caps.expect_find_by_key()
            .returning(|key| Ok(Some(capability(key))));
        let mut tenant_access = MockTenantAccessRepository::new();
        tenant_access
            .expect_upsert_enabled()
            .withf(move |t, k, enabled| *t == tenant && k == "invoicing" && *enabled)
            .returning(|t, k, e| Ok(tenant_grant(t, k, e)));

        let svc = service(caps, tenant_access, MockMemberGrantRepository::new());
        let operator = Actor::operator(Uuid::new_v4());

        let grant = svc
            .enable_for_tenant(&operator, tenant, "invoicing")
            .await
            .unwrap();
        assert!(grant.enabled);
    }

    #[tokio::test]
    async fn test_disable_keeps_row_with_flag_off() {
        let tenant = Uuid::new_v4();
        let mut caps = MockCapabilityRepository::new();
        caps.expect_find_by_key()
            .returning(|key| Ok(Some(capability(key))));
        let mut tenant_access = MockTenantAccessRepository::new();
        tenant_access
            .expect_upsert_enabled()
            .withf(|_, _, enabled| !*enabled)
            .returning(|t, k, e| Ok(tenant_grant(t, k, e)));

        let svc = service(caps, tenant_access, MockMemberGrantRepository::new());
        let operator = Actor::operator(Uuid::new_v4());

        let grant = svc
            .disable_for_tenant(&operator, tenant, "invoicing")
            .await
            .unwrap();
        assert!(!grant.enabled);
    }

    #[tokio::test]
    async fn test_non_operator_may_not_enable_for_tenant() {
        let tenant = Uuid::new_v4();
        let svc = service(
            MockCapabilityRepository::new(),
            MockTenantAccessRepository::new(),
            MockMemberGrantRepository::new(),
        );

        let owner = Actor::tenant_owner(Uuid::new_v4(), tenant);
        let result = svc.enable_for_tenant(&owner, tenant, "invoicing").await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));

        let member = Actor::member(Uuid::new_v4(), tenant);
        let result = svc.enable_for_tenant(&member, tenant, "invoicing").await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_enable_unknown_capability_is_not_found() {
        let mut caps = MockCapabilityRepository::new();
        caps.expect_find_by_key().returning(|_| Ok(None));

        let svc = service(
            caps,
            MockTenantAccessRepository::new(),
            MockMemberGrantRepository::new(),
        );
        let operator = Actor::operator(Uuid::new_v4());

        let result = svc
            .enable_for_tenant(&operator, Uuid::new_v4(), "ghost")
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_owner_grants_actions_and_granter_is_recorded() {
        let tenant = Uuid::new_v4();
        let owner_id = Uuid::new_v4();
        let target = Uuid::new_v4();

        let mut caps = MockCapabilityRepository::new();
        caps.expect_find_by_key()
            .returning(|key| Ok(Some(capability(key))));
        let mut tenant_access = MockTenantAccessRepository::new();
        tenant_access.expect_is_enabled().returning(|_, _| Ok(true));
        let mut member_grants = MockMemberGrantRepository::new();
        member_grants
            .expect_upsert()
            .withf(move |u, k, actions, granted_by| {
                *u == target
                    && k == "invoicing"
                    && actions == ["read".to_string()]
                    && *granted_by == Some(owner_id)
            })
            .returning(|u, k, actions, granted_by| {
                let mut grant = member_grant(u, k, actions);
                grant.granted_by = granted_by;
                Ok(grant)
            });

        let svc = service(caps, tenant_access, member_grants);
        let owner = Actor::tenant_owner(owner_id, tenant);

        let grant = svc
            .grant(&owner, target, "invoicing", grant_input(tenant, &["read"]))
            .await
            .unwrap();
        assert_eq!(grant.granted_by, Some(owner_id));
    }

    #[tokio::test]
    async fn test_regrant_replaces_action_set() {
        // Granting {read} then {write} must end with exactly {write}.
        let tenant = Uuid::new_v4();
        let target = Uuid::new_v4();

        let mut caps = MockCapabilityRepository::new();
        caps.expect_find_by_key()
            .returning(|key| Ok(Some(capability(key))));
        let mut tenant_access = MockTenantAccessRepository::new();
        tenant_access.expect_is_enabled().returning(|_, _| Ok(true));
        let mut member_grants = MockMemberGrantRepository::new();
        let mut seq = mockall::Sequence::new();
        member_grants
            .expect_upsert()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|_, _, actions, _| actions == ["read".to_string()])
            .returning(|u, k, actions, _| Ok(member_grant(u, k, actions)));
        member_grants
            .expect_upsert()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|_, _, actions, _| actions == ["write".to_string()])
            .returning(|u, k, actions, _| Ok(member_grant(u, k, actions)));

        let svc = service(caps, tenant_access, member_grants);
        let owner = Actor::tenant_owner(Uuid::new_v4(), tenant);

        svc.grant(&owner, target, "invoicing", grant_input(tenant, &["read"]))
            .await
            .unwrap();
        let second = svc
            .grant(&owner, target, "invoicing", grant_input(tenant, &["write"]))
            .await
            .unwrap();
        assert_eq!(second.actions, vec!["write".to_string()]);
    }

    #[tokio::test]
    async fn test_grant_against_disabled_capability_is_forbidden() {
        let tenant = Uuid::new_v4();
        let mut caps = MockCapabilityRepository::new();
        caps.expect_find_by_key()
            .returning(|key| Ok(Some(capability(key))));
        let mut tenant_access = MockTenantAccessRepository::new();
        tenant_access
            .expect_is_enabled()
            .returning(|_, _| Ok(false));

        let svc = service(caps, tenant_access, MockMemberGrantRepository::new());
        let owner = Actor::tenant_owner(Uuid::new_v4(), tenant);

        let result = svc
            .grant(
                &owner,
                Uuid::new_v4(),
                "invoicing",
                grant_input(tenant, &["read"]),
            )
            .await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_grant_outside_own_tenant_is_forbidden() {
        let svc = service(
            MockCapabilityRepository::new(),
            MockTenantAccessRepository::new(),
            MockMemberGrantRepository::new(),
        );
        let owner = Actor::tenant_owner(Uuid::new_v4(), Uuid::new_v4());

        let result = svc
            .grant(
                &owner,
                Uuid::new_v4(),
                "invoicing",
                grant_input(Uuid::new_v4(), &["read"]),
            )
            .await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_operator_may_not_assign_member_grants() {
        // Operators handle coarse tenant enablement only.
        let svc = service(
            MockCapabilityRepository::new(),
            MockTenantAccessRepository::new(),
            MockMemberGrantRepository::new(),
        );
        let operator = Actor::operator(Uuid::new_v4());

        let result = svc
            .grant(
                &operator,
                Uuid::new_v4(),
                "invoicing",
                grant_input(Uuid::new_v4(), &["read"]),
            )
            .await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_grant_undeclared_action_is_rejected() {
        let tenant = Uuid::new_v4();
        let mut caps = MockCapabilityRepository::new();
        caps.expect_find_by_key()
            .returning(|key| Ok(Some(capability(key))));
        let mut tenant_access = MockTenantAccessRepository::new();
        tenant_access.expect_is_enabled().returning(|_, _| Ok(true));

        let svc = service(caps, tenant_access, MockMemberGrantRepository::new());
        let owner = Actor::tenant_owner(Uuid::new_v4(), tenant);

        let result = svc
            .grant(
                &owner,
                Uuid::new_v4(),
                "invoicing",
                grant_input(tenant, &["export"]),
            )
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_grant_empty_actions_is_rejected() {
        let svc = service(
            MockCapabilityRepository::new(),
            MockTenantAccessRepository::new(),
            MockMemberGrantRepository::new(),
        );
        let tenant = Uuid::new_v4();
        let owner = Actor::tenant_owner(Uuid::new_v4(), tenant);

        let result = svc
            .grant(
                &owner,
                Uuid::new_v4(),
                "invoicing",
                grant_input(tenant, &[]),
            )
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_revoke_missing_grant_is_noop() {
        let tenant = Uuid::new_v4();
        let mut caps = MockCapabilityRepository::new();
        caps.expect_find_by_key()
            .returning(|key| Ok(Some(capability(key))));
        let mut member_grants = MockMemberGrantRepository::new();
        member_grants.expect_delete().returning(|_, _| Ok(()));

        let svc = service(caps, MockTenantAccessRepository::new(), member_grants);
        let owner = Actor::tenant_owner(Uuid::new_v4(), tenant);

        svc.revoke(&owner, Uuid::new_v4(), tenant, "invoicing")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_revoke_requires_owner_role() {
        let tenant = Uuid::new_v4();
        let svc = service(
            MockCapabilityRepository::new(),
            MockTenantAccessRepository::new(),
            MockMemberGrantRepository::new(),
        );

        let member = Actor::member(Uuid::new_v4(), tenant);
        let result = svc.revoke(&member, Uuid::new_v4(), tenant, "invoicing").await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_operator_deactivates_capability() {
        let mut caps = MockCapabilityRepository::new();
        caps.expect_set_active()
            .withf(|key, active| key == "invoicing" && !*active)
            .returning(|key, active| {
                let mut cap = capability(key);
                cap.is_active = active;
                Ok(cap)
            });

        let svc = service(
            caps,
            MockTenantAccessRepository::new(),
            MockMemberGrantRepository::new(),
        );
        let operator = Actor::operator(Uuid::new_v4());

        let cap = svc
            .set_capability_active(&operator, "invoicing", false)
            .await
            .unwrap();
        assert!(!cap.is_active);
    }

    #[tokio::test]
    async fn test_owner_may_not_change_capability_state() {
        let svc = service(
            MockCapabilityRepository::new(),
            MockTenantAccessRepository::new(),
            MockMemberGrantRepository::new(),
        );
        let owner = Actor::tenant_owner(Uuid::new_v4(), Uuid::new_v4());

        let result = svc.set_capability_active(&owner, "invoicing", false).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }
}
