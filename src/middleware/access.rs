//! Access pipeline middleware
//!
//! Routes declare requirement markers; the guard evaluates them in a fixed
//! order (authenticated, tenant, capability, action) no matter how they were
//! declared, and the first failed check denies the request. Every denial is
//! fail-closed: a resolver error is a denial, never a pass-through.

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{request::Parts, Request},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

use crate::domain::Actor;
use crate::error::{AppError, Result};
use crate::policy::PermissionResolver;
use crate::repository::{CapabilityRepository, MemberGrantRepository, TenantAccessRepository};
use uuid::Uuid;

/// Why a check denied. Logged server-side; the response body stays generic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    MissingTenantAffiliation {
        user_id: Uuid,
    },
    CapabilityUnreachable {
        user_id: Uuid,
        cap_key: String,
    },
    ActionForbidden {
        user_id: Uuid,
        cap_key: String,
        action: String,
    },
}

impl std::fmt::Display for DenialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingTenantAffiliation { user_id } => {
                write!(f, "user {} has no tenant affiliation", user_id)
            }
            Self::CapabilityUnreachable { user_id, cap_key } => {
                write!(f, "user {} cannot reach capability '{}'", user_id, cap_key)
            }
            Self::ActionForbidden {
                user_id,
                cap_key,
                action,
            } => write!(
                f,
                "user {} cannot perform '{}' on capability '{}'",
                user_id, action, cap_key
            ),
        }
    }
}

impl From<DenialReason> for AppError {
    fn from(reason: DenialReason) -> Self {
        AppError::Forbidden(reason.to_string())
    }
}

/// A single route requirement, parsed from a declaration marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessRequirement {
    /// `requires-auth`: an actor must be attached to the request.
    Authenticated,
    /// `requires-tenant`: the actor must carry a tenant affiliation.
    /// Operators have none, so a tenant-scoped endpoint denies them too;
    /// their bypass covers capability gating only.
    Tenant,
    /// `requires-capability:<id>`: the actor must reach the capability.
    Capability(String),
    /// `requires-action:<id>:<action>`: the actor must be able to perform
    /// the action within the capability.
    Action(String, String),
}

impl AccessRequirement {
    /// Parse a declaration marker. Unknown or malformed markers are
    /// rejected at router construction time rather than at request time.
    pub fn parse(marker: &str) -> Result<Self> {
        match marker {
            "requires-auth" => return Ok(Self::Authenticated),
            "requires-tenant" => return Ok(Self::Tenant),
            _ => {}
        }
        if let Some(cap_key) = marker.strip_prefix("requires-capability:") {
            if cap_key.is_empty() {
                return Err(AppError::BadRequest(
                    "requires-capability marker is missing a capability id".to_string(),
                ));
            }
            return Ok(Self::Capability(cap_key.to_string()));
        }
        if let Some(rest) = marker.strip_prefix("requires-action:") {
            return match rest.split_once(':') {
                Some((cap_key, action)) if !cap_key.is_empty() && !action.is_empty() => {
                    Ok(Self::Action(cap_key.to_string(), action.to_string()))
                }
                _ => Err(AppError::BadRequest(format!(
                    "requires-action marker '{}' must be '<capability>:<action>'",
                    rest
                ))),
            };
        }
        Err(AppError::BadRequest(format!(
            "unknown access requirement marker '{}'",
            marker
        )))
    }

    /// Evaluation order within the pipeline. Cheaper identity checks run
    /// before store-backed permission checks.
    fn rank(&self) -> u8 {
        match self {
            Self::Authenticated => 0,
            Self::Tenant => 1,
            Self::Capability(_) => 2,
            Self::Action(_, _) => 3,
        }
    }
}

/// Shared state for the access middleware: the resolver plus the ordered
/// requirements of the route group it protects.
pub struct AccessGuard<R, T, M>
where
    R: CapabilityRepository,
    T: TenantAccessRepository,
    M: MemberGrantRepository,
{
    resolver: Arc<PermissionResolver<R, T, M>>,
    requirements: Vec<AccessRequirement>,
}

// Derived Clone would demand Clone on the repository types.
impl<R, T, M> Clone for AccessGuard<R, T, M>
where
    R: CapabilityRepository,
    T: TenantAccessRepository,
    M: MemberGrantRepository,
{
    fn clone(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
            requirements: self.requirements.clone(),
        }
    }
}

impl<R, T, M> AccessGuard<R, T, M>
where
    R: CapabilityRepository,
    T: TenantAccessRepository,
    M: MemberGrantRepository,
{
    /// Build a guard from requirement values. Authentication is always
    /// enforced first, whether declared or not, and the remaining checks
    /// are normalized into pipeline order.
    pub fn new(
        resolver: Arc<PermissionResolver<R, T, M>>,
        mut requirements: Vec<AccessRequirement>,
    ) -> Self {
        if !requirements.contains(&AccessRequirement::Authenticated) {
            requirements.push(AccessRequirement::Authenticated);
        }
        requirements.sort_by_key(AccessRequirement::rank);
        requirements.dedup();
        Self {
            resolver,
            requirements,
        }
    }

    /// Build a guard from declaration markers.
    pub fn from_markers(
        resolver: Arc<PermissionResolver<R, T, M>>,
        markers: &[&str],
    ) -> Result<Self> {
        let requirements = markers
            .iter()
            .map(|m| AccessRequirement::parse(m))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(resolver, requirements))
    }

    async fn check(&self, actor: &Actor, requirement: &AccessRequirement) -> Result<()> {
        let denial = match requirement {
            AccessRequirement::Authenticated => None,
            AccessRequirement::Tenant => {
                if actor.affiliated_tenant().is_some() {
                    None
                } else {
                    Some(DenialReason::MissingTenantAffiliation {
                        user_id: actor.user_id,
                    })
                }
            }
            AccessRequirement::Capability(cap_key) => {
                if self.resolver.can_reach(actor, cap_key).await? {
                    None
                } else {
                    Some(DenialReason::CapabilityUnreachable {
                        user_id: actor.user_id,
                        cap_key: cap_key.clone(),
                    })
                }
            }
            AccessRequirement::Action(cap_key, action) => {
                if self.resolver.can_perform(actor, cap_key, action).await? {
                    None
                } else {
                    Some(DenialReason::ActionForbidden {
                        user_id: actor.user_id,
                        cap_key: cap_key.clone(),
                        action: action.clone(),
                    })
                }
            }
        };

        match denial {
            Some(reason) => Err(reason.into()),
            None => Ok(()),
        }
    }
}

/// Access pipeline middleware.
///
/// Requests without an attached actor are rejected with 401; requests whose
/// actor fails any declared requirement are rejected with 403. The response
/// body never discloses which check failed.
pub async fn require_access<R, T, M>(
    State(guard): State<AccessGuard<R, T, M>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response>
where
    R: CapabilityRepository + 'static,
    T: TenantAccessRepository + 'static,
    M: MemberGrantRepository + 'static,
{
    let Some(actor) = request.extensions().get::<Actor>().cloned() else {
        return Err(AppError::Unauthenticated(
            "no actor attached to request".to_string(),
        ));
    };

    for requirement in &guard.requirements {
        guard.check(&actor, requirement).await?;
        debug!(user_id = %actor.user_id, ?requirement, "access check passed");
    }

    Ok(next.run(request).await)
}

/// Extractor for handlers that need the calling actor after the guard has
/// let the request through.
#[derive(Debug, Clone)]
pub struct CurrentActor(pub Actor);

impl<S> FromRequestParts<S> for CurrentActor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<Actor>()
            .cloned()
            .map(CurrentActor)
            .ok_or_else(|| {
                AppError::Unauthenticated("no actor attached to request".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::CapabilityRegistry;
    use crate::repository::capability::MockCapabilityRepository;
    use crate::repository::member_grant::MockMemberGrantRepository;
    use crate::repository::tenant_access::MockTenantAccessRepository;
    use axum::{
        http::StatusCode,
        routing::get,
        Extension, Router,
    };
    use std::time::Duration;
    use tower::ServiceExt;
    use uuid::Uuid;

    type TestGuard = AccessGuard<
        MockCapabilityRepository,
        MockTenantAccessRepository,
        MockMemberGrantRepository,
    >;

    async fn guarded_handler() -> &'static str {
        "ok"
    }

    fn resolver_with(
        caps: MockCapabilityRepository,
        tenant_access: MockTenantAccessRepository,
        member_grants: MockMemberGrantRepository,
    ) -> Arc<
        PermissionResolver<
            MockCapabilityRepository,
            MockTenantAccessRepository,
            MockMemberGrantRepository,
        >,
    > {
        let registry = Arc::new(CapabilityRegistry::new(
            Arc::new(caps),
            std::env::temp_dir(),
            Duration::from_secs(60),
        ));
        Arc::new(PermissionResolver::new(
            registry,
            Arc::new(tenant_access),
            Arc::new(member_grants),
        ))
    }

    fn app(guard: TestGuard, actor: Option<Actor>) -> Router {
        let mut router = Router::new().route("/guarded", get(guarded_handler)).layer(
            axum::middleware::from_fn_with_state(guard, require_access),
        );
        if let Some(actor) = actor {
            router = router.layer(Extension(actor));
        }
        router
    }

    async fn status_of(router: Router) -> StatusCode {
        let request = Request::builder()
            .uri("/guarded")
            .body(Body::empty())
            .unwrap();
        router.oneshot(request).await.unwrap().status()
    }

    #[test]
    fn test_parse_markers() {
        assert_eq!(
            AccessRequirement::parse("requires-auth").unwrap(),
            AccessRequirement::Authenticated
        );
        assert_eq!(
            AccessRequirement::parse("requires-tenant").unwrap(),
            AccessRequirement::Tenant
        );
        assert_eq!(
            AccessRequirement::parse("requires-capability:invoicing").unwrap(),
            AccessRequirement::Capability("invoicing".to_string())
        );
        assert_eq!(
            AccessRequirement::parse("requires-action:invoicing:write").unwrap(),
            AccessRequirement::Action("invoicing".to_string(), "write".to_string())
        );
    }

    #[test]
    fn test_denial_reason_maps_to_forbidden() {
        let reason = DenialReason::CapabilityUnreachable {
            user_id: Uuid::new_v4(),
            cap_key: "invoicing".to_string(),
        };
        let err: AppError = reason.into();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn test_parse_rejects_malformed_markers() {
        assert!(AccessRequirement::parse("requires-capability:").is_err());
        assert!(AccessRequirement::parse("requires-action:invoicing").is_err());
        assert!(AccessRequirement::parse("requires-action::write").is_err());
        assert!(AccessRequirement::parse("requires-magic").is_err());
    }

    #[test]
    fn test_requirements_are_normalized_into_pipeline_order() {
        let resolver = resolver_with(
            MockCapabilityRepository::new(),
            MockTenantAccessRepository::new(),
            MockMemberGrantRepository::new(),
        );
        let guard = AccessGuard::new(
            resolver,
            vec![
                AccessRequirement::Action("invoicing".to_string(), "write".to_string()),
                AccessRequirement::Capability("invoicing".to_string()),
                AccessRequirement::Tenant,
            ],
        );
        assert_eq!(
            guard.requirements,
            vec![
                AccessRequirement::Authenticated,
                AccessRequirement::Tenant,
                AccessRequirement::Capability("invoicing".to_string()),
                AccessRequirement::Action("invoicing".to_string(), "write".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_request_without_actor_is_unauthenticated() {
        let resolver = resolver_with(
            MockCapabilityRepository::new(),
            MockTenantAccessRepository::new(),
            MockMemberGrantRepository::new(),
        );
        let guard = AccessGuard::new(resolver, vec![]);

        let status = status_of(app(guard, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_tenant_requirement_denies_actor_without_tenant() {
        let resolver = resolver_with(
            MockCapabilityRepository::new(),
            MockTenantAccessRepository::new(),
            MockMemberGrantRepository::new(),
        );
        let guard = AccessGuard::new(resolver, vec![AccessRequirement::Tenant]);

        let mut actor = Actor::member(Uuid::new_v4(), Uuid::new_v4());
        actor.tenant_id = None;

        let status = status_of(app(guard, Some(actor))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_tenant_requirement_denies_operator_without_affiliation() {
        // The operator bypass covers capability gating only; a tenant-scoped
        // endpoint still requires an affiliation the operator does not have.
        let resolver = resolver_with(
            MockCapabilityRepository::new(),
            MockTenantAccessRepository::new(),
            MockMemberGrantRepository::new(),
        );
        let guard = AccessGuard::new(resolver, vec![AccessRequirement::Tenant]);

        let status = status_of(app(guard, Some(Actor::operator(Uuid::new_v4())))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_tenant_requirement_passes_affiliated_member() {
        let resolver = resolver_with(
            MockCapabilityRepository::new(),
            MockTenantAccessRepository::new(),
            MockMemberGrantRepository::new(),
        );
        let guard = AccessGuard::new(resolver, vec![AccessRequirement::Tenant]);

        let member = Actor::member(Uuid::new_v4(), Uuid::new_v4());
        let status = status_of(app(guard, Some(member))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_capability_requirement_denies_unreachable_capability() {
        // No capability rows exist, so a tenant owner cannot reach anything.
        let mut caps = MockCapabilityRepository::new();
        caps.expect_find_by_key().returning(|_| Ok(None));
        let resolver = resolver_with(
            caps,
            MockTenantAccessRepository::new(),
            MockMemberGrantRepository::new(),
        );
        let guard = AccessGuard::new(
            resolver,
            vec![AccessRequirement::Capability("invoicing".to_string())],
        );

        let owner = Actor::tenant_owner(Uuid::new_v4(), Uuid::new_v4());
        let status = status_of(app(guard, Some(owner))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_operator_passes_capability_and_action_checks() {
        let resolver = resolver_with(
            MockCapabilityRepository::new(),
            MockTenantAccessRepository::new(),
            MockMemberGrantRepository::new(),
        );
        let guard = AccessGuard::new(
            resolver,
            vec![
                AccessRequirement::Capability("invoicing".to_string()),
                AccessRequirement::Action("invoicing".to_string(), "write".to_string()),
            ],
        );

        let status = status_of(app(guard, Some(Actor::operator(Uuid::new_v4())))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_resolver_error_denies_the_request() {
        // A failing store must fail closed, not open.
        let mut caps = MockCapabilityRepository::new();
        caps.expect_find_by_key()
            .returning(|_| Err(AppError::Database(sqlx::Error::PoolClosed)));
        let resolver = resolver_with(
            caps,
            MockTenantAccessRepository::new(),
            MockMemberGrantRepository::new(),
        );
        let guard = AccessGuard::new(
            resolver,
            vec![AccessRequirement::Capability("invoicing".to_string())],
        );

        let owner = Actor::tenant_owner(Uuid::new_v4(), Uuid::new_v4());
        let status = status_of(app(guard, Some(owner))).await;
        assert_ne!(status, StatusCode::OK);
    }
}
