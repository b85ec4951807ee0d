//! Administrative API handlers
//!
//! Role enforcement for grant mutations lives in the grant service; the
//! registry endpoints check for the operator role here.

use crate::api::{require_operator, MessageResponse, SuccessResponse};
use crate::domain::GrantActionsInput;
use crate::error::Result;
use crate::middleware::CurrentActor;
use crate::server::AppState;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// List all capability rows, active or not
pub async fn list_capabilities(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> Result<impl IntoResponse> {
    require_operator(&actor)?;
    let capabilities = state.registry.list().await?;
    Ok(Json(SuccessResponse::new(capabilities)))
}

/// Reactivate a capability
pub async fn activate_capability(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(key): Path<String>,
) -> Result<impl IntoResponse> {
    let capability = state
        .grant_service
        .set_capability_active(&actor, &key, true)
        .await?;
    Ok(Json(SuccessResponse::new(capability)))
}

/// Deactivate a capability (sync never deletes rows)
pub async fn deactivate_capability(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(key): Path<String>,
) -> Result<impl IntoResponse> {
    let capability = state
        .grant_service
        .set_capability_active(&actor, &key, false)
        .await?;
    Ok(Json(SuccessResponse::new(capability)))
}

/// Enable a capability for a tenant
pub async fn enable_for_tenant(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path((tenant_id, key)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse> {
    let grant = state
        .grant_service
        .enable_for_tenant(&actor, tenant_id, &key)
        .await?;
    Ok(Json(SuccessResponse::new(grant)))
}

/// Disable a capability for a tenant
pub async fn disable_for_tenant(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path((tenant_id, key)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse> {
    let grant = state
        .grant_service
        .disable_for_tenant(&actor, tenant_id, &key)
        .await?;
    Ok(Json(SuccessResponse::new(grant)))
}

/// Grant member-level actions; a re-grant replaces the action set
pub async fn grant_member_actions(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path((user_id, key)): Path<(Uuid, String)>,
    Json(input): Json<GrantActionsInput>,
) -> Result<impl IntoResponse> {
    let grant = state
        .grant_service
        .grant(&actor, user_id, &key, input)
        .await?;
    Ok(Json(SuccessResponse::new(grant)))
}

#[derive(Debug, Deserialize)]
pub struct RevokeQuery {
    pub tenant_id: Uuid,
}

/// Revoke a member grant; revoking a missing grant is a no-op
pub async fn revoke_member_actions(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path((user_id, key)): Path<(Uuid, String)>,
    Query(query): Query<RevokeQuery>,
) -> Result<impl IntoResponse> {
    state
        .grant_service
        .revoke(&actor, user_id, query.tenant_id, &key)
        .await?;
    Ok(Json(MessageResponse::new("Grant revoked")))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SyncResponse {
    pub synced: usize,
}

/// Force re-discovery, store sync, and a whole-cache invalidation
pub async fn sync_registry(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> Result<impl IntoResponse> {
    require_operator(&actor)?;
    let synced = state.registry.refresh().await?;
    Ok(Json(SuccessResponse::new(SyncResponse { synced })))
}

#[derive(Debug, Deserialize)]
pub struct InvalidateQuery {
    pub key: Option<String>,
}

/// Drop cached capability entries, either one key or the whole cache
pub async fn invalidate_cache(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Query(query): Query<InvalidateQuery>,
) -> Result<impl IntoResponse> {
    require_operator(&actor)?;
    match query.key {
        Some(key) => {
            state.registry.invalidate(&key);
            Ok(Json(MessageResponse::new(format!(
                "Cache entry '{}' invalidated",
                key
            ))))
        }
        None => {
            state.registry.invalidate_all();
            Ok(Json(MessageResponse::new("Capability cache invalidated")))
        }
    }
}
