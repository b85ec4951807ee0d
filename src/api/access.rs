//! Access decision endpoints
//!
//! Decision probes for the calling actor: they answer "could I", they never
//! mutate. Callers that must enforce (rather than ask) use the access
//! pipeline middleware instead.

use crate::api::SuccessResponse;
use crate::error::Result;
use crate::middleware::CurrentActor;
use crate::server::AppState;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct DecisionResponse {
    pub allowed: bool,
}

/// Whether the calling actor can reach the capability
pub async fn check_reach(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(key): Path<String>,
) -> Result<impl IntoResponse> {
    let allowed = state.resolver.can_reach(&actor, &key).await?;
    Ok(Json(SuccessResponse::new(DecisionResponse { allowed })))
}

/// Whether the calling actor can perform an action within the capability
pub async fn check_action(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path((key, action)): Path<(String, String)>,
) -> Result<impl IntoResponse> {
    let allowed = state.resolver.can_perform(&actor, &key, &action).await?;
    Ok(Json(SuccessResponse::new(DecisionResponse { allowed })))
}
