//! REST API shared utilities (response types, role helpers)

pub mod access;
pub mod admin;
pub mod health;

use crate::domain::{Actor, Role};
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};

/// Require the operator role. Returns a generic Forbidden otherwise.
pub(crate) fn require_operator(actor: &Actor) -> Result<()> {
    if actor.role == Role::Operator {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "user {} with role {} requires operator",
            actor.user_id, actor.role
        )))
    }
}

/// Success response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse<T> {
    pub data: T,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Message response (for delete, invalidate, etc.)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
