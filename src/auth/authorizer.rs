use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use super::Identity;
use crate::{error::ApiError, models::Role};

/// RoleGate
///
/// Role requirement attached to a route group. `allow_system` lets shared-secret
/// callers through regardless of the required role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleGate {
    pub required: Role,
    pub allow_system: bool,
}

impl RoleGate {
    pub fn new(required: Role) -> Self {
        Self {
            required,
            allow_system: false,
        }
    }

    pub fn allowing_system(mut self) -> Self {
        self.allow_system = true;
        self
    }

    pub fn check(&self, identity: &Identity) -> Result<(), ApiError> {
        if identity.is_system && self.allow_system {
            return Ok(());
        }
        if identity.role != self.required {
            tracing::debug!(
                subject = ?identity.subject,
                role = %identity.role,
                required = %self.required,
                "role gate rejected request"
            );
            return Err(ApiError::Forbidden(format!(
                "Only {}s can perform this action",
                self.required
            )));
        }
        Ok(())
    }
}

/// require_role
///
/// Middleware run after `require_auth`. The `Identity` extractor only reads what the
/// authentication layer attached, so this never runs for unauthenticated requests.
pub async fn require_role(
    State(gate): State<RoleGate>,
    identity: Identity,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    gate.check(&identity)?;
    Ok(next.run(request).await)
}
