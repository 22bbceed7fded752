use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::infrastructure::security::{self, Capability};
use crate::models::UserRole;

/// Request-scoped identity. Handlers only ever see this, never raw tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerContext {
    pub user_id: Option<Uuid>,
    pub role: UserRole,
    pub request_id: String,
}

impl ViewerContext {
    pub fn anonymous(request_id: impl Into<String>) -> Self {
        ViewerContext {
            user_id: None,
            role: UserRole::User,
            request_id: request_id.into(),
        }
    }

    pub fn authenticated(user_id: Uuid, role: UserRole, request_id: impl Into<String>) -> Self {
        ViewerContext {
            user_id: Some(user_id),
            role,
            request_id: request_id.into(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    /// The signed-in user id, or `Unauthorized` for anonymous viewers
    pub fn require_user(&self) -> AppResult<Uuid> {
        self.user_id
            .ok_or_else(|| AppError::Unauthorized("Sign in required".to_string()))
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.is_authenticated() && security::can(self.role, capability)
    }

    pub fn require(&self, capability: Capability) -> AppResult<()> {
        self.require_user()?;
        security::require(self.role, capability)
    }
}
