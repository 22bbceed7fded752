// Security - role-based capability checks for privileged operations

use crate::error::{AppError, AppResult};
use crate::models::UserRole;

/// Operations gated on role rather than ownership
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// List users and change their roles
    ManageRoles,
    /// Delete posts authored by someone else
    DeleteAnyPost,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ManageRoles => "manage_roles",
            Capability::DeleteAnyPost => "delete_any_post",
        }
    }
}

pub fn can(role: UserRole, capability: Capability) -> bool {
    match (role, capability) {
        (UserRole::Admin, _) => true,
        (UserRole::User, Capability::ManageRoles | Capability::DeleteAnyPost) => false,
    }
}

pub fn require(role: UserRole, capability: Capability) -> AppResult<()> {
    if can(role, capability) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "{} role lacks {}",
            role,
            capability.as_str()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admins_hold_every_capability() {
        assert!(can(UserRole::Admin, Capability::ManageRoles));
        assert!(can(UserRole::Admin, Capability::DeleteAnyPost));
    }

    #[test]
    fn users_are_refused_with_forbidden() {
        assert!(!can(UserRole::User, Capability::ManageRoles));
        let err = require(UserRole::User, Capability::DeleteAnyPost).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }
}
